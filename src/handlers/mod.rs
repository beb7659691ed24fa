pub mod config;
pub mod score;

pub use config::*;
pub use score::*;
