//! # MCD Backend
//!
//! Mel-cepstral distortion (MCD) between two recordings: how far apart their
//! spectral envelopes are, in decibels, after aligning them in time.
//!
//! ```no_run
//! use mcd_backend::pipeline::{ScoreOptions, Scorer};
//!
//! # fn main() -> Result<(), mcd_backend::error::ScoreError> {
//! let reference = std::fs::read("reference.wav").unwrap_or_default();
//! let test = std::fs::read("test.wav").unwrap_or_default();
//!
//! let scorer = Scorer::new(ScoreOptions::default())?;
//! let report = scorer.score_bytes(reference, test)?;
//! println!("MCD: {:.3} dB over {} aligned frames", report.mcd, report.path_length);
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules:
//! - [`audio`]: decoding, resampling and silence trimming
//! - [`features`]: MFCC extraction
//! - [`alignment`]: DTW / truncation and the distortion measure
//! - [`pipeline`]: everything above behind one [`pipeline::Scorer`]
//! - [`config`], [`error`]: shared with the HTTP server binary

pub mod alignment;
pub mod audio;
pub mod config;
pub mod error;
pub mod features;
pub mod pipeline;
