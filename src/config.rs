//! # Configuration Management
//!
//! Loads the service configuration from layered sources:
//! - Default values (built into the code)
//! - TOML configuration file (config.toml)
//! - Environment variables (with APP_ prefix, `__` between nested keys)
//!
//! ## Key Rust Concepts Used:
//! - **Serde**: the same structs are read from TOML/env and written out as JSON
//! - **Enums in config**: `mode` and `dtw_storage` deserialize straight into
//!   [`AlignmentMode`] / [`DtwStorage`], so a typo fails at load time
//! - **Result<T, E>**: every loading and validation step can fail and says why
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_SCORING__N_MFCC, ...)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

use crate::alignment::{AlignmentMode, DtwStorage, DEFAULT_MAX_DTW_CELLS};
use crate::pipeline::ScoreOptions;

/// Main application configuration that contains all settings.
///
/// ## Why separate config structs:
/// Server binding, scoring parameters and resource limits change for
/// different reasons; keeping them apart keeps each section small.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub scoring: ScoringConfig,
    pub performance: PerformanceConfig,
}

/// Server-specific configuration settings.
///
/// ## Common values:
/// - `host = "127.0.0.1"`: Only accept connections from localhost (development)
/// - `host = "0.0.0.0"`: Accept connections from any IP address (production)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Default scoring parameters. Requests may override most of them per call.
///
/// ## Fields:
/// - `target_sample_rate`: both recordings are resampled to this rate (Hz)
/// - `n_mfcc`: coefficients per frame, energy included (at least 2)
/// - `top_db`: silence threshold below the peak, in dB
/// - `mode`: `"dtw"` (default) or `"truncate"`
/// - `dtw_storage`: `"full_matrix"` or `"rolling_rows"` (score only, O(min(N, M)) memory)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    pub target_sample_rate: u32,
    pub n_mfcc: usize,
    pub top_db: f64,
    pub mode: AlignmentMode,
    pub dtw_storage: DtwStorage,
}

/// Resource limits.
///
/// ## Tuning guidelines:
/// - DTW costs O(N×M) time and, with `full_matrix` storage, O(N×M) memory
///   (9 bytes per cell); `max_dtw_cells` bounds N×M directly, whatever the
///   durations
/// - Each running score holds both decoded recordings in memory, so
///   `max_concurrent_scores × 2 × max_upload_bytes` is a rough memory ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_scores: usize,
    /// Per uploaded file.
    pub max_upload_bytes: usize,
    /// 0 disables the cap.
    pub max_duration_seconds: f64,
    /// Largest N×M frame grid a DTW request may need.
    pub max_dtw_cells: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            scoring: ScoringConfig {
                target_sample_rate: 16000,
                n_mfcc: 13,
                top_db: 30.0,
                mode: AlignmentMode::Dtw,
                dtw_storage: DtwStorage::FullMatrix,
            },
            performance: PerformanceConfig {
                max_concurrent_scores: 4,
                max_upload_bytes: 50 * 1024 * 1024, // 50MB per file
                max_duration_seconds: 600.0,        // 10 minutes
                max_dtw_cells: DEFAULT_MAX_DTW_CELLS,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_SERVER__PORT=3000`: Override server port
    /// - `APP_SCORING__MODE=truncate`: Default to the non-warping mode
    /// - `APP_PERFORMANCE__MAX_CONCURRENT_SCORES=8`
    /// - `HOST=0.0.0.0` / `PORT=3000`: Special cases for deployment platforms
    ///
    /// The double underscore keeps field names such as `n_mfcc` intact.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let config: AppConfig = settings.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Scoring parameters are checked by building the same [`ScoreOptions`]
    /// the handlers use, so anything accepted here is accepted by the scorer.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.performance.max_concurrent_scores == 0 {
            return Err(anyhow::anyhow!("Max concurrent scores must be greater than 0"));
        }

        if self.performance.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Max upload size must be greater than 0"));
        }

        if !self.performance.max_duration_seconds.is_finite()
            || self.performance.max_duration_seconds < 0.0
        {
            return Err(anyhow::anyhow!(
                "Max duration must be a non-negative number of seconds (0 disables the cap)"
            ));
        }

        self.to_score_options().validate()?;
        Ok(())
    }

    /// Scoring options for a request that overrides nothing.
    pub fn to_score_options(&self) -> ScoreOptions {
        let limit = self.performance.max_duration_seconds;
        ScoreOptions {
            target_sample_rate: self.scoring.target_sample_rate,
            n_mfcc: self.scoring.n_mfcc,
            top_db: self.scoring.top_db,
            mode: self.scoring.mode,
            dtw_storage: self.scoring.dtw_storage,
            max_duration_seconds: (limit > 0.0).then_some(limit),
            max_dtw_cells: self.performance.max_dtw_cells,
        }
    }

    /// Apply a partial JSON document (used for runtime config updates).
    ///
    /// Only the keys present are changed; e.g. `{"scoring": {"mode": "truncate"}}`.
    /// The result is validated as a whole and nothing is applied if it fails.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let patch: serde_json::Value = serde_json::from_str(json_str)?;
        if !patch.is_object() {
            return Err(anyhow::anyhow!("Config update must be a JSON object"));
        }

        let mut merged = serde_json::to_value(&*self)?;
        merge_json(&mut merged, patch);

        let updated: AppConfig = serde_json::from_value(merged)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }
}

/// Recursively overlays `patch` onto `target`; non-object values replace.
fn merge_json(target: &mut serde_json::Value, patch: serde_json::Value) {
    match (target, patch) {
        (serde_json::Value::Object(target), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match target.get_mut(&key) {
                    Some(existing) => merge_json(existing, value),
                    None => {
                        target.insert(key, value);
                    }
                }
            }
        }
        (target, patch) => *target = patch,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.scoring.n_mfcc, 13);
        assert_eq!(config.scoring.mode, AlignmentMode::Dtw);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.max_concurrent_scores = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scoring.n_mfcc = 1;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.max_duration_seconds = -5.0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.performance.max_dtw_cells = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.scoring.target_sample_rate = 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_update() {
        let mut config = AppConfig::default();
        let json = r#"{"server": {"port": 9090}, "scoring": {"mode": "truncate", "top_db": 40.0}}"#;
        assert!(config.update_from_json(json).is_ok());
        assert_eq!(config.server.port, 9090);
        assert_eq!(config.scoring.mode, AlignmentMode::Truncate);
        assert_eq!(config.scoring.top_db, 40.0);
        // Untouched fields keep their values
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.scoring.n_mfcc, 13);
    }

    #[test]
    fn test_invalid_update_changes_nothing() {
        let mut config = AppConfig::default();
        assert!(config.update_from_json(r#"{"scoring": {"n_mfcc": 1}}"#).is_err());
        assert!(config.update_from_json(r#"{"scoring": {"mode": "euclid"}}"#).is_err());
        assert!(config.update_from_json(r#"[1, 2]"#).is_err());
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_score_options_mapping() {
        let mut config = AppConfig::default();
        let options = config.to_score_options();
        assert_eq!(options.target_sample_rate, 16000);
        assert_eq!(options.max_duration_seconds, Some(600.0));
        assert_eq!(options.max_dtw_cells, DEFAULT_MAX_DTW_CELLS);

        config.performance.max_duration_seconds = 0.0;
        config.scoring.dtw_storage = DtwStorage::RollingRows;
        let options = config.to_score_options();
        assert_eq!(options.max_duration_seconds, None);
        assert_eq!(options.dtw_storage, DtwStorage::RollingRows);
    }

    #[test]
    fn test_load_from_toml_layer() {
        let toml = r#"
            [scoring]
            mode = "truncate"
            dtw_storage = "rolling_rows"
            n_mfcc = 20
        "#;
        let config: AppConfig = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default()).unwrap())
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();

        assert_eq!(config.scoring.mode, AlignmentMode::Truncate);
        assert_eq!(config.scoring.dtw_storage, DtwStorage::RollingRows);
        assert_eq!(config.scoring.n_mfcc, 20);
        assert_eq!(config.server.port, 8080);
        assert!(config.validate().is_ok());
    }
}
