//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - [`ScoreError`]: what the scoring core reports. Every failure of the
//!   decode → trim → extract → align chain ends up as one of its variants,
//!   and scoring is all-or-nothing: no partial score is ever returned.
//! - [`AppError`]: what the HTTP layer reports. It knows how to turn itself
//!   into a JSON response with the right status code, and every
//!   `ScoreError` converts into it with `?`.
//!
//! ## Why two types:
//! The core is usable without a web server (tests, other callers), so it must
//! not know about HTTP status codes. The server maps each core failure to the
//! status a client should see.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failures reported by the scoring core.
///
/// ## Variants:
/// - **Decode**: the bytes are empty or not a recognised audio container
/// - **EmptySequence**: one side produced no frames after trimming while the
///   other side did (two empty sides score 0.0 instead)
/// - **Configuration**: parameters the core cannot work with (K ≤ 1,
///   sample rate 0, non-positive trim threshold, ...)
/// - **Resample**: the sinc resampler could not be built or run
/// - **InputTooLong**: the decoded audio exceeds the configured duration cap
/// - **AlignmentTooLarge**: the DTW grid would exceed the configured cell limit
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("failed to decode audio: {0}")]
    Decode(String),

    #[error("empty feature sequence: {0}")]
    EmptySequence(String),

    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("resampling failed: {0}")]
    Resample(String),

    #[error("audio is {seconds:.1}s long, limit is {limit:.1}s")]
    InputTooLong { seconds: f64, limit: f64 },

    #[error("aligning {rows}x{cols} frames needs more than the {limit} DTW cells allowed")]
    AlignmentTooLarge { rows: usize, cols: usize, limit: usize },
}

impl ScoreError {
    /// Stable, machine-readable name of the failure kind.
    ///
    /// Used as a metrics key and in logs, so it must not change between releases.
    pub fn kind(&self) -> &'static str {
        match self {
            ScoreError::Decode(_) => "decode_error",
            ScoreError::EmptySequence(_) => "empty_sequence_error",
            ScoreError::Configuration(_) => "configuration_error",
            ScoreError::Resample(_) => "resample_error",
            ScoreError::InputTooLong { .. } => "input_too_long",
            ScoreError::AlignmentTooLarge { .. } => "alignment_too_large",
        }
    }
}

impl From<rubato::ResamplerConstructionError> for ScoreError {
    fn from(err: rubato::ResamplerConstructionError) -> Self {
        ScoreError::Resample(err.to_string())
    }
}

impl From<rubato::ResampleError> for ScoreError {
    fn from(err: rubato::ResampleError) -> Self {
        ScoreError::Resample(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for ScoreError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        ScoreError::Decode(err.to_string())
    }
}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: server-side problems (500)
/// - **BadRequest**: the upload could not be used as audio (400)
/// - **ValidationError**: malformed form data or parameters (400)
/// - **Unprocessable**: valid audio that yields nothing to compare (422)
/// - **PayloadTooLarge**: upload, decoded duration or DTW grid over the limit (413)
/// - **Unavailable**: every scoring slot is busy (503)
/// - **ConfigError**: configuration problems (500)
///
/// ## Usage Example:
/// ```rust
/// # use mcd_backend::error::AppError;
/// let err = AppError::ValidationError("Missing field voice_ref".to_string());
/// assert_eq!(err.to_string(), "Validation error: Missing field voice_ref");
/// ```
#[derive(Debug)]
pub enum AppError {
    Internal(String),
    BadRequest(String),
    ValidationError(String),
    Unprocessable(String),
    PayloadTooLarge(String),
    Unavailable(String),
    ConfigError(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            AppError::Unprocessable(msg) => write!(f, "Unprocessable audio: {}", msg),
            AppError::PayloadTooLarge(msg) => write!(f, "Payload too large: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl AppError {
    /// Machine-readable error type used in the JSON body.
    pub fn error_type(&self) -> &'static str {
        match self {
            AppError::Internal(_) => "internal_error",
            AppError::BadRequest(_) => "bad_request",
            AppError::ValidationError(_) => "validation_error",
            AppError::Unprocessable(_) => "unprocessable",
            AppError::PayloadTooLarge(_) => "payload_too_large",
            AppError::Unavailable(_) => "unavailable",
            AppError::ConfigError(_) => "config_error",
        }
    }

    fn message(&self) -> &str {
        match self {
            AppError::Internal(msg)
            | AppError::BadRequest(msg)
            | AppError::ValidationError(msg)
            | AppError::Unprocessable(msg)
            | AppError::PayloadTooLarge(msg)
            | AppError::Unavailable(msg)
            | AppError::ConfigError(msg) => msg,
        }
    }
}

/// Converts errors into JSON HTTP responses.
///
/// ## JSON Response Format:
/// ```json
/// {
///   "error": {
///     "type": "unprocessable",
///     "message": "empty feature sequence: voice_test has no frames after trimming",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Internal(_) | AppError::ConfigError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::BadRequest(_) | AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": {
                "type": self.error_type(),
                "message": self.message(),
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

/// Maps each core failure to the status a client should see.
///
/// Decode failures are the client's fault (bad upload); an empty sequence is
/// well-formed audio that simply has nothing to compare; resampler failures
/// are ours.
impl From<ScoreError> for AppError {
    fn from(err: ScoreError) -> Self {
        match err {
            ScoreError::Decode(_) => AppError::BadRequest(err.to_string()),
            ScoreError::EmptySequence(_) => AppError::Unprocessable(err.to_string()),
            ScoreError::Configuration(_) => AppError::ValidationError(err.to_string()),
            ScoreError::InputTooLong { .. } | ScoreError::AlignmentTooLarge { .. } => {
                AppError::PayloadTooLarge(err.to_string())
            }
            ScoreError::Resample(_) => AppError::Internal(err.to_string()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_error_kinds_are_stable() {
        assert_eq!(ScoreError::Decode("x".into()).kind(), "decode_error");
        assert_eq!(ScoreError::EmptySequence("x".into()).kind(), "empty_sequence_error");
        assert_eq!(ScoreError::Configuration("x".into()).kind(), "configuration_error");
        assert_eq!(ScoreError::Resample("x".into()).kind(), "resample_error");
        assert_eq!(
            ScoreError::InputTooLong { seconds: 12.0, limit: 10.0 }.kind(),
            "input_too_long"
        );
        assert_eq!(
            ScoreError::AlignmentTooLarge { rows: 9, cols: 9, limit: 80 }.kind(),
            "alignment_too_large"
        );
    }

    #[test]
    fn test_score_error_status_mapping() {
        let cases = [
            (ScoreError::Decode("garbage".into()), StatusCode::BAD_REQUEST),
            (ScoreError::EmptySequence("silent".into()), StatusCode::UNPROCESSABLE_ENTITY),
            (ScoreError::Configuration("K=1".into()), StatusCode::BAD_REQUEST),
            (ScoreError::Resample("ratio".into()), StatusCode::INTERNAL_SERVER_ERROR),
            (
                ScoreError::InputTooLong { seconds: 700.0, limit: 600.0 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            (
                ScoreError::AlignmentTooLarge { rows: 9000, cols: 9000, limit: 36_000_000 },
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
        ];

        for (err, status) in cases {
            let app: AppError = err.into();
            assert_eq!(app.status_code(), status, "wrong status for {}", app);
        }
    }

    #[test]
    fn test_display_carries_core_message() {
        let app: AppError = ScoreError::EmptySequence("voice_test has no frames".into()).into();
        assert_eq!(
            app.to_string(),
            "Unprocessable audio: empty feature sequence: voice_test has no frames"
        );
        assert_eq!(app.error_type(), "unprocessable");
    }

    #[test]
    fn test_input_too_long_message() {
        let err = ScoreError::InputTooLong { seconds: 12.34, limit: 10.0 };
        assert_eq!(err.to_string(), "audio is 12.3s long, limit is 10.0s");
    }
}
