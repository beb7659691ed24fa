use crate::state::AppState;
use actix_multipart::{Field, Multipart};
use actix_web::{web, HttpResponse};
use futures_util::stream::StreamExt;
use mcd_backend::alignment::AlignmentMode;
use mcd_backend::error::{AppError, AppResult, ScoreError};
use mcd_backend::pipeline::{ScoreOptions, ScoreReport, Scorer};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

pub const REFERENCE_FIELD: &str = "voice_ref";
pub const TEST_FIELD: &str = "voice_test";

/// Per-request overrides of the configured scoring defaults.
#[derive(Debug, Default, Deserialize)]
pub struct ScoreQuery {
    pub mode: Option<String>,
    pub n_mfcc: Option<usize>,
    pub top_db: Option<f64>,
    pub sample_rate: Option<u32>,
}

impl ScoreQuery {
    fn apply(&self, mut options: ScoreOptions) -> AppResult<ScoreOptions> {
        if let Some(mode) = &self.mode {
            options.mode = mode.parse::<AlignmentMode>()?;
        }
        if let Some(n_mfcc) = self.n_mfcc {
            options.n_mfcc = n_mfcc;
        }
        if let Some(top_db) = self.top_db {
            options.top_db = top_db;
        }
        if let Some(rate) = self.sample_rate {
            options.target_sample_rate = rate;
        }
        options.validate()?;
        Ok(options)
    }
}

/// Score the mel-cepstral distortion between two uploaded recordings.
///
/// ## Endpoint: `POST /mcd` (also `POST /api/v1/mcd`)
///
/// ## Request:
/// Multipart form data with audio file fields `voice_ref` and `voice_test`.
/// Optional query: `?mode=truncate&n_mfcc=20&top_db=40&sample_rate=22050`.
///
/// ## Response:
/// ```json
/// {
///   "mcd": 4.73,
///   "mode": "dtw",
///   "frames": { "reference": 312, "test": 298 },
///   "path_length": 341,
///   "processing_time_ms": 48,
///   "timestamp": "2025-01-01T12:00:00Z"
/// }
/// ```
pub async fn score_mcd(
    state: web::Data<AppState>,
    query: web::Query<ScoreQuery>,
    mut payload: Multipart,
) -> AppResult<HttpResponse> {
    let start_time = Instant::now();
    let config = state.get_config();
    let options = query.apply(config.to_score_options())?;
    let limit = config.performance.max_upload_bytes;

    let mut reference: Option<Vec<u8>> = None;
    let mut test: Option<Vec<u8>> = None;

    while let Some(item) = payload.next().await {
        let mut field: Field =
            item.map_err(|e| AppError::ValidationError(format!("Multipart error: {}", e)))?;

        let field_name = field
            .content_disposition()
            .and_then(|cd| cd.get_name())
            .map(str::to_string)
            .ok_or_else(|| AppError::ValidationError("Missing field name".to_string()))?;

        let slot = match field_name.as_str() {
            REFERENCE_FIELD => &mut reference,
            TEST_FIELD => &mut test,
            _ => {
                drain_field(&mut field).await?;
                continue;
            }
        };
        if slot.is_some() {
            return Err(AppError::ValidationError(format!(
                "Field {} provided more than once",
                field_name
            )));
        }
        *slot = Some(read_field(&mut field, &field_name, limit).await?);
    }

    let reference = reference.ok_or_else(|| {
        AppError::ValidationError(format!("Missing audio file field {}", REFERENCE_FIELD))
    })?;
    let test = test.ok_or_else(|| {
        AppError::ValidationError(format!("Missing audio file field {}", TEST_FIELD))
    })?;

    let guard = state.try_begin_scoring().ok_or_else(|| {
        AppError::Unavailable(format!(
            "All {} scoring slots are busy, retry later",
            config.performance.max_concurrent_scores
        ))
    })?;

    let reference_bytes = reference.len();
    let test_bytes = test.len();
    let scoring_start = Instant::now();

    let outcome = web::block(move || -> Result<ScoreReport, ScoreError> {
        let _slot = guard;
        Scorer::new(options)?.score_bytes(reference, test)
    })
    .await
    .map_err(|e| AppError::Internal(format!("Scoring task failed: {}", e)))?;

    let scoring_ms = scoring_start.elapsed().as_millis() as u64;

    let report = match outcome {
        Ok(report) => report,
        Err(err) => {
            state.record_score_failure(err.kind());
            warn!(
                kind = err.kind(),
                error = %err,
                reference_bytes,
                test_bytes,
                "Scoring failed"
            );
            return Err(err.into());
        }
    };

    state.record_score_success(scoring_ms);
    info!(
        mcd = report.mcd,
        mode = %report.mode,
        reference_frames = report.reference_frames,
        test_frames = report.test_frames,
        path_length = report.path_length,
        scoring_ms,
        "Scored upload pair"
    );

    Ok(HttpResponse::Ok().json(json!({
        "mcd": report.mcd,
        "mode": report.mode,
        "frames": {
            "reference": report.reference_frames,
            "test": report.test_frames
        },
        "path_length": report.path_length,
        "processing_time_ms": start_time.elapsed().as_millis() as u64,
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}

/// Collects one file field, failing as soon as it grows past `limit` bytes.
async fn read_field(field: &mut Field, name: &str, limit: usize) -> AppResult<Vec<u8>> {
    let mut bytes = Vec::new();
    while let Some(chunk) = field.next().await {
        let chunk =
            chunk.map_err(|e| AppError::ValidationError(format!("Chunk error: {}", e)))?;
        if bytes.len() + chunk.len() > limit {
            return Err(AppError::PayloadTooLarge(format!(
                "Field {} exceeds {} bytes",
                name, limit
            )));
        }
        bytes.extend_from_slice(&chunk);
    }
    Ok(bytes)
}

async fn drain_field(field: &mut Field) -> AppResult<()> {
    while let Some(chunk) = field.next().await {
        chunk.map_err(|e| AppError::ValidationError(format!("Chunk error: {}", e)))?;
    }
    Ok(())
}
