//! # Scoring Pipeline
//!
//! Wires the audio front end, feature extraction and alignment into one call:
//!
//! ```text
//! bytes → decode → (duration cap) → resample → trim → MFCC ─┐
//!                                                            ├→ align → mcd
//! bytes → decode → (duration cap) → resample → trim → MFCC ─┘
//! ```
//!
//! ## Rust Concepts Demonstrated:
//! - **Immutable Shared Engine**: a [`Scorer`] is built once, holds no mutable
//!   state and is `Send + Sync`, so the server shares one behind an `Arc`
//!   across every blocking worker
//! - **Validation at Construction**: bad options fail in [`Scorer::new`], not
//!   halfway through a request

use serde::Serialize;
use tracing::debug;

use crate::alignment::{Aligner, AlignmentMode, Distortion, DtwStorage, DEFAULT_MAX_DTW_CELLS};
use crate::audio::{decode, resample, SilenceTrimmer};
use crate::error::ScoreError;
use crate::features::{FeatureSequence, MfccConfig, MfccExtractor};

/// Accepted range for [`ScoreOptions::target_sample_rate`], in Hz.
pub const MIN_TARGET_SAMPLE_RATE: u32 = 8_000;
pub const MAX_TARGET_SAMPLE_RATE: u32 = 192_000;

/// Parameters of one scoring run.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoreOptions {
    /// Both inputs are resampled to this rate before analysis.
    pub target_sample_rate: u32,
    /// Coefficients per frame, energy included.
    pub n_mfcc: usize,
    /// Silence threshold in dB below the peak.
    pub top_db: f64,
    pub mode: AlignmentMode,
    pub dtw_storage: DtwStorage,
    /// Longest decoded input accepted, in seconds. `None` disables the cap.
    pub max_duration_seconds: Option<f64>,
    /// Largest N×M frame grid DTW may tabulate.
    pub max_dtw_cells: usize,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            target_sample_rate: 16000,
            n_mfcc: 13,
            top_db: 30.0,
            mode: AlignmentMode::Dtw,
            dtw_storage: DtwStorage::FullMatrix,
            max_duration_seconds: None,
            max_dtw_cells: DEFAULT_MAX_DTW_CELLS,
        }
    }
}

impl ScoreOptions {
    fn mfcc_config(&self) -> MfccConfig {
        MfccConfig::with_coefficients(self.target_sample_rate, self.n_mfcc)
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if !(MIN_TARGET_SAMPLE_RATE..=MAX_TARGET_SAMPLE_RATE).contains(&self.target_sample_rate) {
            return Err(ScoreError::Configuration(format!(
                "target sample rate must be between {} and {} Hz, got {}",
                MIN_TARGET_SAMPLE_RATE, MAX_TARGET_SAMPLE_RATE, self.target_sample_rate
            )));
        }
        if self.max_dtw_cells == 0 {
            return Err(ScoreError::Configuration(
                "DTW cell limit must be positive".to_string(),
            ));
        }
        SilenceTrimmer::new(self.top_db)?;
        self.mfcc_config().validate()?;
        if let Some(limit) = self.max_duration_seconds {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(ScoreError::Configuration(format!(
                    "maximum duration must be a positive number of seconds, got {}",
                    limit
                )));
            }
        }
        Ok(())
    }
}

/// Outcome of scoring one pair of recordings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreReport {
    pub mcd: f64,
    pub mode: AlignmentMode,
    pub reference_frames: usize,
    pub test_frames: usize,
    pub path_length: usize,
}

/// Reusable scoring engine.
#[derive(Debug)]
pub struct Scorer {
    options: ScoreOptions,
    trimmer: SilenceTrimmer,
    extractor: MfccExtractor,
    aligner: Aligner,
}

impl Scorer {
    pub fn new(options: ScoreOptions) -> Result<Self, ScoreError> {
        options.validate()?;

        let trimmer = SilenceTrimmer::new(options.top_db)?;
        let extractor = MfccExtractor::new(options.mfcc_config())?;
        let aligner = Aligner::new(options.mode)
            .with_storage(options.dtw_storage)
            .with_max_cells(options.max_dtw_cells);

        Ok(Self {
            options,
            trimmer,
            extractor,
            aligner,
        })
    }

    pub fn options(&self) -> &ScoreOptions {
        &self.options
    }

    /// Decodes, resamples, trims and extracts MFCCs from one recording.
    ///
    /// Takes the buffer by value so it moves straight into the decoder.
    pub fn features(&self, bytes: Vec<u8>) -> Result<FeatureSequence, ScoreError> {
        let decoded = decode(bytes)?;

        if let Some(limit) = self.options.max_duration_seconds {
            let seconds = decoded.duration_seconds();
            if seconds > limit {
                return Err(ScoreError::InputTooLong { seconds, limit });
            }
        }

        let waveform = resample(decoded, self.options.target_sample_rate)?;
        let trimmed = self.trimmer.trim(waveform);
        Ok(self.extractor.extract(&trimmed.samples))
    }

    /// Aligns two already extracted sequences.
    pub fn score_features(
        &self,
        reference: &FeatureSequence,
        test: &FeatureSequence,
    ) -> Result<Distortion, ScoreError> {
        self.aligner.score(reference, test)
    }

    /// Full pipeline on two raw audio buffers.
    pub fn score_bytes(&self, reference: Vec<u8>, test: Vec<u8>) -> Result<ScoreReport, ScoreError> {
        let reference = self.features(reference)?;
        let test = self.features(test)?;
        let distortion = self.score_features(&reference, &test)?;

        debug!(
            reference_frames = reference.len(),
            test_frames = test.len(),
            path_length = distortion.path_length,
            mcd = distortion.value,
            mode = %self.options.mode,
            "Scored audio pair"
        );

        Ok(ScoreReport {
            mcd: distortion.value,
            mode: self.options.mode,
            reference_frames: reference.len(),
            test_frames: test.len(),
            path_length: distortion.path_length,
        })
    }
}
