//! Leading/trailing silence removal.
//!
//! Short-term energy is measured over centred frames; any frame whose energy is
//! more than `top_db` below the loudest frame counts as silent. Only the silent
//! runs at the very start and end are dropped; interior silence is left alone.

use std::ops::Range;

use tracing::debug;

use super::Waveform;
use crate::error::ScoreError;

/// Energies at or below this are treated as digital silence.
const ENERGY_FLOOR: f64 = 1e-10;

/// Trims silence relative to the waveform's peak short-term energy.
#[derive(Debug, Clone)]
pub struct SilenceTrimmer {
    top_db: f64,
    frame_length: usize,
    hop_length: usize,
}

impl Default for SilenceTrimmer {
    fn default() -> Self {
        Self {
            top_db: 30.0,
            frame_length: 2048,
            hop_length: 512,
        }
    }
}

impl SilenceTrimmer {
    /// Creates a trimmer with the default 2048/512 framing.
    pub fn new(top_db: f64) -> Result<Self, ScoreError> {
        Self::with_framing(top_db, 2048, 512)
    }

    pub fn with_framing(top_db: f64, frame_length: usize, hop_length: usize) -> Result<Self, ScoreError> {
        if !top_db.is_finite() || top_db <= 0.0 {
            return Err(ScoreError::Configuration(format!(
                "silence threshold must be a positive number of dB, got {}",
                top_db
            )));
        }
        if frame_length == 0 || hop_length == 0 {
            return Err(ScoreError::Configuration(
                "trim frame and hop lengths must be positive".to_string(),
            ));
        }
        Ok(Self {
            top_db,
            frame_length,
            hop_length,
        })
    }

    pub fn top_db(&self) -> f64 {
        self.top_db
    }

    /// Returns the waveform with leading and trailing silence removed.
    ///
    /// A waveform that is silent throughout comes back empty.
    pub fn trim(&self, waveform: Waveform) -> Waveform {
        let Waveform { mut samples, sample_rate } = waveform;
        let total = samples.len();

        match self.non_silent_range(&samples) {
            Some(range) => {
                debug!(
                    start = range.start,
                    end = range.end,
                    total,
                    "Trimmed silence"
                );
                samples.truncate(range.end);
                samples.drain(..range.start);
            }
            None => {
                debug!(total, "Waveform is silent throughout");
                samples.clear();
            }
        }

        Waveform::new(samples, sample_rate)
    }

    /// Sample range between the first and last non-silent frame, or `None`
    /// when nothing rises above the threshold.
    pub fn non_silent_range(&self, samples: &[f32]) -> Option<Range<usize>> {
        if samples.is_empty() {
            return None;
        }

        let energies = self.frame_energies(samples);
        let peak = energies.iter().cloned().fold(0.0f64, f64::max);
        if peak <= ENERGY_FLOOR {
            return None;
        }

        let threshold = peak * 10f64.powf(-self.top_db / 10.0);
        let first = energies.iter().position(|&e| e > threshold)?;
        let last = energies.iter().rposition(|&e| e > threshold)?;

        let start = first * self.hop_length;
        let end = ((last + 1) * self.hop_length).min(samples.len());
        if start >= end {
            return None;
        }
        Some(start..end)
    }

    /// Mean-square energy of each centred frame (zero padded at both ends).
    fn frame_energies(&self, samples: &[f32]) -> Vec<f64> {
        let half = (self.frame_length / 2) as isize;
        let n_frames = 1 + samples.len() / self.hop_length;

        (0..n_frames)
            .map(|t| {
                let center = (t * self.hop_length) as isize;
                let lo = (center - half).max(0) as usize;
                let hi = ((center - half + self.frame_length as isize).max(0) as usize).min(samples.len());
                let sum: f64 = samples
                    .get(lo..hi)
                    .unwrap_or(&[])
                    .iter()
                    .map(|&s| (s as f64) * (s as f64))
                    .sum();
                sum / self.frame_length as f64
            })
            .collect()
    }
}
