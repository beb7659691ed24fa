//! # Audio Front End
//!
//! Turns an uploaded byte buffer into a mono waveform at a fixed sample rate
//! and strips the silence around it.
//!
//! ## Pipeline:
//! - **decoder**: container probing and packet decoding (symphonia), mono mix-down
//! - **resample**: band-limited sample rate conversion (rubato sinc)
//! - **trim**: leading/trailing silence removal relative to peak energy
//!
//! No amplitude normalization happens anywhere in this module; samples keep
//! whatever scale the decoder produced (`f32` in [-1, 1]).

pub mod decoder;
pub mod resample;
pub mod trim;

pub use decoder::decode;
pub use resample::resample;
pub use trim::SilenceTrimmer;

use crate::error::ScoreError;

/// Mono PCM samples tagged with their sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct Waveform {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl Waveform {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Duration in seconds. Zero for a waveform without a sample rate.
    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Decodes `bytes` and brings the result to `target_rate` Hz.
pub fn load_waveform(bytes: Vec<u8>, target_rate: u32) -> Result<Waveform, ScoreError> {
    let decoded = decode(bytes)?;
    resample(decoded, target_rate)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn test_duration() {
        let wave = Waveform::new(vec![0.0; 8000], 16000);
        assert_eq!(wave.len(), 8000);
        assert!((wave.duration_seconds() - 0.5).abs() < 1e-12);
        assert_eq!(Waveform::new(vec![0.0; 10], 0).duration_seconds(), 0.0);
    }

    #[test]
    fn test_load_waveform_resamples_to_target() {
        let bytes = wav_bytes(&sine(440.0, 0.5, 1.0, 48000), 48000, 1);
        let wave = load_waveform(bytes, 16000).unwrap();

        assert_eq!(wave.sample_rate, 16000);
        assert_eq!(wave.len(), 16000);
    }

    #[test]
    fn test_load_waveform_rejects_garbage() {
        let err = load_waveform(b"definitely not audio".to_vec(), 16000).unwrap_err();
        assert!(matches!(err, ScoreError::Decode(_)));
    }
}
