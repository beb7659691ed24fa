//! Mel-frequency cepstral feature extraction.
//!
//! Output is a [`FeatureSequence`]: one vector of `n_mfcc` coefficients per
//! analysis frame, in chronological order. Coefficient 0 tracks frame
//! log-energy; the remaining ones describe the spectral envelope.
//!
//! Default parameters (all frame sizes in samples):
//! - SampleRate: 16000
//! - WindowSize: 400 (25ms)
//! - HopSize: 160 (10ms)
//! - FFTSize: 512
//! - NumMels: 40, spanning 0 Hz to Nyquist
//! - NumCoefficients: 13
//! - LogFloor: 1e-10 (power), DynamicRange: 80 dB
//!
//! Frames are not centred: `T = (len - window_size) / hop_size + 1`, and a
//! waveform shorter than one window yields no frames at all.

mod dct;
mod mel;

pub use dct::Dct;
pub use mel::{hann_window, hz_to_mel, mel_filter_bank, mel_to_hz};

use std::sync::Arc;

use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tracing::debug;

use crate::error::ScoreError;

/// Ordered per-frame coefficient vectors, all of length `n_coeffs`.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSequence {
    n_coeffs: usize,
    frames: Vec<Vec<f64>>,
}

impl FeatureSequence {
    /// Creates an empty sequence whose frames will carry `n_coeffs` coefficients.
    pub fn new(n_coeffs: usize) -> Self {
        Self {
            n_coeffs,
            frames: Vec::new(),
        }
    }

    /// Builds a sequence from existing frames, checking that every frame has
    /// exactly `n_coeffs` coefficients.
    pub fn from_frames(n_coeffs: usize, frames: Vec<Vec<f64>>) -> Result<Self, ScoreError> {
        if let Some((index, frame)) = frames.iter().enumerate().find(|(_, f)| f.len() != n_coeffs) {
            return Err(ScoreError::Configuration(format!(
                "frame {} has {} coefficients, expected {}",
                index,
                frame.len(),
                n_coeffs
            )));
        }
        Ok(Self { n_coeffs, frames })
    }

    pub fn push(&mut self, frame: Vec<f64>) -> Result<(), ScoreError> {
        if frame.len() != self.n_coeffs {
            return Err(ScoreError::Configuration(format!(
                "frame has {} coefficients, expected {}",
                frame.len(),
                self.n_coeffs
            )));
        }
        self.frames.push(frame);
        Ok(())
    }

    pub fn n_coeffs(&self) -> usize {
        self.n_coeffs
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn frames(&self) -> &[Vec<f64>] {
        &self.frames
    }

    pub fn frame(&self, index: usize) -> Option<&[f64]> {
        self.frames.get(index).map(Vec::as_slice)
    }
}

/// Configuration for MFCC extraction.
#[derive(Debug, Clone)]
pub struct MfccConfig {
    pub sample_rate: u32,
    pub window_size: usize,
    pub hop_size: usize,
    pub fft_size: usize,
    pub num_mels: usize,
    pub n_mfcc: usize,
    pub low_freq: f64,
    /// Upper filter bank edge; `None` means Nyquist.
    pub high_freq: Option<f64>,
    pub log_floor: f64,
    /// Log-mel values are clamped to this many dB below the sequence maximum.
    pub dynamic_range_db: Option<f64>,
}

impl Default for MfccConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            window_size: 400,
            hop_size: 160,
            fft_size: 512,
            num_mels: 40,
            n_mfcc: 13,
            low_freq: 0.0,
            high_freq: None,
            log_floor: 1e-10,
            dynamic_range_db: Some(80.0),
        }
    }
}

impl MfccConfig {
    /// Default framing at `sample_rate` with `n_mfcc` coefficients.
    pub fn with_coefficients(sample_rate: u32, n_mfcc: usize) -> Self {
        Self {
            sample_rate,
            n_mfcc,
            ..Self::default()
        }
    }

    fn nyquist(&self) -> f64 {
        self.sample_rate as f64 / 2.0
    }

    pub fn validate(&self) -> Result<(), ScoreError> {
        if self.sample_rate == 0 {
            return Err(ScoreError::Configuration(
                "sample rate must be positive".to_string(),
            ));
        }
        if self.n_mfcc <= 1 {
            return Err(ScoreError::Configuration(format!(
                "n_mfcc must be at least 2 so cepstral coefficients remain after dropping energy, got {}",
                self.n_mfcc
            )));
        }
        if self.n_mfcc > self.num_mels {
            return Err(ScoreError::Configuration(format!(
                "n_mfcc ({}) cannot exceed the number of mel bands ({})",
                self.n_mfcc, self.num_mels
            )));
        }
        if self.window_size == 0 || self.hop_size == 0 {
            return Err(ScoreError::Configuration(
                "window and hop sizes must be positive".to_string(),
            ));
        }
        if self.fft_size < self.window_size {
            return Err(ScoreError::Configuration(format!(
                "fft size {} is smaller than the window {}",
                self.fft_size, self.window_size
            )));
        }
        let high = self.high_freq.unwrap_or_else(|| self.nyquist());
        if !(self.low_freq >= 0.0 && self.low_freq < high && high <= self.nyquist()) {
            return Err(ScoreError::Configuration(format!(
                "mel range {}..{} Hz is not inside 0..{} Hz",
                self.low_freq,
                high,
                self.nyquist()
            )));
        }
        if !(self.log_floor > 0.0) {
            return Err(ScoreError::Configuration(
                "log floor must be positive".to_string(),
            ));
        }
        if let Some(range) = self.dynamic_range_db {
            if !(range > 0.0) {
                return Err(ScoreError::Configuration(
                    "dynamic range must be positive".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// MFCC feature extractor.
///
/// Holds the FFT plan, window, filter bank and DCT basis; `extract` borrows it
/// immutably, so one extractor can serve any number of threads.
pub struct MfccExtractor {
    cfg: MfccConfig,
    window: Vec<f64>,
    mel_bank: Vec<Vec<f64>>,
    dct: Dct,
    fft: Arc<dyn Fft<f64>>,
}

impl std::fmt::Debug for MfccExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MfccExtractor").field("cfg", &self.cfg).finish()
    }
}

impl MfccExtractor {
    pub fn new(cfg: MfccConfig) -> Result<Self, ScoreError> {
        cfg.validate()?;

        let window = hann_window(cfg.window_size);
        let high_freq = cfg.high_freq.unwrap_or_else(|| cfg.nyquist());
        let mel_bank = mel_filter_bank(
            cfg.num_mels,
            cfg.fft_size,
            cfg.sample_rate,
            cfg.low_freq,
            high_freq,
        );
        let dct = Dct::new(cfg.num_mels, cfg.n_mfcc);
        let fft = FftPlanner::<f64>::new().plan_fft_forward(cfg.fft_size);

        Ok(Self {
            cfg,
            window,
            mel_bank,
            dct,
            fft,
        })
    }

    pub fn config(&self) -> &MfccConfig {
        &self.cfg
    }

    /// Number of frames produced for a waveform of `len` samples.
    pub fn num_frames(&self, len: usize) -> usize {
        if len < self.cfg.window_size {
            0
        } else {
            (len - self.cfg.window_size) / self.cfg.hop_size + 1
        }
    }

    /// Extracts MFCCs from mono samples at the configured sample rate.
    pub fn extract(&self, pcm: &[f32]) -> FeatureSequence {
        let log_mel = self.log_mel_spectrogram(pcm);

        let frames: Vec<Vec<f64>> = log_mel.iter().map(|bands| self.dct.transform(bands)).collect();

        debug!(
            samples = pcm.len(),
            frames = frames.len(),
            n_mfcc = self.cfg.n_mfcc,
            "Extracted MFCC features"
        );

        FeatureSequence {
            n_coeffs: self.cfg.n_mfcc,
            frames,
        }
    }

    /// Log-mel energies in dB, `[T][num_mels]`, after the dynamic-range clamp.
    pub fn log_mel_spectrogram(&self, pcm: &[f32]) -> Vec<Vec<f64>> {
        let cfg = &self.cfg;
        let num_frames = self.num_frames(pcm.len());
        let half_fft = cfg.fft_size / 2 + 1;

        let mut spectrogram = Vec::with_capacity(num_frames);
        let mut buffer = vec![Complex::new(0.0f64, 0.0); cfg.fft_size];
        let mut power = vec![0.0f64; half_fft];

        for t in 0..num_frames {
            let start = t * cfg.hop_size;
            let frame = &pcm[start..start + cfg.window_size];

            for (slot, (&s, &w)) in buffer.iter_mut().zip(frame.iter().zip(&self.window)) {
                *slot = Complex::new(s as f64 * w, 0.0);
            }
            for slot in buffer[cfg.window_size..].iter_mut() {
                *slot = Complex::new(0.0, 0.0);
            }

            self.fft.process(&mut buffer);

            for (p, c) in power.iter_mut().zip(&buffer[..half_fft]) {
                *p = c.norm_sqr();
            }

            let bands: Vec<f64> = self
                .mel_bank
                .iter()
                .map(|filter| {
                    let energy: f64 = filter.iter().zip(&power).map(|(w, p)| w * p).sum();
                    10.0 * energy.max(cfg.log_floor).log10()
                })
                .collect();
            spectrogram.push(bands);
        }

        if let Some(range) = cfg.dynamic_range_db {
            let peak = spectrogram
                .iter()
                .flatten()
                .cloned()
                .fold(f64::NEG_INFINITY, f64::max);
            let floor = peak - range;
            for v in spectrogram.iter_mut().flatten() {
                if *v < floor {
                    *v = floor;
                }
            }
        }

        spectrogram
    }
}
