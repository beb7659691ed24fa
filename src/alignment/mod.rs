//! # Alignment and Distortion
//!
//! Compares two [`FeatureSequence`]s and reduces them to one mel-cepstral
//! distortion value in decibels.
//!
//! ## Steps:
//! 1. Drop coefficient 0 (energy) from every frame
//! 2. Pair frames, either by DTW ([`AlignmentMode::Dtw`]) or index by index
//!    up to the shorter length ([`AlignmentMode::Truncate`])
//! 3. Average the per-pair distance over every pair on the path
//!
//! Repeated frames on a warped path count once per step; nothing is
//! deduplicated or re-weighted.

pub mod distance;
pub mod dtw;

pub use distance::{cepstral, cepstral_frames, frame_distance, DB_SCALE};
pub use dtw::{rolling_cost, AlignmentPath, CostMatrix, RollingCost, Step};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;

use crate::error::ScoreError;
use crate::features::FeatureSequence;

/// How frames of the two sequences are paired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlignmentMode {
    /// Optimal monotonic alignment by dynamic time warping.
    #[default]
    Dtw,
    /// Frame `i` against frame `i`, cut to the shorter sequence.
    Truncate,
}

impl AlignmentMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlignmentMode::Dtw => "dtw",
            AlignmentMode::Truncate => "truncate",
        }
    }
}

impl fmt::Display for AlignmentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AlignmentMode {
    type Err = ScoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dtw" => Ok(AlignmentMode::Dtw),
            "truncate" => Ok(AlignmentMode::Truncate),
            other => Err(ScoreError::Configuration(format!(
                "unknown alignment mode '{}', expected 'dtw' or 'truncate'",
                other
            ))),
        }
    }
}

/// Memory layout of the DTW tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DtwStorage {
    /// N×M costs plus backpointers; the path is recovered.
    #[default]
    FullMatrix,
    /// Two rows only; score and path length, no path.
    RollingRows,
}

/// Result of comparing two sequences.
#[derive(Debug, Clone, PartialEq)]
pub struct Distortion {
    /// Mean per-step distance in dB. Finite and non-negative.
    pub value: f64,
    /// Number of frame pairs the mean was taken over.
    pub path_length: usize,
    /// The frame pairs themselves, when the storage mode keeps them.
    pub path: Option<AlignmentPath>,
}

/// Default bound on the N×M grid DTW may tabulate: 6000×6000 frames, one
/// minute per side at a 10 ms hop. The full matrix then needs about 324 MB.
pub const DEFAULT_MAX_DTW_CELLS: usize = 36_000_000;

/// Scores pairs of feature sequences under a fixed mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Aligner {
    mode: AlignmentMode,
    storage: DtwStorage,
    max_cells: usize,
}

impl Default for Aligner {
    fn default() -> Self {
        Self::new(AlignmentMode::default())
    }
}

impl Aligner {
    pub fn new(mode: AlignmentMode) -> Self {
        Self {
            mode,
            storage: DtwStorage::default(),
            max_cells: DEFAULT_MAX_DTW_CELLS,
        }
    }

    pub fn with_storage(mut self, storage: DtwStorage) -> Self {
        self.storage = storage;
        self
    }

    /// Refuse DTW when `N × M` exceeds `max_cells`. Truncation is not limited.
    pub fn with_max_cells(mut self, max_cells: usize) -> Self {
        self.max_cells = max_cells;
        self
    }

    pub fn max_cells(&self) -> usize {
        self.max_cells
    }

    pub fn mode(&self) -> AlignmentMode {
        self.mode
    }

    pub fn storage(&self) -> DtwStorage {
        self.storage
    }

    /// Mel-cepstral distortion between `a` and `b`.
    ///
    /// Two empty sequences score 0.0. One empty side is an
    /// [`ScoreError::EmptySequence`]; mismatched or too few coefficients are a
    /// [`ScoreError::Configuration`]. A DTW grid larger than the cell limit is
    /// refused with [`ScoreError::AlignmentTooLarge`] before anything is
    /// allocated.
    pub fn score(&self, a: &FeatureSequence, b: &FeatureSequence) -> Result<Distortion, ScoreError> {
        if a.n_coeffs() != b.n_coeffs() {
            return Err(ScoreError::Configuration(format!(
                "sequences carry {} and {} coefficients per frame",
                a.n_coeffs(),
                b.n_coeffs()
            )));
        }
        if a.n_coeffs() < 2 {
            return Err(ScoreError::Configuration(format!(
                "{} coefficient(s) per frame leave nothing after dropping energy",
                a.n_coeffs()
            )));
        }

        match (a.is_empty(), b.is_empty()) {
            (true, true) => {
                return Ok(Distortion {
                    value: 0.0,
                    path_length: 0,
                    path: Some(AlignmentPath::default()),
                })
            }
            (true, false) | (false, true) => {
                return Err(ScoreError::EmptySequence(format!(
                    "cannot align {} frame(s) against {} frame(s)",
                    a.len(),
                    b.len()
                )))
            }
            (false, false) => {}
        }

        if self.mode == AlignmentMode::Dtw && a.len().saturating_mul(b.len()) > self.max_cells {
            return Err(ScoreError::AlignmentTooLarge {
                rows: a.len(),
                cols: b.len(),
                limit: self.max_cells,
            });
        }

        let ca = cepstral_frames(a);
        let cb = cepstral_frames(b);

        let distortion = match (self.mode, self.storage) {
            (AlignmentMode::Truncate, _) => truncate(&ca, &cb),
            (AlignmentMode::Dtw, DtwStorage::FullMatrix) => {
                let path = CostMatrix::compute(&ca, &cb).backtrack();
                let value = distance::mean(
                    path.pairs()
                        .iter()
                        .map(|&(i, j)| frame_distance(ca[i], cb[j])),
                );
                Distortion {
                    value,
                    path_length: path.len(),
                    path: Some(path),
                }
            }
            (AlignmentMode::Dtw, DtwStorage::RollingRows) => match rolling_cost(&ca, &cb) {
                Some(RollingCost {
                    total_cost,
                    path_length,
                }) => Distortion {
                    value: total_cost / path_length as f64,
                    path_length,
                    path: None,
                },
                None => Distortion {
                    value: 0.0,
                    path_length: 0,
                    path: None,
                },
            },
        };

        debug!(
            mode = %self.mode,
            frames_a = a.len(),
            frames_b = b.len(),
            path_length = distortion.path_length,
            mcd = distortion.value,
            "Computed distortion"
        );

        Ok(distortion)
    }
}

fn truncate(a: &[&[f64]], b: &[&[f64]]) -> Distortion {
    let n = a.len().min(b.len());
    let value = distance::mean((0..n).map(|i| frame_distance(a[i], b[i])));
    Distortion {
        value,
        path_length: n,
        path: Some(AlignmentPath::from_pairs((0..n).map(|i| (i, i)).collect())),
    }
}

/// DTW distortion between `a` and `b` with full-matrix storage.
pub fn score(a: &FeatureSequence, b: &FeatureSequence) -> Result<f64, ScoreError> {
    Aligner::default().score(a, b).map(|d| d.value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seq(frames: &[&[f64]]) -> FeatureSequence {
        let n = frames.first().map_or(3, |f| f.len());
        FeatureSequence::from_frames(n, frames.iter().map(|f| f.to_vec()).collect()).unwrap()
    }

    fn ramp(len: usize, slope: f64) -> FeatureSequence {
        let frames: Vec<Vec<f64>> = (0..len)
            .map(|t| {
                let x = t as f64 * slope;
                vec![10.0 + x, x.sin(), (0.5 * x).cos(), 0.1 * x]
            })
            .collect();
        FeatureSequence::from_frames(4, frames).unwrap()
    }

    #[test]
    fn test_identity_scores_zero() {
        let a = ramp(30, 0.3);
        for mode in [AlignmentMode::Dtw, AlignmentMode::Truncate] {
            for storage in [DtwStorage::FullMatrix, DtwStorage::RollingRows] {
                let d = Aligner::new(mode).with_storage(storage).score(&a, &a).unwrap();
                assert_eq!(d.value, 0.0, "{} / {:?}", mode, storage);
                assert_eq!(d.path_length, 30);
            }
        }
    }

    #[test]
    fn test_scoring_is_deterministic() {
        let a = ramp(25, 0.3);
        let b = ramp(31, 0.25);
        let first = score(&a, &b).unwrap();
        let second = score(&a, &b).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        assert!(first.is_finite() && first > 0.0);
    }

    #[test]
    fn test_truncate_is_symmetric() {
        let a = ramp(25, 0.3);
        let b = ramp(31, 0.25);
        let aligner = Aligner::new(AlignmentMode::Truncate);

        let ab = aligner.score(&a, &b).unwrap();
        let ba = aligner.score(&b, &a).unwrap();
        assert_eq!(ab.value, ba.value);
        assert_eq!(ab.path_length, 25);
    }

    #[test]
    fn test_dtw_path_endpoints_in_both_orientations() {
        let a = ramp(12, 0.4);
        let b = ramp(19, 0.3);
        let aligner = Aligner::default();

        let ab = aligner.score(&a, &b).unwrap().path.unwrap();
        let ba = aligner.score(&b, &a).unwrap().path.unwrap();
        assert_eq!((ab.first(), ab.last()), (Some((0, 0)), Some((11, 18))));
        assert_eq!((ba.first(), ba.last()), (Some((0, 0)), Some((18, 11))));
    }

    #[test]
    fn test_dtw_absorbs_a_repeated_frame() {
        let a = seq(&[&[1.0, 0.0, 0.0], &[1.0, 1.0, 0.0], &[1.0, 0.0, 1.0]]);
        let b = seq(&[
            &[5.0, 0.0, 0.0],
            &[5.0, 1.0, 0.0],
            &[5.0, 1.0, 0.0],
            &[5.0, 0.0, 1.0],
        ]);

        let dtw = Aligner::new(AlignmentMode::Dtw).score(&a, &b).unwrap();
        assert_eq!(dtw.value, 0.0);
        assert_eq!(dtw.path_length, 4);

        let truncated = Aligner::new(AlignmentMode::Truncate).score(&a, &b).unwrap();
        assert!(truncated.value > 0.0);
        assert_eq!(truncated.path_length, 3);
    }

    #[test]
    fn test_storage_modes_agree() {
        let a = ramp(40, 0.2);
        let b = ramp(27, 0.33);

        let full = Aligner::default().score(&a, &b).unwrap();
        let rolling = Aligner::default()
            .with_storage(DtwStorage::RollingRows)
            .score(&a, &b)
            .unwrap();

        assert!((full.value - rolling.value).abs() < 1e-9);
        assert_eq!(full.path_length, rolling.path_length);
        assert!(full.path.is_some());
        assert!(rolling.path.is_none());
    }

    #[test]
    fn test_mean_over_path_steps() {
        // Single-coefficient cepstra [0, 1, 2] vs [0, 2]: path (0,0),(1,0),(2,1)
        // visits distances 0, c, 0.
        let a = seq(&[&[0.0, 0.0], &[0.0, 1.0], &[0.0, 2.0]]);
        let b = seq(&[&[0.0, 0.0], &[0.0, 2.0]]);
        let c = DB_SCALE * 2f64.sqrt();

        let d = Aligner::default().score(&a, &b).unwrap();
        assert_eq!(d.path_length, 3);
        assert!((d.value - c / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_both_empty_scores_zero() {
        let empty = FeatureSequence::new(13);
        for mode in [AlignmentMode::Dtw, AlignmentMode::Truncate] {
            let d = Aligner::new(mode).score(&empty, &empty).unwrap();
            assert_eq!(d.value, 0.0);
            assert_eq!(d.path_length, 0);
        }
    }

    #[test]
    fn test_one_empty_side_is_an_error() {
        let empty = FeatureSequence::new(4);
        let a = ramp(5, 0.3);

        assert!(matches!(score(&empty, &a), Err(ScoreError::EmptySequence(_))));
        assert!(matches!(score(&a, &empty), Err(ScoreError::EmptySequence(_))));
        assert!(matches!(
            Aligner::new(AlignmentMode::Truncate).score(&a, &empty),
            Err(ScoreError::EmptySequence(_))
        ));
    }

    #[test]
    fn test_coefficient_checks() {
        let a = ramp(5, 0.3);
        let b = seq(&[&[1.0, 2.0, 3.0]]);
        assert!(matches!(score(&a, &b), Err(ScoreError::Configuration(_))));

        let energy_only = seq(&[&[1.0], &[2.0]]);
        assert!(matches!(
            score(&energy_only, &energy_only),
            Err(ScoreError::Configuration(_))
        ));
    }

    #[test]
    fn test_oversized_grid_is_refused_before_alignment() {
        let a = ramp(4, 0.3);
        let b = ramp(3, 0.3);

        for storage in [DtwStorage::FullMatrix, DtwStorage::RollingRows] {
            let aligner = Aligner::default().with_storage(storage).with_max_cells(11);
            match aligner.score(&a, &b) {
                Err(ScoreError::AlignmentTooLarge { rows, cols, limit }) => {
                    assert_eq!((rows, cols, limit), (4, 3, 11));
                }
                other => panic!("expected a refusal, got {:?}", other),
            }
            assert!(aligner.with_max_cells(12).score(&a, &b).is_ok());
        }

        let truncated = Aligner::new(AlignmentMode::Truncate)
            .with_max_cells(1)
            .score(&a, &b)
            .unwrap();
        assert_eq!(truncated.path_length, 3);
        assert_eq!(Aligner::default().max_cells(), DEFAULT_MAX_DTW_CELLS);
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("dtw".parse::<AlignmentMode>().unwrap(), AlignmentMode::Dtw);
        assert_eq!(" Truncate ".parse::<AlignmentMode>().unwrap(), AlignmentMode::Truncate);
        assert!("euclid".parse::<AlignmentMode>().is_err());
        assert_eq!(AlignmentMode::default().to_string(), "dtw");

        assert_eq!(serde_json::to_string(&AlignmentMode::Truncate).unwrap(), "\"truncate\"");
        assert_eq!(
            serde_json::from_str::<DtwStorage>("\"rolling_rows\"").unwrap(),
            DtwStorage::RollingRows
        );
    }
}
