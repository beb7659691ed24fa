//! Coefficient selection and the mel-cepstral distance between two frames.

use std::f64::consts::LN_10;

use crate::features::FeatureSequence;

/// `10 / ln(10)`: converts a natural-log cepstral distance into decibels.
pub const DB_SCALE: f64 = 10.0 / LN_10;

/// Drops coefficient 0 (frame energy) and returns the cepstral part of every frame.
///
/// Frames with fewer than two coefficients yield empty slices.
pub fn cepstral_frames(seq: &FeatureSequence) -> Vec<&[f64]> {
    seq.frames().iter().map(|frame| cepstral(frame)).collect()
}

/// The cepstral coefficients of one frame: everything after coefficient 0.
pub fn cepstral(frame: &[f64]) -> &[f64] {
    frame.get(1..).unwrap_or(&[])
}

/// Mel-cepstral distortion between two coefficient vectors of equal length:
/// `(10 / ln 10) * sqrt(2 * sum_k (u_k - v_k)^2)`.
pub fn frame_distance(u: &[f64], v: &[f64]) -> f64 {
    debug_assert_eq!(u.len(), v.len());
    let squared: f64 = u.iter().zip(v).map(|(a, b)| (a - b) * (a - b)).sum();
    DB_SCALE * (2.0 * squared).sqrt()
}

/// Arithmetic mean of a per-step distance list; 0.0 when there are no steps.
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0f64, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        0.0
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_constant() {
        assert!((DB_SCALE - 4.342944819032518).abs() < 1e-15);
    }

    #[test]
    fn test_known_distance() {
        // One unit apart in one coefficient: 10/ln10 * sqrt(2).
        let d = frame_distance(&[0.0, 0.0], &[1.0, 0.0]);
        assert!((d - DB_SCALE * 2f64.sqrt()).abs() < 1e-12);
        assert!((d - 6.141851463713754).abs() < 1e-12);

        // 3-4-5 triangle: squared distance 25.
        let d = frame_distance(&[1.0, 1.0], &[4.0, 5.0]);
        assert!((d - DB_SCALE * 50f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_identical_frames_have_zero_distance() {
        let u = [1.5, -2.0, 0.25, 7.0];
        assert_eq!(frame_distance(&u, &u), 0.0);
    }

    #[test]
    fn test_distance_is_symmetric() {
        let u = [0.3, -1.2, 4.0];
        let v = [-0.7, 2.2, 3.5];
        assert_eq!(frame_distance(&u, &v), frame_distance(&v, &u));
    }

    #[test]
    fn test_distance_grows_as_a_coefficient_moves_away() {
        let u = [0.5, -1.0, 2.0];
        for k in 0..u.len() {
            for direction in [1.0, -1.0] {
                let mut previous = 0.0;
                for step in 1..=20 {
                    let mut v = u;
                    v[k] += direction * step as f64 * 0.25;
                    let d = frame_distance(&u, &v);
                    assert!(d > previous, "d did not increase at k={} step={}", k, step);
                    previous = d;
                }
            }
        }
    }

    #[test]
    fn test_cepstral_drops_energy() {
        let seq = FeatureSequence::from_frames(
            3,
            vec![vec![100.0, 1.0, 2.0], vec![-50.0, 3.0, 4.0]],
        )
        .unwrap();
        let frames = cepstral_frames(&seq);
        assert_eq!(frames, vec![&[1.0, 2.0][..], &[3.0, 4.0][..]]);

        assert!(cepstral(&[]).is_empty());
        assert!(cepstral(&[5.0]).is_empty());
    }

    #[test]
    fn test_energy_difference_alone_is_not_distortion() {
        let a = [80.0, 1.0, -2.0];
        let b = [20.0, 1.0, -2.0];
        assert_eq!(frame_distance(cepstral(&a), cepstral(&b)), 0.0);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(Vec::<f64>::new()), 0.0);
        assert_eq!(mean([1.0, 2.0, 6.0]), 3.0);
    }
}
