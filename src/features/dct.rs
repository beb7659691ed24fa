//! Orthonormal DCT-II, truncated to the first few coefficients.

use std::f64::consts::PI;

/// Precomputed DCT-II basis producing `num_coeffs` outputs from `input_len` inputs.
///
/// Scaled so the full transform is orthonormal: coefficient 0 is
/// `sum(x) / sqrt(N)`, the rest `sqrt(2 / N) * sum(x_n * cos(pi * k * (2n + 1) / 2N))`.
#[derive(Debug, Clone)]
pub struct Dct {
    input_len: usize,
    basis: Vec<Vec<f64>>,
}

impl Dct {
    pub fn new(input_len: usize, num_coeffs: usize) -> Self {
        let n = input_len as f64;
        let basis = (0..num_coeffs)
            .map(|k| {
                let scale = if k == 0 { (1.0 / n).sqrt() } else { (2.0 / n).sqrt() };
                (0..input_len)
                    .map(|i| scale * (PI * k as f64 * (2 * i + 1) as f64 / (2.0 * n)).cos())
                    .collect()
            })
            .collect();
        Self { input_len, basis }
    }

    pub fn num_coeffs(&self) -> usize {
        self.basis.len()
    }

    /// Transforms `input` (length `input_len`) into `num_coeffs` coefficients.
    pub fn transform(&self, input: &[f64]) -> Vec<f64> {
        debug_assert_eq!(input.len(), self.input_len);
        self.basis
            .iter()
            .map(|row| row.iter().zip(input).map(|(b, x)| b * x).sum())
            .collect()
    }
}
