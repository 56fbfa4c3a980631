//! FFT-based cross-correlation of real signals
//!
//! Follows the MATLAB `xcorr` convention: for lag `k` the output holds
//! `sum_n x[n + k] * y[n]`, and lags run symmetrically from `-(M - 1)` to
//! `M - 1` where `M = max(x.len(), y.len())`. Output length is `2M - 1`.
//!
//! Both inputs are zero-padded to the next length `>= 2M` whose only prime
//! factors are 2, 3, 5 and 7. That keeps the circular correlation free of
//! wrap-around and the padded length close to the minimum.

use crate::error::Result;
use crate::fourier;

/// Prime factors allowed in a padded correlation length
pub const SMOOTH_FACTORS: [usize; 4] = [2, 3, 5, 7];

/// Smallest integer `>= n` with no prime factor outside [`SMOOTH_FACTORS`].
pub fn next_smooth_len(n: usize) -> usize {
    let mut candidate = n.max(1);
    loop {
        let mut rest = candidate;
        for p in SMOOTH_FACTORS {
            while rest > 1 && rest % p == 0 {
                rest /= p;
            }
        }
        if rest == 1 {
            return candidate;
        }
        candidate += 1;
    }
}

/// Correlation values with the lag of each element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Correlation {
    pub values: Vec<f32>,
    pub lags: Vec<isize>,
}

impl Correlation {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Sub-range of `count` consecutive lags starting at `first_lag`.
    ///
    /// Lags outside the computed range are dropped.
    pub fn window(&self, first_lag: isize, count: usize) -> Correlation {
        let Some(&lowest) = self.lags.first() else {
            return Correlation::default();
        };
        let start = (first_lag - lowest).max(0) as usize;
        let start = start.min(self.values.len());
        let end = (start + count).min(self.values.len());
        Correlation {
            values: self.values[start..end].to_vec(),
            lags: self.lags[start..end].to_vec(),
        }
    }

    /// Largest value and its lag. Ties keep the lowest lag.
    pub fn peak(&self) -> Option<(f32, isize)> {
        let mut best: Option<(f32, isize)> = None;
        for (&value, &lag) in self.values.iter().zip(&self.lags) {
            if value.is_nan() {
                continue;
            }
            if best.map_or(true, |(current, _)| value > current) {
                best = Some((value, lag));
            }
        }
        best
    }

    /// Mean of the absolute correlation values, 0 for an empty trace.
    pub fn mean_abs(&self) -> f32 {
        if self.values.is_empty() {
            return 0.0;
        }
        self.values.iter().map(|v| v.abs()).sum::<f32>() / self.values.len() as f32
    }
}

/// Cross-correlate `x` against `y`.
///
/// Returns an empty [`Correlation`] if either input is empty.
pub fn xcorr(x: &[f32], y: &[f32]) -> Result<Correlation> {
    if x.is_empty() || y.is_empty() {
        return Ok(Correlation::default());
    }

    let m = x.len().max(y.len());
    let max_lag = m - 1;
    let padded_len = next_smooth_len(2 * m);

    let mut x_real = vec![0.0f32; padded_len];
    let mut x_imag = vec![0.0f32; padded_len];
    let mut y_real = vec![0.0f32; padded_len];
    let mut y_imag = vec![0.0f32; padded_len];
    x_real[..x.len()].copy_from_slice(x);
    y_real[..y.len()].copy_from_slice(y);

    fourier::forward(&mut x_real, &mut x_imag)?;
    fourier::forward(&mut y_real, &mut y_imag)?;

    // X * conj(Y)
    for i in 0..padded_len {
        let re = x_real[i] * y_real[i] + x_imag[i] * y_imag[i];
        let im = x_imag[i] * y_real[i] - x_real[i] * y_imag[i];
        x_real[i] = re;
        x_imag[i] = im;
    }
    fourier::inverse(&mut x_real, &mut x_imag)?;

    // Negative lags live at the tail of the circular result
    let len = 2 * max_lag + 1;
    let mut values = Vec::with_capacity(len);
    values.extend_from_slice(&x_real[padded_len - max_lag..]);
    values.extend_from_slice(&x_real[..=max_lag]);
    let lags = (-(max_lag as isize)..=max_lag as isize).collect();

    Ok(Correlation { values, lags })
}
