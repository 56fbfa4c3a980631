//! Discrete Fourier transform for arbitrary lengths
//!
//! Power-of-two lengths go through an iterative radix-2 decimation-in-time
//! transform. Every other length is computed with Bluestein's algorithm, which
//! rewrites the DFT as a circular convolution of power-of-two length.
//!
//! Everything runs in single precision. Twiddle tables are built by
//! angle-addition recurrence from one `cos`/`sin` pair instead of one
//! transcendental call per entry.

use crate::error::{ModemError, Result};
use num_complex::Complex32;
use std::f64::consts::PI;
use std::ops::Range;

/// Complex samples stored as two index-aligned real sequences.
///
/// Both halves always have the same length; the only way to build one is
/// through constructors that check it.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComplexSignal {
    real: Vec<f32>,
    imag: Vec<f32>,
}

impl ComplexSignal {
    pub fn new(real: Vec<f32>, imag: Vec<f32>) -> Result<Self> {
        if real.len() != imag.len() {
            return Err(ModemError::LengthMismatch {
                expected: real.len(),
                actual: imag.len(),
            });
        }
        Ok(Self { real, imag })
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            real: vec![0.0; len],
            imag: vec![0.0; len],
        }
    }

    /// Real signal with a zero imaginary part
    pub fn from_real(real: Vec<f32>) -> Self {
        let imag = vec![0.0; real.len()];
        Self { real, imag }
    }

    pub fn len(&self) -> usize {
        self.real.len()
    }

    pub fn is_empty(&self) -> bool {
        self.real.is_empty()
    }

    pub fn real(&self) -> &[f32] {
        &self.real
    }

    pub fn imag(&self) -> &[f32] {
        &self.imag
    }

    pub fn get(&self, index: usize) -> Complex32 {
        Complex32::new(self.real[index], self.imag[index])
    }

    pub fn set(&mut self, index: usize, value: Complex32) {
        self.real[index] = value.re;
        self.imag[index] = value.im;
    }

    /// Mutable access to both halves at once; the slices cannot change length.
    pub fn parts_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        (&mut self.real, &mut self.imag)
    }

    pub fn slice(&self, range: Range<usize>) -> ComplexSignal {
        Self {
            real: self.real[range.clone()].to_vec(),
            imag: self.imag[range].to_vec(),
        }
    }

    pub fn extend_from(&mut self, other: &ComplexSignal) {
        self.real.extend_from_slice(&other.real);
        self.imag.extend_from_slice(&other.imag);
    }

    /// Forward transform in place
    pub fn fft(&mut self) -> Result<()> {
        forward(&mut self.real, &mut self.imag)
    }

    /// Inverse transform in place, normalized by `1/n`
    pub fn ifft(&mut self) -> Result<()> {
        inverse(&mut self.real, &mut self.imag)
    }
}

fn check_lengths(expected: usize, actual: usize) -> Result<()> {
    if expected != actual {
        return Err(ModemError::LengthMismatch { expected, actual });
    }
    Ok(())
}

/// Forward DFT of `real + j*imag`, in place, without normalization.
///
/// Empty input is a no-op. Fails with `LengthMismatch` if the two halves
/// differ in length.
pub fn forward(real: &mut [f32], imag: &mut [f32]) -> Result<()> {
    check_lengths(real.len(), imag.len())?;
    let n = real.len();
    if n == 0 {
        return Ok(());
    }
    if n.is_power_of_two() {
        radix2(real, imag);
    } else {
        bluestein(real, imag);
    }
    Ok(())
}

/// Inverse DFT in place, normalized by `1/n`.
///
/// Computed as the forward transform with real and imaginary parts swapped.
pub fn inverse(real: &mut [f32], imag: &mut [f32]) -> Result<()> {
    forward(imag, real)?;
    let n = real.len() as f32;
    for (re, im) in real.iter_mut().zip(imag.iter_mut()) {
        *re /= n;
        *im /= n;
    }
    Ok(())
}

/// Circular convolution of `x` and `y` into `out`.
///
/// All six sequences must have the same length. `x` and `y` are left holding
/// their spectra.
pub fn circular_convolve(
    x_real: &mut [f32],
    x_imag: &mut [f32],
    y_real: &mut [f32],
    y_imag: &mut [f32],
    out_real: &mut [f32],
    out_imag: &mut [f32],
) -> Result<()> {
    let n = x_real.len();
    for len in [x_imag.len(), y_real.len(), y_imag.len(), out_real.len(), out_imag.len()] {
        check_lengths(n, len)?;
    }

    forward(x_real, x_imag)?;
    forward(y_real, y_imag)?;
    for i in 0..n {
        out_real[i] = x_real[i] * y_real[i] - x_imag[i] * y_imag[i];
        out_imag[i] = x_imag[i] * y_real[i] + x_real[i] * y_imag[i];
    }
    inverse(out_real, out_imag)
}

/// `cos`/`sin` of `i * step` for `i in 0..len`, generated by rotation.
fn rotation_table(len: usize, step: f64) -> (Vec<f32>, Vec<f32>) {
    let mut cos_table = vec![0.0f32; len];
    let mut sin_table = vec![0.0f32; len];
    if len == 0 {
        return (cos_table, sin_table);
    }
    cos_table[0] = 1.0;
    sin_table[0] = 0.0;
    let qc = step.cos() as f32;
    let qs = step.sin() as f32;
    for i in 1..len {
        cos_table[i] = cos_table[i - 1] * qc - sin_table[i - 1] * qs;
        sin_table[i] = sin_table[i - 1] * qc + cos_table[i - 1] * qs;
    }
    (cos_table, sin_table)
}

// Caller guarantees n is a power of two.
fn radix2(real: &mut [f32], imag: &mut [f32]) {
    let n = real.len();
    if n <= 1 {
        return;
    }
    let levels = n.trailing_zeros();
    let (cos_table, sin_table) = rotation_table(n / 2, 2.0 * PI / n as f64);

    for i in 0..n {
        let j = i.reverse_bits() >> (usize::BITS - levels);
        if j > i {
            real.swap(i, j);
            imag.swap(i, j);
        }
    }

    let mut size = 2;
    while size <= n {
        let half = size / 2;
        let table_step = n / size;
        for start in (0..n).step_by(size) {
            let mut k = 0;
            for j in start..start + half {
                let (c, s) = (cos_table[k], sin_table[k]);
                let tpre = real[j + half] * c + imag[j + half] * s;
                let tpim = -real[j + half] * s + imag[j + half] * c;
                real[j + half] = real[j] - tpre;
                imag[j + half] = imag[j] - tpim;
                real[j] += tpre;
                imag[j] += tpim;
                k += table_step;
            }
        }
        size *= 2;
    }
}

fn bluestein(real: &mut [f32], imag: &mut [f32]) {
    let n = real.len();
    let m = (2 * n - 1).next_power_of_two();

    // exp(j*pi*i^2/n) with i^2 reduced mod 2n before the lookup
    let (tc, ts) = rotation_table(2 * n, PI / n as f64);
    let modulus = 2 * n as u64;
    let (cos_table, sin_table): (Vec<f32>, Vec<f32>) = (0..n as u64)
        .map(|i| {
            let j = ((i * i) % modulus) as usize;
            (tc[j], ts[j])
        })
        .unzip();

    let mut a_real = vec![0.0f32; m];
    let mut a_imag = vec![0.0f32; m];
    for i in 0..n {
        a_real[i] = real[i] * cos_table[i] + imag[i] * sin_table[i];
        a_imag[i] = -real[i] * sin_table[i] + imag[i] * cos_table[i];
    }

    let mut b_real = vec![0.0f32; m];
    let mut b_imag = vec![0.0f32; m];
    b_real[0] = cos_table[0];
    b_imag[0] = sin_table[0];
    for i in 1..n {
        b_real[i] = cos_table[i];
        b_real[m - i] = cos_table[i];
        b_imag[i] = sin_table[i];
        b_imag[m - i] = sin_table[i];
    }

    let mut c_real = vec![0.0f32; m];
    let mut c_imag = vec![0.0f32; m];
    // Lengths are equal by construction and m is a power of two.
    radix2(&mut a_real, &mut a_imag);
    radix2(&mut b_real, &mut b_imag);
    for i in 0..m {
        c_real[i] = a_real[i] * b_real[i] - a_imag[i] * b_imag[i];
        c_imag[i] = a_imag[i] * b_real[i] + a_real[i] * b_imag[i];
    }
    radix2(&mut c_imag, &mut c_real);
    let scale = m as f32;

    for i in 0..n {
        let cr = c_real[i] / scale;
        let ci = c_imag[i] / scale;
        real[i] = cr * cos_table[i] + ci * sin_table[i];
        imag[i] = -cr * sin_table[i] + ci * cos_table[i];
    }
}
