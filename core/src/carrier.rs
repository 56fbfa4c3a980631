//! Quadrature carrier mixing
//!
//! Time starts at sample 0 of the slice being mixed. The carrier phase is
//! reduced to one cycle in double precision before the trig call, so long
//! frames do not lose phase accuracy.

use crate::fourier::ComplexSignal;
use std::f64::consts::TAU;

fn carrier_phase(index: usize, carrier_freq: f32, sample_rate: f32) -> f32 {
    let cycles = carrier_freq as f64 * index as f64 / sample_rate as f64;
    (TAU * cycles.fract()) as f32
}

/// Real passband `re * cos(wt) - im * sin(wt)` of a complex baseband.
pub fn upmix(baseband: &ComplexSignal, carrier_freq: f32, sample_rate: f32) -> Vec<f32> {
    baseband
        .real()
        .iter()
        .zip(baseband.imag())
        .enumerate()
        .map(|(i, (&re, &im))| {
            let phase = carrier_phase(i, carrier_freq, sample_rate);
            re * phase.cos() - im * phase.sin()
        })
        .collect()
}

/// Multiply by `cos(wt)` and `-sin(wt)` to bring a passband back to baseband.
///
/// The result carries half the original amplitude plus an image at twice the
/// carrier frequency.
pub fn downmix(passband: &[f32], carrier_freq: f32, sample_rate: f32) -> ComplexSignal {
    let mut signal = ComplexSignal::zeros(passband.len());
    let (real, imag) = signal.parts_mut();
    for (i, &sample) in passband.iter().enumerate() {
        let phase = carrier_phase(i, carrier_freq, sample_rate);
        real[i] = sample * phase.cos();
        imag[i] = -sample * phase.sin();
    }
    signal
}
