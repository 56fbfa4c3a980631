//! Single-tap channel correction from pilot subcarriers

use crate::error::Result;
use crate::psk::PskOrder;
use num_complex::Complex32;

/// Pilot symbols the transmitter sends. Both ends derive them the same way.
pub fn generate_pilot(len: usize) -> Vec<u32> {
    vec![0; len]
}

#[derive(Debug, Clone, Copy)]
pub struct ChannelEstimator {
    psk: PskOrder,
}

impl ChannelEstimator {
    pub fn new(psk: PskOrder) -> Self {
        Self { psk }
    }

    /// Constellation points the pilots carry on transmit.
    pub fn known_pilots(&self, count: usize) -> Result<Vec<Complex32>> {
        self.psk.modulate(&generate_pilot(count))
    }

    /// Mean of `known / received` over every pilot with non-zero energy.
    ///
    /// Returns unity when no pilot is usable.
    pub fn estimate(&self, received: &[Complex32]) -> Result<Complex32> {
        let known = self.known_pilots(received.len())?;

        let mut sum = Complex32::new(0.0, 0.0);
        let mut used = 0usize;
        for (k, r) in known.iter().zip(received) {
            let energy = r.norm_sqr();
            if energy == 0.0 || !energy.is_finite() {
                continue;
            }
            sum += *k * r.conj() / energy;
            used += 1;
        }

        if used == 0 {
            log::warn!(
                "no usable pilot among {}, channel left uncorrected",
                received.len()
            );
            return Ok(Complex32::new(1.0, 0.0));
        }
        let correction = sum / used as f32;
        log::debug!("mean delta: {} {}", correction.re, correction.im);
        Ok(correction)
    }

    pub fn apply(correction: Complex32, data: &mut [Complex32]) {
        for value in data.iter_mut() {
            *value *= correction;
        }
    }
}
