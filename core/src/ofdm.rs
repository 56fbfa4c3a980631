//! OFDM symbol construction with cyclic prefix
//!
//! One OFDM symbol carries `subcarrier_count` values in the lowest bins of a
//! `symbol_len`-point spectrum. Pilot bins are spread evenly across that range
//! and the remaining bins carry data. The time-domain symbol is prefixed with
//! a copy of its last `cyclic_prefix_len` samples:
//!
//! ```text
//! [CP: tail of symbol] [IFFT output: symbol_len samples]
//! ```

use crate::error::{ModemError, Result};
use crate::fourier::ComplexSignal;
use num_complex::Complex32;

/// Partition of `[0, subcarrier_count)` into pilot and data bins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubcarrierLayout {
    subcarrier_count: usize,
    pilot_indices: Vec<usize>,
    data_indices: Vec<usize>,
}

impl SubcarrierLayout {
    pub fn new(subcarrier_count: usize, pilot_count: usize) -> Result<Self> {
        if subcarrier_count == 0 {
            return Err(ModemError::InvalidConfig(
                "subcarrier count must be positive".to_string(),
            ));
        }
        if pilot_count >= subcarrier_count {
            return Err(ModemError::InvalidConfig(format!(
                "{} pilots leave no data subcarrier out of {}",
                pilot_count, subcarrier_count
            )));
        }

        let step = subcarrier_count as f32 / (pilot_count + 1) as f32;
        let pilot_indices: Vec<usize> = (0..pilot_count)
            .map(|i| ((i + 1) as f32 * step).round() as usize - 1)
            .collect();
        let data_indices = (0..subcarrier_count)
            .filter(|index| !pilot_indices.contains(index))
            .collect();

        Ok(Self {
            subcarrier_count,
            pilot_indices,
            data_indices,
        })
    }

    pub fn subcarrier_count(&self) -> usize {
        self.subcarrier_count
    }

    pub fn pilot_indices(&self) -> &[usize] {
        &self.pilot_indices
    }

    pub fn data_indices(&self) -> &[usize] {
        &self.data_indices
    }

    pub fn pilot_count(&self) -> usize {
        self.pilot_indices.len()
    }

    pub fn data_count(&self) -> usize {
        self.data_indices.len()
    }
}

/// Sample lengths of one transmitted OFDM symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OfdmTiming {
    pub symbol_len: usize,
    pub cyclic_prefix_len: usize,
    /// `symbol_len + cyclic_prefix_len`; also the synchronizer window size
    pub real_symbol_len: usize,
}

impl OfdmTiming {
    pub fn new(symbol_len: usize, cyclic_prefix_factor: f32) -> Result<Self> {
        if symbol_len == 0 {
            return Err(ModemError::InvalidConfig(
                "symbol length must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&cyclic_prefix_factor) {
            return Err(ModemError::InvalidConfig(format!(
                "cyclic prefix factor must be within [0, 1], got {}",
                cyclic_prefix_factor
            )));
        }
        let cyclic_prefix_len = (cyclic_prefix_factor * symbol_len as f32).ceil() as usize;
        Ok(Self {
            symbol_len,
            cyclic_prefix_len,
            real_symbol_len: symbol_len + cyclic_prefix_len,
        })
    }
}

/// Data and pilot values read back from one OFDM symbol
#[derive(Debug, Clone, PartialEq)]
pub struct SymbolBins {
    pub data: Vec<Complex32>,
    pub pilots: Vec<Complex32>,
}

#[derive(Debug, Clone)]
pub struct OfdmCodec {
    layout: SubcarrierLayout,
    timing: OfdmTiming,
}

impl OfdmCodec {
    pub fn new(layout: SubcarrierLayout, timing: OfdmTiming) -> Result<Self> {
        if layout.subcarrier_count() > timing.symbol_len {
            return Err(ModemError::InvalidConfig(format!(
                "{} subcarriers do not fit a {}-point symbol",
                layout.subcarrier_count(),
                timing.symbol_len
            )));
        }
        Ok(Self { layout, timing })
    }

    pub fn layout(&self) -> &SubcarrierLayout {
        &self.layout
    }

    pub fn timing(&self) -> OfdmTiming {
        self.timing
    }

    /// Build one cyclic-prefixed baseband symbol of `real_symbol_len` samples.
    pub fn encode_symbol(&self, data: &[Complex32], pilots: &[Complex32]) -> Result<ComplexSignal> {
        if data.len() != self.layout.data_count() {
            return Err(ModemError::LengthMismatch {
                expected: self.layout.data_count(),
                actual: data.len(),
            });
        }
        if pilots.len() != self.layout.pilot_count() {
            return Err(ModemError::LengthMismatch {
                expected: self.layout.pilot_count(),
                actual: pilots.len(),
            });
        }

        let symbol_len = self.timing.symbol_len;
        let mut spectrum = ComplexSignal::zeros(symbol_len);
        for (&index, &value) in self.layout.data_indices().iter().zip(data) {
            spectrum.set(index, value);
        }
        for (&index, &value) in self.layout.pilot_indices().iter().zip(pilots) {
            spectrum.set(index, value);
        }
        spectrum.ifft()?;

        let mut symbol = spectrum.slice(symbol_len - self.timing.cyclic_prefix_len..symbol_len);
        symbol.extend_from(&spectrum);
        Ok(symbol)
    }

    /// Strip the cyclic prefix, transform, and read the subcarrier bins.
    pub fn decode_symbol(&self, window: &ComplexSignal) -> Result<SymbolBins> {
        if window.len() != self.timing.real_symbol_len {
            return Err(ModemError::LengthMismatch {
                expected: self.timing.real_symbol_len,
                actual: window.len(),
            });
        }
        let mut body = window.slice(self.timing.cyclic_prefix_len..self.timing.real_symbol_len);
        body.fft()?;

        Ok(SymbolBins {
            data: self.layout.data_indices().iter().map(|&i| body.get(i)).collect(),
            pilots: self.layout.pilot_indices().iter().map(|&i| body.get(i)).collect(),
        })
    }

    /// [`decode_symbol`](Self::decode_symbol) for a window with no imaginary part.
    pub fn decode_real_symbol(&self, window: &[f32]) -> Result<SymbolBins> {
        self.decode_symbol(&ComplexSignal::from_real(window.to_vec()))
    }

    /// Nearest whole number of OFDM symbols in `len` samples.
    pub fn symbol_count_for(&self, len: usize) -> usize {
        (len as f64 / self.timing.real_symbol_len as f64).round() as usize
    }

    /// Fit `raw` to exactly `expected_symbols` OFDM symbols.
    ///
    /// A short capture is centered between zeros; a long one loses
    /// `floor(excess / 2)` samples on the left and the rest on the right.
    pub fn realign_signal(&self, raw: &[f32], expected_symbols: usize) -> Vec<f32> {
        let expected_len = expected_symbols * self.timing.real_symbol_len;
        if raw.len() == expected_len {
            return raw.to_vec();
        }
        if raw.len() < expected_len {
            let pad_left = (expected_len - raw.len()) / 2;
            let mut out = vec![0.0; expected_len];
            out[pad_left..pad_left + raw.len()].copy_from_slice(raw);
            out
        } else {
            let clip_left = (raw.len() - expected_len) / 2;
            raw[clip_left..clip_left + expected_len].to_vec()
        }
    }
}
