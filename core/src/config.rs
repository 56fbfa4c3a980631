//! Modem parameters
//!
//! Every tunable lives in [`ModemConfig`]. Derived values (subcarrier layout,
//! symbol timing, preamble waveforms) are rebuilt from it by
//! [`Modem::new`](crate::modem::Modem::new) and
//! [`Receiver::reconfigure`](crate::modem::Receiver::reconfigure).

use crate::error::{ModemError, Result};
use crate::ofdm::{OfdmCodec, OfdmTiming, SubcarrierLayout};
use crate::psk::PskOrder;
use crate::sync::SyncParams;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModemConfig {
    /// PSK order: 2, 4 or 8
    pub psk_modulate: usize,
    /// Lowest FFT bins used, pilots included
    pub subcarrier_num: usize,
    pub pilot_subcarrier_num: usize,
    /// FFT length of one OFDM symbol
    pub symbol_len: usize,
    /// Cyclic prefix as a fraction of `symbol_len`
    pub cyclic_prefix_factor: f32,
    /// Hz
    pub sample_freq: f32,
    /// Hz
    pub carrier_freq: f32,
    /// Hz
    pub preamble_low_freq: f32,
    /// Hz
    pub preamble_high_freq: f32,
    pub start_preamble_num: usize,
    pub end_preamble_num: usize,
    /// Peak-to-mean correlation ratio that counts as a preamble sighting
    pub start_end_threshold: f32,
    /// Largest lag spread (samples) accepted as one boundary
    pub lag_stdev_limit: f32,
    /// Most OFDM symbols in one frame, 0 for no limit. Longer frames are
    /// refused on transmit and dropped on receive.
    pub symbol_num_limit: usize,
    /// Silence around each transmitted frame, in symbol lengths
    pub space_factor: f32,
}

impl Default for ModemConfig {
    fn default() -> Self {
        Self {
            psk_modulate: 4,
            subcarrier_num: 10,
            pilot_subcarrier_num: 2,
            symbol_len: 2048,
            cyclic_prefix_factor: 0.1,
            sample_freq: crate::SAMPLE_RATE as f32,
            carrier_freq: 16_000.0,
            preamble_low_freq: 8_000.0,
            preamble_high_freq: 16_000.0,
            start_preamble_num: 3,
            end_preamble_num: 3,
            start_end_threshold: 10.0,
            lag_stdev_limit: 10.0,
            symbol_num_limit: 16,
            space_factor: 0.0,
        }
    }
}

fn require(condition: bool, message: impl FnOnce() -> String) -> Result<()> {
    if condition {
        Ok(())
    } else {
        Err(ModemError::InvalidConfig(message()))
    }
}

impl ModemConfig {
    /// Check every parameter and the derived layout and timing.
    pub fn validate(&self) -> Result<()> {
        self.psk_order()?;
        self.codec()?;

        let nyquist = self.sample_freq / 2.0;
        require(self.sample_freq.is_finite() && self.sample_freq > 0.0, || {
            format!("sample frequency must be positive, got {}", self.sample_freq)
        })?;
        for (name, freq) in [
            ("carrier", self.carrier_freq),
            ("preamble low", self.preamble_low_freq),
            ("preamble high", self.preamble_high_freq),
        ] {
            require(freq.is_finite() && freq > 0.0 && freq <= nyquist, || {
                format!("{} frequency {} outside (0, {}]", name, freq, nyquist)
            })?;
        }
        require(self.start_preamble_num > 0, || {
            "at least one start preamble is required".to_string()
        })?;
        require(self.end_preamble_num > 0, || {
            "at least one end preamble is required".to_string()
        })?;
        require(
            self.start_end_threshold.is_finite() && self.start_end_threshold >= 0.0,
            || format!("threshold must be non-negative, got {}", self.start_end_threshold),
        )?;
        require(
            self.lag_stdev_limit.is_finite() && self.lag_stdev_limit >= 0.0,
            || format!("lag stdev limit must be non-negative, got {}", self.lag_stdev_limit),
        )?;
        require(self.space_factor.is_finite() && self.space_factor >= 0.0, || {
            format!("space factor must be non-negative, got {}", self.space_factor)
        })?;
        Ok(())
    }

    pub fn psk_order(&self) -> Result<PskOrder> {
        PskOrder::try_from(self.psk_modulate)
    }

    pub fn layout(&self) -> Result<SubcarrierLayout> {
        SubcarrierLayout::new(self.subcarrier_num, self.pilot_subcarrier_num)
    }

    pub fn timing(&self) -> Result<OfdmTiming> {
        OfdmTiming::new(self.symbol_len, self.cyclic_prefix_factor)
    }

    pub fn codec(&self) -> Result<OfdmCodec> {
        OfdmCodec::new(self.layout()?, self.timing()?)
    }

    /// Capture ceiling in samples, 0 when unlimited.
    ///
    /// The capture of a frame with `symbol_num_limit` rows carries the last
    /// start repetition and all but one end repetition, less the frame's
    /// offset inside its window, so one extra window always fits it.
    pub fn buffer_limit(&self) -> Result<usize> {
        if self.symbol_num_limit == 0 {
            return Ok(0);
        }
        let timing = self.timing()?;
        Ok(timing.real_symbol_len * (self.symbol_num_limit + self.end_preamble_num))
    }

    pub fn sync_params(&self) -> Result<SyncParams> {
        Ok(SyncParams {
            window_len: self.timing()?.real_symbol_len,
            start_preamble_num: self.start_preamble_num,
            end_preamble_num: self.end_preamble_num,
            threshold: self.start_end_threshold,
            lag_stdev_limit: self.lag_stdev_limit,
            buffer_limit: self.buffer_limit()?,
        })
    }

    /// Silence samples on each side of a transmitted frame
    pub fn space_len(&self) -> Result<usize> {
        let real_symbol_len = self.timing()?.real_symbol_len;
        Ok((real_symbol_len as f32 * self.space_factor).round() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ModemConfig::default();
        config.validate().unwrap();
        assert_eq!(config.psk_order().unwrap(), PskOrder::Qpsk);
        assert_eq!(config.timing().unwrap().real_symbol_len, 2253);
        assert_eq!(config.space_len().unwrap(), 0);
    }

    #[test]
    fn test_buffer_limit() {
        let config = ModemConfig::default();
        assert_eq!(config.buffer_limit().unwrap(), 2253 * (16 + 3));

        let unlimited = ModemConfig {
            symbol_num_limit: 0,
            ..ModemConfig::default()
        };
        assert_eq!(unlimited.buffer_limit().unwrap(), 0);
    }

    #[test]
    fn test_sync_params_follow_timing() {
        let config = ModemConfig {
            symbol_len: 1024,
            cyclic_prefix_factor: 0.25,
            ..ModemConfig::default()
        };
        let params = config.sync_params().unwrap();
        assert_eq!(params.window_len, 1280);
        assert_eq!(params.start_preamble_num, 3);
        assert_eq!(params.threshold, 10.0);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let cases = [
            ModemConfig { psk_modulate: 16, ..ModemConfig::default() },
            ModemConfig { pilot_subcarrier_num: 10, ..ModemConfig::default() },
            ModemConfig { cyclic_prefix_factor: 2.0, ..ModemConfig::default() },
            ModemConfig { carrier_freq: 30_000.0, ..ModemConfig::default() },
            ModemConfig { sample_freq: 0.0, ..ModemConfig::default() },
            ModemConfig { end_preamble_num: 0, ..ModemConfig::default() },
            ModemConfig { space_factor: -1.0, ..ModemConfig::default() },
            ModemConfig { subcarrier_num: 4096, ..ModemConfig::default() },
        ];
        for config in cases {
            assert!(config.validate().is_err(), "{:?}", config);
        }
    }

    #[test]
    fn test_unsupported_order_error_kind() {
        let config = ModemConfig {
            psk_modulate: 3,
            ..ModemConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ModemError::UnsupportedModulationOrder(3))
        ));
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config: ModemConfig =
            serde_json::from_str(r#"{"psk_modulate": 8, "space_factor": 0.5}"#).unwrap();
        assert_eq!(config.psk_modulate, 8);
        assert_eq!(config.space_factor, 0.5);
        assert_eq!(config.subcarrier_num, 10);
        assert_eq!(config.space_len().unwrap(), 1127);
    }

    #[test]
    fn test_json_round_trip() {
        let config = ModemConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let parsed: ModemConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
