//! Acoustic OFDM modem for short text messages over speaker and microphone
//!
//! PSK symbols ride on the lowest bins of an OFDM symbol, upmixed onto an
//! audio carrier and bracketed by chirp preambles so a receiver can find
//! frame boundaries by cross-correlation.

pub mod audio;
pub mod carrier;
pub mod config;
pub mod correlation;
pub mod equalizer;
pub mod error;
pub mod fourier;
pub mod framing;
pub mod modem;
pub mod ofdm;
pub mod psk;
pub mod resample;
pub mod sync;

pub use audio::{AudioInput, AudioOutput, CancellationToken, Transmitter};
pub use config::ModemConfig;
pub use error::{DeviceError, ModemError, Result};
pub use fourier::ComplexSignal;
pub use framing::BitstreamFramer;
pub use modem::{Modem, ReceivedFrame, Receiver};
pub use ofdm::OfdmCodec;
pub use psk::PskOrder;
pub use sync::{FrameSynchronizer, Telemetry};

pub const SAMPLE_RATE: usize = 44_100;

/// Full scale of signed 16-bit PCM
pub const SHORT_MAX: f32 = 32_768.0;

/// Gain applied to the OFDM section so it sits near the chirp level
pub const SOUND_AMPLIFIER: f32 = 200.0;

/// Headroom applied when converting to PCM
pub const OUTPUT_ATTENUATION: f32 = 0.8;
