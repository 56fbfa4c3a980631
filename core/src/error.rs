use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModemError {
    #[error("Length mismatch: expected {expected}, got {actual}")]
    LengthMismatch { expected: usize, actual: usize },

    #[error("Unsupported PSK modulation order: {0} (expected 2, 4 or 8)")]
    UnsupportedModulationOrder(usize),

    #[error("Audio device failure: {0}")]
    DeviceIo(#[from] DeviceError),

    #[error("Frame too long: {len} samples exceeds limit of {limit}")]
    FrameTooLong { len: usize, limit: usize },

    #[error("Frame of {rows} OFDM symbols exceeds limit of {limit}")]
    TooManySymbols { rows: usize, limit: usize },

    #[error("Frame decode mismatch: {0}")]
    FrameDecodeMismatch(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Symbol {symbol} out of range for modulation order {order}")]
    InvalidSymbol { symbol: u32, order: usize },

    #[error("Invalid input size")]
    InvalidInputSize,
}

pub type Result<T> = std::result::Result<T, ModemError>;

/// Negative status code returned by a blocking audio device call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceError {
    pub code: i32,
}

impl DeviceError {
    pub const ERROR: i32 = -1;
    pub const BAD_VALUE: i32 = -2;
    pub const INVALID_OPERATION: i32 = -3;
    pub const DEAD_OBJECT: i32 = -6;

    pub fn new(code: i32) -> Self {
        Self { code }
    }
}

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.code {
            Self::ERROR => write!(f, "ERROR"),
            Self::BAD_VALUE => write!(f, "ERROR_BAD_VALUE"),
            Self::INVALID_OPERATION => write!(f, "ERROR_INVALID_OPERATION"),
            Self::DEAD_OBJECT => write!(f, "ERROR_DEAD_OBJECT"),
            code => write!(f, "Unknown ({})", code),
        }
    }
}

impl std::error::Error for DeviceError {}
