use crate::error::{ModemError, Result};

/// OFDM row count (u32 LE) + payload length (u32 LE)
pub const FRAME_HEADER_SIZE: usize = 8;

/// Packs payload bytes into PSK symbols laid out in rows of one OFDM symbol.
///
/// The byte stream (header followed by payload) is read LSB first, and each
/// group of `bits_per_symbol` bits becomes one symbol with its first bit in
/// the least significant position. The last row is padded with zero symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitstreamFramer {
    bits_per_symbol: usize,
    symbols_per_row: usize,
}

impl BitstreamFramer {
    pub fn new(bits_per_symbol: usize, symbols_per_row: usize) -> Result<Self> {
        if bits_per_symbol == 0 || bits_per_symbol > 16 {
            return Err(ModemError::InvalidConfig(format!(
                "bits per symbol must be in 1..=16, got {}",
                bits_per_symbol
            )));
        }
        if symbols_per_row == 0 {
            return Err(ModemError::InvalidConfig(
                "a row needs at least one data subcarrier".to_string(),
            ));
        }
        Ok(Self {
            bits_per_symbol,
            symbols_per_row,
        })
    }

    pub fn bits_per_symbol(&self) -> usize {
        self.bits_per_symbol
    }

    pub fn symbols_per_row(&self) -> usize {
        self.symbols_per_row
    }

    /// Number of OFDM rows needed to carry `payload_len` bytes.
    pub fn row_count(&self, payload_len: usize) -> usize {
        let bits = (payload_len + FRAME_HEADER_SIZE) * 8;
        bits.div_ceil(self.bits_per_symbol).div_ceil(self.symbols_per_row)
    }

    pub fn encode(&self, payload: &[u8]) -> Result<Vec<u32>> {
        let rows = self.row_count(payload.len());
        let header_rows = u32::try_from(rows).map_err(|_| ModemError::InvalidInputSize)?;
        let header_len = u32::try_from(payload.len()).map_err(|_| ModemError::InvalidInputSize)?;

        let mut data = Vec::with_capacity(FRAME_HEADER_SIZE + payload.len());
        data.extend_from_slice(&header_rows.to_le_bytes());
        data.extend_from_slice(&header_len.to_le_bytes());
        data.extend_from_slice(payload);

        let total_bits = data.len() * 8;
        let bit = |pos: usize| -> u32 {
            if pos < total_bits {
                ((data[pos / 8] >> (pos % 8)) & 1) as u32
            } else {
                0
            }
        };

        let n = self.bits_per_symbol;
        let symbols = (0..rows * self.symbols_per_row)
            .map(|index| (0..n).fold(0u32, |value, j| value | (bit(index * n + j) << j)))
            .collect();
        Ok(symbols)
    }

    pub fn decode(&self, symbols: &[u32]) -> Result<Vec<u8>> {
        if symbols.len() % self.symbols_per_row != 0 {
            return Err(ModemError::FrameDecodeMismatch(format!(
                "{} symbols is not a whole number of rows of {}",
                symbols.len(),
                self.symbols_per_row
            )));
        }
        let rows = symbols.len() / self.symbols_per_row;

        let n = self.bits_per_symbol;
        let mut bytes = vec![0u8; symbols.len() * n / 8];
        for (index, &symbol) in symbols.iter().enumerate() {
            for j in 0..n {
                let pos = index * n + j;
                if pos / 8 >= bytes.len() {
                    break;
                }
                if (symbol >> j) & 1 == 1 {
                    bytes[pos / 8] |= 1 << (pos % 8);
                }
            }
        }

        if bytes.len() < FRAME_HEADER_SIZE {
            return Err(ModemError::FrameDecodeMismatch(format!(
                "{} bytes recovered, header needs {}",
                bytes.len(),
                FRAME_HEADER_SIZE
            )));
        }
        let declared_rows = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as usize;
        if declared_rows != rows {
            return Err(ModemError::FrameDecodeMismatch(format!(
                "header declares {} rows, received {}",
                declared_rows, rows
            )));
        }
        let declared_len = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]) as usize;
        let available = bytes.len() - FRAME_HEADER_SIZE;
        if declared_len > available {
            return Err(ModemError::FrameDecodeMismatch(format!(
                "header declares {} payload bytes, only {} recovered",
                declared_len, available
            )));
        }

        Ok(bytes[FRAME_HEADER_SIZE..FRAME_HEADER_SIZE + declared_len].to_vec())
    }
}
