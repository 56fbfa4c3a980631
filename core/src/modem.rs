//! Transmit and receive chains built from one [`ModemConfig`]
//!
//! Transmit: symbols -> PSK -> OFDM rows -> carrier -> preambles around it.
//! Receive: synchronizer capture -> realign -> downmix -> OFDM rows ->
//! pilot correction -> PSK decisions -> payload.

use crate::carrier::{downmix, upmix};
use crate::config::ModemConfig;
use crate::equalizer::ChannelEstimator;
use crate::error::{ModemError, Result};
use crate::fourier::ComplexSignal;
use crate::framing::BitstreamFramer;
use crate::ofdm::OfdmCodec;
use crate::psk::PskOrder;
use crate::sync::{FrameSynchronizer, PreambleWaveforms, Telemetry};
use crate::SOUND_AMPLIFIER;
use num_complex::Complex32;

/// Stateless modulator/demodulator for one configuration.
#[derive(Debug, Clone)]
pub struct Modem {
    config: ModemConfig,
    psk: PskOrder,
    codec: OfdmCodec,
    framer: BitstreamFramer,
    estimator: ChannelEstimator,
    preambles: PreambleWaveforms,
}

impl Modem {
    pub fn new(config: ModemConfig) -> Result<Self> {
        config.validate()?;
        let psk = config.psk_order()?;
        let codec = config.codec()?;
        let framer = BitstreamFramer::new(psk.bits_per_symbol(), codec.layout().data_count())?;
        let preambles = PreambleWaveforms::new(
            codec.timing().real_symbol_len,
            config.preamble_low_freq,
            config.preamble_high_freq,
            config.sample_freq,
        );
        Ok(Self {
            psk,
            codec,
            framer,
            estimator: ChannelEstimator::new(psk),
            preambles,
            config,
        })
    }

    pub fn config(&self) -> &ModemConfig {
        &self.config
    }

    pub fn psk(&self) -> PskOrder {
        self.psk
    }

    pub fn codec(&self) -> &OfdmCodec {
        &self.codec
    }

    pub fn framer(&self) -> &BitstreamFramer {
        &self.framer
    }

    pub fn preambles(&self) -> &PreambleWaveforms {
        &self.preambles
    }

    /// Samples per OFDM symbol including the cyclic prefix
    pub fn window_len(&self) -> usize {
        self.codec.timing().real_symbol_len
    }

    /// A fresh synchronizer matching this configuration.
    pub fn synchronizer(&self) -> Result<FrameSynchronizer> {
        FrameSynchronizer::new(self.config.sync_params()?, self.preambles.clone())
    }

    /// Build a complete frame from raw symbols.
    ///
    /// `symbols.len()` must be a multiple of the data subcarrier count; each
    /// group becomes one OFDM symbol, and there may be at most
    /// `symbol_num_limit` of them when that is non-zero. The result is
    /// amplified passband audio with the preambles and silence padding in
    /// place.
    pub fn modulate_symbols(&self, symbols: &[u32]) -> Result<Vec<f32>> {
        let data_count = self.codec.layout().data_count();
        let pilot_count = self.codec.layout().pilot_count();
        if symbols.len() % data_count != 0 {
            return Err(ModemError::InvalidInputSize);
        }
        let rows = symbols.len() / data_count;
        let limit = self.config.symbol_num_limit;
        if limit != 0 && rows > limit {
            return Err(ModemError::TooManySymbols { rows, limit });
        }

        let data = self.psk.modulate(symbols)?;
        let pilots = self.estimator.known_pilots(rows * pilot_count)?;

        let mut baseband = ComplexSignal::default();
        for row in 0..rows {
            let symbol = self.codec.encode_symbol(
                &data[row * data_count..(row + 1) * data_count],
                &pilots[row * pilot_count..(row + 1) * pilot_count],
            )?;
            baseband.extend_from(&symbol);
        }
        let passband = upmix(&baseband, self.config.carrier_freq, self.config.sample_freq);

        let space = self.config.space_len()?;
        let w = self.window_len();
        let preamble_len = (self.config.start_preamble_num + self.config.end_preamble_num) * w;
        let mut sound = Vec::with_capacity(2 * space + preamble_len + passband.len());
        sound.resize(space, 0.0);
        for _ in 0..self.config.start_preamble_num {
            sound.extend_from_slice(&self.preambles.start);
        }
        sound.extend(passband.iter().map(|s| s * SOUND_AMPLIFIER));
        for _ in 0..self.config.end_preamble_num {
            sound.extend_from_slice(&self.preambles.end);
        }
        sound.resize(sound.len() + space, 0.0);

        log::debug!("modulated {} OFDM symbols into {} samples", rows, sound.len());
        Ok(sound)
    }

    /// Frame a byte payload and modulate it.
    pub fn encode_payload(&self, payload: &[u8]) -> Result<Vec<f32>> {
        let symbols = self.framer.encode(payload)?;
        self.modulate_symbols(&symbols)
    }

    /// Recover symbols from the OFDM section of a captured frame.
    pub fn demodulate_frame(&self, frame: &[f32]) -> Result<Vec<u32>> {
        let w = self.window_len();
        let rows = self.codec.symbol_count_for(frame.len());
        log::debug!(
            "real sig len: {} expected sig len: {}",
            frame.len(),
            rows * w
        );
        if rows == 0 {
            return Ok(Vec::new());
        }

        let aligned = self.codec.realign_signal(frame, rows);
        let baseband = downmix(&aligned, self.config.carrier_freq, self.config.sample_freq);

        let mut data: Vec<Complex32> = Vec::with_capacity(rows * self.codec.layout().data_count());
        let mut pilots: Vec<Complex32> = Vec::with_capacity(rows * self.codec.layout().pilot_count());
        for row in 0..rows {
            let bins = self.codec.decode_symbol(&baseband.slice(row * w..(row + 1) * w))?;
            data.extend(bins.data);
            pilots.extend(bins.pilots);
        }

        let correction = self.estimator.estimate(&pilots)?;
        ChannelEstimator::apply(correction, &mut data);
        let symbols = self.psk.demodulate(&data);

        log::warn!("receiver data: {}", format_symbols(&symbols));
        Ok(symbols)
    }

    /// Demodulate a captured frame and strip its payload header.
    pub fn decode_payload(&self, frame: &[f32]) -> Result<Vec<u8>> {
        let symbols = self.demodulate_frame(frame)?;
        self.framer.decode(&symbols)
    }
}

fn format_symbols(symbols: &[u32]) -> String {
    symbols
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(" ")
}

/// One frame recovered by a [`Receiver`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    pub symbols: Vec<u32>,
    /// `None` when the symbols do not carry a valid payload header
    pub payload: Option<Vec<u8>>,
}

impl ReceivedFrame {
    pub fn text(&self) -> Option<String> {
        self.payload
            .as_ref()
            .map(|bytes| String::from_utf8_lossy(bytes).into_owned())
    }
}

/// Synchronizer plus demodulator: turns a window stream into frames.
pub struct Receiver {
    modem: Modem,
    sync: FrameSynchronizer,
}

impl Receiver {
    pub fn new(config: ModemConfig) -> Result<Self> {
        let modem = Modem::new(config)?;
        let sync = modem.synchronizer()?;
        Ok(Self { modem, sync })
    }

    pub fn modem(&self) -> &Modem {
        &self.modem
    }

    pub fn synchronizer(&self) -> &FrameSynchronizer {
        &self.sync
    }

    pub fn window_len(&self) -> usize {
        self.modem.window_len()
    }

    pub fn set_telemetry(&mut self, telemetry: Box<dyn Telemetry>) {
        self.sync.set_telemetry(telemetry);
    }

    /// Rebuild everything from `config` and drop any partial capture.
    ///
    /// On error the previous configuration stays in effect.
    pub fn reconfigure(&mut self, config: ModemConfig) -> Result<()> {
        let modem = Modem::new(config)?;
        let mut sync = modem.synchronizer()?;
        sync.set_telemetry(self.sync.take_telemetry());
        self.modem = modem;
        self.sync = sync;
        log::info!("receiver reconfigured, window {}", self.modem.window_len());
        Ok(())
    }

    /// Feed one window of [`window_len`](Self::window_len) samples.
    pub fn process_window(&mut self, window: &[f32]) -> Result<Option<ReceivedFrame>> {
        let Some(frame) = self.sync.process_window(window)? else {
            return Ok(None);
        };
        let symbols = self.modem.demodulate_frame(&frame)?;
        let payload = match self.modem.framer().decode(&symbols) {
            Ok(payload) => Some(payload),
            Err(e) => {
                log::info!("frame carries no payload: {}", e);
                None
            }
        };
        Ok(Some(ReceivedFrame { symbols, payload }))
    }
}
