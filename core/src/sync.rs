//! Preamble-based frame synchronization
//!
//! A frame on the air looks like
//!
//! ```text
//! [start chirp x N] [OFDM symbols ...] [end chirp x M]
//! ```
//!
//! where each chirp repetition is exactly one window (`real_symbol_len`
//! samples) long. The receiver correlates every pair of consecutive windows
//! against the chirp it is waiting for. Because the repetitions sit one window
//! apart, a real preamble produces the same lag in every probe. A boundary is
//! accepted once the last N (or M) lags agree to within `lag_stdev_limit`.

use crate::correlation::{xcorr, Correlation};
use crate::error::{ModemError, Result};
use std::collections::VecDeque;
use std::f64::consts::TAU;

/// Linear chirp `cos(2*pi*(beta/2*t^2 + f0*t))` sweeping from `start_freq` at
/// the first sample to `end_freq` at the last.
pub fn generate_chirp(
    duration_samples: usize,
    start_freq: f32,
    end_freq: f32,
    sample_rate: f32,
) -> Vec<f32> {
    if duration_samples < 2 {
        return vec![1.0; duration_samples];
    }
    let sample_rate = sample_rate as f64;
    let f0 = start_freq as f64;
    let t_last = (duration_samples - 1) as f64 / sample_rate;
    let beta = (end_freq as f64 - f0) / t_last;

    (0..duration_samples)
        .map(|n| {
            let t = n as f64 / sample_rate;
            let cycles = beta / 2.0 * t * t + f0 * t;
            (TAU * cycles.fract()).cos() as f32
        })
        .collect()
}

/// Start (rising) and end (falling) chirps, one window long each.
#[derive(Debug, Clone, PartialEq)]
pub struct PreambleWaveforms {
    pub start: Vec<f32>,
    pub end: Vec<f32>,
}

impl PreambleWaveforms {
    pub fn new(len: usize, low_freq: f32, high_freq: f32, sample_rate: f32) -> Self {
        Self {
            start: generate_chirp(len, low_freq, high_freq, sample_rate),
            end: generate_chirp(len, high_freq, low_freq, sample_rate),
        }
    }
}

/// Bounded FIFO of recent correlation peak lags.
///
/// Pushing into a full history evicts the oldest entry.
#[derive(Debug, Clone)]
pub struct LagHistory {
    capacity: usize,
    lags: VecDeque<isize>,
}

impl LagHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            lags: VecDeque::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, lag: isize) {
        if self.capacity == 0 {
            return;
        }
        if self.lags.len() == self.capacity {
            self.lags.pop_front();
        }
        self.lags.push_back(lag);
    }

    pub fn clear(&mut self) {
        self.lags.clear();
    }

    pub fn len(&self) -> usize {
        self.lags.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lags.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.capacity > 0 && self.lags.len() == self.capacity
    }

    pub fn lags(&self) -> impl Iterator<Item = isize> + '_ {
        self.lags.iter().copied()
    }

    pub fn mean(&self) -> f32 {
        if self.lags.is_empty() {
            return 0.0;
        }
        self.lags.iter().map(|&l| l as f32).sum::<f32>() / self.lags.len() as f32
    }

    /// Population standard deviation around `mean`
    pub fn stdev(&self, mean: f32) -> f32 {
        if self.lags.is_empty() {
            return 0.0;
        }
        let sum: f32 = self
            .lags
            .iter()
            .map(|&l| {
                let diff = l as f32 - mean;
                diff * diff
            })
            .sum();
        (sum / self.lags.len() as f32).sqrt()
    }

    /// Rounded mean lag once the history is full and its spread is within
    /// `stdev_limit`.
    pub fn consensus(&self, stdev_limit: f32) -> Option<usize> {
        if !self.is_full() {
            return None;
        }
        let mean = self.mean();
        let dev = self.stdev(mean);
        log::debug!("candidate mean: {} dev: {}", mean, dev);
        if dev <= stdev_limit {
            Some(mean.round().max(0.0) as usize)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    SearchingStart,
    Capturing,
}

/// Observer for intermediate receive-side signals, e.g. for plotting.
pub trait Telemetry: Send {
    fn on_window(&mut self, _window: &[f32]) {}
    fn on_start_correlation(&mut self, _trace: &Correlation) {}
    fn on_end_correlation(&mut self, _trace: &Correlation) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoTelemetry;

impl Telemetry for NoTelemetry {}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SyncParams {
    /// Samples per window; equals one preamble repetition
    pub window_len: usize,
    pub start_preamble_num: usize,
    pub end_preamble_num: usize,
    /// Peak-to-mean correlation ratio a window must exceed
    pub threshold: f32,
    pub lag_stdev_limit: f32,
    /// Capture buffer ceiling in samples, 0 for none
    pub buffer_limit: usize,
}

pub struct FrameSynchronizer {
    params: SyncParams,
    preambles: PreambleWaveforms,
    state: SyncState,
    previous_window: Option<Vec<f32>>,
    starts: LagHistory,
    ends: LagHistory,
    buffer: Vec<f32>,
    telemetry: Box<dyn Telemetry>,
}

impl FrameSynchronizer {
    pub fn new(params: SyncParams, preambles: PreambleWaveforms) -> Result<Self> {
        if params.window_len == 0 {
            return Err(ModemError::InvalidConfig(
                "synchronizer window must be positive".to_string(),
            ));
        }
        for (name, waveform) in [("start", &preambles.start), ("end", &preambles.end)] {
            if waveform.len() != params.window_len {
                return Err(ModemError::InvalidConfig(format!(
                    "{} preamble has {} samples, window has {}",
                    name,
                    waveform.len(),
                    params.window_len
                )));
            }
        }
        Ok(Self {
            starts: LagHistory::new(params.start_preamble_num),
            ends: LagHistory::new(params.end_preamble_num),
            params,
            preambles,
            state: SyncState::SearchingStart,
            previous_window: None,
            buffer: Vec::new(),
            telemetry: Box::new(NoTelemetry),
        })
    }

    pub fn set_telemetry(&mut self, telemetry: Box<dyn Telemetry>) {
        self.telemetry = telemetry;
    }

    /// Detach the current observer, leaving [`NoTelemetry`] in its place.
    pub fn take_telemetry(&mut self) -> Box<dyn Telemetry> {
        std::mem::replace(&mut self.telemetry, Box::new(NoTelemetry))
    }

    pub fn params(&self) -> &SyncParams {
        &self.params
    }

    pub fn state(&self) -> SyncState {
        self.state
    }

    pub fn start_candidates(&self) -> &LagHistory {
        &self.starts
    }

    pub fn end_candidates(&self) -> &LagHistory {
        &self.ends
    }

    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Forget everything, including the cached previous window.
    pub fn reset(&mut self) {
        self.back_to_search();
        self.previous_window = None;
    }

    fn back_to_search(&mut self) {
        self.state = SyncState::SearchingStart;
        self.buffer = Vec::new();
        self.starts.clear();
        self.ends.clear();
    }

    /// Feed one window of exactly `window_len` samples.
    ///
    /// Returns the raw OFDM section of a frame when its end boundary is
    /// accepted in this window. An oversized capture is dropped and reported
    /// as [`ModemError::FrameTooLong`]; the synchronizer keeps running.
    pub fn process_window(&mut self, window: &[f32]) -> Result<Option<Vec<f32>>> {
        let w = self.params.window_len;
        if window.len() != w {
            return Err(ModemError::LengthMismatch {
                expected: w,
                actual: window.len(),
            });
        }
        self.telemetry.on_window(window);

        let Some(mut probe) = self.previous_window.take() else {
            self.previous_window = Some(window.to_vec());
            return Ok(None);
        };
        probe.extend_from_slice(window);

        let result = self.step(&probe);
        self.previous_window = Some(window.to_vec());
        result
    }

    fn step(&mut self, probe: &[f32]) -> Result<Option<Vec<f32>>> {
        let w = self.params.window_len;
        let mut frame = None;
        let mut skip_buffer = false;

        match self.state {
            SyncState::SearchingStart => {
                let trace = self.clipped_correlation(probe, &self.preambles.start)?;
                self.telemetry.on_start_correlation(&trace);
                let (value, lag) = peak_statistic(&trace);
                if value > self.params.threshold {
                    self.starts.push(lag);
                    log::debug!("start correlation: {} lag: {}", value, lag);
                    if let Some(offset) = self.starts.consensus(self.params.lag_stdev_limit) {
                        let offset = offset.min(w);
                        log::info!("started: {}", offset);
                        self.buffer = probe[offset..w].to_vec();
                        self.starts.clear();
                        self.state = SyncState::Capturing;
                        skip_buffer = true;
                        log::debug!("start write: {}", w - offset);
                    }
                } else {
                    self.starts.clear();
                }
            }
            SyncState::Capturing => {
                let trace = self.clipped_correlation(probe, &self.preambles.end)?;
                self.telemetry.on_end_correlation(&trace);
                let (value, lag) = peak_statistic(&trace);
                if value > self.params.threshold {
                    self.ends.push(lag);
                    log::debug!("end correlation: {} lag: {}", value, lag);
                    if let Some(offset) = self.ends.consensus(self.params.lag_stdev_limit) {
                        let offset = offset.min(w);
                        log::info!("ended: {}", offset);
                        self.buffer.extend_from_slice(&probe[..offset]);
                        frame = self.take_frame();
                        self.back_to_search();
                    }
                } else {
                    self.ends.clear();
                }
            }
        }

        if self.state == SyncState::Capturing && !skip_buffer {
            self.buffer.extend_from_slice(&probe[..w]);
            let limit = self.params.buffer_limit;
            if limit != 0 && self.buffer.len() > limit {
                let len = self.buffer.len();
                self.back_to_search();
                log::warn!("packet too long");
                return Err(ModemError::FrameTooLong { len, limit });
            }
        }
        Ok(frame)
    }

    /// OFDM section of the capture buffer: skip the final start repetition
    /// and keep `len - end_preamble_num * w` samples.
    fn take_frame(&mut self) -> Option<Vec<f32>> {
        let w = self.params.window_len;
        let tail = self.params.end_preamble_num * w;
        let length = self.buffer.len().checked_sub(tail).filter(|&l| l > 0)?;
        let frame = self.buffer.get(w..w + length).map(|s| s.to_vec());
        if frame.is_none() {
            log::warn!("capture of {} samples too short for a frame", self.buffer.len());
        }
        frame
    }

    fn clipped_correlation(&self, probe: &[f32], template: &[f32]) -> Result<Correlation> {
        Ok(xcorr(probe, template)?.window(0, self.params.window_len))
    }
}

/// Peak over mean absolute correlation, and the lag of that peak.
fn peak_statistic(trace: &Correlation) -> (f32, isize) {
    let Some((peak, lag)) = trace.peak() else {
        return (0.0, 0);
    };
    let mean = trace.mean_abs();
    if mean > 0.0 && mean.is_finite() {
        (peak / mean, lag)
    } else {
        (0.0, lag)
    }
}
