//! WAV files standing in for the microphone and the speaker

use crate::CliError;
use hound::{SampleFormat, WavReader, WavSpec, WavWriter};
use soundmessage_core::audio::{AudioInput, AudioOutput};
use soundmessage_core::resample::{mix_to_mono, resample_linear};
use soundmessage_core::{DeviceError, SHORT_MAX};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Read any PCM or float WAV as mono samples in [-1, 1] at `target_rate`.
pub fn read_wav(path: &Path, target_rate: u32) -> Result<Vec<f32>, CliError> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();
    log::info!(
        "Read WAV: {} Hz, {} channels, {} bits",
        spec.sample_rate,
        spec.channels,
        spec.bits_per_sample
    );

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Int => {
            let scale = (1i64 << (spec.bits_per_sample.clamp(1, 32) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / scale))
                .collect::<Result<_, _>>()?
        }
        SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
    };

    let mono = mix_to_mono(&interleaved, spec.channels as usize);
    if spec.sample_rate != target_rate {
        log::info!("resampling {} Hz to {} Hz", spec.sample_rate, target_rate);
    }
    Ok(resample_linear(&mono, spec.sample_rate, target_rate))
}

pub fn write_wav(path: &Path, samples: &[i16], sample_rate: u32) -> Result<(), CliError> {
    let spec = WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(path, spec)?;
    for &sample in samples {
        writer.write_sample(sample)?;
    }
    writer.finalize()?;
    Ok(())
}

/// Recorded samples replayed as a finite input device.
///
/// `trailing` samples of silence follow the recording so a frame that ends
/// right at the end of the file still sees its final end preamble.
pub struct WavSource {
    samples: Vec<i16>,
    position: usize,
}

impl WavSource {
    pub fn new(samples: &[f32], trailing: usize) -> Self {
        let mut pcm: Vec<i16> = samples
            .iter()
            .map(|&s| (s * SHORT_MAX).round() as i16)
            .collect();
        pcm.resize(pcm.len() + trailing, 0);
        Self {
            samples: pcm,
            position: 0,
        }
    }
}

impl AudioInput for WavSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        let n = buf.len().min(self.samples.len() - self.position);
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

/// Output device that keeps everything written to it.
#[derive(Clone, Default)]
pub struct WavSink {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl WavSink {
    pub fn take(&self) -> Vec<i16> {
        match self.samples.lock() {
            Ok(mut samples) => std::mem::take(&mut *samples),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl AudioOutput for WavSink {
    fn write(&mut self, buf: &[i16]) -> Result<usize, DeviceError> {
        let mut samples = self
            .samples
            .lock()
            .map_err(|_| DeviceError::new(DeviceError::DEAD_OBJECT))?;
        samples.extend_from_slice(buf);
        Ok(buf.len())
    }
}
