//! Audio device seams and the receive/transmit loops
//!
//! Devices are blocking, 16-bit mono. A read or write returns the number of
//! samples moved, or a [`DeviceError`] carrying the device's negative status.

use crate::error::{DeviceError, ModemError, Result};
use crate::modem::{ReceivedFrame, Receiver};
use crate::{OUTPUT_ATTENUATION, SHORT_MAX};
use crossbeam_channel::{unbounded, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

/// Samples requested from the input device per read
pub const DEFAULT_CHUNK_LEN: usize = 4096;

pub trait AudioInput: Send {
    /// Block until some samples are available. `Ok(0)` marks the end of a
    /// finite source.
    fn read(&mut self, buf: &mut [i16]) -> std::result::Result<usize, DeviceError>;
}

pub trait AudioOutput: Send {
    /// Block until some of `buf` has been accepted.
    fn write(&mut self, buf: &[i16]) -> std::result::Result<usize, DeviceError>;
}

/// Shared stop flag checked by both loops between device calls.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub fn pcm_to_sample(sample: i16) -> f32 {
    sample as f32 / SHORT_MAX
}

/// Scale by `0.8 * 32768`, round, and saturate to the `i16` range.
pub fn sample_to_pcm(sample: f32) -> i16 {
    // float-to-int `as` saturates
    (sample * OUTPUT_ATTENUATION * SHORT_MAX).round() as i16
}

/// Pull audio from `input` until it is exhausted, fails, or `cancel` fires.
///
/// Chunks of any size are stitched into synchronizer windows; samples left
/// over after the last whole window carry into the next read. Decoded frames
/// go to `frames`. An oversized capture is logged and skipped. A device
/// failure drops `input` and ends the loop with [`ModemError::DeviceIo`].
pub fn receive_loop<I: AudioInput>(
    mut input: I,
    receiver: &mut Receiver,
    frames: &Sender<ReceivedFrame>,
    cancel: &CancellationToken,
    chunk_len: usize,
) -> Result<()> {
    let w = receiver.window_len();
    let mut chunk = vec![0i16; chunk_len.max(1)];
    let mut pending: Vec<f32> = Vec::with_capacity(2 * w);

    while !cancel.is_cancelled() {
        let read = match input.read(&mut chunk) {
            Ok(read) => read,
            Err(e) => {
                log::error!("error when reading audio: {}", e);
                drop(input);
                return Err(e.into());
            }
        };
        if read == 0 {
            log::info!("audio input exhausted");
            break;
        }
        pending.extend(chunk[..read].iter().map(|&s| pcm_to_sample(s)));

        let mut offset = 0;
        while offset + w <= pending.len() {
            match receiver.process_window(&pending[offset..offset + w]) {
                Ok(Some(frame)) => {
                    if frames.send(frame).is_err() {
                        log::debug!("frame consumer gone, stopping receiver");
                        return Ok(());
                    }
                }
                Ok(None) => {}
                Err(ModemError::FrameTooLong { .. }) => {}
                Err(e) => return Err(e),
            }
            offset += w;
        }
        pending.drain(..offset);
    }
    Ok(())
}

/// Run [`receive_loop`] on its own thread, which owns the receiver.
pub fn spawn_receiver<I: AudioInput + 'static>(
    input: I,
    mut receiver: Receiver,
    frames: Sender<ReceivedFrame>,
    cancel: CancellationToken,
) -> JoinHandle<Result<()>> {
    thread::spawn(move || receive_loop(input, &mut receiver, &frames, &cancel, DEFAULT_CHUNK_LEN))
}

type OutputFactory =
    dyn Fn() -> std::result::Result<Box<dyn AudioOutput>, DeviceError> + Send + Sync;

/// Queue of outgoing sounds drained by at most one sender thread.
///
/// The thread is started by an enqueue that finds none running, opens the
/// device, writes until the queue is empty, then releases the device and
/// exits. A new sender joins its predecessor on its own thread before opening
/// the device, so enqueue never waits on a device being released.
pub struct Transmitter {
    queue: Sender<Vec<f32>>,
    pending: crossbeam_channel::Receiver<Vec<f32>>,
    active: Arc<AtomicBool>,
    open: Arc<OutputFactory>,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<Result<()>>>>,
}

impl Transmitter {
    pub fn new<F>(open: F, cancel: CancellationToken) -> Self
    where
        F: Fn() -> std::result::Result<Box<dyn AudioOutput>, DeviceError> + Send + Sync + 'static,
    {
        let (queue, pending) = unbounded();
        Self {
            queue,
            pending,
            active: Arc::new(AtomicBool::new(false)),
            open: Arc::new(open),
            cancel,
            handle: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Queue `sound` for playback without blocking.
    pub fn enqueue(&self, sound: Vec<f32>) {
        if self.queue.send(sound).is_err() {
            log::error!("send queue closed");
            return;
        }
        if self
            .active
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.spawn();
        }
    }

    fn spawn(&self) {
        let mut slot = match self.handle.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = slot.take();
        let pending = self.pending.clone();
        let active = Arc::clone(&self.active);
        let open = Arc::clone(&self.open);
        let cancel = self.cancel.clone();
        *slot = Some(thread::spawn(move || {
            // the earlier sender may still be releasing its device
            if let Some(previous) = previous {
                if let Ok(Err(e)) = previous.join() {
                    log::warn!("earlier sender thread failed: {}", e);
                }
            }
            let result = transmit_loop(&pending, &active, open.as_ref(), &cancel);
            if let Err(e) = &result {
                active.store(false, Ordering::Release);
                log::error!("error when writing audio: {}", e);
            }
            result
        }));
    }

    /// Block until the current sender thread has drained the queue.
    pub fn wait(&self) -> Result<()> {
        let handle = match self.handle.lock() {
            Ok(mut slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        match handle {
            Some(handle) => handle.join().unwrap_or_else(|_| {
                log::error!("sender thread panicked");
                Err(DeviceError::new(DeviceError::ERROR).into())
            }),
            None => Ok(()),
        }
    }
}

fn transmit_loop(
    pending: &crossbeam_channel::Receiver<Vec<f32>>,
    active: &AtomicBool,
    open: &OutputFactory,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut device = open()?;
    loop {
        if cancel.is_cancelled() {
            active.store(false, Ordering::Release);
            return Ok(());
        }

        let data: Vec<i16> = pending
            .try_iter()
            .flat_map(|sound| sound.into_iter().map(sample_to_pcm))
            .collect();
        if data.is_empty() {
            active.store(false, Ordering::Release);
            // An enqueue may have landed after the drain but before the flag
            // dropped; it saw the flag set and did not spawn.
            if !pending.is_empty()
                && active
                    .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
                    .is_ok()
            {
                continue;
            }
            log::debug!("send queue drained");
            return Ok(());
        }

        let mut written = 0;
        while written < data.len() {
            if cancel.is_cancelled() {
                active.store(false, Ordering::Release);
                return Ok(());
            }
            match device.write(&data[written..])? {
                0 => return Err(DeviceError::new(DeviceError::ERROR).into()),
                n => written += n,
            }
        }
    }
}
