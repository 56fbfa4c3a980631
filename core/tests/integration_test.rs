// ============================================================================
// INTEGRATION TESTS - PERFORMANCE NOTE
// ============================================================================
// Every window the receiver sees costs one cross-correlation of a two-window
// probe against a 2253-sample chirp, so a full frame is a few dozen FFTs of
// several thousand points. Release mode is much faster:
//   cargo test -p soundmessage-core --test integration_test --release
// ============================================================================

use crossbeam_channel::unbounded;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use soundmessage_core::audio::{
    pcm_to_sample, receive_loop, sample_to_pcm, spawn_receiver, AudioInput, CancellationToken,
};
use soundmessage_core::correlation::Correlation;
use soundmessage_core::sync::Telemetry;
use soundmessage_core::{DeviceError, Modem, ModemConfig, ModemError, ReceivedFrame, Receiver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const RAW_SYMBOLS: [u32; 8] = [1, 0, 1, 1, 1, 3, 1, 3];

/// Pad `sound` so it starts mid-window and is followed by enough silence for
/// the final end-preamble probe.
fn on_air(sound: &[f32], leading: usize, window_len: usize) -> Vec<f32> {
    let mut stream = vec![0.0; leading];
    stream.extend_from_slice(sound);
    stream.extend(std::iter::repeat(0.0).take(3 * window_len));
    stream
}

fn add_noise(samples: &mut [f32], sigma: f32, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0f32, sigma).expect("Invalid noise distribution");
    for sample in samples.iter_mut() {
        *sample += normal.sample(&mut rng);
    }
}

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Feed whole windows, collecting frames and counting oversized captures.
fn run_receiver(receiver: &mut Receiver, stream: &[f32]) -> (Vec<ReceivedFrame>, usize) {
    init_logging();
    let w = receiver.window_len();
    let mut frames = Vec::new();
    let mut too_long = 0;
    for window in stream.chunks_exact(w) {
        match receiver.process_window(window) {
            Ok(Some(frame)) => frames.push(frame),
            Ok(None) => {}
            Err(ModemError::FrameTooLong { .. }) => too_long += 1,
            Err(e) => panic!("Receiver failed: {:?}", e),
        }
    }
    (frames, too_long)
}

/// Finite PCM source handing out fixed-size chunks.
struct PcmSource {
    samples: Vec<i16>,
    position: usize,
    chunk: usize,
}

impl PcmSource {
    fn new(stream: &[f32], chunk: usize) -> Self {
        Self {
            samples: stream.iter().map(|&s| sample_to_pcm(s)).collect(),
            position: 0,
            chunk,
        }
    }
}

impl AudioInput for PcmSource {
    fn read(&mut self, buf: &mut [i16]) -> Result<usize, DeviceError> {
        let n = self
            .chunk
            .min(buf.len())
            .min(self.samples.len() - self.position);
        buf[..n].copy_from_slice(&self.samples[self.position..self.position + n]);
        self.position += n;
        Ok(n)
    }
}

#[test]
fn test_raw_symbols_round_trip() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let sound = modem
        .modulate_symbols(&RAW_SYMBOLS)
        .expect("Failed to modulate");
    let w = modem.window_len();
    assert_eq!(sound.len(), 7 * w, "3 start + 1 data + 3 end windows");

    let stream = on_air(&sound, 1000, w);
    let mut receiver = Receiver::new(config).expect("Failed to create receiver");
    let (frames, too_long) = run_receiver(&mut receiver, &stream);

    assert_eq!(too_long, 0);
    assert_eq!(frames.len(), 1, "Expected exactly one frame");
    assert_eq!(frames[0].symbols, RAW_SYMBOLS.to_vec());
    assert_eq!(frames[0].payload, None, "Raw symbols carry no payload header");
}

#[test]
fn test_text_round_trip_with_noise() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let sound = modem
        .encode_payload(b"Hello, Audio Modem!")
        .expect("Failed to encode");

    let mut stream = on_air(&sound, 5000, modem.window_len());
    add_noise(&mut stream, 0.05, 7);

    let mut receiver = Receiver::new(config).expect("Failed to create receiver");
    let (frames, _) = run_receiver(&mut receiver, &stream);

    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].text().as_deref(), Some("Hello, Audio Modem!"));
}

#[test]
fn test_unicode_and_binary_payloads() {
    let config = ModemConfig {
        space_factor: 1.0,
        ..ModemConfig::default()
    };
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let w = modem.window_len();

    let payloads: [&[u8]; 3] = ["你好，世界".as_bytes(), &[0, 1, 2, 255, 128, 0, 0], b""];
    let mut stream = Vec::new();
    for payload in payloads {
        stream.extend(modem.encode_payload(payload).expect("Failed to encode"));
        stream.extend(std::iter::repeat(0.0).take(2 * w));
    }
    let stream = on_air(&stream, 321, w);

    let mut receiver = Receiver::new(config).expect("Failed to create receiver");
    let (frames, _) = run_receiver(&mut receiver, &stream);

    let decoded: Vec<Vec<u8>> = frames
        .into_iter()
        .map(|f| f.payload.expect("Frame without payload"))
        .collect();
    let expected: Vec<Vec<u8>> = payloads.iter().map(|p| p.to_vec()).collect();
    assert_eq!(decoded, expected, "Trailing zero bytes and empty payloads survive");
}

#[test]
fn test_every_psk_order() {
    for psk_modulate in [2, 4, 8] {
        let config = ModemConfig {
            psk_modulate,
            ..ModemConfig::default()
        };
        let modem = Modem::new(config.clone()).expect("Failed to create modem");
        let sound = modem.encode_payload(b"psk").expect("Failed to encode");
        let stream = on_air(&sound, 2000, modem.window_len());

        let mut receiver = Receiver::new(config).expect("Failed to create receiver");
        let (frames, _) = run_receiver(&mut receiver, &stream);
        assert_eq!(frames.len(), 1, "order {}", psk_modulate);
        assert_eq!(frames[0].payload.as_deref(), Some(&b"psk"[..]));
    }
}

#[test]
fn test_receive_loop_over_pcm_chunks() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let w = modem.window_len();

    let mut stream = vec![0.0; 1234];
    stream.extend(modem.encode_payload(b"first").expect("Failed to encode"));
    stream.extend(std::iter::repeat(0.0).take(3 * w));
    stream.extend(modem.encode_payload(b"second").expect("Failed to encode"));
    stream.extend(std::iter::repeat(0.0).take(3 * w));

    init_logging();
    let mut receiver = Receiver::new(config).expect("Failed to create receiver");
    let (tx, rx) = unbounded();
    receive_loop(
        PcmSource::new(&stream, 1000),
        &mut receiver,
        &tx,
        &CancellationToken::new(),
        4096,
    )
    .expect("Receive loop failed");
    drop(tx);

    let texts: Vec<String> = rx.iter().filter_map(|f| f.text()).collect();
    assert_eq!(texts, vec!["first".to_string(), "second".to_string()]);
}

#[test]
fn test_pcm_round_trip_keeps_scale() {
    for sample in [0.0f32, 0.25, -0.5, 1.0] {
        let back = pcm_to_sample(sample_to_pcm(sample));
        assert!((back - sample * 0.8).abs() < 1e-4, "{} -> {}", sample, back);
    }
}

#[test]
fn test_spawned_receiver_delivers_frames() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let sound = modem.encode_payload(b"threaded").expect("Failed to encode");
    let stream = on_air(&sound, 4000, modem.window_len());

    let receiver = Receiver::new(config).expect("Failed to create receiver");
    let (tx, rx) = unbounded();
    let handle = spawn_receiver(
        PcmSource::new(&stream, 777),
        receiver,
        tx,
        CancellationToken::new(),
    );

    let frame = rx.recv().expect("No frame delivered");
    assert_eq!(frame.text().as_deref(), Some("threaded"));
    handle
        .join()
        .expect("Receiver thread panicked")
        .expect("Receive loop failed");
}

#[test]
fn test_oversized_frame_dropped_then_recovers() {
    let config = ModemConfig {
        symbol_num_limit: 2,
        ..ModemConfig::default()
    };
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let w = modem.window_len();

    // another station with no symbol limit
    let unlimited = Modem::new(ModemConfig {
        symbol_num_limit: 0,
        ..config.clone()
    })
    .expect("Failed to create modem");
    let long = unlimited
        .encode_payload(&[7u8; 40])
        .expect("Failed to encode");
    let short = modem
        .modulate_symbols(&RAW_SYMBOLS)
        .expect("Failed to modulate");
    let mut stream = long;
    stream.extend(std::iter::repeat(0.0).take(3 * w));
    stream.extend(short);
    let stream = on_air(&stream, 800, w);

    let mut receiver = Receiver::new(config).expect("Failed to create receiver");
    let (frames, too_long) = run_receiver(&mut receiver, &stream);

    assert_eq!(too_long, 1, "The long capture is dropped once");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].symbols, RAW_SYMBOLS.to_vec());
}

#[test]
fn test_longest_frame_fits_at_any_offset() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let w = modem.window_len();

    // 24 bytes plus the header fill exactly symbol_num_limit rows
    let payload = [0x5au8; 24];
    assert_eq!(modem.framer().row_count(payload.len()), config.symbol_num_limit);
    assert!(matches!(
        modem.encode_payload(&[0x5au8; 25]),
        Err(ModemError::TooManySymbols { rows: 17, limit: 16 })
    ));
    let sound = modem.encode_payload(&payload).expect("Failed to encode");

    for leading in [100, 1500] {
        let stream = on_air(&sound, leading, w);
        let mut receiver = Receiver::new(config.clone()).expect("Failed to create receiver");
        let (frames, too_long) = run_receiver(&mut receiver, &stream);

        assert_eq!(too_long, 0, "Frame at offset {} hit the ceiling", leading);
        assert_eq!(frames.len(), 1, "Expected one frame at offset {}", leading);
        assert_eq!(frames[0].payload.as_deref(), Some(&payload[..]));
    }
}

#[test]
fn test_reconfigure_between_frames() {
    let qpsk = ModemConfig::default();
    let psk8 = ModemConfig {
        psk_modulate: 8,
        ..ModemConfig::default()
    };

    let mut receiver = Receiver::new(qpsk.clone()).expect("Failed to create receiver");
    let w = receiver.window_len();
    let sound = Modem::new(qpsk)
        .and_then(|m| m.encode_payload(b"before"))
        .expect("Failed to encode");
    let (frames, _) = run_receiver(&mut receiver, &on_air(&sound, 100, w));
    assert_eq!(frames[0].text().as_deref(), Some("before"));

    receiver.reconfigure(psk8.clone()).expect("Failed to reconfigure");
    let sound = Modem::new(psk8)
        .and_then(|m| m.encode_payload(b"after"))
        .expect("Failed to encode");
    let (frames, _) = run_receiver(&mut receiver, &on_air(&sound, 100, w));
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].text().as_deref(), Some("after"));
}

#[derive(Clone, Default)]
struct Counters {
    windows: Arc<AtomicUsize>,
    start_traces: Arc<AtomicUsize>,
    end_traces: Arc<AtomicUsize>,
}

impl Telemetry for Counters {
    fn on_window(&mut self, _window: &[f32]) {
        self.windows.fetch_add(1, Ordering::SeqCst);
    }

    fn on_start_correlation(&mut self, trace: &Correlation) {
        assert_eq!(trace.lags.first(), Some(&0));
        self.start_traces.fetch_add(1, Ordering::SeqCst);
    }

    fn on_end_correlation(&mut self, _trace: &Correlation) {
        self.end_traces.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn test_telemetry_sees_every_window() {
    let config = ModemConfig::default();
    let modem = Modem::new(config.clone()).expect("Failed to create modem");
    let sound = modem
        .modulate_symbols(&RAW_SYMBOLS)
        .expect("Failed to modulate");
    let w = modem.window_len();
    let stream = on_air(&sound, 0, w);

    let counters = Counters::default();
    let mut receiver = Receiver::new(config.clone()).expect("Failed to create receiver");
    receiver.set_telemetry(Box::new(counters.clone()));
    let (frames, _) = run_receiver(&mut receiver, &stream);
    assert_eq!(frames.len(), 1);

    let windows = stream.len() / w;
    assert_eq!(counters.windows.load(Ordering::SeqCst), windows);
    // the first window only primes the probe
    let traces =
        counters.start_traces.load(Ordering::SeqCst) + counters.end_traces.load(Ordering::SeqCst);
    assert_eq!(traces, windows - 1);
    assert!(counters.end_traces.load(Ordering::SeqCst) > 0);

    // the observer moves over to the rebuilt synchronizer
    receiver.reconfigure(config).expect("Failed to reconfigure");
    receiver
        .process_window(&vec![0.0; w])
        .expect("Receiver failed");
    assert_eq!(counters.windows.load(Ordering::SeqCst), windows + 1);
}
