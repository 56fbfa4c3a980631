mod wav;

use clap::{ArgAction, ArgGroup, Parser, Subcommand};
use crossbeam_channel::unbounded;
use soundmessage_core::audio::{spawn_receiver, AudioOutput, CancellationToken, Transmitter};
use soundmessage_core::{Modem, ModemConfig, ModemError, Receiver};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use wav::{read_wav, write_wav, WavSink, WavSource};

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Modem(#[from] ModemError),

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Config(#[from] serde_json::Error),

    #[error("Receiver thread panicked")]
    ReceiverPanicked,
}

#[derive(Parser)]
#[command(name = "soundmessage")]
#[command(about = "Acoustic OFDM modem for short messages")]
struct Cli {
    /// Modem configuration as JSON; missing fields keep their defaults
    #[arg(short, long, global = true, value_name = "CONFIG.JSON")]
    config: Option<PathBuf>,

    /// More logging (-v info, -vv debug, -vvv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode a text message or a binary file to a WAV recording
    #[command(group(ArgGroup::new("source").required(true).args(["text", "input"])))]
    Encode {
        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Message text
        #[arg(short, long)]
        text: Option<String>,

        /// Input binary file
        #[arg(short, long, value_name = "INPUT.BIN")]
        input: Option<PathBuf>,
    },

    /// Modulate raw symbols, one OFDM symbol per data-subcarrier group
    SendSymbols {
        /// Output WAV file
        #[arg(value_name = "OUTPUT.WAV")]
        output: PathBuf,

        /// Comma-separated symbols, e.g. 1,0,1,1,1,3,1,3
        #[arg(value_name = "SYMBOLS", value_delimiter = ',', required = true)]
        symbols: Vec<u32>,
    },

    /// Find and decode every frame in a WAV recording
    Decode {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,

        /// Append decoded payload bytes to this file
        #[arg(short, long, value_name = "OUTPUT.BIN")]
        output: Option<PathBuf>,
    },

    /// Print the effective configuration as JSON
    PrintConfig,
}

fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Encode {
            output,
            text,
            input,
        } => {
            let payload = match (text, input) {
                (Some(text), _) => text.into_bytes(),
                (None, Some(path)) => {
                    let data = fs::read(&path)?;
                    println!("Read {} bytes from {}", data.len(), path.display());
                    data
                }
                // clap enforces the group
                (None, None) => Vec::new(),
            };
            encode_command(config, &payload, &output)?
        }
        Commands::SendSymbols { output, symbols } => send_symbols_command(config, &symbols, &output)?,
        Commands::Decode { input, output } => decode_command(config, &input, output.as_deref())?,
        Commands::PrintConfig => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ModemConfig, CliError> {
    let Some(path) = path else {
        return Ok(ModemConfig::default());
    };
    let config: ModemConfig = serde_json::from_str(&fs::read_to_string(path)?)?;
    config.validate()?;
    log::info!("loaded config from {}", path.display());
    Ok(config)
}

fn sample_rate(config: &ModemConfig) -> u32 {
    config.sample_freq.round() as u32
}

/// Play `sound` through the transmit queue into a WAV file.
fn transmit(config: &ModemConfig, sound: Vec<f32>, output: &Path) -> Result<(), CliError> {
    let sink = WavSink::default();
    let device = sink.clone();
    let transmitter = Transmitter::new(
        move || Ok(Box::new(device.clone()) as Box<dyn AudioOutput>),
        CancellationToken::new(),
    );
    transmitter.enqueue(sound);
    transmitter.wait()?;

    let samples = sink.take();
    write_wav(output, &samples, sample_rate(config))?;
    println!("Wrote {} samples to {}", samples.len(), output.display());
    Ok(())
}

fn encode_command(config: ModemConfig, payload: &[u8], output: &Path) -> Result<(), CliError> {
    let modem = Modem::new(config)?;
    let sound = modem.encode_payload(payload)?;
    println!(
        "Encoded {} bytes into {} OFDM symbols",
        payload.len(),
        modem.framer().row_count(payload.len())
    );
    transmit(modem.config(), sound, output)
}

fn send_symbols_command(config: ModemConfig, symbols: &[u32], output: &Path) -> Result<(), CliError> {
    let modem = Modem::new(config)?;
    let sound = modem.modulate_symbols(symbols)?;
    println!("Modulated {} symbols", symbols.len());
    transmit(modem.config(), sound, output)
}

fn decode_command(config: ModemConfig, input: &Path, output: Option<&Path>) -> Result<(), CliError> {
    let receiver = Receiver::new(config)?;
    let samples = read_wav(input, sample_rate(receiver.modem().config()))?;
    println!("Extracted {} samples", samples.len());

    // a few windows of silence flush a frame that ends with the file
    let source = WavSource::new(&samples, 3 * receiver.window_len());

    let mut sink = match output {
        Some(path) => Some(fs::File::create(path)?),
        None => None,
    };

    let (tx, rx) = unbounded();
    let handle = spawn_receiver(source, receiver, tx, CancellationToken::new());

    let mut frames = 0usize;
    for frame in rx.iter() {
        frames += 1;
        match &frame.payload {
            Some(payload) => {
                println!("Decoded {} bytes: {}", payload.len(), String::from_utf8_lossy(payload));
                if let Some(file) = sink.as_mut() {
                    file.write_all(payload)?;
                }
            }
            None => {
                let symbols: Vec<String> = frame.symbols.iter().map(|s| s.to_string()).collect();
                println!("Decoded symbols: {}", symbols.join(" "));
            }
        }
    }

    handle.join().map_err(|_| CliError::ReceiverPanicked)??;
    println!("Found {} frames", frames);
    Ok(())
}
