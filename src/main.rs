use std::fs;
use std::io::{self, ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::exit;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use log::{info, warn, LevelFilter};

use openbci_rs::logging::{env_level, init_rust_logging_with};
use openbci_rs::{
    Board, CytonDecoder, DecodeBatch, DecoderConfig, GanglionDecoder, Sample, BLE_PACKET_SIZE,
};

const DEFAULT_BAUD_RATE: u32 = 115_200;
const READ_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum BoardArg {
    Cyton,
    Ganglion,
}

impl From<BoardArg> for Board {
    fn from(board: BoardArg) -> Self {
        match board {
            BoardArg::Cyton => Board::Cyton,
            BoardArg::Ganglion => Board::Ganglion,
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    name = "openbci-decode",
    about = "Decode OpenBCI Cyton/Ganglion packets from a capture file or serial port"
)]
struct Args {
    /// Capture file: a raw Cyton byte stream, or Ganglion notifications stored
    /// back to back as 20-byte records
    #[arg(required_unless_present = "port")]
    input: Option<PathBuf>,
    /// Serial port of a Cyton dongle (e.g., /dev/ttyUSB0)
    #[arg(long, conflicts_with = "input")]
    port: Option<String>,
    #[arg(long, default_value_t = DEFAULT_BAUD_RATE)]
    baud: u32,
    /// Bytes written to the port before reading, e.g. "b" to start streaming
    #[arg(long, requires = "port")]
    send: Option<String>,
    /// Decoder configuration as JSON; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long, value_enum)]
    board: Option<BoardArg>,
    /// Cyton with daisy module (16 channels)
    #[arg(long)]
    daisy: bool,
    #[arg(long)]
    micro_volts: bool,
    /// Print raw ADC counts instead of volts
    #[arg(long)]
    raw_counts: bool,
    /// Print one JSON object per sample
    #[arg(long)]
    json: bool,
    /// Stop after this many samples
    #[arg(long)]
    limit: Option<usize>,
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

/// Either decoder behind one interface.
enum Decoder {
    Cyton(CytonDecoder),
    Ganglion(GanglionDecoder),
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {e:#}");
        exit(1);
    }
}

fn run() -> Result<()> {
    let args = Args::parse();

    let level = match args.verbose {
        0 => env_level(),
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    init_rust_logging_with(level);

    let config = load_config(&args)?;
    let mut decoder = match config.board {
        Board::Cyton => Decoder::Cyton(CytonDecoder::new(config)?),
        Board::Ganglion => Decoder::Ganglion(GanglionDecoder::new(config)?),
    };

    let mut printer = Printer::new(args.json, args.limit);
    let total = match (&args.input, &args.port) {
        (Some(path), _) => decode_file(&mut decoder, path, &mut printer)?,
        (None, Some(port)) => decode_port(&mut decoder, port, &args, &mut printer)?,
        (None, None) => bail!("either a capture file or --port is required"),
    };

    info!(
        "Decoded {} samples: sequence_gaps={}, desync_events={}, skipped_bytes={}, dropped_packets={}",
        printer.printed,
        total.sequence_gaps,
        total.desync_events,
        total.skipped_bytes,
        total.dropped_packets
    );
    Ok(())
}

fn load_config(args: &Args) -> Result<DecoderConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config at {}", path.display()))?;
            serde_json::from_str::<DecoderConfig>(&text)
                .with_context(|| format!("Invalid config at {}", path.display()))?
        }
        None => DecoderConfig::default(),
    };

    if let Some(board) = args.board {
        config.board = board.into();
    }
    if args.daisy {
        config.daisy = true;
    }
    if args.micro_volts {
        config.micro_volts = true;
    }
    if args.raw_counts {
        config.scaled_output = false;
    }
    if args.port.is_some() && config.board == Board::Ganglion {
        bail!("the Ganglion streams over BLE; decode a capture file instead");
    }
    config.validate()?;
    Ok(config)
}

fn decode_file(decoder: &mut Decoder, path: &Path, printer: &mut Printer) -> Result<DecodeBatch> {
    let data =
        fs::read(path).with_context(|| format!("Failed to read capture at {}", path.display()))?;
    info!("Decoding {} bytes from {}", data.len(), path.display());

    let mut total = DecodeBatch::default();
    match decoder {
        Decoder::Cyton(cyton) => {
            let batch = cyton.feed(&data);
            printer.print(&batch)?;
            total.merge(batch);
        }
        Decoder::Ganglion(ganglion) => {
            for record in data.chunks(BLE_PACKET_SIZE) {
                let batch = ganglion.decode_notification(record);
                printer.print(&batch)?;
                total.merge(batch);
                if printer.done() {
                    break;
                }
            }
        }
    }
    Ok(total)
}

fn decode_port(
    decoder: &mut Decoder,
    path: &str,
    args: &Args,
    printer: &mut Printer,
) -> Result<DecodeBatch> {
    let Decoder::Cyton(cyton) = decoder else {
        bail!("serial input is only supported for the Cyton");
    };

    let mut port = serialport::new(path, args.baud)
        .timeout(READ_TIMEOUT)
        .open()
        .with_context(|| format!("Failed to open serial port at {}", path))?;
    info!("Opened {} at {} baud", path, args.baud);

    if let Some(command) = &args.send {
        port.write_all(command.as_bytes())
            .context("Failed to write to serial port")?;
        port.flush()?;
    }

    let start = Instant::now();
    let mut total = DecodeBatch::default();
    let mut buffer = vec![0u8; 4096];
    while !printer.done() {
        let n = match port.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::TimedOut => continue,
            Err(e) => return Err(e).context("Failed to read from serial port"),
        };

        let batch = cyton.feed_at(&buffer[..n], start.elapsed().as_micros() as u64);
        printer.print(&batch)?;
        if batch.stalled {
            warn!("No valid frame found; is the board streaming?");
        }
        total.merge(DecodeBatch {
            samples: Vec::new(),
            ..batch
        });
    }
    Ok(total)
}

struct Printer {
    json: bool,
    limit: Option<usize>,
    printed: usize,
    out: io::StdoutLock<'static>,
}

impl Printer {
    fn new(json: bool, limit: Option<usize>) -> Self {
        Self {
            json,
            limit,
            printed: 0,
            out: io::stdout().lock(),
        }
    }

    fn done(&self) -> bool {
        self.limit.is_some_and(|limit| self.printed >= limit)
    }

    fn print(&mut self, batch: &DecodeBatch) -> Result<()> {
        for message in &batch.messages {
            if !self.json {
                writeln!(self.out, "# {}", message.trim_end())?;
            }
        }
        for sample in &batch.samples {
            if self.done() {
                break;
            }
            if self.json {
                serde_json::to_writer(&mut self.out, sample)?;
                writeln!(self.out)?;
            } else {
                writeln!(self.out, "{}", format_sample(sample))?;
            }
            self.printed += 1;
        }
        Ok(())
    }
}

fn format_sample(sample: &Sample) -> String {
    let channels: Vec<String> = sample
        .channel_data
        .iter()
        .map(|v| format!("{v:.6}"))
        .collect();
    let mut line = format!(
        "[{:03}] {:?} | {}",
        sample.sample_number,
        sample.packet_type,
        channels.join(" ")
    );
    if let Some([x, y, z]) = sample.accel_data {
        line.push_str(&format!(" | accel {x:.4} {y:.4} {z:.4}"));
    }
    if let Some(impedance) = &sample.impedance {
        line.push_str(&format!(" | impedance {:?}", impedance));
    }
    if let Some(time) = sample.board_time {
        line.push_str(&format!(" | board_time {time}"));
    }
    line
}
