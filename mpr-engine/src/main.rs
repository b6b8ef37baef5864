//! mpr-engine - terminal player
//!
//! Plays a local file or an internet radio URL and reads one-line commands
//! from stdin (`help` lists them). Player events are printed as they arrive.

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use mpr_common::human_time::{format_clock, format_progress, parse_clock};
use mpr_common::lyrics::{line_at, load_lrc};
use mpr_common::{LyricLine, PlayerEvent};
use mpr_engine::backend::ChannelGroup;
use mpr_engine::{position, probe, EngineConfig, MediaSession, NativeBackend, PlaybackEngine, SeekTarget};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Volume step for `+` / `-`
const VOLUME_STEP: f64 = 0.05;
/// Seconds skipped by `ff` / `rw`
const SKIP_SECONDS: f64 = 10.0;

/// Command-line arguments for mpr-engine
#[derive(Parser, Debug)]
#[command(name = "mpr-engine")]
#[command(about = "MP3 and internet radio player")]
#[command(version)]
struct Args {
    /// File path or http(s):// radio URL
    source: String,

    /// Configuration file
    #[arg(short, long, env = "MPR_CONFIG")]
    config: Option<PathBuf>,

    /// Output driver (null, discard, wav, cpal)
    #[arg(short, long)]
    driver: Option<String>,

    /// Output device (device name, or file path for wav)
    #[arg(long)]
    device: Option<String>,

    /// Initial volume
    #[arg(long)]
    volume: Option<f64>,

    /// Allow volume above 1.0
    #[arg(long)]
    boost: bool,

    /// Relative volume adjustment in dB
    #[arg(long, allow_hyphen_values = true)]
    rva: Option<f64>,

    /// Start position (seconds, M:SS or H:MM:SS)
    #[arg(long)]
    start: Option<String>,

    /// LRC lyrics file
    #[arg(long)]
    lyrics: Option<PathBuf>,
}

fn init_logging(config: &EngineConfig) -> Result<()> {
    let default_filter = format!(
        "mpr_engine={level},mpr_common={level}",
        level = config.logging.level
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let file_layer = match &config.logging.file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(std::sync::Mutex::new(file)),
            )
        }
        None => None,
    };
    let stderr_layer = match file_layer {
        Some(_) => None,
        None => Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stderr_layer)
        .init();
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = EngineConfig::load(args.config.as_deref()).context("Failed to load configuration")?;
    if let Some(driver) = args.driver {
        config.output.driver = driver;
    }
    if args.device.is_some() {
        config.output.device = args.device;
    }
    if args.boost {
        config.playback.boost = true;
    }
    if let Some(volume) = args.volume {
        config.playback.volume = volume;
    }
    if let Some(rva) = args.rva {
        config.playback.rva_db = rva;
        config.validate().context("Invalid --rva")?;
    }

    init_logging(&config)?;
    info!("Starting mpr-engine {}", env!("CARGO_PKG_VERSION"));

    let lyrics: Vec<LyricLine> = match &args.lyrics {
        Some(path) => load_lrc(path).with_context(|| format!("Failed to read lyrics {}", path.display()))?,
        None => Vec::new(),
    };

    let backend = Arc::new(NativeBackend::new());
    backend.set_rva_db(config.playback.rva_db);
    let session = if args.source.starts_with("http://") || args.source.starts_with("https://") {
        MediaSession::open_radio(&args.source, backend, &config.radio)
    } else {
        MediaSession::open_file(&args.source, backend)
    }
    .with_context(|| format!("Failed to open {}", args.source))?;

    let boost = config.playback.boost;
    let initial_volume = config.playback.volume;
    let engine = PlaybackEngine::new(config);
    engine.set_volume(&session, initial_volume, boost)?;

    let events = engine.subscribe();
    std::thread::Builder::new()
        .name("mpr-events".to_string())
        .spawn(move || {
            for event in events {
                print_event(&event);
            }
        })
        .context("Failed to spawn event printer")?;

    if let Some(start) = &args.start {
        let seconds = parse_clock(start)?;
        position::seek_to(&session, SeekTarget::Seconds(seconds)).context("Failed to seek to start position")?;
    }

    engine.play(&session).context("Failed to start playback")?;

    let player = Player {
        engine,
        session: Arc::clone(&session),
        lyrics,
        boost,
    };

    let stdin = std::io::stdin();
    let mut interactive = false;
    for line in stdin.lock().lines() {
        interactive = true;
        let line = line.context("Failed to read stdin")?;
        match player.handle(line.trim()) {
            Ok(true) => {}
            Ok(false) => break,
            Err(e) => warn!("{}", e),
        }
    }

    if !interactive {
        // No command input: play to the end
        session.transport().wait_until_stopped();
    }

    session.close();
    info!("Exiting");
    Ok(())
}

struct Player {
    engine: PlaybackEngine,
    session: Arc<MediaSession>,
    lyrics: Vec<LyricLine>,
    boost: bool,
}

impl Player {
    /// Run one command; `Ok(false)` means quit
    fn handle(&self, line: &str) -> Result<bool> {
        let mut words = line.split_whitespace();
        let Some(command) = words.next() else {
            return Ok(true);
        };
        let args: Vec<&str> = words.collect();
        let session = &self.session;

        match command {
            "q" | "quit" => return Ok(false),
            "p" | "pause" => self.engine.toggle_pause(session)?,
            "s" | "stop" => self.engine.stop(session, true)?,
            "+" | "-" => {
                let step = if command == "+" { VOLUME_STEP } else { -VOLUME_STEP };
                let current = self.engine.get_volume(session).base;
                let applied = self.engine.set_volume(session, current + step, self.boost)?;
                println!("volume {:.0}%", applied * 100.0);
            }
            "v" | "volume" => {
                let value: f64 = arg(&args, 0)?.parse().context("volume must be a number")?;
                let applied = self.engine.set_volume(session, value, self.boost)?;
                println!("volume {:.0}%", applied * 100.0);
            }
            "seek" => {
                let seconds = parse_clock(arg(&args, 0)?)?;
                position::seek_to(session, SeekTarget::Seconds(seconds))?;
            }
            "ff" => {
                position::seek_relative(session, SKIP_SECONDS)?;
            }
            "rw" => {
                position::seek_relative(session, -SKIP_SECONDS)?;
            }
            "pos" => {
                let elapsed = position::current_duration_span(session)?;
                let total = position::total_length_span(session)?;
                println!("{} [{}]", format_progress(elapsed, total), session.state());
                if let Some(idx) = line_at(&self.lyrics, elapsed) {
                    println!("  {}", self.lyrics[idx].text);
                }
            }
            "lyric" => {
                let index: usize = arg(&args, 0)?.parse().context("lyric index must be a number")?;
                let line = self
                    .lyrics
                    .get(index)
                    .with_context(|| format!("no lyric line {}", index))?;
                position::seek_lyric(session, line)?;
            }
            "lyrics" => {
                for (idx, line) in self.lyrics.iter().enumerate() {
                    println!("{:3} {} {}", idx, format_clock(line.timestamp), line.text);
                }
            }
            "eq" => {
                let band: usize = arg(&args, 0)?.parse().context("band must be a number")?;
                let factor: f64 = arg(&args, 1)?.parse().context("factor must be a number")?;
                self.engine
                    .set_equalizer_band(session, ChannelGroup::Both, band, factor)?;
            }
            "eqrange" => {
                let first: usize = arg(&args, 0)?.parse().context("band must be a number")?;
                let last: usize = arg(&args, 1)?.parse().context("band must be a number")?;
                let factor: f64 = arg(&args, 2)?.parse().context("factor must be a number")?;
                self.engine
                    .set_equalizer_range(session, ChannelGroup::Both, first..=last, factor)?;
            }
            "eqreset" => self.engine.reset_equalizer(session),
            "caps" => {
                for cap in probe::capabilities(session) {
                    println!("{:>6} Hz {:>4} channels mask {:#x}", cap.rate, cap.encoding, cap.channels);
                }
                if let Some(format) = session.current_format() {
                    println!("negotiated: {}", format);
                }
            }
            "now" => match session.station() {
                Some(station) => println!(
                    "{}: {}",
                    station.name.as_deref().unwrap_or("radio"),
                    session.now_playing()
                ),
                None => println!("{}", session.source()),
            },
            "help" => println!(
                "p pause/resume | s stop | q quit | + - volume | v N | seek T | ff | rw | pos | \
                 lyric N | lyrics | eq BAND FACTOR | eqrange A B FACTOR | eqreset | caps | now"
            ),
            other => println!("unknown command '{}' (try help)", other),
        }
        Ok(true)
    }
}

fn arg<'a>(args: &[&'a str], index: usize) -> Result<&'a str> {
    args.get(index)
        .copied()
        .with_context(|| format!("missing argument {}", index + 1))
}

fn print_event(event: &PlayerEvent) {
    match event {
        PlayerEvent::StateChanged { new_state, .. } => println!("[{}]", new_state),
        PlayerEvent::FormatNegotiated { rate, channels, encoding } => {
            println!("format {} Hz, {} ch, {}", rate, channels, encoding)
        }
        PlayerEvent::NowPlaying { title, raw } => {
            if title.is_empty() {
                println!("station: {}", raw);
            } else {
                println!("now playing: {}", title);
            }
        }
        PlayerEvent::VolumeChanged { .. } => {}
        PlayerEvent::PlaybackEnded { reason } => println!("playback ended: {}", reason),
    }
}
