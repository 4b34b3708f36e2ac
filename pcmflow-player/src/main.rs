//! pcmflow player - Main entry point
//!
//! Streams raw PCM from a file or stdin into a [`PcmPlayer`] playing through
//! the default (or named) cpal output device.
//!
//! Settings priority: command-line flags / environment variables, then the
//! TOML config file, then built-in defaults.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use pcmflow_common::config::{LoggingConfig, OutputConfig, TomlConfig};
use pcmflow_common::{PlayerConfig, SampleEncoding};
use pcmflow_player::{CpalSink, PcmPlayer};
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::signal;
use tracing::{debug, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for pcmflow-player
#[derive(Parser, Debug)]
#[command(name = "pcmflow-player")]
#[command(about = "Stream raw PCM samples to an audio output device")]
#[command(version)]
struct Args {
    /// Raw PCM input file, or "-" for stdin
    #[arg(short, long, default_value = "-")]
    input: String,

    /// Configuration file (default: $PCMFLOW_CONFIG or <config dir>/pcmflow/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Sample encoding of the input (i8, i16, i32, f32)
    #[arg(short, long, env = "PCMFLOW_ENCODING")]
    encoding: Option<SampleEncoding>,

    /// Interleaved channel count
    #[arg(long, env = "PCMFLOW_CHANNELS")]
    channels: Option<u16>,

    /// Sample rate in Hz
    #[arg(long, env = "PCMFLOW_SAMPLE_RATE")]
    sample_rate: Option<u32>,

    /// Flush interval in milliseconds
    #[arg(long, env = "PCMFLOW_FLUSH_INTERVAL_MS")]
    flush_interval_ms: Option<u64>,

    /// Output device name
    #[arg(long, env = "PCMFLOW_DEVICE")]
    device: Option<String>,

    /// Output buffer size in frames
    #[arg(long)]
    buffer_size: Option<u32>,

    /// Output gain multiplier
    #[arg(long, default_value_t = 1.0, allow_negative_numbers = true)]
    volume: f32,

    /// Bytes read from the input per feed
    #[arg(long, default_value_t = 4096)]
    chunk_bytes: usize,

    /// Stop reading input while more than this much audio is queued ahead of the output clock
    #[arg(long, default_value_t = 2000)]
    max_lead_ms: u64,

    /// Print output device names and exit
    #[arg(long)]
    list_devices: bool,
}

impl Args {
    /// Overlay command-line values on the file configuration
    fn resolve(&self, toml: TomlConfig) -> (PlayerConfig, OutputConfig) {
        let mut player = toml.player;
        if let Some(encoding) = self.encoding {
            player.encoding = encoding;
        }
        if let Some(channels) = self.channels {
            player.channels = channels;
        }
        if let Some(sample_rate) = self.sample_rate {
            player.sample_rate = sample_rate;
        }
        if let Some(flush_interval_ms) = self.flush_interval_ms {
            player.flush_interval_ms = flush_interval_ms;
        }

        let mut output = toml.output;
        if self.device.is_some() {
            output.device = self.device.clone();
        }
        if self.buffer_size.is_some() {
            output.buffer_size = self.buffer_size;
        }

        (player, output)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let toml = TomlConfig::load_or_default(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing
    init_tracing(&toml.logging);

    if args.list_devices {
        for name in CpalSink::list_devices().context("Failed to list output devices")? {
            println!("{}", name);
        }
        return Ok(());
    }

    let (player_config, output_config) = args.resolve(toml);
    player_config
        .validate()
        .context("Invalid player configuration")?;

    info!(
        "Starting pcmflow player: input={}, encoding={}, channels={}, sample_rate={}, flush_interval={}ms",
        args.input,
        player_config.encoding,
        player_config.channels,
        player_config.sample_rate,
        player_config.flush_interval_ms
    );

    let sink = CpalSink::open(&player_config, &output_config)
        .context("Failed to open audio output")?;
    let player = PcmPlayer::start(player_config, sink).context("Failed to start player")?;
    player.set_volume(args.volume)?;

    tokio::select! {
        result = play_input(&player, &args) => {
            result?;
        },
        _ = shutdown_signal() => {
            info!(
                "Stopping early, discarding {} buffered sample(s)",
                player.pending_samples()
            );
        },
    }

    let stats = player.stats();
    let late_frames = player.with_sink(CpalSink::late_frames);
    player.destroy().context("Failed to close audio output")?;

    info!(
        "Playback complete: {} segment(s), {} frame(s), {} rejected chunk(s), {} dropped sample(s), {} frame(s) late delay",
        stats.segments_scheduled,
        stats.frames_scheduled,
        stats.chunks_rejected,
        stats.partial_frame_samples_dropped,
        late_frames
    );
    Ok(())
}

/// Install the tracing subscriber
///
/// `RUST_LOG` wins; otherwise the `[logging] level` setting applies to the
/// pcmflow crates.
fn init_tracing(logging: &LoggingConfig) {
    let fallback = if logging.level.contains('=') {
        logging.level.clone()
    } else {
        format!(
            "pcmflow_player={0},pcmflow_common={0}",
            logging.level
        )
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Stream the whole input, then wait for it to finish playing
async fn play_input(player: &PcmPlayer<CpalSink>, args: &Args) -> Result<()> {
    let bytes = stream_input(player, args).await?;
    info!("Input finished after {} byte(s), draining", bytes);
    drain(player).await
}

/// Read the input in chunks and feed whole samples to the player
///
/// A read that ends mid-sample carries the partial bytes into the next
/// read. Reading pauses while the queued audio runs more than
/// `max_lead_ms` ahead of the output clock.
async fn stream_input(player: &PcmPlayer<CpalSink>, args: &Args) -> Result<usize> {
    let mut reader: Box<dyn AsyncRead + Unpin + Send> = if args.input == "-" {
        Box::new(tokio::io::stdin())
    } else {
        Box::new(
            tokio::fs::File::open(&args.input)
                .await
                .with_context(|| format!("Failed to open input {}", args.input))?,
        )
    };

    let config = player.config().clone();
    let width = config.encoding.width();
    let max_lead = args.max_lead_ms as f64 / 1000.0;
    let backoff = config.flush_interval() / 2;

    let mut buf = vec![0u8; args.chunk_bytes.max(width)];
    let mut pending: Vec<u8> = Vec::with_capacity(buf.len() + width);
    let mut total = 0usize;

    loop {
        while queued_seconds(player, &config) > max_lead {
            tokio::time::sleep(backoff).await;
        }

        let n = reader.read(&mut buf).await.context("Failed to read input")?;
        if n == 0 {
            break;
        }

        pending.extend_from_slice(&buf[..n]);
        let whole = pending.len() - pending.len() % width;
        if whole > 0 {
            player.feed(&pending[..whole])?;
            pending.drain(..whole);
            total += whole;
        }
    }

    if !pending.is_empty() {
        warn!(
            "Ignoring {} trailing byte(s) that do not form a whole {} sample",
            pending.len(),
            config.encoding
        );
    }

    Ok(total)
}

/// Output clock time at which everything scheduled so far has played
fn playback_end(player: &PcmPlayer<CpalSink>) -> f64 {
    player.scheduled_until() + player.with_sink(CpalSink::late_offset_seconds)
}

/// Audio queued ahead of the output clock, including unflushed samples
fn queued_seconds(player: &PcmPlayer<CpalSink>, config: &PlayerConfig) -> f64 {
    let scheduled = (playback_end(player) - player.sink_time()).max(0.0);
    let buffered = player.pending_samples() as f64
        / config.channels as f64
        / config.sample_rate as f64;
    scheduled + buffered
}

/// Flush what is left and wait for the output clock to pass the last segment
async fn drain(player: &PcmPlayer<CpalSink>) -> Result<()> {
    player.flush_now()?;

    let end = playback_end(player);
    let remaining = (end - player.sink_time()).max(0.0);
    let deadline = tokio::time::Instant::now() + Duration::from_secs_f64(remaining + 1.0);

    while player.sink_time() < end {
        if tokio::time::Instant::now() >= deadline {
            warn!("Output clock stalled, stopping before playback finished");
            break;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    debug!("Drained to {:.3}s", end);
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
