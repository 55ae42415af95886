use std::time::Duration;

use anyhow::{anyhow, Context};
use clap::{Parser, ValueEnum};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use streamchat_app::runtime::{self, RuntimeOptions};
use streamchat_audio::{DeviceManager, ResamplerQuality};
use streamchat_foundation::PipelineConfig;

const DEFAULT_ENDPOINT: &str =
    "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1alpha.GenerativeService.BidiGenerateContent";
const API_KEY_ENV: &str = "GEMINI_API_KEY";

const DEFAULT_SYSTEM_PROMPT: &str = "\
You are co-watching a live stream with the viewer. You receive the stream's \
audio and periodic screenshots. Whenever you have something worth saying in \
the stream's chat, respond with a JSON object in a fenced code block with \
exactly two fields: \"message\" (a short chat message, written like a casual \
viewer) and \"relevancy\" (an integer 0-100 rating how relevant and timely \
the message is to what is happening right now). If nothing is worth saying, \
use a low relevancy. Never send anything except that JSON object.";

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QualityArg {
    Fast,
    Balanced,
    Quality,
}

impl From<QualityArg> for ResamplerQuality {
    fn from(q: QualityArg) -> Self {
        match q {
            QualityArg::Fast => ResamplerQuality::Fast,
            QualityArg::Balanced => ResamplerQuality::Balanced,
            QualityArg::Quality => ResamplerQuality::Quality,
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "streamchat", about = "Watches a live stream and chats about it")]
struct Cli {
    /// Capture device name (defaults to the first working loopback)
    #[arg(short = 'D', long)]
    device: Option<String>,

    /// List candidate capture devices and exit
    #[arg(long)]
    list_devices: bool,

    /// Full session endpoint URL (overrides the default endpoint + API key)
    #[arg(long)]
    url: Option<String>,

    /// Model to request in session setup
    #[arg(long, default_value = "models/gemini-2.0-flash-exp")]
    model: String,

    /// File holding the system message; a built-in prompt is used otherwise
    #[arg(long)]
    system_prompt_file: Option<std::path::PathBuf>,

    /// Minimum relevancy (0-100) a decision needs to reach chat
    #[arg(long, default_value_t = 80)]
    relevancy_threshold: u8,

    /// Minimum seconds between two accepted chat messages
    #[arg(long, default_value_t = 20)]
    cooldown_secs: u64,

    /// Audio segment length in seconds
    #[arg(long, default_value_t = 5)]
    segment_secs: u64,

    /// Screen snapshot period in seconds
    #[arg(long, default_value_t = 5)]
    snapshot_secs: u64,

    /// Outbound queue capacity (audio segments + snapshots)
    #[arg(long, default_value_t = 5)]
    queue_capacity: usize,

    /// Resampler quality preset
    #[arg(long, value_enum, default_value_t = QualityArg::Balanced)]
    resampler_quality: QualityArg,

    /// Log accepted messages instead of typing them into chat
    #[arg(long)]
    dry_run: bool,
}

fn init_logging() -> anyhow::Result<()> {
    std::fs::create_dir_all("logs")?;
    let file_appender = RollingFileAppender::new(Rotation::DAILY, "logs", "streamchat.log");
    let (non_blocking_file, _guard) = tracing_appender::non_blocking(file_appender);
    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_writer(std::io::stdout.and(non_blocking_file))
        .with_env_filter(log_level)
        .init();
    std::mem::forget(_guard);
    Ok(())
}

fn resolve_url(cli: &Cli) -> anyhow::Result<String> {
    if let Some(url) = &cli.url {
        return Ok(url.clone());
    }
    let key = std::env::var(API_KEY_ENV)
        .map_err(|_| anyhow!("set {} or pass --url", API_KEY_ENV))?;
    Ok(format!("{}?key={}", DEFAULT_ENDPOINT, key))
}

fn resolve_system_prompt(cli: &Cli) -> anyhow::Result<String> {
    match &cli.system_prompt_file {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display())),
        None => Ok(DEFAULT_SYSTEM_PROMPT.to_string()),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging()?;
    let cli = Cli::parse();

    if cli.list_devices {
        let manager = DeviceManager::new()?;
        println!("Capture device candidates (preferred first):");
        for name in manager.candidate_device_names() {
            println!("  {}", name);
        }
        return Ok(());
    }

    let session_url = resolve_url(&cli)?;
    let system_prompt = resolve_system_prompt(&cli)?;

    let config = PipelineConfig {
        segment_duration: Duration::from_secs(cli.segment_secs),
        snapshot_interval: Duration::from_secs(cli.snapshot_secs),
        queue_capacity: cli.queue_capacity,
        relevancy_threshold: cli.relevancy_threshold,
        cooldown: Duration::from_secs(cli.cooldown_secs),
        device: cli.device.clone(),
        ..PipelineConfig::default()
    };

    tracing::info!("Starting streamchat");
    let handle = runtime::start(RuntimeOptions {
        config,
        session_url,
        model: cli.model.clone(),
        system_prompt,
        resampler_quality: cli.resampler_quality.into(),
        dry_run: cli.dry_run,
    })
    .await?;

    let shutdown = handle.guard().clone();
    let metrics = handle.metrics().clone();
    let mut stats_interval = tokio::time::interval(Duration::from_secs(30));
    stats_interval.tick().await; // first tick is immediate
    loop {
        tokio::select! {
            _ = shutdown.wait() => {
                tracing::info!("Shutdown signal received");
                break;
            }
            _ = stats_interval.tick() => {
                let s = metrics.snapshot();
                tracing::info!(
                    "stats: frames={} dropped={} segments={} snapshots={} sent={} turns={} dispatched={} skipped(lo/cd)={}/{}",
                    s.frames_captured,
                    s.frames_dropped,
                    s.segments_emitted,
                    s.snapshots_captured,
                    s.items_sent,
                    s.turns_completed,
                    s.decisions_dispatched,
                    s.skipped_low_relevancy,
                    s.skipped_cooldown,
                );
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
