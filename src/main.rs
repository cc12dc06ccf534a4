use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use glam::EulerRot;
use motion_config::{AppConfig, QueueConfig};
use motion_imu::{LiveQueueSource, MemoryQueue, RecordedSequenceSource};
use motion_playback::{PlaybackController, Recording};
use motion_pose::Pose;
use motion_store::{RunId, RunStore};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};

/// Drive a rigid-body pose from live or recorded IMU motion.
#[derive(Parser)]
#[command(name = "motion-viewer", version)]
struct Cli {
    /// Config file to use instead of the per-user one.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Smooth samples with the temporal filter.
    #[arg(long, global = true)]
    filter: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll the live sample queue until Ctrl-C.
    Live(LiveArgs),
    /// Play a CSV file of raw frames.
    PlayCsv { path: PathBuf },
    /// Fetch a stored run and play it.
    PlayRun { id: RunId },
    /// Manage stored runs.
    #[command(subcommand)]
    Runs(RunsCommand),
    /// Write the effective config to the config file.
    InitConfig,
}

#[derive(Args)]
struct LiveArgs {
    /// Record for this many seconds, then stop.
    #[arg(long)]
    record_secs: Option<u64>,

    /// Write the recording to this CSV file.
    #[arg(long, requires = "record_secs")]
    csv_out: Option<PathBuf>,

    /// Save the recording to the run store under this name.
    #[arg(long, requires = "record_secs")]
    save_run: Option<String>,
}

#[derive(Subcommand)]
enum RunsCommand {
    /// List stored runs.
    List {
        #[arg(long)]
        search: Option<String>,
    },
    /// Delete a stored run.
    Delete { id: RunId },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "motion_viewer=info,motion_playback=info,motion_imu=info,motion_store=info".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => motion_config::load_config_from(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => motion_config::load_config().unwrap_or_else(|e| {
            warn!(?e, "Failed to load config, using defaults");
            AppConfig::default()
        }),
    };
    if cli.filter {
        config.playback.filter_enabled = true;
    }
    info!(
        tick_ms = config.playback.tick_ms,
        filter = config.playback.filter_enabled,
        policy = ?config.playback.record_policy,
        "Config loaded"
    );

    match cli.command {
        Command::Live(args) => run_live(&config, args).await,
        Command::PlayCsv { path } => {
            let source = RecordedSequenceSource::from_csv_path(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            play_recorded(&config, source).await
        }
        Command::PlayRun { id } => {
            let store = RunStore::new(&config.store)?;
            let run = store.get(id).await?;
            info!(id, name = %run.name, created_at = %run.created_at, "Playing stored run");
            play_recorded(&config, run.into_source()).await
        }
        Command::Runs(RunsCommand::List { search }) => {
            let store = RunStore::new(&config.store)?;
            for run in store.list(search.as_deref()).await? {
                println!(
                    "{:>6}  {:<32}  {:>6} frames  {}",
                    run.id,
                    run.name,
                    run.frame_count,
                    run.created_at.format("%Y-%m-%d %H:%M:%S")
                );
            }
            Ok(())
        }
        Command::Runs(RunsCommand::Delete { id }) => {
            RunStore::new(&config.store)?.delete(id).await?;
            Ok(())
        }
        Command::InitConfig => {
            let path = write_config(cli.config.as_deref(), &config)?;
            println!("Wrote {}", path.display());
            Ok(())
        }
    }
}

/// Save `config` to `path`, or to the per-user config file when no path is given.
fn write_config(path: Option<&Path>, config: &AppConfig) -> Result<PathBuf> {
    match path {
        Some(path) => {
            motion_config::save_config_to(path, config)
                .with_context(|| format!("Failed to write {}", path.display()))?;
            Ok(path.to_path_buf())
        }
        None => {
            motion_config::save_config(config)?;
            motion_config::config_path()
        }
    }
}

/// Connect to the sample queue. With `allow_mock`, an unreachable server is
/// replaced by an empty in-process queue instead of failing.
async fn open_live_source(config: &QueueConfig, allow_mock: bool) -> Result<LiveQueueSource> {
    match LiveQueueSource::connect(config).await {
        Ok(source) => Ok(source),
        Err(e) if allow_mock => {
            warn!(%e, "Sample queue not available, using mock (no motion)");
            Ok(LiveQueueSource::in_memory(MemoryQueue::new()))
        }
        Err(e) => Err(e).with_context(|| {
            format!("Cannot record: sample queue at {} is unavailable", config.addr())
        }),
    }
}

async fn run_live(config: &AppConfig, args: LiveArgs) -> Result<()> {
    // Recording needs the real queue; plain viewing may fall back to the mock.
    let source = open_live_source(&config.queue, args.record_secs.is_none()).await?;

    let mut controller = PlaybackController::new(config);
    let poses = tokio::spawn(log_poses(controller.subscribe()));
    controller.use_live(source).await?;
    controller.start().await?;

    match args.record_secs {
        Some(secs) => {
            controller.record_start().await?;
            info!(secs, "Recording live samples");
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_secs(secs)) => {}
                _ = tokio::signal::ctrl_c() => info!("Interrupted, keeping what was recorded"),
            }
            let recording = controller.record_stop().await?;
            controller.pause().await?;
            export(config, &recording, args.csv_out, args.save_run).await?;
        }
        None => {
            tokio::signal::ctrl_c().await?;
            controller.pause().await?;
        }
    }

    controller.reset().await?;
    poses.abort();
    Ok(())
}

async fn export(
    config: &AppConfig,
    recording: &Recording,
    csv_out: Option<PathBuf>,
    save_run: Option<String>,
) -> Result<()> {
    if recording.is_empty() {
        warn!("Nothing was recorded");
        return Ok(());
    }
    if let Some(path) = csv_out {
        recording
            .write_csv(&path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
    }
    if let Some(name) = save_run {
        let saved = RunStore::new(&config.store)?
            .save(&name, &recording.frames())
            .await?;
        println!("Saved run {} ({} frames)", saved.id, saved.frame_count);
    }
    Ok(())
}

async fn play_recorded(config: &AppConfig, source: RecordedSequenceSource) -> Result<()> {
    let frames = source.len();
    let mut controller = PlaybackController::new(config);
    let poses = tokio::spawn(log_poses(controller.subscribe()));
    controller.use_recorded(source).await?;
    controller.start().await?;
    info!(frames, "Playback started");

    tokio::select! {
        result = controller.wait_for_end() => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted"),
    }
    controller.pause().await?;
    info!(cursor = ?controller.cursor(), frames, "Playback stopped");

    poses.abort();
    Ok(())
}

/// Pose consumer: reports each published pose at debug level.
async fn log_poses(mut poses: watch::Receiver<Pose>) {
    let mut count: u64 = 0;
    while poses.changed().await.is_ok() {
        let matrix = poses.borrow_and_update().matrix();
        let (_, rotation, translation) = matrix.to_scale_rotation_translation();
        let (x, y, z) = rotation.to_euler(EulerRot::XYZ);
        count += 1;
        tracing::debug!(
            count,
            position = ?translation.to_array(),
            euler_deg = ?[x.to_degrees(), y.to_degrees(), z.to_degrees()],
            "Pose"
        );
    }
}
