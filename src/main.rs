mod cache;
mod config;
mod detect;
mod error;
mod playback;
mod sync;

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use config::AppConfig;
use detect::{CommandDetector, Detector};
use error::CensorError;
use playback::{spawn_stdin_controls, PlayerOptions, VideoPlayer};
use sync::{run_session, Health, SyncController, TickReport};

#[derive(Debug, Parser)]
#[command(name = "autocensor", version, about = "Censor video regions live during playback")]
struct Cli {
    /// Config file (defaults to the platform config directory)
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Which detection model to use
    #[arg(short, long, global = true, value_name = "NAME")]
    model: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Play a file or URL with censoring
    Play {
        /// Label to censor; repeat for several
        #[arg(short, long = "censor", value_name = "LABEL")]
        censor: Vec<String>,

        /// Seconds an overlay stays up
        #[arg(long, value_name = "SECS")]
        ttl: Option<f64>,

        /// Save a composited frame here whenever overlays are placed
        #[arg(long, value_name = "DIR")]
        preview_dir: Option<PathBuf>,

        /// Path or URL to play
        path: String,
    },
    /// Show detector information
    Info {
        /// Output a list of available labels
        #[arg(short, long)]
        labels: bool,
    },
}

fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("autocensor=info")),
        )
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config = AppConfig::load(cli.config.as_deref()).context("loading configuration")?;

    match cli.command {
        Command::Play {
            censor,
            ttl,
            preview_dir,
            path,
        } => {
            let config = config
                .with_overrides(cli.model, censor, ttl)
                .context("applying command-line options")?;
            play(&config, &path, preview_dir.as_deref())
        }
        Command::Info { labels } => {
            let config = config
                .with_overrides(cli.model, Vec::new(), None)
                .context("applying command-line options")?;
            show_info(&config, labels)
        }
    }
}

fn play(config: &AppConfig, source: &str, preview_dir: Option<&Path>) -> Result<()> {
    let detector = CommandDetector::new(&config.detector_command, &config.model)
        .context("preparing detector")?;

    let mut player = VideoPlayer::open(
        source,
        PlayerOptions {
            osd_width: config.osd_width,
            osd_height: config.osd_height,
        },
    )
    .map_err(CensorError::PlaybackInitFailure)
    .with_context(|| format!("opening {source}"))?;

    if let Some(dir) = preview_dir {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating preview directory {}", dir.display()))?;
    }

    let policy = config.policy();
    info!(
        source = player.source(),
        duration = player.duration(),
        labels = ?policy.labels(),
        "starting playback"
    );

    let events = player.events();
    player.play();

    // Detached: it blocks on stdin and dies with the process
    match spawn_stdin_controls(player.control()) {
        Ok(_) => info!("controls: p pause, +N/-N skip, N jump to N seconds, q quit"),
        Err(e) => warn!(error = %e, "keyboard controls unavailable"),
    }

    let mut controller =
        SyncController::new(player, detector, policy, config.controller_settings());

    let summary = run_session(&mut controller, &events, |player: &VideoPlayer, report: &TickReport| {
        if let (Some(dir), Some(position)) = (preview_dir, report.position) {
            if report.allocated > 0 {
                save_preview(player, dir, position);
            }
        }
    });

    if let Health::Degraded { consecutive_failures } = controller.health() {
        warn!(consecutive_failures, "session ended in degraded mode");
    } else if summary.degraded {
        warn!("censoring was degraded during the session");
    }

    Ok(())
}

fn save_preview(player: &VideoPlayer, dir: &Path, position: f64) {
    let Some(frame) = player.render_osd() else {
        return;
    };
    let file = dir.join(format!("{position:010.3}.png"));
    if let Err(e) = frame.save(&file) {
        warn!(file = %file.display(), error = %e, "failed to save preview");
    }
}

fn show_info(config: &AppConfig, list_labels: bool) -> Result<()> {
    if list_labels {
        let detector = CommandDetector::new(&config.detector_command, &config.model)
            .context("preparing detector")?;
        let labels = detector
            .available_labels()
            .context("querying detector labels")?;

        println!("Available labels");
        for label in labels {
            println!("{label}");
        }
        return Ok(());
    }

    println!("Model: {}", config.model);
    println!("Detector: {}", config.detector_command.display());
    println!("Overlay TTL: {}s", config.overlay_ttl_secs);
    println!("Censored labels:");
    for label in config.policy().labels() {
        println!("  {label}");
    }
    if let Some(path) = AppConfig::default_path() {
        println!("Config file: {}", path.display());
    }
    Ok(())
}
