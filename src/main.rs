use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use live_guide::{
    create_router, AppState, Config, ConnectionStatus, FileDevices, LiveSession, NatsConnector,
    TranscriptLog,
};

/// Live Guide - real-time spoken guidance from camera and microphone
#[derive(Parser)]
#[command(name = "live-guide", version, about)]
struct Cli {
    /// Config file (extension optional)
    #[arg(short, long, env = "LIVE_GUIDE_CONFIG", default_value = "config/live-guide")]
    config: String,

    /// NATS server bridging to the guidance service (overrides config)
    #[arg(long, env = "LIVE_GUIDE_NATS_URL")]
    nats_url: Option<String>,

    /// Increase verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run one session in the foreground until Ctrl-C or the service hangs up
    Run {
        /// WAV file to use as the microphone
        #[arg(long)]
        mic: Option<PathBuf>,
        /// Image file to use as the camera
        #[arg(long)]
        camera: Option<PathBuf>,
        /// Write synthesized speech to this WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Replay the microphone file instead of going silent at its end
        #[arg(long = "loop")]
        looping: bool,
    },
    /// Serve the HTTP control API
    Serve,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_filter = match cli.verbose {
        0 => "info",
        1 => "info,live_guide=debug",
        _ => "debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("fatal: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut cfg = Config::load(&cli.config)?;
    if let Some(url) = cli.nats_url {
        cfg.channel.nats_url = url;
    }

    info!("{} v{}", cfg.service.name, env!("CARGO_PKG_VERSION"));
    info!("Guidance service bridge: {}", cfg.channel.nats_url);

    match cli.command {
        Command::Run {
            mic,
            camera,
            output,
            looping,
        } => {
            let devices = file_devices(
                &cfg,
                mic,
                camera,
                output,
                looping || cfg.capture.looping,
            )?;
            run_session(&cfg, devices).await
        }
        Command::Serve => {
            let devices = file_devices(&cfg, None, None, None, cfg.capture.looping)?;
            serve(&cfg, devices).await
        }
    }
}

fn file_devices(
    cfg: &Config,
    mic: Option<PathBuf>,
    camera: Option<PathBuf>,
    output: Option<PathBuf>,
    looping: bool,
) -> Result<FileDevices> {
    let Some(microphone_path) = mic.or_else(|| cfg.capture.microphone_path.clone()) else {
        bail!("No microphone file given (--mic or capture.microphone_path)");
    };
    let Some(camera_path) = camera.or_else(|| cfg.capture.camera_path.clone()) else {
        bail!("No camera image given (--camera or capture.camera_path)");
    };

    Ok(FileDevices {
        microphone_path,
        camera_path,
        output_path: output.or_else(|| cfg.playback.output_path.clone()),
        looping,
    })
}

fn build_session(cfg: &Config, devices: FileDevices) -> (LiveSession, Arc<TranscriptLog>) {
    let transcript = TranscriptLog::new();
    let session = LiveSession::new(
        cfg.to_session_config(),
        Arc::new(devices),
        Arc::new(NatsConnector::new(cfg.channel.nats_url.clone())),
        transcript.clone(),
    );

    (session, transcript)
}

async fn run_session(cfg: &Config, devices: FileDevices) -> Result<()> {
    let (session, transcript) = build_session(cfg, devices);

    session.start().await.context("Failed to start session")?;

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, stopping session");
                session.stop().await;
                break;
            }
            _ = poll.tick() => {
                let status = session.status().await;
                if matches!(status, ConnectionStatus::Idle | ConnectionStatus::Error) {
                    break;
                }
            }
        }
    }

    let stats = session.stats().await;
    info!(
        "Session finished: {} audio chunks, {} video frames, {} speech segments, {} transcript fragments",
        stats.audio_chunks_sent,
        stats.video_frames_sent,
        stats.playback_segments_scheduled,
        transcript.segments().len()
    );

    match session.last_error().await {
        Some(e) => bail!("Session ended with an error: {}", e),
        None => Ok(()),
    }
}

async fn serve(cfg: &Config, devices: FileDevices) -> Result<()> {
    let (session, transcript) = build_session(cfg, devices);
    let app = create_router(AppState::new(session.clone(), transcript));

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("HTTP server failed")?;

    session.stop().await;
    Ok(())
}
