//! Camera Session CLI
//!
//! Drives one camera session end to end: permission prompt, open, still
//! capture, a short paused-and-resumed recording, a frame stream, close.
//! Uses the mock camera unless built with the `camera` feature and run
//! with `--webcam`.

use camera_session::{
    config::FileConfig,
    device::{Frame, InMemoryRenderTargets, MockBackend, ResolutionPreset},
    metrics::MetricsRegistry,
    permission::{PermissionGate, ScriptedPermissionHost},
    session::{CameraSession, CameraSessionController, ErrorKind, SessionEvent},
};
use chrono::Local;
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

/// How long to wait for a frame before giving up on the stream.
const FRAME_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Parser)]
#[command(name = "camera-session", version, about = "Camera session controller demo")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Camera name or index.
    #[arg(long)]
    camera: Option<String>,

    /// Capture-quality preset (low, medium, high, veryHigh, ultraHigh, max).
    #[arg(long)]
    preset: Option<ResolutionPreset>,

    /// Record an audio track.
    #[arg(long)]
    audio: bool,

    /// Frames to stream before stopping.
    #[arg(long)]
    frames: Option<u32>,

    /// Mock camera frame rate.
    #[arg(long)]
    fps: Option<u32>,

    /// Directory for stills and recordings.
    #[arg(short, long)]
    output_dir: Option<PathBuf>,

    /// Metrics server port (0 to disable).
    #[arg(long)]
    metrics_port: Option<u16>,

    /// Print the final metrics in Prometheus text format.
    #[arg(long)]
    print_metrics: bool,

    /// Use a real webcam instead of the mock camera.
    #[cfg(feature = "camera")]
    #[arg(long)]
    webcam: bool,
}

impl Cli {
    fn load_config(&self) -> Result<FileConfig, camera_session::config::ConfigError> {
        let mut config = match &self.config {
            Some(path) => FileConfig::from_file(path)?,
            None => FileConfig::default(),
        };

        if let Some(camera) = &self.camera {
            config.session.camera = camera.clone();
        }
        if let Some(preset) = self.preset {
            config.session.preset = preset;
        }
        if self.audio {
            config.session.enable_audio = true;
        }
        if let Some(frames) = self.frames {
            config.output.stream_frames = frames;
        }
        if let Some(fps) = self.fps {
            config.mock.fps = fps;
        }
        if let Some(dir) = &self.output_dir {
            config.output.dir = dir.clone();
        }
        if let Some(port) = self.metrics_port {
            config.output.metrics_port = port;
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Camera Session v{}", camera_session::VERSION);

    let config = match cli.load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match run(&cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli, config: FileConfig) -> Result<(), Box<dyn std::error::Error>> {
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || {
            stop.store(true, Ordering::SeqCst);
        })?;
    }

    // Nothing granted up front; the scripted host grants on prompt.
    let host = ScriptedPermissionHost::new(false, false);
    let gate = Arc::new(PermissionGate::new(Arc::new(host)));
    let targets = InMemoryRenderTargets::new();

    let (controller, session) = build_controller(cli, &config, targets.clone(), gate);
    let controller = controller.spawn();

    let registry = MetricsRegistry::new()?;
    #[cfg(feature = "metrics")]
    let exporter = match config.output.metrics_port {
        0 => None,
        port => Some(spawn_exporter(session.clone(), port)?),
    };

    std::fs::create_dir_all(&config.output.dir)?;
    let descriptor = config.session.descriptor();
    let opened = session
        .open(
            descriptor,
            config.session.preset,
            config.session.enable_audio,
        )
        .await?;
    info!(
        session = %opened.handle.session,
        texture = %opened.handle.texture_id,
        "Camera open, preview {}x{}",
        opened.preview_width,
        opened.preview_height
    );

    let mut events = session.observe().await?;
    let event_log = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                SessionEvent::Error { description } => warn!("Camera error: {}", description),
                SessionEvent::CameraClosed => warn!("Camera closed by the device"),
            }
        }
    });

    let still = output_path(&config.output.dir, "still", "jpg");
    session.capture_still(&still).await?;
    info!("Still written to {}", still.display());

    record(&session, &config.output.dir).await?;
    stream(&session, config.output.stream_frames, &stop).await?;

    session.close().await?;
    let stats = session.stats().await?;
    info!(
        stills = stats.stills_captured,
        recordings = stats.recordings_completed,
        frames = stats.frames_delivered,
        failures = stats.failed_operations,
        "Session finished"
    );
    registry.update(&stats);
    if cli.print_metrics {
        println!("{}", registry.encode()?);
    }
    info!("Render targets still allocated: {}", targets.live_count());

    #[cfg(feature = "metrics")]
    if let Some((stop, task)) = exporter {
        let _ = stop.send(());
        let _ = task.await;
    }
    drop(session);
    let _ = event_log.await;
    controller.await??;
    Ok(())
}

fn build_controller(
    cli: &Cli,
    config: &FileConfig,
    targets: InMemoryRenderTargets,
    gate: Arc<PermissionGate>,
) -> (CameraSessionController, CameraSession) {
    #[cfg(feature = "camera")]
    if cli.webcam {
        info!("Using webcam backend");
        return CameraSessionController::new(
            camera_session::device::NokhwaBackend::new(),
            targets,
            gate,
        );
    }
    #[cfg(not(feature = "camera"))]
    let _ = cli;

    info!("Using mock camera at {} fps", config.mock.fps);
    let backend = MockBackend::with_config(config.mock.to_mock_config());
    CameraSessionController::new(backend, targets, gate)
}

fn output_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let stamp = Local::now().format("%Y%m%d-%H%M%S%.3f");
    dir.join(format!("{stem}-{stamp}.{extension}"))
}

async fn record(session: &CameraSession, dir: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let clip = output_path(dir, "clip", "mp4");
    session.prepare_for_video_recording().await?;
    match session.start_recording(&clip).await {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::VideoRecordingFailed => {
            warn!("Recording not available: {}", e);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    }
    info!("Recording to {}", clip.display());

    match session.pause_recording().await {
        Ok(()) => {
            tokio::time::sleep(Duration::from_millis(100)).await;
            session.resume_recording().await?;
        }
        Err(e) if e.kind() == ErrorKind::Unsupported => {
            warn!("Pause not supported: {}", e);
        }
        Err(e) => return Err(e.into()),
    }

    session.stop_recording().await?;
    info!("Recording finalized");
    Ok(())
}

async fn stream(
    session: &CameraSession,
    frames: u32,
    stop: &AtomicBool,
) -> Result<(), Box<dyn std::error::Error>> {
    let (tx, mut rx) = mpsc::channel::<Frame>(8);
    session.start_image_stream(tx).await?;

    let mut received = 0u32;
    while received < frames && !stop.load(Ordering::SeqCst) {
        match tokio::time::timeout(FRAME_TIMEOUT, rx.recv()).await {
            Ok(Some(frame)) => {
                received += 1;
                if received % 10 == 0 {
                    info!(
                        sequence = frame.sequence(),
                        bytes = frame.byte_len(),
                        "Frame {}x{}",
                        frame.width(),
                        frame.height()
                    );
                }
            }
            Ok(None) => break,
            Err(_) => {
                warn!("No frame within {:?}", FRAME_TIMEOUT);
                break;
            }
        }
    }

    session.stop_image_stream().await?;
    info!("Streamed {} frames", received);
    Ok(())
}

/// Starts the exporter; send on the returned channel to stop it.
#[cfg(feature = "metrics")]
fn spawn_exporter(
    session: CameraSession,
    port: u16,
) -> Result<(tokio::sync::oneshot::Sender<()>, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>>
{
    use camera_session::metrics::{MetricsServer, MetricsServerConfig};

    let server = MetricsServer::new(
        MetricsServerConfig::with_port(port),
        MetricsRegistry::new()?,
        session,
    );
    let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
    let task = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stopped.await;
        };
        if let Err(e) = server.serve(shutdown).await {
            error!("Metrics exporter failed: {}", e);
        }
    });
    Ok((stop, task))
}
