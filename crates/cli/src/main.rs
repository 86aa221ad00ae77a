use std::path::{Path, PathBuf};
use std::process;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;

use facecapture_core::capture::domain::capture_record::CaptureBatch;
use facecapture_core::capture::infrastructure::ffmpeg_camera::{CameraSource, FfmpegCamera};
use facecapture_core::capture::infrastructure::jpeg_data_url_encoder::JpegDataUrlEncoder;
use facecapture_core::detection::infrastructure::onnx_face_mesh_detector::OnnxFaceMeshFactory;
use facecapture_core::display::infrastructure::in_memory_display_host::InMemoryDisplayHost;
use facecapture_core::pipeline::face_capture_session::{FaceCaptureSession, SessionCollaborators};
use facecapture_core::pipeline::session_logger::{SessionLogger, StdoutSessionLogger};
use facecapture_core::shared::asset_resolver::{AssetRegistry, AssetSpec, HttpAssetFetcher};
use facecapture_core::shared::config::{CaptureConfig, MeshStyle};
use facecapture_core::shared::size::Size;

/// Polling period while waiting on the session.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Live face tracking from a camera (or a replayed video) with still capture.
#[derive(Parser)]
#[command(name = "face-capture")]
struct Cli {
    /// Capture device name (e.g. /dev/video0). Defaults to the first camera.
    #[arg(long)]
    device: Option<String>,

    /// libavdevice input format for --device (v4l2, avfoundation, dshow).
    #[arg(long, requires = "device")]
    backend: Option<String>,

    /// Replay a video file instead of opening a camera.
    #[arg(long, conflicts_with_all = ["device", "backend"])]
    input: Option<PathBuf>,

    /// Loop the --input video.
    #[arg(long = "loop", requires = "input")]
    looping: bool,

    /// JSON config file; flags below override it.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Rendered size of the preview surface, as WIDTHxHEIGHT.
    #[arg(long, default_value = "640x400", value_parser = parse_size)]
    display: Size,

    /// Seconds to track before capturing.
    #[arg(long, default_value = "3")]
    duration: f64,

    /// Number of stills to capture (defaults to the config batch size).
    #[arg(long)]
    frames: Option<usize>,

    /// Delay between stills in milliseconds (defaults to the config batch delay).
    #[arg(long)]
    delay_ms: Option<u64>,

    /// Only capture once the face is close enough.
    #[arg(long)]
    require_face: bool,

    /// Write the captured batch as JSON here (stdout if omitted).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Save the final overlay surface as a PNG.
    #[arg(long)]
    overlay_png: Option<PathBuf>,

    /// Built-in overlay mesh: tessellation, contours or points.
    #[arg(long)]
    mesh: Option<String>,

    /// Mesh topology JSON (list of [from, to] landmark index pairs).
    /// Replaces the built-in mesh.
    #[arg(long)]
    topology: Option<PathBuf>,

    /// Local face detection model.
    #[arg(long)]
    detection_model: Option<PathBuf>,

    /// Local face landmark model.
    #[arg(long)]
    landmark_model: Option<PathBuf>,

    /// Face detection confidence threshold (0.0-1.0).
    #[arg(long)]
    confidence: Option<f64>,
}

fn main() {
    env_logger::init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    validate(&cli)?;

    let config = build_config(&cli)?;
    let display = Arc::new(InMemoryDisplayHost::new(cli.display));
    let logger = Arc::new(Mutex::new(StdoutSessionLogger::new()));
    let session = build_session(&cli, config, display, logger.clone())?;

    session.start();
    wait_until_ready(&session)?;
    track(&session, Duration::from_secs_f64(cli.duration));

    if cli.require_face && !session.face_ready() {
        let status = session.status();
        session.stop_and_join();
        return Err(format!("No face ready to capture ({status})").into());
    }

    let batch = match (cli.frames, cli.delay_ms) {
        (None, None) => session.capture_batch(),
        (frames, delay_ms) => session.capture_multi(
            frames.unwrap_or(session.config().batch_size),
            delay_ms
                .map(Duration::from_millis)
                .unwrap_or(session.config().batch_delay()),
        ),
    };
    log::info!("Captured {} frames", batch.len());

    if let Some(path) = &cli.overlay_png {
        match session.overlay() {
            Some(overlay) => {
                overlay.save(path)?;
                log::info!("Overlay written to {}", path.display());
            }
            None => log::warn!("Session stopped before the overlay could be read"),
        }
    }
    session.stop_and_join();

    write_batch(&batch, cli.output.as_deref())?;
    logger
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .summary();
    Ok(())
}

fn build_config(cli: &Cli) -> Result<CaptureConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => CaptureConfig::load(path)?,
        None => CaptureConfig::default(),
    };
    if let Some(path) = &cli.detection_model {
        config.face_detection_model = local_asset(path)?;
    }
    if let Some(path) = &cli.landmark_model {
        config.face_landmark_model = local_asset(path)?;
    }
    if let Some(mesh) = &cli.mesh {
        config.mesh_style = parse_mesh_style(mesh)?;
    }
    if let Some(path) = &cli.topology {
        config.topology_path = Some(path.clone());
    }
    if let Some(confidence) = cli.confidence {
        config.detector.min_detection_confidence = confidence;
    }
    config.validate()?;
    Ok(config)
}

fn build_session(
    cli: &Cli,
    config: CaptureConfig,
    display: Arc<InMemoryDisplayHost>,
    logger: Arc<Mutex<StdoutSessionLogger>>,
) -> Result<FaceCaptureSession, Box<dyn std::error::Error>> {
    let source = match (&cli.input, &cli.device) {
        (Some(path), _) => CameraSource::File {
            path: path.clone(),
            looping: cli.looping,
        },
        (None, Some(name)) => CameraSource::Device {
            backend: cli.backend.clone(),
            name: name.clone(),
        },
        (None, None) => CameraSource::default_device(),
    };

    let factory = OnnxFaceMeshFactory::new(
        config.face_detection_model.clone(),
        config.face_landmark_model.clone(),
        config.topology_source()?,
    );

    let fetcher = HttpAssetFetcher::new(Some(Box::new(download_progress)));
    let parts = SessionCollaborators::new(
        Arc::new(FfmpegCamera::new(source)),
        Arc::new(factory),
        display,
        Arc::new(AssetRegistry::new(Box::new(fetcher))),
    )
    .with_encoder(Arc::new(JpegDataUrlEncoder::new(config.jpeg_quality)))
    .with_logger(logger);

    Ok(FaceCaptureSession::new(config, parts))
}

fn wait_until_ready(session: &FaceCaptureSession) -> Result<(), Box<dyn std::error::Error>> {
    loop {
        if let Some(error) = session.error() {
            session.stop_and_join();
            return Err(error.into());
        }
        if session.ready() {
            return Ok(());
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Logs every status label change for `duration`.
fn track(session: &FaceCaptureSession, duration: Duration) {
    let deadline = Instant::now() + duration;
    let mut last_label = "";
    while Instant::now() < deadline {
        let label = session.status();
        if label != last_label {
            log::info!("{label}");
            last_label = label;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

fn write_batch(
    batch: &CaptureBatch,
    output: Option<&Path>,
) -> Result<(), Box<dyn std::error::Error>> {
    let json = serde_json::to_string_pretty(batch)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            log::info!("Batch written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

fn validate(cli: &Cli) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(input) = &cli.input {
        if !input.exists() {
            return Err(format!("Input file not found: {}", input.display()).into());
        }
    }
    if !(cli.duration.is_finite() && cli.duration >= 0.0) {
        return Err(format!("Duration must be a non-negative number, got {}", cli.duration).into());
    }
    if cli.display.is_empty() {
        return Err(format!("Display size must be non-empty, got {}", cli.display).into());
    }
    if let Some(confidence) = cli.confidence {
        if !(0.0..=1.0).contains(&confidence) {
            return Err(
                format!("Confidence must be between 0.0 and 1.0, got {confidence}").into(),
            );
        }
    }
    Ok(())
}

/// Pins an asset to an explicit file instead of the cache or a download.
fn local_asset(path: &Path) -> Result<AssetSpec, Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(format!("Model file not found: {}", path.display()).into());
    }
    AssetSpec::at_path(path)
        .ok_or_else(|| format!("Invalid model path: {}", path.display()).into())
}

fn parse_mesh_style(value: &str) -> Result<MeshStyle, String> {
    match value {
        "tessellation" => Ok(MeshStyle::Tessellation),
        "contours" => Ok(MeshStyle::Contours),
        "points" => Ok(MeshStyle::Points),
        other => Err(format!(
            "Mesh must be one of: tessellation, contours, points, got '{other}'"
        )),
    }
}

fn parse_size(value: &str) -> Result<Size, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got '{value}'"))?;
    let width = w.trim().parse().map_err(|e| format!("bad width '{w}': {e}"))?;
    let height = h.trim().parse().map_err(|e| format!("bad height '{h}': {e}"))?;
    Ok(Size::new(width, height))
}

fn download_progress(downloaded: u64, total: u64) {
    if total > 0 {
        let pct = downloaded as f64 / total as f64 * 100.0;
        eprint!("\rDownloading model: {pct:.0}%");
    } else {
        eprint!("\rDownloading model: {downloaded} bytes");
    }
}
