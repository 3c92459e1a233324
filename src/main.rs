use anyhow::Result;
use camcapture::{
    CamcaptureConfig, CameraBackend, CameraEvent, CaptureControllerBuilder, EventFilter, Facing,
    FixedRotation, MockCameraBackend, PermissionResponse, Quality, Rotation, ScriptedPermission,
};
use clap::{Parser, ValueEnum};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

#[derive(Parser, Debug)]
#[command(name = "camcapture")]
#[command(about = "Camera capture controller with NV21/NV12 to packed pixel conversion")]
#[command(version)]
#[command(long_about = "Runs one capture session against a camera backend: requests permission, \
opens the camera facing the requested direction at the requested quality, converts every \
preview frame to packed 32-bit pixels and reports lifecycle notifications.")]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "camcapture.toml", help = "Path to TOML configuration file")]
    config: String,

    /// Enable debug logging (most verbose)
    #[arg(short, long, help = "Enable debug level logging")]
    debug: bool,

    /// Enable verbose logging (info level)
    #[arg(short, long, help = "Enable verbose info level logging")]
    verbose: bool,

    /// Enable quiet mode (errors only)
    #[arg(short, long, help = "Enable quiet mode - only log errors")]
    quiet: bool,

    /// Validate configuration and exit
    #[arg(long, help = "Validate configuration file and exit without opening a camera")]
    validate_config: bool,

    /// Print default configuration and exit
    #[arg(long, help = "Print default configuration in TOML format and exit")]
    print_config: bool,

    /// Override log format (json, pretty, compact)
    #[arg(long, value_name = "FORMAT", help = "Log output format: json, pretty, or compact")]
    log_format: Option<String>,

    /// Camera backend
    #[arg(long, value_enum, default_value_t = BackendKind::Mock)]
    backend: BackendKind,

    /// Camera direction, overriding the configuration
    #[arg(long, value_enum)]
    facing: Option<FacingArg>,

    /// Preview quality, overriding the configuration
    #[arg(long, value_enum)]
    quality: Option<QualityArg>,

    /// Display rotation in degrees (0, 90, 180, 270)
    #[arg(long, default_value_t = 0)]
    rotation: u16,

    /// Answer the permission request with a denial
    #[arg(long)]
    deny_permission: bool,

    /// Seconds to capture before stopping
    #[arg(long, default_value_t = 5)]
    duration: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum BackendKind {
    Mock,
    Gstreamer,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum FacingArg {
    Front,
    Back,
}

impl From<FacingArg> for Facing {
    fn from(arg: FacingArg) -> Self {
        match arg {
            FacingArg::Front => Facing::Front,
            FacingArg::Back => Facing::Back,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum QualityArg {
    Low,
    Medium,
    High,
}

impl From<QualityArg> for Quality {
    fn from(arg: QualityArg) -> Self {
        match arg {
            QualityArg::Low => Quality::Low,
            QualityArg::Medium => Quality::Medium,
            QualityArg::High => Quality::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        println!("# Camcapture Configuration File");
        println!("{}", CamcaptureConfig::default().to_toml()?);
        return Ok(());
    }

    init_logging(&args)?;

    info!("Starting camcapture v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration file: {}", args.config);

    let config = match CamcaptureConfig::load_from_file(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    if args.validate_config {
        match config.validate() {
            Ok(()) => {
                println!("✓ Configuration is valid");
                return Ok(());
            }
            Err(e) => {
                eprintln!("✗ Configuration validation failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    config.validate()?;

    let rotation = Rotation::from_degrees(args.rotation)
        .ok_or_else(|| anyhow::anyhow!("Unsupported rotation {}", args.rotation))?;
    let permission = if args.deny_permission {
        PermissionResponse::Denied
    } else {
        PermissionResponse::Granted
    };
    let facing = args.facing.map(Facing::from).unwrap_or(config.camera.facing);
    let quality = args.quality.map(Quality::from).unwrap_or(config.camera.quality);

    let controller = CaptureControllerBuilder::new()
        .shared_backend(create_backend(args.backend, &config)?)
        .permissions(Arc::new(ScriptedPermission::always(permission)))
        .rotation(Arc::new(FixedRotation(rotation)))
        .config(config)
        .build()?;

    let mut events = controller.subscribe_filtered(EventFilter::All, "cli");
    controller.start_capture(facing, quality);

    let deadline = tokio::time::sleep(Duration::from_secs(args.duration));
    tokio::pin!(deadline);
    let mut exit_code = 0;

    loop {
        tokio::select! {
            _ = &mut deadline => {
                info!("Capture duration elapsed");
                break;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted");
                break;
            }
            event = events.recv() => match event {
                Ok(CameraEvent::Started { .. }) => {
                    println!("{}", serde_json::to_string(&controller.info())?);
                }
                Ok(CameraEvent::FrameUpdate { frame }) => {
                    debug!("Frame {} converted ({} pixels)", frame.frame_id, frame.len());
                }
                Ok(CameraEvent::Error { kind, details }) => {
                    eprintln!("Capture failed ({:?}): {}", kind, details);
                    exit_code = 1;
                    break;
                }
                Ok(event) => info!("{}", event.description()),
                Err(camcapture::error::EventBusError::ChannelClosed) => break,
                Err(e) => warn!("{}", e),
            },
        }
    }

    controller.stop();
    let stats = controller.stats();
    println!("{}", serde_json::json!({
        "frames_received": stats.frames_received,
        "frames_converted": stats.frames_converted,
        "frames_malformed": stats.frames_malformed,
        "frames_discarded": stats.frames_discarded,
        "conversion_success_rate": stats.conversion_success_rate(),
    }));
    controller.shutdown();

    if exit_code != 0 {
        std::process::exit(exit_code);
    }
    Ok(())
}

fn create_backend(kind: BackendKind, config: &CamcaptureConfig) -> Result<Arc<dyn CameraBackend>> {
    match kind {
        BackendKind::Mock => Ok(Arc::new(MockCameraBackend::from_config(
            &config.mock,
            config.camera.chroma_order,
        ))),
        BackendKind::Gstreamer => gstreamer_backend(config),
    }
}

#[cfg(all(target_os = "linux", feature = "gstreamer"))]
fn gstreamer_backend(config: &CamcaptureConfig) -> Result<Arc<dyn CameraBackend>> {
    Ok(Arc::new(camcapture::GstCameraBackend::new(
        config.devices.clone(),
        config.camera.chroma_order,
    )?))
}

#[cfg(not(all(target_os = "linux", feature = "gstreamer")))]
fn gstreamer_backend(_config: &CamcaptureConfig) -> Result<Arc<dyn CameraBackend>> {
    anyhow::bail!("camcapture was built without the gstreamer feature")
}

fn init_logging(args: &Args) -> Result<()> {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    let log_level = if args.debug {
        "debug"
    } else if args.verbose {
        "info"
    } else if args.quiet {
        "error"
    } else {
        "warn"
    };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("camcapture={}", log_level)));

    let fmt_layer = match args.log_format.as_deref() {
        Some("json") => fmt::layer()
            .json()
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
            .boxed(),
        Some("compact") => fmt::layer()
            .compact()
            .with_target(false)
            .with_thread_ids(false)
            .boxed(),
        Some("pretty") | None => fmt::layer()
            .pretty()
            .with_target(true)
            .with_thread_ids(args.debug)
            .with_file(args.debug)
            .with_line_number(args.debug)
            .boxed(),
        Some(format) => {
            eprintln!("Warning: Unknown log format '{}', using default", format);
            fmt::layer()
                .with_target(true)
                .with_thread_ids(args.debug)
                .boxed()
        }
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(env_filter)
        .init();

    Ok(())
}
