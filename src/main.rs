//! Camera Desk CLI
//!
//! Scans for cameras, takes still captures, writes stream frames to disk and
//! prints diagnostics, using either a real camera (`camera` feature) or the
//! built-in simulator.

use camera_desk::{
    capture::{DeviceOpener, FileConfig, SimulatedOpener},
    pipeline::DirectoryStore,
    service::CameraService,
};
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "camera-desk", version, about = "Shared camera capture desk")]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Use the simulated camera even when a real one is available.
    #[arg(long)]
    simulated: bool,

    /// Serve Prometheus metrics on this port while running (0 disables).
    #[cfg(feature = "metrics")]
    #[arg(long)]
    metrics_port: Option<u16>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List devices that deliver readable frames.
    Scan,
    /// Start the camera and capture still images.
    Capture {
        #[arg(short = 'n', long, default_value_t = 1)]
        count: u32,
    },
    /// Write live stream frames to a directory until cancelled.
    Stream {
        /// Stop after this many frames.
        #[arg(long)]
        frames: Option<usize>,
        #[arg(long, default_value = "stream")]
        out_dir: PathBuf,
    },
    /// Print a troubleshooting report.
    Diagnostics,
    /// Diagnose the camera and try to start it.
    Troubleshoot,
    /// Read one frame and report its size and brightness.
    FrameReport,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let cli = Cli::parse();
    info!("Camera Desk v{}", camera_desk::VERSION);

    let config = match cli.config {
        Some(ref path) => match FileConfig::from_file(path) {
            Ok(config) => config,
            Err(e) => {
                eprintln!("Failed to load {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => FileConfig::default(),
    };

    let store = match DirectoryStore::new(&config.output.image_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("Failed to prepare {}: {}", config.output.image_dir.display(), e);
            std::process::exit(1);
        }
    };

    let service = CameraService::from_config(opener(cli.simulated), Arc::new(store), &config);

    #[cfg(feature = "metrics")]
    let metrics = start_metrics(cli.metrics_port.unwrap_or(config.output.metrics_port));

    match cli.command {
        Command::Scan => {
            let report = service.manager().scanner().scan_report();
            print_json(&report);
        }
        Command::Capture { count } => {
            require_camera(&service);
            for _ in 0..count {
                let outcome = service.capture();
                if !outcome.success {
                    warn!(error = outcome.error.as_deref().unwrap_or(""), "Capture failed");
                }
                print_json(&outcome);
                #[cfg(feature = "metrics")]
                push_metrics(&metrics, &service);
                std::thread::sleep(Duration::from_millis(config.capture.debounce_ms));
            }
            print_json(&service.statistics());
            service.stop_camera();
        }
        Command::Stream { frames, out_dir } => {
            require_camera(&service);
            if let Err(e) = std::fs::create_dir_all(&out_dir) {
                eprintln!("Failed to create {}: {}", out_dir.display(), e);
                std::process::exit(1);
            }

            let stream = service.stream();
            let cancel = stream.cancel_handle();
            if let Err(e) = ctrlc::set_handler(move || cancel.cancel()) {
                warn!(error = %e, "Ctrl-C handler not installed");
            }

            let mut written = 0usize;
            for frame in stream.take(frames.unwrap_or(usize::MAX)) {
                let path = out_dir.join(format!("frame_{:06}.jpg", frame.sequence));
                if let Err(e) = std::fs::write(&path, &frame.bytes) {
                    warn!(path = %path.display(), error = %e, "Failed to write frame");
                    continue;
                }
                written += 1;
            }
            info!(frames = written, dir = %out_dir.display(), "Stream finished");
            service.stop_camera();
        }
        Command::Diagnostics => print_json(&service.diagnostics()),
        Command::Troubleshoot => {
            print_json(&service.troubleshoot());
            service.stop_camera();
        }
        Command::FrameReport => {
            require_camera(&service);
            print_json(&service.frame_report());
            service.stop_camera();
        }
    }
}

#[cfg(feature = "camera")]
fn opener(simulated: bool) -> Arc<dyn DeviceOpener> {
    if simulated {
        Arc::new(SimulatedOpener::single())
    } else {
        Arc::new(camera_desk::capture::NokhwaOpener::new())
    }
}

#[cfg(not(feature = "camera"))]
fn opener(simulated: bool) -> Arc<dyn DeviceOpener> {
    if !simulated {
        info!("Built without the camera feature; using the simulated camera");
    }
    Arc::new(SimulatedOpener::single())
}

fn require_camera(service: &CameraService) {
    let outcome = service.start_camera();
    if !outcome.success {
        eprintln!(
            "Camera failed to start: {}",
            outcome.error.as_deref().unwrap_or("unknown error")
        );
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(text) => println!("{}", text),
        Err(e) => eprintln!("Failed to encode output: {}", e),
    }
}

#[cfg(feature = "metrics")]
type MetricsHandle = Option<Arc<camera_desk::metrics::MetricsRegistry>>;

#[cfg(feature = "metrics")]
fn start_metrics(port: u16) -> MetricsHandle {
    use camera_desk::metrics::{MetricsRegistry, MetricsServer, MetricsServerConfig};

    if port == 0 {
        return None;
    }
    let registry = match MetricsRegistry::new() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            warn!(error = %e, "Metrics disabled");
            return None;
        }
    };
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), Arc::clone(&registry));

    std::thread::spawn(move || {
        let runtime = match tokio::runtime::Runtime::new() {
            Ok(runtime) => runtime,
            Err(e) => {
                warn!(error = %e, "Metrics runtime failed to start");
                return;
            }
        };
        if let Err(e) = runtime.block_on(server.run()) {
            warn!(error = %e, "Metrics server stopped");
        }
    });
    Some(registry)
}

#[cfg(feature = "metrics")]
fn push_metrics(metrics: &MetricsHandle, service: &CameraService) {
    if let Some(registry) = metrics {
        registry.update(&service.metrics_snapshot());
    }
}
