//! framebridge: serve depth/color captures to a single-threaded event loop

use std::path::PathBuf;
use std::sync::Arc;

use color_eyre::Result;
use tokio::task::{self, LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use framebridge::capture::{FrameGeometry, FrameSource};
use framebridge::sink::DumpSink;
use framebridge::{Bridge, Config, StreamConfig};

fn main() -> Result<()> {
    // Initialize error handling and logging
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("framebridge=info")),
        )
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    info!("framebridge launching...");

    // Load configuration
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = Config::load(config_path.as_deref())?;
    framebridge::CONFIG.store(Arc::new(config.clone()));

    // All deliveries happen on this one thread
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let local = LocalSet::new();
    local.block_on(&runtime, serve(config))?;

    info!("framebridge shutting down");
    Ok(())
}

async fn serve(config: Config) -> Result<()> {
    let shutdown = CancellationToken::new();

    // Ctrl-C only flips the token, bridges do the rest
    let on_signal = shutdown.clone();
    task::spawn_local(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("SIGINT");
                on_signal.cancel();
            }
            Err(e) => error!("Cannot listen for SIGINT: {}", e),
        }
    });

    let mut streams = Vec::new();
    for stream in &config.streams {
        let settings = stream.bridge_settings()?;
        let source = open_source(stream, settings.geometry)?;

        let dump_path = config
            .dump
            .path
            .as_deref()
            .map(|base| DumpSink::dump_path_for(base, &stream.name));
        let sink = DumpSink::new(
            stream.name.clone(),
            config.delivery.max_buffer_size,
            dump_path.as_deref(),
        );

        let mut bridge = Bridge::start(settings, source, sink, &shutdown)?;
        let name = stream.name.clone();
        streams.push(task::spawn_local(async move {
            bridge.run().await;
            let delivered = bridge.controller().sink().frames();
            let report = bridge.shutdown();
            (name, delivered, report)
        }));
    }

    if streams.is_empty() {
        warn!("No streams configured");
        return Ok(());
    }

    for stream in streams {
        let (name, delivered, report) = stream.await?;
        info!(
            "{}: {} frames captured, {} delivered, {} dropped, {} discarded",
            name,
            report.capture.frames_captured,
            delivered,
            report.queue.frames_dropped,
            report.frames_discarded
        );
    }

    info!("Exiting...");
    Ok(())
}

#[cfg(feature = "v4l2")]
fn open_source(stream: &StreamConfig, geometry: FrameGeometry) -> Result<Box<dyn FrameSource>> {
    use framebridge::capture::V4l2Source;
    use framebridge::utils;

    // Auto-detect capture device if needed
    let device = match &stream.device {
        Some(device) => device.clone(),
        None => utils::auto_detect_device(stream.kind)?,
    };
    info!("Using capture device for {}: {}", stream.name, device);
    Ok(Box::new(V4l2Source::open(&device, stream.kind, geometry)?))
}

#[cfg(not(feature = "v4l2"))]
fn open_source(stream: &StreamConfig, geometry: FrameGeometry) -> Result<Box<dyn FrameSource>> {
    use framebridge::capture::PatternSource;

    if let Some(device) = &stream.device {
        warn!(
            "{}: built without v4l2 support, ignoring device {}",
            stream.name, device
        );
    }
    Ok(Box::new(PatternSource::new(geometry, stream.fps)))
}
