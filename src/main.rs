//! camgrab: capture frames from a V4L2 camera
//!
//! Usage: `camgrab [config.toml]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use camgrab::capture::CaptureSession;
use camgrab::pipeline::{CaptureWorker, FrameRingBuffer, WorkerSettings};
use camgrab::{utils, Config, Frame, PipelineConfig};
use color_eyre::Result;
use tokio::io::AsyncWriteExt;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("camgrab=info"));
    let timer = tracing_subscriber::fmt::time::uptime();

    #[cfg(feature = "profiling")]
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;

        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_timer(timer))
            .with(tracing_tracy::TracyLayer::default())
            .init();
    }

    #[cfg(not(feature = "profiling"))]
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(timer)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    init_tracing();

    info!("camgrab starting...");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let mut config = Config::load(config_path.as_deref())?;

    if config.capture.device.is_empty() {
        let found = tokio::task::spawn_blocking(utils::auto_detect_device).await??;
        config.capture.device = found.path;
    }
    camgrab::CONFIG.store(Arc::new(config.clone()));
    info!("Using capture device: {}", config.capture.device);

    let session = CaptureSession::open(&config.capture.device)?;
    let (tx, rx) = flume::bounded::<Frame>(config.pipeline.channel_capacity);
    let settings = WorkerSettings::from_config(&config.capture, &config.pipeline);
    let worker = CaptureWorker::spawn(session, settings, tx)?;

    let mut consumer = tokio::spawn(consume(rx, config.pipeline.clone()));
    let consumer_result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted, stopping capture");
            worker.stop();
            None
        }
        result = &mut consumer => Some(result),
    };

    let report = tokio::task::spawn_blocking(move || worker.join()).await??;
    let consumed = match consumer_result {
        Some(result) => result??,
        None => consumer.await??,
    };

    info!(
        "camgrab shutting down: {} captured, {} dropped, {} discarded, {} consumed",
        report.delivered, report.dropped, report.backpressure, consumed
    );
    Ok(())
}

/// Drain the worker's channel through the frame ring until it disconnects.
async fn consume(rx: flume::Receiver<Frame>, pipeline: PipelineConfig) -> Result<u64> {
    let mut ring = FrameRingBuffer::new(pipeline.ring_buffer_size);
    let mut dump = match &pipeline.dump_path {
        Some(path) => {
            info!("Dumping frames to {}", path.display());
            Some(tokio::fs::File::create(path).await?)
        }
        None => None,
    };

    let mut ticker = tokio::time::interval(Duration::from_millis(pipeline.stats_interval_ms.max(1)));
    let mut consumed = 0u64;

    loop {
        tokio::select! {
            received = rx.recv_async() => {
                let Ok(frame) = received else {
                    break;
                };
                metrics::histogram!("camgrab_handoff_latency_ms")
                    .record(frame.timestamp.elapsed().as_secs_f64() * 1000.0);
                if ring.push(frame).is_some() {
                    warn!("Consumer ring full, oldest frame evicted");
                }

                while let Some(frame) = ring.pop() {
                    consumed += 1;
                    let failed = match dump.as_mut() {
                        Some(file) => file.write_all(&frame.data).await.err(),
                        None => None,
                    };
                    if let Some(e) = failed {
                        error!("Frame dump failed, disabling dump: {}", e);
                        dump = None;
                    }
                }
            }
            _ = ticker.tick() => {
                let stats = ring.stats();
                info!(
                    "Frames: {} received, {} consumed, {} evicted",
                    stats.written, stats.read, stats.evicted
                );
            }
        }
    }

    if let Some(mut file) = dump {
        file.flush().await?;
    }
    Ok(consumed)
}
