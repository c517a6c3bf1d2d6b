//! Capture worker and frame handoff
//!
//! The worker thread owns the [`CaptureSession`] for its whole life: it
//! negotiates, streams, grabs into a YUYV staging buffer, runs the optional
//! output conversion and hands [`Frame`]s to the consumer over a bounded
//! channel. A full channel drops the frame instead of stalling the device.

pub mod ringbuf;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use bytes::Bytes;
use flume::{Sender, TrySendError};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::capture::{
    CaptureSession, Frame, FrameInfo, FrameMetadata, FrameStatus, OutputFormat, SessionOptions,
    SurfaceSize,
};
use crate::convert::{self, Geometry};
use crate::device::CaptureDevice;
use crate::error::{CaptureError, ConvertError};
use crate::{CaptureConfig, PipelineConfig};

pub use self::ringbuf::{FrameRingBuffer, RingStats};

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error("capture worker panicked")]
    Panicked,
}

/// What the worker settles on from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSettings {
    pub width: u32,
    pub height: u32,
    pub fps: u32,
    pub output_format: OutputFormat,
    pub session: SessionOptions,
    pub pin_core: Option<usize>,
    /// Stop after this many delivered frames
    pub frame_limit: Option<u64>,
}

impl WorkerSettings {
    pub fn from_config(capture: &CaptureConfig, pipeline: &PipelineConfig) -> Self {
        Self {
            width: capture.width,
            height: capture.height,
            fps: capture.fps,
            output_format: capture.output_format,
            session: SessionOptions {
                buffer_count: capture.buffer_count,
                max_dequeue_failures: capture.max_dequeue_failures,
            },
            pin_core: pipeline.pin_core,
            frame_limit: pipeline.frame_limit,
        }
    }
}

/// Counters returned when the worker exits
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub delivered: u64,
    pub dropped: u64,
    /// Frames the consumer had no room for
    pub backpressure: u64,
}

pub struct CaptureWorker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<Result<WorkerReport, CaptureError>>>,
}

impl CaptureWorker {
    /// Move `session` to a new thread and start capturing.
    pub fn spawn<D>(
        session: CaptureSession<D>,
        settings: WorkerSettings,
        frames: Sender<Frame>,
    ) -> std::io::Result<Self>
    where
        D: CaptureDevice + 'static,
    {
        let stop = Arc::new(AtomicBool::new(false));
        let flag = stop.clone();
        let handle = thread::Builder::new()
            .name("camgrab-capture".into())
            .spawn(move || run(session, settings, frames, flag))?;
        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Ask the worker to stop after the frame in flight.
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Stop and wait for the worker to tear the session down.
    pub fn join(mut self) -> Result<WorkerReport, WorkerError> {
        self.stop();
        match self.handle.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| WorkerError::Panicked)?
                .map_err(WorkerError::from),
            None => Ok(WorkerReport::default()),
        }
    }
}

impl Drop for CaptureWorker {
    fn drop(&mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn pin_to_core(core: usize) {
    let Some(ids) = core_affinity::get_core_ids() else {
        warn!("CPU topology unavailable, capture thread not pinned");
        return;
    };
    match ids.into_iter().find(|id| id.id == core) {
        Some(id) if core_affinity::set_for_current(id) => info!("Capture thread pinned to core {}", core),
        _ => warn!("Could not pin capture thread to core {}", core),
    }
}

fn run<D: CaptureDevice>(
    mut session: CaptureSession<D>,
    settings: WorkerSettings,
    frames: Sender<Frame>,
    stop: Arc<AtomicBool>,
) -> Result<WorkerReport, CaptureError> {
    if let Some(core) = settings.pin_core {
        pin_to_core(core);
    }

    session = session.with_options(settings.session);
    let output = session.init(settings.width, settings.height, settings.fps)?;
    session.start_streaming()?;

    let mut staging = vec![0u8; output.width as usize * output.height as usize * 2];
    let mut report = WorkerReport::default();

    let result = loop {
        if stop.load(Ordering::Relaxed) {
            debug!("Stop requested");
            break Ok(());
        }
        if settings.frame_limit.is_some_and(|limit| report.delivered >= limit) {
            info!("Frame limit of {} reached", report.delivered);
            break Ok(());
        }

        let info = match session.grab_frame(&mut staging) {
            Ok(FrameStatus::Delivered(info)) => info,
            Ok(FrameStatus::Dropped(_)) => {
                report.dropped += 1;
                continue;
            }
            Err(e) => break Err(e),
        };

        let data = match encode_output(settings.output_format, &staging, output) {
            Ok(data) => data,
            Err(e) => {
                warn!("Output conversion to {:?} failed: {}", settings.output_format, e);
                report.dropped += 1;
                continue;
            }
        };

        match frames.try_send(frame(data, &info, settings.output_format, output)) {
            Ok(()) => report.delivered += 1,
            Err(TrySendError::Full(_)) => {
                report.backpressure += 1;
                debug!("Consumer behind, frame {} discarded", info.sequence);
            }
            Err(TrySendError::Disconnected(_)) => {
                info!("Consumer gone, stopping capture");
                break Ok(());
            }
        }
    };

    let closed = session.close();
    result?;
    closed?;
    info!(
        "Capture worker done: {} delivered, {} dropped, {} discarded",
        report.delivered, report.dropped, report.backpressure
    );
    Ok(report)
}

/// Second conversion pass from the YUYV staging buffer.
fn encode_output(
    format: OutputFormat,
    yuyv: &[u8],
    size: SurfaceSize,
) -> Result<Bytes, ConvertError> {
    if format == OutputFormat::Yuyv {
        return Ok(Bytes::copy_from_slice(yuyv));
    }
    let (width, height) = (size.width as usize, size.height as usize);
    let mut out = vec![0u8; format.frame_size(width, height)];
    let geometry = Geometry::new(width, height, width * 2, format.stride(width));
    convert::from_yuyv(format, yuyv, &mut out, geometry)?;
    Ok(Bytes::from(out))
}

fn frame(data: Bytes, info: &FrameInfo, format: OutputFormat, size: SurfaceSize) -> Frame {
    Frame {
        data,
        meta: Arc::new(FrameMetadata {
            sequence: info.sequence,
            width: size.width,
            height: size.height,
            stride: format.stride(size.width as usize) as u32,
            format,
            device_timestamp: info.timestamp,
        }),
        timestamp: Instant::now(),
    }
}
