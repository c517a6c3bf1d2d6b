//! Capture session: open, negotiate, stream, grab, tear down
//!
//! A session owns one device and its buffer ring. Every call that touches the
//! ring takes `&mut self`, so a session is driven by exactly one worker and
//! `grab_frame` is its only blocking point.

use std::collections::BTreeSet;
use std::fmt;
use std::io;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use crate::capture::catalog::{FormatCatalog, SurfaceDescriptor, SurfaceSize};
use crate::capture::frame::WireFormat;
use crate::capture::negotiate::{negotiate_wire_format, select_mode, CropGeometry};
use crate::capture::ring::{BufferRing, SlotState};
use crate::convert::{self, Geometry};
use crate::device::{CaptureDevice, DequeuedBuffer, PixFormat, V4l2Device};
use crate::error::{CaptureError, ConvertError, DecodeError};
use crate::jpeg;

/// Compressed frames this small are headers without image data.
pub const EMPTY_FRAME_BYTES: usize = 0xaf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Closed,
    Initialized,
    Streaming,
}

/// Tunables that do not affect negotiation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionOptions {
    pub buffer_count: u32,
    /// Consecutive dequeue failures tolerated before `grab_frame` errors out
    pub max_dequeue_failures: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            buffer_count: 4,
            max_dequeue_failures: 8,
        }
    }
}

/// Everything `init` settled on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamGeometry {
    pub wire: WireFormat,
    pub capture: SurfaceSize,
    pub bytes_per_line: u32,
    pub size_image: u32,
    pub crop: CropGeometry,
    pub fps: u32,
}

impl StreamGeometry {
    /// Output frame size in pixels.
    pub fn output(&self) -> SurfaceSize {
        self.crop.output
    }

    /// Bytes one YUYV output frame needs.
    pub fn output_frame_size(&self) -> usize {
        let out = self.crop.output;
        out.width as usize * out.height as usize * 2
    }

    /// Byte offset of the crop origin in a device buffer.
    pub fn source_offset(&self) -> usize {
        let bpp = self.wire.traits().bytes_per_pixel as usize;
        self.crop.y as usize * self.bytes_per_line as usize + self.crop.x as usize * bpp
    }
}

/// Metadata of a delivered frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    /// Frames delivered by this session, starting at 0
    pub sequence: u64,
    pub device_sequence: u32,
    pub bytes_used: usize,
    pub width: u32,
    pub height: u32,
    pub timestamp: Option<Duration>,
}

/// Why a frame did not reach the destination
#[derive(Debug)]
pub enum DropReason {
    DestinationTooSmall { required: usize, available: usize },
    Empty { bytes_used: usize },
    Unmapped { index: usize },
    Decode(DecodeError),
    Convert(ConvertError),
    Dequeue(io::Error),
}

impl DropReason {
    /// Metric label.
    pub fn label(&self) -> &'static str {
        match self {
            DropReason::DestinationTooSmall { .. } => "destination_too_small",
            DropReason::Empty { .. } => "empty",
            DropReason::Unmapped { .. } => "unmapped",
            DropReason::Decode(_) => "decode",
            DropReason::Convert(_) => "convert",
            DropReason::Dequeue(_) => "dequeue",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DropReason::DestinationTooSmall {
                required,
                available,
            } => write!(f, "destination holds {available} bytes, frame needs {required}"),
            DropReason::Empty { bytes_used } => write!(f, "empty frame ({bytes_used} bytes)"),
            DropReason::Unmapped { index } => write!(f, "buffer {index} is not mapped"),
            DropReason::Decode(e) => write!(f, "decode error {}: {}", e.code(), e),
            DropReason::Convert(e) => write!(f, "conversion failed: {e}"),
            DropReason::Dequeue(e) => write!(f, "dequeue failed: {e}"),
        }
    }
}

/// Outcome of one `grab_frame`
#[derive(Debug)]
pub enum FrameStatus {
    Delivered(FrameInfo),
    Dropped(DropReason),
}

impl FrameStatus {
    pub fn is_delivered(&self) -> bool {
        matches!(self, FrameStatus::Delivered(_))
    }
}

pub struct CaptureSession<D: CaptureDevice = V4l2Device> {
    path: String,
    device: D,
    state: SessionState,
    options: SessionOptions,
    catalog: FormatCatalog,
    stream: Option<StreamGeometry>,
    ring: BufferRing,
    /// Intermediate RGB image for Bayer sources
    scratch: Vec<u8>,
    dequeue_failures: u32,
    delivered: u64,
}

impl CaptureSession<V4l2Device> {
    /// Open a kernel capture device and build its mode catalog.
    #[instrument]
    pub fn open(path: &str) -> Result<Self, CaptureError> {
        let device = V4l2Device::open(path).map_err(|e| CaptureError::DeviceUnavailable {
            path: path.to_owned(),
            reason: e.to_string(),
        })?;
        Self::from_device(device, path)
    }
}

impl<D: CaptureDevice> CaptureSession<D> {
    /// Wrap an already open device. Fails unless it can capture and stream.
    pub fn from_device(device: D, path: impl Into<String>) -> Result<Self, CaptureError> {
        let path = path.into();
        let unavailable = |reason: String| CaptureError::DeviceUnavailable {
            path: path.clone(),
            reason,
        };

        let caps = device
            .query_capabilities()
            .map_err(|e| unavailable(format!("capability query failed: {e}")))?;
        info!(
            "Device: {} ({}) on {}, capture={}, streaming={}",
            caps.card, caps.driver, caps.bus, caps.video_capture, caps.streaming
        );
        if !caps.video_capture {
            return Err(unavailable("no video capture capability".into()));
        }
        if !caps.streaming {
            return Err(unavailable("no streaming I/O".into()));
        }

        let catalog = FormatCatalog::enumerate(&device);
        Ok(Self {
            path,
            device,
            state: SessionState::Closed,
            options: SessionOptions::default(),
            catalog,
            stream: None,
            ring: BufferRing::new(0),
            scratch: Vec::new(),
            dequeue_failures: 0,
            delivered: 0,
        })
    }

    pub fn with_options(mut self, options: SessionOptions) -> Self {
        self.options = options;
        self
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn catalog(&self) -> &FormatCatalog {
        &self.catalog
    }

    pub fn geometry(&self) -> Option<&StreamGeometry> {
        self.stream.as_ref()
    }

    pub fn ring(&self) -> &BufferRing {
        &self.ring
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    pub fn available_sizes(&self) -> BTreeSet<SurfaceSize> {
        self.catalog.available_sizes()
    }

    pub fn available_frame_rates(&self) -> BTreeSet<u32> {
        self.catalog.available_frame_rates()
    }

    pub fn best_preview_format(&self) -> SurfaceDescriptor {
        self.catalog.best_preview_format()
    }

    pub fn best_picture_format(&self) -> SurfaceDescriptor {
        self.catalog.best_picture_format()
    }

    fn require(&self, expected: SessionState) -> Result<(), CaptureError> {
        if self.state != expected {
            return Err(CaptureError::InvalidState {
                expected,
                actual: self.state,
            });
        }
        Ok(())
    }

    /// Re-enumerate device modes, e.g. after a hotplug.
    pub fn refresh_catalog(&mut self) -> Result<(), CaptureError> {
        self.require(SessionState::Closed)?;
        self.catalog = FormatCatalog::enumerate(&self.device);
        Ok(())
    }

    /// Negotiate a mode for `width`x`height`@`fps` and map the buffer ring.
    ///
    /// Returns the output size `grab_frame` will produce. It equals the
    /// request unless the device came back smaller on some axis.
    #[instrument(skip(self), fields(device = %self.path))]
    pub fn init(&mut self, width: u32, height: u32, fps: u32) -> Result<SurfaceSize, CaptureError> {
        self.require(SessionState::Closed)?;
        // Every output layout packs pixels in pairs.
        if width % 2 != 0 {
            return Err(CaptureError::NoAcceptableMode {
                width,
                height,
                fps,
                reason: "width must be even".into(),
            });
        }
        let requested = SurfaceDescriptor::new(width, height, fps);

        let selection = select_mode(&self.catalog, requested)?;
        info!(
            "Selected {} for {} (crop: {})",
            selection.descriptor, requested, selection.needs_crop
        );
        let (wire, _) = negotiate_wire_format(&self.device, &selection)?;

        let no_mode = |reason: String| CaptureError::NoAcceptableMode {
            width,
            height,
            fps,
            reason,
        };
        let size = selection.descriptor.size;
        let set = self
            .device
            .set_format(&PixFormat::request(wire.fourcc(), size.width, size.height))
            .map_err(|e| no_mode(format!("set format {wire}: {e}")))?;
        let actual = self.device.format().unwrap_or_else(|e| {
            debug!("Reading back format failed, trusting set result: {}", e);
            set
        });
        if actual.fourcc != wire.fourcc() {
            return Err(no_mode(format!(
                "device switched {} to {}",
                wire, actual.fourcc
            )));
        }
        let actual = sanitize(wire, actual);
        let capture = actual.size();

        let crop = if wire.traits().crop_safe {
            CropGeometry::compute(capture, requested.size)
        } else {
            CropGeometry::top_left(capture, requested.size)
        };
        if !crop.is_identity(capture) {
            info!(
                "Cropping {} capture to {} at ({}, {})",
                capture, crop.output, crop.x, crop.y
            );
        }

        let fps = match self.device.set_frame_rate(selection.descriptor.fps) {
            Ok(actual) => {
                if actual != selection.descriptor.fps {
                    warn!("Asked for {} fps, device runs at {}", selection.descriptor.fps, actual);
                }
                actual
            }
            Err(e) => {
                warn!("Device refused {} fps: {}", selection.descriptor.fps, e);
                selection.descriptor.fps
            }
        };

        let granted = match self.device.request_buffers(self.options.buffer_count) {
            Ok(0) => Err(io::Error::other("driver granted no buffers")),
            other => other,
        };
        let granted = match granted {
            Ok(n) => n,
            Err(e) => {
                if let Err(release) = self.device.release_buffers() {
                    debug!("Releasing partial buffers failed: {}", release);
                }
                return Err(CaptureError::BufferSetup(e));
            }
        };

        self.ring = BufferRing::new(granted);
        if matches!(wire, WireFormat::Bayer(_)) {
            self.scratch = Vec::with_capacity(crop.output.area() as usize * 3);
        }
        self.stream = Some(StreamGeometry {
            wire,
            capture,
            bytes_per_line: actual.bytes_per_line,
            size_image: actual.size_image,
            crop,
            fps,
        });
        self.dequeue_failures = 0;
        self.state = SessionState::Initialized;
        info!(
            "Initialized {} {}@{} with {} buffers, output {}",
            wire, capture, fps, granted, crop.output
        );
        Ok(crop.output)
    }

    /// Queue every buffer and start the stream.
    #[instrument(skip(self), fields(device = %self.path))]
    pub fn start_streaming(&mut self) -> Result<(), CaptureError> {
        self.require(SessionState::Initialized)?;

        for index in self.ring.indices(SlotState::Free) {
            if let Err(e) = self.device.queue_buffer(index) {
                self.abort_start();
                return Err(CaptureError::StreamTransition {
                    transition: "on",
                    source: e,
                });
            }
            self.ring.mark_queued(index)?;
        }

        if let Err(e) = self.device.stream_on() {
            self.abort_start();
            return Err(CaptureError::StreamTransition {
                transition: "on",
                source: e,
            });
        }

        self.state = SessionState::Streaming;
        info!("Streaming with {} buffers queued", self.ring.count(SlotState::Queued));
        Ok(())
    }

    /// Take back buffers queued by a failed start.
    fn abort_start(&mut self) {
        if let Err(e) = self.device.stream_off() {
            debug!("Clearing the queue after a failed start: {}", e);
        }
        self.ring.reset();
    }

    /// Stop the stream and reclaim every buffer from the driver.
    #[instrument(skip(self), fields(device = %self.path))]
    pub fn stop_streaming(&mut self) -> Result<(), CaptureError> {
        self.require(SessionState::Streaming)?;
        self.device
            .stream_off()
            .map_err(|e| CaptureError::StreamTransition {
                transition: "off",
                source: e,
            })?;

        // Stream-off normally returns every buffer; anything still reported
        // is collected here, at most once per queued slot.
        let mut drained = 0;
        for _ in 0..self.ring.count(SlotState::Queued) {
            match self.device.dequeue_buffer() {
                Ok(_) => drained += 1,
                Err(_) => break,
            }
        }
        if drained > 0 {
            debug!("Drained {} buffers after stream off", drained);
        }

        self.ring.reset();
        self.state = SessionState::Initialized;
        info!("Stream stopped after {} frames", self.delivered);
        Ok(())
    }

    /// Unmap the buffer ring and forget the negotiated mode.
    #[instrument(skip(self), fields(device = %self.path))]
    pub fn uninit(&mut self) -> Result<(), CaptureError> {
        self.require(SessionState::Initialized)?;
        if let Err(e) = self.device.release_buffers() {
            warn!("Releasing buffers failed: {}", e);
        }
        self.ring = BufferRing::new(0);
        self.scratch = Vec::new();
        self.stream = None;
        self.state = SessionState::Closed;
        Ok(())
    }

    /// Stop and tear down whatever is active, then drop the device.
    pub fn close(mut self) -> Result<(), CaptureError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), CaptureError> {
        if self.state == SessionState::Streaming {
            self.stop_streaming()?;
        }
        if self.state == SessionState::Initialized {
            self.uninit()?;
        }
        Ok(())
    }

    /// Dequeue one frame, convert it into `dst` as YUYV and requeue the buffer.
    ///
    /// Blocks until the device delivers. Bad frames, short destinations and
    /// transient dequeue errors come back as [`FrameStatus::Dropped`]; only
    /// misuse and persistent dequeue failure are errors.
    pub fn grab_frame(&mut self, dst: &mut [u8]) -> Result<FrameStatus, CaptureError> {
        self.require(SessionState::Streaming)?;
        self.requeue_pending()?;

        let buffer = match self.device.dequeue_buffer() {
            Ok(buffer) => {
                self.dequeue_failures = 0;
                buffer
            }
            Err(e) => {
                self.dequeue_failures += 1;
                if self.dequeue_failures >= self.options.max_dequeue_failures {
                    return Err(CaptureError::DequeueFailure {
                        failures: self.dequeue_failures,
                        source: e,
                    });
                }
                return Ok(self.dropped(DropReason::Dequeue(e)));
            }
        };
        self.ring.mark_dequeued(buffer.index)?;

        let status = match self.deliver(&buffer, dst) {
            Ok(info) => {
                metrics::counter!("camgrab_frames_delivered").increment(1);
                FrameStatus::Delivered(info)
            }
            Err(reason) => self.dropped(reason),
        };

        self.requeue_pending()?;
        Ok(status)
    }

    fn dropped(&self, reason: DropReason) -> FrameStatus {
        warn!("Dropped frame: {}", reason);
        metrics::counter!("camgrab_frames_dropped", "reason" => reason.label()).increment(1);
        FrameStatus::Dropped(reason)
    }

    /// Hand every dequeued slot back to the driver.
    ///
    /// A slot the driver refuses stays dequeued and is retried on the next
    /// grab. Running out of queued slots altogether is fatal.
    fn requeue_pending(&mut self) -> Result<(), CaptureError> {
        let mut last_error = None;
        for index in self.ring.indices(SlotState::Dequeued) {
            match self.device.queue_buffer(index) {
                Ok(()) => self.ring.mark_queued(index)?,
                Err(e) => {
                    warn!("Requeue of buffer {} failed: {}", index, e);
                    last_error = Some(e);
                }
            }
        }
        match last_error {
            Some(e) if self.ring.count(SlotState::Queued) == 0 => {
                Err(CaptureError::StreamTransition {
                    transition: "requeue",
                    source: e,
                })
            }
            _ => Ok(()),
        }
    }

    fn deliver(&mut self, buffer: &DequeuedBuffer, dst: &mut [u8]) -> Result<FrameInfo, DropReason> {
        let Some(stream) = self.stream else {
            return Err(DropReason::Unmapped {
                index: buffer.index,
            });
        };
        let required = stream.output_frame_size();
        if dst.len() < required {
            return Err(DropReason::DestinationTooSmall {
                required,
                available: dst.len(),
            });
        }

        let mapped = self
            .device
            .buffer(buffer.index)
            .ok_or(DropReason::Unmapped {
                index: buffer.index,
            })?;
        let out = stream.output();
        let dst_stride = out.width as usize * 2;
        let started = Instant::now();

        match stream.wire {
            WireFormat::Compressed(_) => {
                if buffer.bytes_used <= EMPTY_FRAME_BYTES {
                    return Err(DropReason::Empty {
                        bytes_used: buffer.bytes_used,
                    });
                }
                let data = &mapped[..buffer.bytes_used.min(mapped.len())];
                jpeg::decode_to_yuyv(data, dst, dst_stride, out.width, out.height)
                    .map_err(DropReason::Decode)?;
            }
            wire => {
                let src = mapped.get(stream.source_offset()..).unwrap_or_default();
                let geometry = Geometry::new(
                    out.width as usize,
                    out.height as usize,
                    stream.bytes_per_line as usize,
                    dst_stride,
                )
                .with_src_rows(stream.capture.height as usize);
                convert::to_yuyv(wire, src, dst, geometry, &mut self.scratch)
                    .map_err(DropReason::Convert)?;
            }
        }
        metrics::histogram!("camgrab_convert_time_us").record(started.elapsed().as_micros() as f64);

        let info = FrameInfo {
            sequence: self.delivered,
            device_sequence: buffer.sequence,
            bytes_used: buffer.bytes_used,
            width: out.width,
            height: out.height,
            timestamp: buffer.timestamp,
        };
        self.delivered += 1;
        Ok(info)
    }
}

impl<D: CaptureDevice> Drop for CaptureSession<D> {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!("Closing {} failed: {}", self.path, e);
        }
    }
}

/// Raise implausible stride and image size reports to their minimum.
fn sanitize(wire: WireFormat, mut format: PixFormat) -> PixFormat {
    let min_stride = wire.min_stride(format.width);
    if format.bytes_per_line < min_stride {
        warn!(
            "Driver reported stride {} for {} wide {}, using {}",
            format.bytes_per_line, format.width, wire, min_stride
        );
        format.bytes_per_line = min_stride;
    }
    if !wire.is_compressed() {
        let min_image = format.bytes_per_line.saturating_mul(format.height);
        if format.size_image < min_image {
            warn!(
                "Driver reported image size {}, using {}",
                format.size_image, min_image
            );
            format.size_image = min_image;
        }
    }
    format
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::frame::PackedYuv;
    use crate::device::mock::{SimulatedDevice, SimulatedMode};
    use crate::device::DeviceCapabilities;

    fn session(modes: Vec<SimulatedMode>) -> CaptureSession<SimulatedDevice> {
        CaptureSession::from_device(SimulatedDevice::new(modes), "/dev/sim0").unwrap()
    }

    #[test]
    fn open_requires_capture_capability() {
        let device = SimulatedDevice::new(vec![SimulatedMode::yuyv(640, 480, &[30])])
            .with_capabilities(DeviceCapabilities {
                video_capture: false,
                streaming: true,
                ..Default::default()
            });
        let err = CaptureSession::from_device(device, "/dev/sim0").err().unwrap();
        assert!(matches!(err, CaptureError::DeviceUnavailable { .. }));
    }

    #[test]
    fn lifecycle_follows_state_machine() {
        let mut session = session(vec![SimulatedMode::yuyv(64, 48, &[30])]);
        assert!(matches!(
            session.start_streaming(),
            Err(CaptureError::InvalidState { .. })
        ));
        assert_eq!(session.init(64, 48, 30).unwrap(), SurfaceSize::new(64, 48));
        assert!(session.refresh_catalog().is_err());
        session.start_streaming().unwrap();
        assert_eq!(session.ring().count(SlotState::Queued), 4);
        assert!(matches!(
            session.uninit(),
            Err(CaptureError::InvalidState { .. })
        ));
        session.stop_streaming().unwrap();
        assert_eq!(session.ring().count(SlotState::Free), 4);
        session.uninit().unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(
            session.device().calls(),
            &[
                "set_format",
                "set_frame_rate",
                "request_buffers",
                "stream_on",
                "stream_off",
                "release_buffers"
            ]
        );
    }

    #[test]
    fn failed_stream_on_keeps_state() {
        let mut session = session(vec![SimulatedMode::yuyv(64, 48, &[30])]);
        session.init(64, 48, 30).unwrap();
        session.device_mut().fail_stream_on(true);
        assert!(matches!(
            session.start_streaming(),
            Err(CaptureError::StreamTransition { transition: "on", .. })
        ));
        assert_eq!(session.state(), SessionState::Initialized);
        assert_eq!(session.ring().count(SlotState::Free), 4);

        session.device_mut().fail_stream_on(false);
        session.start_streaming().unwrap();
    }

    #[test]
    fn buffer_setup_failure_leaves_session_closed() {
        let mut session = session(vec![SimulatedMode::yuyv(64, 48, &[30])]);
        session.device_mut().fail_request_buffers(true);
        assert!(matches!(
            session.init(64, 48, 30),
            Err(CaptureError::BufferSetup(_))
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(session.device().calls().last(), Some(&"release_buffers"));
    }

    #[test]
    fn refused_frame_rate_is_not_fatal() {
        let mut session = session(vec![SimulatedMode::yuyv(64, 48, &[30])]);
        session.device_mut().refuse_frame_rate(true);
        session.init(64, 48, 30).unwrap();
        assert_eq!(session.geometry().unwrap().fps, 30);
    }

    #[test]
    fn cropped_yuyv_starts_at_offset() {
        let mut session = session(vec![SimulatedMode::yuyv(16, 8, &[30])]);
        assert_eq!(session.init(8, 4, 30).unwrap(), SurfaceSize::new(8, 4));
        let geometry = *session.geometry().unwrap();
        assert_eq!(geometry.wire, WireFormat::Packed(PackedYuv::Yuyv));
        assert_eq!((geometry.crop.x, geometry.crop.y), (4, 2));
        assert_eq!(geometry.source_offset(), 2 * 32 + 4 * 2);

        session.start_streaming().unwrap();
        let mut dst = vec![0u8; 8 * 4 * 2];
        let status = session.grab_frame(&mut dst).unwrap();
        assert!(status.is_delivered());
        // Pattern byte is x + 3y of the capture buffer.
        assert_eq!(dst[0], (8 + 3 * 2) as u8);
        assert_eq!(dst[16], (8 + 3 * 3) as u8);
    }

    #[test]
    fn persistent_dequeue_failure_escalates() {
        let mut session = session(vec![SimulatedMode::yuyv(16, 8, &[30])]).with_options(
            SessionOptions {
                buffer_count: 2,
                max_dequeue_failures: 3,
            },
        );
        session.init(16, 8, 30).unwrap();
        session.start_streaming().unwrap();
        session.device_mut().fail_dequeues(3);

        let mut dst = vec![0u8; 16 * 8 * 2];
        for _ in 0..2 {
            let status = session.grab_frame(&mut dst).unwrap();
            assert!(matches!(status, FrameStatus::Dropped(DropReason::Dequeue(_))));
        }
        assert!(matches!(
            session.grab_frame(&mut dst),
            Err(CaptureError::DequeueFailure { failures: 3, .. })
        ));
        assert!(session.grab_frame(&mut dst).unwrap().is_delivered());
    }

    #[test]
    fn sanitize_raises_short_reports() {
        let wire = WireFormat::Packed(PackedYuv::Yuyv);
        let format = PixFormat {
            fourcc: wire.fourcc(),
            width: 320,
            height: 240,
            bytes_per_line: 100,
            size_image: 0,
        };
        let fixed = sanitize(wire, format);
        assert_eq!(fixed.bytes_per_line, 640);
        assert_eq!(fixed.size_image, 640 * 240);
    }

    #[test]
    fn sanitize_saturates_absurd_reports() {
        let wire = WireFormat::Packed(PackedYuv::Yuyv);
        let format = PixFormat {
            fourcc: wire.fourcc(),
            width: u32::MAX / 2,
            height: 2,
            bytes_per_line: u32::MAX,
            size_image: 16,
        };
        let fixed = sanitize(wire, format);
        assert_eq!(fixed.bytes_per_line, u32::MAX);
        assert_eq!(fixed.size_image, u32::MAX);
    }

    #[test]
    fn odd_width_is_refused_before_touching_the_device() {
        let mut session = session(vec![SimulatedMode::yuyv(64, 48, &[30])]);
        let err = session.init(63, 48, 30).unwrap_err();
        assert!(matches!(
            err,
            CaptureError::NoAcceptableMode { width: 63, height: 48, fps: 30, .. }
        ));
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.device().calls().is_empty());
        assert_eq!(session.init(64, 48, 30).unwrap(), SurfaceSize::new(64, 48));
    }
}
