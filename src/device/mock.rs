//! In-memory capture device
//!
//! Behaves like a well-mannered V4L2 driver: advertises a fixed set of modes,
//! clamps format requests to the nearest one, and fills queued buffers from a
//! frame source when they are dequeued. Dequeue never blocks; an empty queue
//! is reported as `WouldBlock`.

use std::collections::VecDeque;
use std::io;
use std::time::Duration;

use v4l::FourCC;

use super::{
    CaptureDevice, DequeuedBuffer, DeviceCapabilities, Interval, IntervalSpec, PixFormat, SizeSpec,
};
use crate::capture::catalog::SurfaceSize;
use crate::capture::frame::{Compression, PackedYuv, PlanarYuv, WireFormat};

/// One advertised (format, size) pair with its frame rates
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedMode {
    pub fourcc: FourCC,
    pub size: SurfaceSize,
    pub fps: Vec<u32>,
}

impl SimulatedMode {
    pub fn new(format: WireFormat, width: u32, height: u32, fps: &[u32]) -> Self {
        Self {
            fourcc: format.fourcc(),
            size: SurfaceSize::new(width, height),
            fps: fps.to_vec(),
        }
    }

    pub fn yuyv(width: u32, height: u32, fps: &[u32]) -> Self {
        Self::new(WireFormat::Packed(PackedYuv::Yuyv), width, height, fps)
    }

    pub fn mjpeg(width: u32, height: u32, fps: &[u32]) -> Self {
        Self::new(WireFormat::Compressed(Compression::Mjpeg), width, height, fps)
    }
}

/// Format and sequence of the frame being produced
#[derive(Debug, Clone, Copy)]
pub struct FrameRequest {
    pub format: PixFormat,
    pub sequence: u32,
}

/// Fills a buffer for a request and returns the bytes used.
pub type FrameSource = Box<dyn FnMut(&FrameRequest, &mut [u8]) -> usize + Send>;

/// Deterministic fill: byte `x` of row `y` is `x + 3y` (mod 256).
pub fn test_pattern(request: &FrameRequest, buf: &mut [u8]) -> usize {
    let stride = request.format.bytes_per_line.max(1) as usize;
    for (i, byte) in buf.iter_mut().enumerate() {
        let (y, x) = (i / stride, i % stride);
        *byte = (x + 3 * y) as u8;
    }
    buf.len()
}

#[derive(Debug, Default)]
struct Faults {
    stream_on: bool,
    request_buffers: bool,
    frame_rate: bool,
    dequeues: u32,
}

pub struct SimulatedDevice {
    capabilities: DeviceCapabilities,
    modes: Vec<SimulatedMode>,
    stepwise: bool,
    row_padding: u32,
    format: Option<PixFormat>,
    fps: u32,
    buffers: Vec<Vec<u8>>,
    queued: VecDeque<usize>,
    streaming: bool,
    sequence: u32,
    source: FrameSource,
    faults: Faults,
    calls: Vec<&'static str>,
}

impl SimulatedDevice {
    pub fn new(modes: Vec<SimulatedMode>) -> Self {
        Self {
            capabilities: DeviceCapabilities {
                driver: "simulated".into(),
                card: "Simulated Camera".into(),
                bus: "virtual".into(),
                video_capture: true,
                streaming: true,
            },
            modes,
            stepwise: false,
            row_padding: 0,
            format: None,
            fps: 0,
            buffers: Vec::new(),
            queued: VecDeque::new(),
            streaming: false,
            sequence: 0,
            source: Box::new(test_pattern),
            faults: Faults::default(),
            calls: Vec::new(),
        }
    }

    /// Report every format's sizes as one stepwise range instead of discrete entries.
    pub fn stepwise(mut self) -> Self {
        self.stepwise = true;
        self
    }

    /// Pad every row by `bytes` beyond the minimum stride.
    pub fn with_row_padding(mut self, bytes: u32) -> Self {
        self.row_padding = bytes;
        self
    }

    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_frame_source<F>(mut self, source: F) -> Self
    where
        F: FnMut(&FrameRequest, &mut [u8]) -> usize + Send + 'static,
    {
        self.source = Box::new(source);
        self
    }

    /// Cycle through fixed payloads, e.g. pre-encoded JPEG frames.
    pub fn with_payloads(self, payloads: Vec<Vec<u8>>) -> Self {
        let mut next = 0;
        self.with_frame_source(move |_, buf| {
            let Some(payload) = payloads.get(next % payloads.len().max(1)) else {
                return 0;
            };
            next += 1;
            let len = payload.len().min(buf.len());
            buf[..len].copy_from_slice(&payload[..len]);
            len
        })
    }

    pub fn fail_stream_on(&mut self, fail: bool) {
        self.faults.stream_on = fail;
    }

    pub fn fail_request_buffers(&mut self, fail: bool) {
        self.faults.request_buffers = fail;
    }

    pub fn refuse_frame_rate(&mut self, refuse: bool) {
        self.faults.frame_rate = refuse;
    }

    /// The next `count` dequeues fail.
    pub fn fail_dequeues(&mut self, count: u32) {
        self.faults.dequeues = count;
    }

    /// Control calls received, in order.
    pub fn calls(&self) -> &[&'static str] {
        &self.calls
    }

    pub fn queued_count(&self) -> usize {
        self.queued.len()
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    pub fn frame_rate(&self) -> u32 {
        self.fps
    }

    fn modes_for(&self, fourcc: FourCC) -> impl Iterator<Item = &SimulatedMode> {
        self.modes.iter().filter(move |mode| mode.fourcc == fourcc)
    }

    fn resolve(&self, request: &PixFormat) -> io::Result<PixFormat> {
        let nearest = self
            .modes_for(request.fourcc)
            .min_by_key(|mode| {
                mode.size.width.abs_diff(request.width) + mode.size.height.abs_diff(request.height)
            })
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("format {} not supported", request.fourcc),
                )
            })?;

        let size = nearest.size;
        let (bytes_per_line, size_image) = match WireFormat::from_fourcc(request.fourcc) {
            Some(WireFormat::Compressed(_)) | None => (0, size.width * size.height * 2),
            Some(wire) => {
                let stride = wire.min_stride(size.width) + self.row_padding;
                let rows = match wire {
                    WireFormat::Planar(PlanarYuv::Nv16 | PlanarYuv::Nv61) => size.height * 2,
                    WireFormat::Planar(_) => size.height * 3 / 2,
                    _ => size.height,
                };
                (stride, stride * rows)
            }
        };

        Ok(PixFormat {
            fourcc: request.fourcc,
            width: size.width,
            height: size.height,
            bytes_per_line,
            size_image,
        })
    }
}

impl CaptureDevice for SimulatedDevice {
    fn query_capabilities(&self) -> io::Result<DeviceCapabilities> {
        Ok(self.capabilities.clone())
    }

    fn enumerate_pixel_formats(&self) -> io::Result<Vec<FourCC>> {
        let mut formats: Vec<FourCC> = Vec::new();
        for mode in &self.modes {
            if !formats.contains(&mode.fourcc) {
                formats.push(mode.fourcc);
            }
        }
        Ok(formats)
    }

    fn enumerate_frame_sizes(&self, fourcc: FourCC) -> io::Result<Vec<SizeSpec>> {
        if self.stepwise {
            let sizes: Vec<SurfaceSize> = self.modes_for(fourcc).map(|m| m.size).collect();
            let (Some(min), Some(max)) = (sizes.iter().min(), sizes.iter().max()) else {
                return Ok(Vec::new());
            };
            return Ok(vec![SizeSpec::Stepwise {
                min: *min,
                max: *max,
                step: SurfaceSize::new(1, 1),
            }]);
        }

        let mut specs = Vec::new();
        for mode in self.modes_for(fourcc) {
            let spec = SizeSpec::Discrete(mode.size);
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }

    fn enumerate_frame_intervals(
        &self,
        fourcc: FourCC,
        width: u32,
        height: u32,
    ) -> io::Result<Vec<IntervalSpec>> {
        let size = SurfaceSize::new(width, height);
        Ok(self
            .modes_for(fourcc)
            .filter(|mode| mode.size == size)
            .flat_map(|mode| mode.fps.iter())
            .map(|&fps| {
                IntervalSpec::Discrete(Interval {
                    numerator: 1,
                    denominator: fps,
                })
            })
            .collect())
    }

    fn try_format(&self, format: &PixFormat) -> io::Result<PixFormat> {
        self.resolve(format)
    }

    fn set_format(&mut self, format: &PixFormat) -> io::Result<PixFormat> {
        self.calls.push("set_format");
        if !self.buffers.is_empty() {
            return Err(io::Error::other("buffers allocated, device busy"));
        }
        let actual = self.resolve(format)?;
        self.format = Some(actual);
        Ok(actual)
    }

    fn format(&self) -> io::Result<PixFormat> {
        self.format
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, "no format set"))
    }

    fn set_frame_rate(&mut self, fps: u32) -> io::Result<u32> {
        self.calls.push("set_frame_rate");
        if self.faults.frame_rate {
            return Err(io::Error::other("frame rate refused"));
        }
        self.fps = fps;
        Ok(fps)
    }

    fn request_buffers(&mut self, count: u32) -> io::Result<usize> {
        self.calls.push("request_buffers");
        if self.faults.request_buffers {
            return Err(io::Error::new(io::ErrorKind::OutOfMemory, "no buffer memory"));
        }
        let format = self.format()?;
        let len = format.size_image as usize;
        self.buffers = (0..count).map(|_| vec![0; len]).collect();
        Ok(self.buffers.len())
    }

    fn release_buffers(&mut self) -> io::Result<()> {
        self.calls.push("release_buffers");
        self.buffers.clear();
        self.queued.clear();
        Ok(())
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(Vec::as_slice)
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.calls.push("stream_on");
        if self.faults.stream_on {
            return Err(io::Error::other("stream on refused"));
        }
        if self.buffers.is_empty() {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "no buffers"));
        }
        self.streaming = true;
        Ok(())
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.calls.push("stream_off");
        self.streaming = false;
        self.queued.clear();
        Ok(())
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        if self.faults.dequeues > 0 {
            self.faults.dequeues -= 1;
            return Err(io::Error::other("simulated dequeue failure"));
        }
        if !self.streaming {
            return Err(io::Error::new(io::ErrorKind::InvalidInput, "not streaming"));
        }
        let index = self
            .queued
            .pop_front()
            .ok_or_else(|| io::Error::new(io::ErrorKind::WouldBlock, "no buffer queued"))?;

        let request = FrameRequest {
            format: self.format()?,
            sequence: self.sequence,
        };
        let buffer = &mut self.buffers[index];
        let bytes_used = (self.source)(&request, buffer).min(buffer.len());
        let sequence = self.sequence;
        self.sequence = self.sequence.wrapping_add(1);

        Ok(DequeuedBuffer {
            index,
            bytes_used,
            sequence,
            timestamp: Some(Duration::from_millis(u64::from(sequence) * 33)),
        })
    }

    fn queue_buffer(&mut self, index: usize) -> io::Result<()> {
        if index >= self.buffers.len() || self.queued.contains(&index) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer {index} cannot be queued"),
            ));
        }
        self.queued.push_back(index);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_clamp_to_nearest_mode() {
        let device = SimulatedDevice::new(vec![
            SimulatedMode::yuyv(640, 480, &[30]),
            SimulatedMode::yuyv(320, 240, &[30]),
        ]);
        let fourcc = WireFormat::Packed(PackedYuv::Yuyv).fourcc();
        let actual = device
            .try_format(&PixFormat::request(fourcc, 600, 400))
            .unwrap();
        assert_eq!(actual.size(), SurfaceSize::new(640, 480));
        assert_eq!(actual.bytes_per_line, 1280);
        assert!(device
            .try_format(&PixFormat::request(FourCC::new(b"NV12"), 640, 480))
            .is_err());
    }

    #[test]
    fn dequeue_follows_queue_order() {
        let mut device = SimulatedDevice::new(vec![SimulatedMode::yuyv(4, 2, &[30])]);
        let fourcc = WireFormat::Packed(PackedYuv::Yuyv).fourcc();
        device.set_format(&PixFormat::request(fourcc, 4, 2)).unwrap();
        assert_eq!(device.request_buffers(2).unwrap(), 2);
        device.queue_buffer(1).unwrap();
        device.queue_buffer(0).unwrap();
        assert!(device.queue_buffer(0).is_err());
        device.stream_on().unwrap();
        assert_eq!(device.dequeue_buffer().unwrap().index, 1);
        assert_eq!(device.dequeue_buffer().unwrap().index, 0);
        assert_eq!(
            device.dequeue_buffer().unwrap_err().kind(),
            io::ErrorKind::WouldBlock
        );
        assert_eq!(device.buffer(0).unwrap()[8], 3);
    }
}
