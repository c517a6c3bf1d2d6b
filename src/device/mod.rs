//! Capture device abstraction
//!
//! [`CaptureDevice`] is the control surface the pipeline drives: capability
//! query, mode enumeration, format negotiation and the mmap buffer ring.
//! [`V4l2Device`] talks to a kernel driver; [`SimulatedDevice`] is an
//! in-memory stand-in for tests and dry runs.

pub mod mock;
pub mod v4l2;

use std::io;
use std::time::Duration;

use v4l::FourCC;

use crate::capture::catalog::SurfaceSize;

pub use mock::SimulatedDevice;
pub use v4l2::V4l2Device;

/// What the driver reports about itself
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeviceCapabilities {
    pub driver: String,
    pub card: String,
    pub bus: String,
    pub video_capture: bool,
    pub streaming: bool,
}

/// One frame-size entry for a pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizeSpec {
    Discrete(SurfaceSize),
    /// Continuous ranges are reported with a step of 1
    Stepwise {
        min: SurfaceSize,
        max: SurfaceSize,
        step: SurfaceSize,
    },
}

/// Frame interval in seconds, as a fraction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub numerator: u32,
    pub denominator: u32,
}

impl Interval {
    /// Frames per second, rounded to nearest. A zero numerator yields the denominator.
    pub fn fps(self) -> u32 {
        if self.numerator == 0 {
            return self.denominator;
        }
        (self.denominator + self.numerator / 2) / self.numerator
    }
}

/// One frame-interval entry for a (format, size) pair
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntervalSpec {
    Discrete(Interval),
    Stepwise {
        min: Interval,
        max: Interval,
        step: Interval,
    },
}

/// Single-planar capture format as seen by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    pub fourcc: FourCC,
    pub width: u32,
    pub height: u32,
    pub bytes_per_line: u32,
    pub size_image: u32,
}

impl PixFormat {
    /// A request; the driver fills in stride and image size.
    pub fn request(fourcc: FourCC, width: u32, height: u32) -> Self {
        Self {
            fourcc,
            width,
            height,
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    pub fn size(&self) -> SurfaceSize {
        SurfaceSize::new(self.width, self.height)
    }
}

/// A filled buffer handed back by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DequeuedBuffer {
    pub index: usize,
    pub bytes_used: usize,
    pub sequence: u32,
    pub timestamp: Option<Duration>,
}

/// Device control calls, issued in the order: capabilities, enumeration,
/// format negotiation, buffer setup, stream-on, dequeue/queue, stream-off,
/// buffer teardown.
pub trait CaptureDevice: Send {
    fn query_capabilities(&self) -> io::Result<DeviceCapabilities>;

    fn enumerate_pixel_formats(&self) -> io::Result<Vec<FourCC>>;

    fn enumerate_frame_sizes(&self, fourcc: FourCC) -> io::Result<Vec<SizeSpec>>;

    fn enumerate_frame_intervals(
        &self,
        fourcc: FourCC,
        width: u32,
        height: u32,
    ) -> io::Result<Vec<IntervalSpec>>;

    /// Ask what the driver would do with `format` without changing state.
    fn try_format(&self, format: &PixFormat) -> io::Result<PixFormat>;

    fn set_format(&mut self, format: &PixFormat) -> io::Result<PixFormat>;

    fn format(&self) -> io::Result<PixFormat>;

    /// Returns the frame rate the driver settled on.
    fn set_frame_rate(&mut self, fps: u32) -> io::Result<u32>;

    /// Allocate and map `count` buffers; returns how many were granted.
    fn request_buffers(&mut self, count: u32) -> io::Result<usize>;

    /// Unmap every buffer and hand the allocation back to the driver.
    fn release_buffers(&mut self) -> io::Result<()>;

    /// Mapped contents of buffer `index`.
    fn buffer(&self, index: usize) -> Option<&[u8]>;

    fn stream_on(&mut self) -> io::Result<()>;

    fn stream_off(&mut self) -> io::Result<()>;

    /// Blocks until the driver hands back a filled buffer.
    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer>;

    fn queue_buffer(&mut self, index: usize) -> io::Result<()>;
}
