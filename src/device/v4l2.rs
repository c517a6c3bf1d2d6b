//! V4L2 device backend
//!
//! Capability query, enumeration and format/parameter calls go through the
//! `v4l` crate's safe API. The mmap buffer ring uses `v4l::v4l2::ioctl` on the
//! `v4l_sys` structs directly: `MmapStream` only hands out bytes through
//! `next()`, which requeues the previous buffer itself, and its arena is
//! private to the crate. Driving the ring here keeps queue and dequeue
//! separate and every buffer index visible to the caller.

use std::io;
use std::mem;
use std::os::fd::RawFd;
use std::time::Duration;

use libc::{c_int, c_void};
use memmap2::{Mmap, MmapOptions};
use tracing::{debug, info, instrument, warn};
use v4l::buffer::Type as BufType;
use v4l::capability::Flags as CapFlags;
use v4l::frameinterval::FrameIntervalEnum;
use v4l::framesize::FrameSizeEnum;
use v4l::memory::Memory;
use v4l::v4l2::{self, vidioc};
use v4l::v4l_sys::{v4l2_buffer, v4l2_format, v4l2_requestbuffers};
use v4l::video::capture::Parameters;
use v4l::video::Capture;
use v4l::{Device, Format, FourCC};

use super::{
    CaptureDevice, DequeuedBuffer, DeviceCapabilities, Interval, IntervalSpec, PixFormat, SizeSpec,
};
use crate::capture::catalog::SurfaceSize;

/// Kernel V4L2 capture device
pub struct V4l2Device {
    path: String,
    device: Device,
    buffers: Vec<Mmap>,
}

impl V4l2Device {
    pub fn open(path: &str) -> io::Result<Self> {
        let device = Device::with_path(path)?;
        info!("Opened {}", path);
        Ok(Self {
            path: path.to_owned(),
            device,
            buffers: Vec::new(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    fn fd(&self) -> RawFd {
        self.device.handle().fd()
    }

    /// Issue one V4L2 ioctl on `arg`.
    ///
    /// # Safety
    ///
    /// `T` must be the kernel struct `request` is defined over.
    unsafe fn ioctl<T>(&self, request: vidioc::_IOC_TYPE, arg: &mut T) -> io::Result<()> {
        v4l2::ioctl(self.fd(), request, arg as *mut T as *mut c_void)
    }

    /// Map one buffer the driver has allocated.
    fn map_buffer(&self, index: u32) -> io::Result<Mmap> {
        let mut desc = mmap_capture(index);
        // SAFETY: QUERYBUF takes a v4l2_buffer.
        unsafe { self.ioctl(vidioc::VIDIOC_QUERYBUF, &mut desc) }?;

        // SAFETY: `m.offset` is the active union member for MMAP buffers.
        let offset = unsafe { desc.m.offset };
        // SAFETY: the driver keeps the region alive until REQBUFS(0), which
        // `release_buffers` only issues after dropping every mapping.
        unsafe {
            MmapOptions::new()
                .offset(u64::from(offset))
                .len(desc.length as usize)
                .map(self.fd())
        }
    }

    fn request_count(&self, count: u32) -> io::Result<u32> {
        let mut req = v4l2_requestbuffers {
            count,
            type_: BufType::VideoCapture as u32,
            memory: Memory::Mmap as u32,
            // SAFETY: the remaining fields are plain integers.
            ..unsafe { mem::zeroed() }
        };
        // SAFETY: REQBUFS takes a v4l2_requestbuffers.
        unsafe { self.ioctl(vidioc::VIDIOC_REQBUFS, &mut req) }?;
        Ok(req.count)
    }

    fn set_streaming(&self, on: bool) -> io::Result<()> {
        let mut kind = BufType::VideoCapture as c_int;
        let request = if on {
            vidioc::VIDIOC_STREAMON
        } else {
            vidioc::VIDIOC_STREAMOFF
        };
        // SAFETY: STREAMON and STREAMOFF read one int.
        unsafe { self.ioctl(request, &mut kind) }
    }
}

/// An mmap capture buffer descriptor for `index`.
fn mmap_capture(index: u32) -> v4l2_buffer {
    v4l2_buffer {
        index,
        type_: BufType::VideoCapture as u32,
        memory: Memory::Mmap as u32,
        // SAFETY: all-zero is valid for the remaining plain-data fields.
        ..unsafe { mem::zeroed() }
    }
}

impl From<Format> for PixFormat {
    fn from(format: Format) -> Self {
        Self {
            fourcc: format.fourcc,
            width: format.width,
            height: format.height,
            bytes_per_line: format.stride,
            size_image: format.size,
        }
    }
}

impl CaptureDevice for V4l2Device {
    fn query_capabilities(&self) -> io::Result<DeviceCapabilities> {
        let caps = self.device.query_caps()?;
        Ok(DeviceCapabilities {
            driver: caps.driver,
            card: caps.card,
            bus: caps.bus,
            video_capture: caps.capabilities.contains(CapFlags::VIDEO_CAPTURE),
            streaming: caps.capabilities.contains(CapFlags::STREAMING),
        })
    }

    fn enumerate_pixel_formats(&self) -> io::Result<Vec<FourCC>> {
        Ok(self
            .device
            .enum_formats()?
            .into_iter()
            .map(|desc| desc.fourcc)
            .collect())
    }

    fn enumerate_frame_sizes(&self, fourcc: FourCC) -> io::Result<Vec<SizeSpec>> {
        Ok(self
            .device
            .enum_framesizes(fourcc)?
            .into_iter()
            .map(|size| match size.size {
                FrameSizeEnum::Discrete(d) => SizeSpec::Discrete(SurfaceSize::new(d.width, d.height)),
                FrameSizeEnum::Stepwise(s) => SizeSpec::Stepwise {
                    min: SurfaceSize::new(s.min_width, s.min_height),
                    max: SurfaceSize::new(s.max_width, s.max_height),
                    step: SurfaceSize::new(s.step_width, s.step_height),
                },
            })
            .collect())
    }

    fn enumerate_frame_intervals(
        &self,
        fourcc: FourCC,
        width: u32,
        height: u32,
    ) -> io::Result<Vec<IntervalSpec>> {
        let interval = |f: v4l::Fraction| Interval {
            numerator: f.numerator,
            denominator: f.denominator,
        };
        Ok(self
            .device
            .enum_frameintervals(fourcc, width, height)?
            .into_iter()
            .map(|iv| match iv.interval {
                FrameIntervalEnum::Discrete(f) => IntervalSpec::Discrete(interval(f)),
                FrameIntervalEnum::Stepwise(s) => IntervalSpec::Stepwise {
                    min: interval(s.min),
                    max: interval(s.max),
                    step: interval(s.step),
                },
            })
            .collect())
    }

    fn try_format(&self, format: &PixFormat) -> io::Result<PixFormat> {
        // SAFETY: all-zero is a valid v4l2_format.
        let mut raw: v4l2_format = unsafe { mem::zeroed() };
        raw.type_ = BufType::VideoCapture as u32;
        // SAFETY: `pix` is the member used for single-planar capture. A zero
        // field means V4L2_FIELD_ANY.
        let pix = unsafe { &mut raw.fmt.pix };
        pix.width = format.width;
        pix.height = format.height;
        pix.pixelformat = u32::from_le_bytes(format.fourcc.repr);

        // SAFETY: TRY_FMT takes a v4l2_format.
        unsafe { self.ioctl(vidioc::VIDIOC_TRY_FMT, &mut raw) }?;

        // SAFETY: the driver answered in the same member.
        let pix = unsafe { raw.fmt.pix };
        Ok(PixFormat {
            fourcc: FourCC::new(&pix.pixelformat.to_le_bytes()),
            width: pix.width,
            height: pix.height,
            bytes_per_line: pix.bytesperline,
            size_image: pix.sizeimage,
        })
    }

    #[instrument(skip(self))]
    fn set_format(&mut self, format: &PixFormat) -> io::Result<PixFormat> {
        let request = Format::new(format.width, format.height, format.fourcc);
        let actual = self.device.set_format(&request)?;
        debug!("Driver format: {:?}", actual);
        Ok(actual.into())
    }

    fn format(&self) -> io::Result<PixFormat> {
        Ok(self.device.format()?.into())
    }

    fn set_frame_rate(&mut self, fps: u32) -> io::Result<u32> {
        let params = self.device.set_params(&Parameters::with_fps(fps))?;
        let interval = Interval {
            numerator: params.interval.numerator,
            denominator: params.interval.denominator,
        };
        Ok(interval.fps())
    }

    #[instrument(skip(self))]
    fn request_buffers(&mut self, count: u32) -> io::Result<usize> {
        let granted = self.request_count(count)?;
        if granted == 0 {
            return Err(io::Error::new(
                io::ErrorKind::OutOfMemory,
                "driver granted no buffers",
            ));
        }

        let mut mapped = Vec::with_capacity(granted as usize);
        for index in 0..granted {
            match self.map_buffer(index) {
                Ok(map) => mapped.push(map),
                Err(e) => {
                    drop(mapped);
                    if let Err(release) = self.request_count(0) {
                        warn!("Releasing partial buffer set failed: {}", release);
                    }
                    return Err(e);
                }
            }
        }

        debug!("Mapped {} buffers of {} bytes", granted, mapped[0].len());
        self.buffers = mapped;
        Ok(self.buffers.len())
    }

    fn release_buffers(&mut self) -> io::Result<()> {
        self.buffers.clear();
        self.request_count(0).map(|_| ())
    }

    fn buffer(&self, index: usize) -> Option<&[u8]> {
        self.buffers.get(index).map(|map| &map[..])
    }

    fn stream_on(&mut self) -> io::Result<()> {
        self.set_streaming(true)
    }

    fn stream_off(&mut self) -> io::Result<()> {
        self.set_streaming(false)
    }

    fn dequeue_buffer(&mut self) -> io::Result<DequeuedBuffer> {
        let mut desc = mmap_capture(0);
        loop {
            // SAFETY: DQBUF takes a v4l2_buffer. Blocks until the driver fills one.
            match unsafe { self.ioctl(vidioc::VIDIOC_DQBUF, &mut desc) } {
                Ok(()) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let ts = desc.timestamp;
        let timestamp = (ts.tv_sec > 0 || ts.tv_usec > 0).then(|| {
            Duration::from_secs(ts.tv_sec as u64) + Duration::from_micros(ts.tv_usec as u64)
        });

        Ok(DequeuedBuffer {
            index: desc.index as usize,
            bytes_used: desc.bytesused as usize,
            sequence: desc.sequence,
            timestamp,
        })
    }

    fn queue_buffer(&mut self, index: usize) -> io::Result<()> {
        let mut desc = mmap_capture(index as u32);
        // SAFETY: QBUF takes a v4l2_buffer.
        unsafe { self.ioctl(vidioc::VIDIOC_QBUF, &mut desc) }
    }
}

impl Drop for V4l2Device {
    fn drop(&mut self) {
        if !self.buffers.is_empty() {
            if let Err(e) = self.release_buffers() {
                warn!("Releasing buffers of {} failed: {}", self.path, e);
            }
        }
    }
}
