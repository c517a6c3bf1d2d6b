use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use v4l::FourCC;

/// Converted frame handed from the capture worker to the consumer
#[derive(Clone)]
pub struct Frame {
    /// Immutable frame data - can be shared across threads without copying
    pub data: Bytes,

    /// Frame metadata
    pub meta: Arc<FrameMetadata>,

    /// Time the frame left `grab_frame`, for latency tracking
    pub timestamp: Instant,
}

/// Frame metadata
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub sequence: u64,
    pub width: u32,
    pub height: u32,
    pub stride: u32,
    pub format: OutputFormat,
    pub device_timestamp: Option<Duration>, // Driver timestamp if available
}

/// Byte order of packed 4:2:2 YUV
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PackedYuv {
    Yuyv,
    Yvyu,
    Uyvy,
    Yyuv,
}

/// Planar and semiplanar YUV layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlanarYuv {
    /// I420: Y, U, V planes, 4:2:0
    Yuv420,
    /// YV12: Y, V, U planes, 4:2:0
    Yvu420,
    Nv12,
    Nv21,
    Nv16,
    Nv61,
}

/// Sunplus SPCA5xx two-line signed YUV blocks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpcaLayout {
    /// Y0 | U | Y1 | V
    Spca501,
    /// Y0 | Y1 | U | V
    Spca505,
    /// Y0 | U | V | Y1
    Spca508,
}

/// Colour of the top-left 2x2 Bayer cell, read row-major
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BayerPattern {
    Gbrg,
    Grbg,
    Bggr,
    Rggb,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RgbOrder {
    Rgb,
    Bgr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Compression {
    Mjpeg,
    Jpeg,
}

/// Pixel layout a capture device delivers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireFormat {
    Packed(PackedYuv),
    Spca(SpcaLayout),
    Planar(PlanarYuv),
    /// Packed 4:1:1, 12 bytes per 8 pixels
    Y41p,
    Bayer(BayerPattern),
    Rgb(RgbOrder),
    Compressed(Compression),
    Grey,
    /// 16-bit little-endian luma
    Y16,
}

/// Static properties of a wire format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatTraits {
    /// Bytes per pixel for formats with a regular per-pixel stride, 0 otherwise
    pub bytes_per_pixel: u32,
    /// A sub-rectangle can be addressed by offset and stride alone
    pub crop_safe: bool,
}

impl WireFormat {
    /// Negotiation order, most directly consumable first.
    pub const PRIORITY: [WireFormat; 24] = [
        WireFormat::Packed(PackedYuv::Yuyv),
        WireFormat::Packed(PackedYuv::Yvyu),
        WireFormat::Packed(PackedYuv::Uyvy),
        WireFormat::Packed(PackedYuv::Yyuv),
        WireFormat::Spca(SpcaLayout::Spca501),
        WireFormat::Spca(SpcaLayout::Spca505),
        WireFormat::Spca(SpcaLayout::Spca508),
        WireFormat::Planar(PlanarYuv::Yuv420),
        WireFormat::Planar(PlanarYuv::Yvu420),
        WireFormat::Planar(PlanarYuv::Nv12),
        WireFormat::Planar(PlanarYuv::Nv21),
        WireFormat::Planar(PlanarYuv::Nv16),
        WireFormat::Planar(PlanarYuv::Nv61),
        WireFormat::Y41p,
        WireFormat::Bayer(BayerPattern::Gbrg),
        WireFormat::Bayer(BayerPattern::Grbg),
        WireFormat::Bayer(BayerPattern::Bggr),
        WireFormat::Bayer(BayerPattern::Rggb),
        WireFormat::Rgb(RgbOrder::Bgr),
        WireFormat::Rgb(RgbOrder::Rgb),
        WireFormat::Compressed(Compression::Mjpeg),
        WireFormat::Compressed(Compression::Jpeg),
        WireFormat::Grey,
        WireFormat::Y16,
    ];

    pub fn traits(self) -> FormatTraits {
        let (bytes_per_pixel, crop_safe) = match self {
            WireFormat::Packed(_) => (2, true),
            WireFormat::Spca(_) => (2, false),
            WireFormat::Planar(_) | WireFormat::Y41p => (0, false),
            WireFormat::Bayer(_) => (0, false),
            WireFormat::Rgb(_) => (3, true),
            WireFormat::Compressed(_) => (0, false),
            WireFormat::Grey => (1, true),
            WireFormat::Y16 => (2, true),
        };
        FormatTraits {
            bytes_per_pixel,
            crop_safe,
        }
    }

    pub fn is_compressed(self) -> bool {
        matches!(self, WireFormat::Compressed(_))
    }

    pub fn fourcc(self) -> FourCC {
        FourCC::new(self.code())
    }

    pub fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        Self::PRIORITY
            .iter()
            .copied()
            .find(|format| format.code() == &fourcc.repr)
    }

    fn code(self) -> &'static [u8; 4] {
        match self {
            WireFormat::Packed(PackedYuv::Yuyv) => b"YUYV",
            WireFormat::Packed(PackedYuv::Yvyu) => b"YVYU",
            WireFormat::Packed(PackedYuv::Uyvy) => b"UYVY",
            WireFormat::Packed(PackedYuv::Yyuv) => b"YYUV",
            WireFormat::Spca(SpcaLayout::Spca501) => b"S501",
            WireFormat::Spca(SpcaLayout::Spca505) => b"S505",
            WireFormat::Spca(SpcaLayout::Spca508) => b"S508",
            WireFormat::Planar(PlanarYuv::Yuv420) => b"YU12",
            WireFormat::Planar(PlanarYuv::Yvu420) => b"YV12",
            WireFormat::Planar(PlanarYuv::Nv12) => b"NV12",
            WireFormat::Planar(PlanarYuv::Nv21) => b"NV21",
            WireFormat::Planar(PlanarYuv::Nv16) => b"NV16",
            WireFormat::Planar(PlanarYuv::Nv61) => b"NV61",
            WireFormat::Y41p => b"Y41P",
            WireFormat::Bayer(BayerPattern::Gbrg) => b"GBRG",
            WireFormat::Bayer(BayerPattern::Grbg) => b"GRBG",
            WireFormat::Bayer(BayerPattern::Bggr) => b"BA81",
            WireFormat::Bayer(BayerPattern::Rggb) => b"RGGB",
            WireFormat::Rgb(RgbOrder::Bgr) => b"BGR3",
            WireFormat::Rgb(RgbOrder::Rgb) => b"RGB3",
            WireFormat::Compressed(Compression::Mjpeg) => b"MJPG",
            WireFormat::Compressed(Compression::Jpeg) => b"JPEG",
            WireFormat::Grey => b"GREY",
            WireFormat::Y16 => b"Y16 ",
        }
    }

    /// Smallest sane bytes-per-line for a row of `width` pixels.
    pub fn min_stride(self, width: u32) -> u32 {
        match self {
            WireFormat::Planar(_) | WireFormat::Bayer(_) | WireFormat::Spca(_) => width,
            WireFormat::Y41p => width / 8 * 12,
            WireFormat::Compressed(_) => 0,
            other => width.saturating_mul(other.traits().bytes_per_pixel),
        }
    }
}

impl fmt::Display for WireFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let code = self.code();
        write!(f, "{}", String::from_utf8_lossy(code).trim_end())
    }
}

/// Layouts the consumer can ask the second conversion pass for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Yuyv,
    /// Y plane then interleaved V/U, 4:2:0
    Nv21,
    /// Y plane then interleaved U/V, 4:2:0
    Nv12,
    /// Y plane then interleaved U/V, 4:2:2
    Nv16,
    /// Y, V, U planes with 16-byte aligned chroma stride
    Yv12,
    I420,
    /// Y, V, U planes, 4:2:2
    Yv16,
    Rgb24,
    Bgr24,
    Rgb32,
    Bgr32,
    Rgb565,
    Bgr565,
}

impl OutputFormat {
    /// Bytes per row of the (first) plane.
    pub fn stride(self, width: usize) -> usize {
        match self {
            OutputFormat::Yuyv | OutputFormat::Rgb565 | OutputFormat::Bgr565 => width * 2,
            OutputFormat::Rgb24 | OutputFormat::Bgr24 => width * 3,
            OutputFormat::Rgb32 | OutputFormat::Bgr32 => width * 4,
            _ => width,
        }
    }

    /// Total bytes for a tightly strided frame.
    pub fn frame_size(self, width: usize, height: usize) -> usize {
        let luma = width * height;
        match self {
            OutputFormat::Nv21 | OutputFormat::Nv12 | OutputFormat::I420 => luma + luma / 2,
            OutputFormat::Yv12 => luma + yv12_chroma_stride(width) * height,
            OutputFormat::Nv16 | OutputFormat::Yv16 => luma * 2,
            other => other.stride(width) * height,
        }
    }
}

/// YV12 chroma rows are half the luma stride rounded up to 16 bytes.
pub fn yv12_chroma_stride(luma_stride: usize) -> usize {
    (luma_stride / 2 + 15) & !15
}
