//! Pixel layout conversion
//!
//! Every function here is a pure transform from a source buffer to a
//! destination buffer with explicit strides. YUYV is the pivot layout: wire
//! formats are converted into it by [`to_yuyv`] and consumers convert out of
//! it with [`from_yuyv`].

pub mod bayer;
pub mod packed;
pub mod planar;
pub mod rgb;

use crate::capture::frame::{OutputFormat, RgbOrder, WireFormat};
use crate::error::ConvertError;

pub type Result<T> = std::result::Result<T, ConvertError>;

/// Region and strides of one conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub width: usize,
    pub height: usize,
    /// Bytes per source row (luma row for planar sources)
    pub src_stride: usize,
    /// Bytes per destination row (luma row for planar destinations)
    pub dst_stride: usize,
    /// Luma rows in the source buffer; chroma planes start after them
    pub src_rows: usize,
}

impl Geometry {
    pub fn new(width: usize, height: usize, src_stride: usize, dst_stride: usize) -> Self {
        Self {
            width,
            height,
            src_stride,
            dst_stride,
            src_rows: height,
        }
    }

    /// Source planes are taller than the converted region.
    pub fn with_src_rows(mut self, rows: usize) -> Self {
        self.src_rows = rows.max(self.height);
        self
    }

    pub(crate) fn check_src(&self, src: &[u8], row: usize, rows: usize) -> Result<()> {
        check_plane("source", src.len(), self.src_stride, row, rows)
    }

    pub(crate) fn check_dst(&self, dst: &[u8], row: usize, rows: usize) -> Result<()> {
        check_plane("destination", dst.len(), self.dst_stride, row, rows)
    }

    /// Width and height must be multiples of `x` and `y`.
    pub(crate) fn require_multiple(&self, x: usize, y: usize) -> Result<()> {
        if self.width % x != 0 || self.height % y != 0 {
            return Err(ConvertError::OddDimensions {
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }
}

/// `rows` rows of `row` bytes at `stride` must fit in `len`.
pub(crate) fn check_plane(
    which: &'static str,
    len: usize,
    stride: usize,
    row: usize,
    rows: usize,
) -> Result<()> {
    if rows == 0 || row == 0 {
        return Ok(());
    }
    if stride < row {
        return Err(ConvertError::StrideTooShort { stride, row });
    }
    let needed = stride * (rows - 1) + row;
    if len < needed {
        return Err(ConvertError::BufferTooSmall {
            which,
            needed,
            got: len,
        });
    }
    Ok(())
}

pub(crate) fn check_len(which: &'static str, len: usize, needed: usize) -> Result<()> {
    if len < needed {
        return Err(ConvertError::BufferTooSmall {
            which,
            needed,
            got: len,
        });
    }
    Ok(())
}

#[inline]
pub(crate) fn clamp_u8(v: i32) -> u8 {
    v.clamp(0, 255) as u8
}

/// Convert one frame of `wire` into YUYV.
///
/// `scratch` backs the intermediate RGB image of Bayer sources and is grown
/// on demand.
pub fn to_yuyv(
    wire: WireFormat,
    src: &[u8],
    dst: &mut [u8],
    geometry: Geometry,
    scratch: &mut Vec<u8>,
) -> Result<()> {
    match wire {
        WireFormat::Packed(order) => packed::packed_to_yuyv(order, src, dst, geometry),
        WireFormat::Spca(layout) => planar::spca_to_yuyv(layout, src, dst, geometry),
        WireFormat::Planar(layout) => planar::planar_to_yuyv(layout, src, dst, geometry),
        WireFormat::Y41p => packed::y41p_to_yuyv(src, dst, geometry),
        WireFormat::Bayer(pattern) => {
            let rgb_stride = geometry.width * 3;
            scratch.resize(rgb_stride * geometry.height, 0);
            let demosaic = Geometry {
                dst_stride: rgb_stride,
                ..geometry
            };
            bayer::demosaic(pattern, src, scratch, demosaic)?;
            let pack = Geometry::new(
                geometry.width,
                geometry.height,
                rgb_stride,
                geometry.dst_stride,
            );
            rgb::rgb_to_yuyv(RgbOrder::Rgb, scratch, dst, pack)
        }
        WireFormat::Rgb(order) => rgb::rgb_to_yuyv(order, src, dst, geometry),
        WireFormat::Grey => packed::grey_to_yuyv(src, dst, geometry),
        WireFormat::Y16 => packed::y16_to_yuyv(src, dst, geometry),
        WireFormat::Compressed(_) => Err(ConvertError::UnsupportedSource("compressed")),
    }
}

/// Convert a YUYV frame into `output`.
pub fn from_yuyv(output: OutputFormat, src: &[u8], dst: &mut [u8], geometry: Geometry) -> Result<()> {
    use planar::ChromaPlacement;

    match output {
        OutputFormat::Yuyv => packed::copy_rows(src, dst, geometry, geometry.width * 2),
        OutputFormat::Nv21 => {
            planar::yuyv_to_planar(src, dst, geometry, true, ChromaPlacement::Interleaved { vu: true })
        }
        OutputFormat::Nv12 => {
            planar::yuyv_to_planar(src, dst, geometry, true, ChromaPlacement::Interleaved { vu: false })
        }
        OutputFormat::Nv16 => {
            planar::yuyv_to_planar(src, dst, geometry, false, ChromaPlacement::Interleaved { vu: false })
        }
        OutputFormat::Yv12 => planar::yuyv_to_planar(
            src,
            dst,
            geometry,
            true,
            ChromaPlacement::Separate {
                v_first: true,
                stride: crate::capture::frame::yv12_chroma_stride(geometry.dst_stride),
            },
        ),
        OutputFormat::I420 => planar::yuyv_to_planar(
            src,
            dst,
            geometry,
            true,
            ChromaPlacement::Separate {
                v_first: false,
                stride: geometry.dst_stride / 2,
            },
        ),
        OutputFormat::Yv16 => planar::yuyv_to_planar(
            src,
            dst,
            geometry,
            false,
            ChromaPlacement::Separate {
                v_first: true,
                stride: geometry.dst_stride / 2,
            },
        ),
        OutputFormat::Rgb24
        | OutputFormat::Bgr24
        | OutputFormat::Rgb32
        | OutputFormat::Bgr32
        | OutputFormat::Rgb565
        | OutputFormat::Bgr565 => rgb::yuyv_to_rgb(output, src, dst, geometry),
    }
}
