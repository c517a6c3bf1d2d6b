//! Planar and semiplanar YUV, both directions
//!
//! Sources are upsampled to 4:2:2 by repeating each chroma row for the two
//! luma rows it covers. Destinations are downsampled with a 2-tap vertical
//! average of the two rows sharing a chroma sample.

use super::{check_len, check_plane, Geometry, Result};
use crate::capture::frame::{PlanarYuv, SpcaLayout};

/// Where chroma goes in a planar destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaPlacement {
    /// One plane of interleaved pairs, row stride equal to the luma stride
    Interleaved { vu: bool },
    /// Two planes with their own row stride
    Separate { v_first: bool, stride: usize },
}

/// Byte offsets and strides of the chroma samples in a planar source.
struct ChromaPlanes {
    u: usize,
    v: usize,
    /// Distance between horizontally adjacent samples
    step: usize,
    stride: usize,
    rows: usize,
    /// Luma rows per chroma row
    vertical: usize,
}

impl ChromaPlanes {
    fn for_source(layout: PlanarYuv, g: &Geometry) -> Self {
        let luma = g.src_stride * g.src_rows;
        let half = g.src_stride / 2;
        let quarter = half * (g.src_rows / 2);
        match layout {
            PlanarYuv::Yuv420 => Self {
                u: luma,
                v: luma + quarter,
                step: 1,
                stride: half,
                rows: g.src_rows / 2,
                vertical: 2,
            },
            PlanarYuv::Yvu420 => Self {
                u: luma + quarter,
                v: luma,
                step: 1,
                stride: half,
                rows: g.src_rows / 2,
                vertical: 2,
            },
            PlanarYuv::Nv12 | PlanarYuv::Nv21 | PlanarYuv::Nv16 | PlanarYuv::Nv61 => {
                let swapped = matches!(layout, PlanarYuv::Nv21 | PlanarYuv::Nv61);
                let vertical = if matches!(layout, PlanarYuv::Nv12 | PlanarYuv::Nv21) {
                    2
                } else {
                    1
                };
                Self {
                    u: luma + usize::from(swapped),
                    v: luma + usize::from(!swapped),
                    step: 2,
                    stride: g.src_stride,
                    rows: g.src_rows / vertical,
                    vertical,
                }
            }
        }
    }

    /// One past the last chroma byte read for `pairs` samples per row.
    fn end(&self, pairs: usize) -> usize {
        if self.rows == 0 || pairs == 0 {
            return 0;
        }
        self.u.max(self.v) + self.stride * (self.rows - 1) + (pairs - 1) * self.step + 1
    }
}

/// I420, YV12, NV12, NV21, NV16 or NV61 into YUYV.
pub fn planar_to_yuyv(layout: PlanarYuv, src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    let planes = ChromaPlanes::for_source(layout, &g);
    g.require_multiple(2, planes.vertical)?;
    if g.src_rows % planes.vertical != 0 {
        return Err(crate::error::ConvertError::OddDimensions {
            width: g.width,
            height: g.src_rows,
        });
    }
    g.check_src(src, g.width, g.height)?;
    let pairs = g.width / 2;
    check_len("source", src.len(), planes.end(pairs))?;
    g.check_dst(dst, g.width * 2, g.height)?;

    for y in 0..g.height {
        let luma = &src[y * g.src_stride..][..g.width];
        let chroma_row = (y / planes.vertical) * planes.stride;
        let d = &mut dst[y * g.dst_stride..][..g.width * 2];
        for k in 0..pairs {
            let c = chroma_row + k * planes.step;
            d[4 * k..4 * k + 4].copy_from_slice(&[
                luma[2 * k],
                src[planes.u + c],
                luma[2 * k + 1],
                src[planes.v + c],
            ]);
        }
    }
    Ok(())
}

/// SPCA50x: each pair of rows is one block of signed samples.
pub fn spca_to_yuyv(layout: SpcaLayout, src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.require_multiple(2, 2)?;
    let w = g.width;
    let block = g.src_stride * 3;
    check_plane("source", src.len(), block, w * 3, g.height / 2)?;
    g.check_dst(dst, w * 2, g.height)?;

    // Offsets of Y0, Y1, U, V inside a block
    let (y0, y1, u, v) = match layout {
        SpcaLayout::Spca501 => (0, w + w / 2, w, 2 * w + w / 2),
        SpcaLayout::Spca505 => (0, w, 2 * w, 2 * w + w / 2),
        SpcaLayout::Spca508 => (0, 2 * w, w, w + w / 2),
    };
    let unsigned = |b: u8| b ^ 0x80;

    for pair in 0..g.height / 2 {
        let s = &src[pair * block..][..w * 3];
        for (line, luma) in [(0, y0), (1, y1)] {
            let d = &mut dst[(2 * pair + line) * g.dst_stride..][..w * 2];
            for k in 0..w / 2 {
                d[4 * k..4 * k + 4].copy_from_slice(&[
                    unsigned(s[luma + 2 * k]),
                    unsigned(s[u + k]),
                    unsigned(s[luma + 2 * k + 1]),
                    unsigned(s[v + k]),
                ]);
            }
        }
    }
    Ok(())
}

/// YUYV into a planar or semiplanar layout. `subsample` halves chroma vertically.
pub fn yuyv_to_planar(
    src: &[u8],
    dst: &mut [u8],
    g: Geometry,
    subsample: bool,
    placement: ChromaPlacement,
) -> Result<()> {
    let vertical = if subsample { 2 } else { 1 };
    g.require_multiple(2, vertical)?;
    g.check_src(src, g.width * 2, g.height)?;
    g.check_dst(dst, g.width, g.height)?;

    let luma_end = g.dst_stride * g.height;
    let chroma_rows = g.height / vertical;
    let pairs = g.width / 2;

    // (u offset, v offset, sample step, chroma row stride)
    let (u_base, v_base, step, stride) = match placement {
        ChromaPlacement::Interleaved { vu } => {
            (luma_end + usize::from(vu), luma_end + usize::from(!vu), 2, g.dst_stride)
        }
        ChromaPlacement::Separate { v_first, stride } => {
            let first = luma_end;
            let second = luma_end + stride * chroma_rows;
            if v_first {
                (second, first, 1, stride)
            } else {
                (first, second, 1, stride)
            }
        }
    };
    if chroma_rows > 0 && pairs > 0 {
        let end = u_base.max(v_base) + stride * (chroma_rows - 1) + (pairs - 1) * step + 1;
        check_len("destination", dst.len(), end)?;
    }

    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..g.width * 2];
        let d = &mut dst[y * g.dst_stride..][..g.width];
        for (out, px) in d.iter_mut().zip(s.iter().step_by(2)) {
            *out = *px;
        }
    }

    for row in 0..chroma_rows {
        let top = &src[row * vertical * g.src_stride..][..g.width * 2];
        let bottom = &src[(row * vertical + vertical - 1) * g.src_stride..][..g.width * 2];
        for k in 0..pairs {
            let u = (u16::from(top[4 * k + 1]) + u16::from(bottom[4 * k + 1])) >> 1;
            let v = (u16::from(top[4 * k + 3]) + u16::from(bottom[4 * k + 3])) >> 1;
            let at = row * stride + k * step;
            dst[u_base + at] = u as u8;
            dst[v_base + at] = v as u8;
        }
    }
    Ok(())
}
