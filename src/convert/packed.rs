//! Packed YUV and luma-only sources

use super::{Geometry, Result};
use crate::capture::frame::PackedYuv;

/// Neutral chroma for luma-only sources
const NEUTRAL: u8 = 0x80;

/// Byte positions of (Y0, U, Y1, V) inside one 4-byte macropixel.
fn macropixel(order: PackedYuv) -> [usize; 4] {
    match order {
        PackedYuv::Yuyv => [0, 1, 2, 3],
        PackedYuv::Yvyu => [0, 3, 2, 1],
        PackedYuv::Uyvy => [1, 0, 3, 2],
        PackedYuv::Yyuv => [0, 2, 1, 3],
    }
}

/// Copy `row` bytes of each of `height` rows between strided buffers.
pub fn copy_rows(src: &[u8], dst: &mut [u8], g: Geometry, row: usize) -> Result<()> {
    g.check_src(src, row, g.height)?;
    g.check_dst(dst, row, g.height)?;
    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..row];
        dst[y * g.dst_stride..][..row].copy_from_slice(s);
    }
    Ok(())
}

/// Reorder any packed 4:2:2 layout into YUYV.
pub fn packed_to_yuyv(order: PackedYuv, src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    if order == PackedYuv::Yuyv {
        return copy_rows(src, dst, g, g.width * 2);
    }
    g.require_multiple(2, 1)?;
    let row = g.width * 2;
    g.check_src(src, row, g.height)?;
    g.check_dst(dst, row, g.height)?;

    let [y0, u, y1, v] = macropixel(order);
    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..row];
        let d = &mut dst[y * g.dst_stride..][..row];
        for (out, px) in d.chunks_exact_mut(4).zip(s.chunks_exact(4)) {
            out.copy_from_slice(&[px[y0], px[u], px[y1], px[v]]);
        }
    }
    Ok(())
}

/// 8-bit luma with neutral chroma.
pub fn grey_to_yuyv(src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.check_src(src, g.width, g.height)?;
    g.check_dst(dst, g.width * 2, g.height)?;
    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..g.width];
        let d = &mut dst[y * g.dst_stride..][..g.width * 2];
        for (out, &luma) in d.chunks_exact_mut(2).zip(s) {
            out[0] = luma;
            out[1] = NEUTRAL;
        }
    }
    Ok(())
}

/// 16-bit little-endian luma, keeping the high byte.
pub fn y16_to_yuyv(src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.check_src(src, g.width * 2, g.height)?;
    g.check_dst(dst, g.width * 2, g.height)?;
    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..g.width * 2];
        let d = &mut dst[y * g.dst_stride..][..g.width * 2];
        for (out, sample) in d.chunks_exact_mut(2).zip(s.chunks_exact(2)) {
            out[0] = sample[1];
            out[1] = NEUTRAL;
        }
    }
    Ok(())
}

/// Y41P: 12 bytes carry 8 pixels as U0 Y0 V0 Y1 U4 Y2 V4 Y3 Y4 Y5 Y6 Y7.
pub fn y41p_to_yuyv(src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.require_multiple(8, 1)?;
    let src_row = g.width / 8 * 12;
    g.check_src(src, src_row, g.height)?;
    g.check_dst(dst, g.width * 2, g.height)?;

    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..src_row];
        let d = &mut dst[y * g.dst_stride..][..g.width * 2];
        for (out, group) in d.chunks_exact_mut(16).zip(s.chunks_exact(12)) {
            let (u0, v0, u4, v4) = (group[0], group[2], group[4], group[6]);
            out.copy_from_slice(&[
                group[1], u0, group[3], v0, //
                group[5], u0, group[7], v0, //
                group[8], u4, group[9], v4, //
                group[10], u4, group[11], v4,
            ]);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shuffles_each_order() {
        let g = Geometry::new(2, 1, 4, 4);
        let mut out = [0u8; 4];
        // Y0=10 U=20 Y1=30 V=40 in each layout
        for (order, src) in [
            (PackedYuv::Yuyv, [10, 20, 30, 40]),
            (PackedYuv::Yvyu, [10, 40, 30, 20]),
            (PackedYuv::Uyvy, [20, 10, 40, 30]),
            (PackedYuv::Yyuv, [10, 30, 20, 40]),
        ] {
            packed_to_yuyv(order, &src, &mut out, g).unwrap();
            assert_eq!(out, [10, 20, 30, 40], "{order:?}");
        }
    }

    #[test]
    fn honours_strides() {
        // 2x2 UYVY with 2 bytes of row padding, into a padded destination
        let src = [1, 2, 3, 4, 0xee, 0xee, 5, 6, 7, 8];
        let mut dst = [0xffu8; 14];
        let g = Geometry::new(2, 2, 6, 7);
        packed_to_yuyv(PackedYuv::Uyvy, &src, &mut dst, g).unwrap();
        assert_eq!(&dst[..4], &[2, 1, 4, 3]);
        assert_eq!(&dst[4..7], &[0xff, 0xff, 0xff]);
        assert_eq!(&dst[7..11], &[6, 5, 8, 7]);
    }

    #[test]
    fn luma_only_sources() {
        let mut out = [0u8; 4];
        grey_to_yuyv(&[7, 9], &mut out, Geometry::new(2, 1, 2, 4)).unwrap();
        assert_eq!(out, [7, 0x80, 9, 0x80]);

        y16_to_yuyv(&[0x34, 0x12, 0xff, 0xab], &mut out, Geometry::new(2, 1, 4, 4)).unwrap();
        assert_eq!(out, [0x12, 0x80, 0xab, 0x80]);
    }

    #[test]
    fn y41p_groups() {
        let src: Vec<u8> = (0..12).collect();
        let mut out = [0u8; 16];
        y41p_to_yuyv(&src, &mut out, Geometry::new(8, 1, 12, 16)).unwrap();
        assert_eq!(
            out,
            [1, 0, 3, 2, 5, 0, 7, 2, 8, 4, 9, 6, 10, 4, 11, 6]
        );
        assert!(y41p_to_yuyv(&src, &mut out, Geometry::new(6, 1, 12, 16)).is_err());
    }

    #[test]
    fn short_destination_is_rejected() {
        let mut out = [0u8; 3];
        assert!(packed_to_yuyv(PackedYuv::Yuyv, &[0; 4], &mut out, Geometry::new(2, 1, 4, 4)).is_err());
    }
}
