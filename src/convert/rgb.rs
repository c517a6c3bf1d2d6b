//! RGB to and from YUYV
//!
//! Both directions use full-range BT.601 in 8.8 fixed point. Chroma is
//! shared by each horizontal pixel pair.

use super::{clamp_u8, Geometry, Result};
use crate::capture::frame::{OutputFormat, RgbOrder};
use crate::error::ConvertError;

// 1.402, 0.34414, 0.71414 and 1.772 scaled by 256, truncated
const CR_R: i32 = 358;
const CB_G: i32 = 88;
const CR_G: i32 = 182;
const CB_B: i32 = 453;

fn luma(r: i32, g: i32, b: i32) -> u8 {
    clamp_u8((77 * r + 150 * g + 29 * b + 128) >> 8)
}

/// Packed RGB24 or BGR24 into YUYV, averaging chroma over each pixel pair.
pub fn rgb_to_yuyv(order: RgbOrder, src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.require_multiple(2, 1)?;
    g.check_src(src, g.width * 3, g.height)?;
    g.check_dst(dst, g.width * 2, g.height)?;

    let (ri, bi) = match order {
        RgbOrder::Rgb => (0, 2),
        RgbOrder::Bgr => (2, 0),
    };

    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..g.width * 3];
        let d = &mut dst[y * g.dst_stride..][..g.width * 2];
        for (out, pair) in d.chunks_exact_mut(4).zip(s.chunks_exact(6)) {
            let (r0, g0, b0) = (i32::from(pair[ri]), i32::from(pair[1]), i32::from(pair[bi]));
            let (r1, g1, b1) = (
                i32::from(pair[3 + ri]),
                i32::from(pair[4]),
                i32::from(pair[3 + bi]),
            );
            let (sr, sg, sb) = (r0 + r1, g0 + g1, b0 + b1);
            let u = ((-43 * sr - 85 * sg + 128 * sb + 256) >> 9) + 128;
            let v = ((128 * sr - 107 * sg - 21 * sb + 256) >> 9) + 128;
            out.copy_from_slice(&[luma(r0, g0, b0), clamp_u8(u), luma(r1, g1, b1), clamp_u8(v)]);
        }
    }
    Ok(())
}

type PixelWriter = fn(&mut [u8], [u8; 3]);

fn put_rgb24(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&[r, g, b]);
}

fn put_bgr24(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&[b, g, r]);
}

fn put_rgb32(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&[r, g, b, 0xff]);
}

fn put_bgr32(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&[b, g, r, 0xff]);
}

fn put_rgb565(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&pack565(r, g, b).to_le_bytes());
}

fn put_bgr565(px: &mut [u8], [r, g, b]: [u8; 3]) {
    px.copy_from_slice(&pack565(b, g, r).to_le_bytes());
}

/// Bytes per pixel and the pixel writer for `output`.
fn pixel_writer(output: OutputFormat) -> Result<(usize, PixelWriter)> {
    Ok(match output {
        OutputFormat::Rgb24 => (3, put_rgb24 as PixelWriter),
        OutputFormat::Bgr24 => (3, put_bgr24 as PixelWriter),
        OutputFormat::Rgb32 => (4, put_rgb32 as PixelWriter),
        OutputFormat::Bgr32 => (4, put_bgr32 as PixelWriter),
        OutputFormat::Rgb565 => (2, put_rgb565 as PixelWriter),
        OutputFormat::Bgr565 => (2, put_bgr565 as PixelWriter),
        _ => return Err(ConvertError::UnsupportedSource("yuv output")),
    })
}

/// 5:6:5 with the first channel in the high bits.
pub fn pack565(hi: u8, mid: u8, lo: u8) -> u16 {
    ((u16::from(hi) << 8) & 0xf800) | ((u16::from(mid) << 3) & 0x07e0) | (u16::from(lo) >> 3)
}

/// YUYV into one of the RGB family outputs.
pub fn yuyv_to_rgb(output: OutputFormat, src: &[u8], dst: &mut [u8], g: Geometry) -> Result<()> {
    g.require_multiple(2, 1)?;
    let (bpp, write) = pixel_writer(output)?;
    g.check_src(src, g.width * 2, g.height)?;
    g.check_dst(dst, g.width * bpp, g.height)?;

    for y in 0..g.height {
        let s = &src[y * g.src_stride..][..g.width * 2];
        let d = &mut dst[y * g.dst_stride..][..g.width * bpp];
        for (out, mp) in d.chunks_exact_mut(bpp * 2).zip(s.chunks_exact(4)) {
            let u = i32::from(mp[1]) - 128;
            let v = i32::from(mp[3]) - 128;
            let dr = (CR_R * v) >> 8;
            let dg = (-CB_G * u - CR_G * v) >> 8;
            let db = (CB_B * u) >> 8;
            let (first, second) = out.split_at_mut(bpp);
            for (px, sample) in [(first, mp[0]), (second, mp[2])] {
                let l = i32::from(sample);
                write(px, [clamp_u8(l + dr), clamp_u8(l + dg), clamp_u8(l + db)]);
            }
        }
    }
    Ok(())
}
