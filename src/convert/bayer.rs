//! Bilinear Bayer demosaicing
//!
//! Missing channels are the rounded mean of the same-coloured neighbours:
//! the four edge neighbours for green at red/blue sites, the two
//! horizontal or vertical neighbours for red/blue at green sites, and the
//! four diagonals for blue at red sites and vice versa. On the first and last
//! row and column the window is truncated to the neighbours that exist.

use super::{Geometry, Result};
use crate::capture::frame::BayerPattern;
use crate::error::ConvertError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Site {
    Red,
    Green,
    Blue,
}

const CROSS: [(isize, isize); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];
const DIAGONAL: [(isize, isize); 4] = [(-1, -1), (1, -1), (-1, 1), (1, 1)];
const HORIZONTAL: [(isize, isize); 2] = [(-1, 0), (1, 0)];
const VERTICAL: [(isize, isize); 2] = [(0, -1), (0, 1)];

fn cell(pattern: BayerPattern) -> [Site; 4] {
    use Site::*;
    match pattern {
        BayerPattern::Gbrg => [Green, Blue, Red, Green],
        BayerPattern::Grbg => [Green, Red, Blue, Green],
        BayerPattern::Bggr => [Blue, Green, Green, Red],
        BayerPattern::Rggb => [Red, Green, Green, Blue],
    }
}

struct Mosaic<'a> {
    src: &'a [u8],
    stride: usize,
    width: usize,
    height: usize,
}

impl Mosaic<'_> {
    fn at(&self, x: usize, y: usize) -> u8 {
        self.src[y * self.stride + x]
    }

    /// Rounded mean over the in-bounds members of `window`.
    fn mean(&self, x: usize, y: usize, window: &[(isize, isize)]) -> u8 {
        let (mut sum, mut count) = (0u32, 0u32);
        for &(dx, dy) in window {
            let (nx, ny) = (x as isize + dx, y as isize + dy);
            if nx < 0 || ny < 0 || nx >= self.width as isize || ny >= self.height as isize {
                continue;
            }
            sum += u32::from(self.at(nx as usize, ny as usize));
            count += 1;
        }
        if count == 0 {
            return 0;
        }
        ((sum + count / 2) / count) as u8
    }
}

/// Reconstruct packed RGB24 (`g.dst_stride` bytes per row) from an 8-bit mosaic.
pub fn demosaic(pattern: BayerPattern, src: &[u8], rgb: &mut [u8], g: Geometry) -> Result<()> {
    if g.width < 2 || g.height < 2 {
        return Err(ConvertError::OddDimensions {
            width: g.width,
            height: g.height,
        });
    }
    g.check_src(src, g.width, g.height)?;
    g.check_dst(rgb, g.width * 3, g.height)?;

    let sites = cell(pattern);
    let site = |x: usize, y: usize| sites[(y & 1) * 2 + (x & 1)];
    let mosaic = Mosaic {
        src,
        stride: g.src_stride,
        width: g.width,
        height: g.height,
    };

    for y in 0..g.height {
        let row = &mut rgb[y * g.dst_stride..][..g.width * 3];
        for (x, px) in row.chunks_exact_mut(3).enumerate() {
            let here = mosaic.at(x, y);
            let [r, gr, b] = match site(x, y) {
                Site::Red => [
                    here,
                    mosaic.mean(x, y, &CROSS),
                    mosaic.mean(x, y, &DIAGONAL),
                ],
                Site::Blue => [
                    mosaic.mean(x, y, &DIAGONAL),
                    mosaic.mean(x, y, &CROSS),
                    here,
                ],
                Site::Green => {
                    let across = mosaic.mean(x, y, &HORIZONTAL);
                    let down = mosaic.mean(x, y, &VERTICAL);
                    if site(x ^ 1, y) == Site::Red {
                        [across, here, down]
                    } else {
                        [down, here, across]
                    }
                }
            };
            px.copy_from_slice(&[r, gr, b]);
        }
    }
    Ok(())
}
