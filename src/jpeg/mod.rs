//! Baseline JPEG / MJPEG decoder producing YUYV
//!
//! Supports what capture devices emit: 8-bit baseline sequential DCT,
//! one interleaved scan, Y or YCbCr with 2x2, 2x1 or 1x1 luma sampling,
//! optional restart intervals and optional DHT (the Annex K tables stand in
//! when it is missing). Decoding walks the marker stream through an explicit
//! [`Stage`] machine; every failure is a [`DecodeError`] for this frame
//! only.

mod bits;
mod huffman;
mod idct;
mod tables;

use tracing::trace;

use crate::error::DecodeError;
use bits::BitReader;
use huffman::{decode_block, parse_dht, HuffmanTable};
use idct::ScaledQuant;
use tables::{DEFAULT_TABLES, ZIGZAG};

pub type Result<T> = std::result::Result<T, DecodeError>;

const SOF0: u8 = 0xc0;
const DHT: u8 = 0xc4;
const SOI: u8 = 0xd8;
const EOI: u8 = 0xd9;
const SOS: u8 = 0xda;
const DQT: u8 = 0xdb;
const DRI: u8 = 0xdd;
const RST0: u8 = 0xd0;
const COM: u8 = 0xfe;

/// Where the decoder is in the marker stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    ExpectSoi,
    /// Tables and application segments up to SOF0
    FrameTables,
    FrameHeader,
    /// Tables up to SOS
    ScanTables,
    ScanHeader,
    Entropy,
    ExpectEoi,
    Done,
}

/// Chroma arrangement of the frame, from the luma sampling factors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layout {
    /// 2x2 luma blocks per chroma block
    Yuv420,
    /// 2x1
    Yuv422,
    Yuv444,
    Gray,
}

impl Layout {
    fn mcu_size(self) -> (usize, usize) {
        match self {
            Layout::Yuv420 => (16, 16),
            Layout::Yuv422 => (16, 8),
            Layout::Yuv444 | Layout::Gray => (8, 8),
        }
    }

    fn luma_blocks(self) -> usize {
        match self {
            Layout::Yuv420 => 4,
            Layout::Yuv422 => 2,
            Layout::Yuv444 | Layout::Gray => 1,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Component {
    id: u8,
    quant: usize,
}

#[derive(Debug)]
struct FrameHeader {
    width: usize,
    height: usize,
    layout: Layout,
    components: Vec<Component>,
}

/// Per scan component: frame component index and Huffman slots.
#[derive(Debug, Clone, Copy)]
struct ScanComponent {
    component: usize,
    dc: usize,
    ac: usize,
}

/// Bounds-checked reader over marker segments
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn u8(&mut self) -> Result<u8> {
        let byte = *self.data.get(self.pos).ok_or(DecodeError::Truncated)?;
        self.pos += 1;
        Ok(byte)
    }

    fn u16(&mut self) -> Result<u16> {
        Ok(u16::from_be_bytes([self.u8()?, self.u8()?]))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let bytes = self
            .data
            .get(self.pos..self.pos + n)
            .ok_or(DecodeError::Truncated)?;
        self.pos += n;
        Ok(bytes)
    }

    /// Payload of a length-prefixed segment.
    fn segment(&mut self) -> Result<&'a [u8]> {
        let len = usize::from(self.u16()?);
        if len < 2 {
            return Err(DecodeError::BadTables);
        }
        self.take(len - 2)
    }

    /// Next marker code, skipping `FF` fill bytes.
    fn marker(&mut self) -> Result<u8> {
        let byte = self.u8()?;
        if byte != 0xff {
            return Err(DecodeError::WrongMarker(byte));
        }
        loop {
            match self.u8()? {
                0xff => continue,
                code => return Ok(code),
            }
        }
    }
}

/// Decoded samples of one MCU
struct McuSamples {
    luma: [[u8; 64]; 4],
    cb: [u8; 64],
    cr: [u8; 64],
}

struct Decoder<'a> {
    cursor: Cursor<'a>,
    quant: [Option<[u16; 64]>; 4],
    huffman: [Option<HuffmanTable>; 4],
    restart_interval: usize,
}

impl<'a> Decoder<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor { data, pos: 0 },
            quant: [None; 4],
            huffman: Default::default(),
            restart_interval: 0,
        }
    }

    /// Consume table and miscellaneous segments, returning the first other marker.
    fn read_tables(&mut self) -> Result<u8> {
        loop {
            let marker = self.cursor.marker()?;
            match marker {
                DQT => {
                    let payload = self.cursor.segment()?;
                    self.parse_dqt(payload)?;
                }
                DHT => {
                    let payload = self.cursor.segment()?;
                    parse_dht(payload, &mut self.huffman)?;
                }
                DRI => {
                    let payload = self.cursor.segment()?;
                    let interval = payload.get(..2).ok_or(DecodeError::Truncated)?;
                    self.restart_interval = usize::from(u16::from_be_bytes([interval[0], interval[1]]));
                }
                0xe0..=0xef | COM => {
                    self.cursor.segment()?;
                }
                other => return Ok(other),
            }
        }
    }

    fn parse_dqt(&mut self, mut payload: &[u8]) -> Result<()> {
        while let Some((&precision_id, rest)) = payload.split_first() {
            if precision_id >> 4 != 0 {
                return Err(DecodeError::BadTables);
            }
            let id = precision_id & 0x0f;
            if id > 3 {
                return Err(DecodeError::QuantSelector(id));
            }
            let values = rest.get(..64).ok_or(DecodeError::Truncated)?;
            let mut table = [0u16; 64];
            for (k, &q) in values.iter().enumerate() {
                table[ZIGZAG[k]] = u16::from(q);
            }
            self.quant[usize::from(id)] = Some(table);
            payload = &rest[64..];
        }
        Ok(())
    }

    fn read_frame_header(&mut self) -> Result<FrameHeader> {
        let mut seg = Cursor {
            data: self.cursor.segment()?,
            pos: 0,
        };
        if seg.u8()? != 8 {
            return Err(DecodeError::NotEightBit);
        }
        let height = usize::from(seg.u16()?);
        let width = usize::from(seg.u16()?);
        // YUYV pairs pixels and 4:2:0 chroma pairs rows.
        if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
            return Err(DecodeError::BadDimensions {
                width: width as u32,
                height: height as u32,
            });
        }
        let count = seg.u8()?;
        if count > 4 {
            return Err(DecodeError::TooManyComponents(count));
        }

        let mut components = Vec::with_capacity(usize::from(count));
        let mut sampling = Vec::with_capacity(usize::from(count));
        for _ in 0..count {
            let id = seg.u8()?;
            let hv = seg.u8()?;
            let (h, v) = (hv >> 4, hv & 0x0f);
            if h > 3 || v > 3 {
                return Err(DecodeError::IllegalSampling { h, v });
            }
            let quant = seg.u8()?;
            if quant > 3 {
                return Err(DecodeError::QuantSelector(quant));
            }
            components.push(Component {
                id,
                quant: usize::from(quant),
            });
            sampling.push((h, v));
        }

        let layout = match (count, sampling.as_slice()) {
            (1, _) => Layout::Gray,
            (3, [luma, (1, 1), (1, 1)]) => match luma {
                (2, 2) => Layout::Yuv420,
                (2, 1) => Layout::Yuv422,
                (1, 1) => Layout::Yuv444,
                _ => return Err(DecodeError::UnsupportedLayout),
            },
            _ => return Err(DecodeError::UnsupportedLayout),
        };

        Ok(FrameHeader {
            width,
            height,
            layout,
            components,
        })
    }

    fn read_scan_header(&mut self, frame: &FrameHeader) -> Result<Vec<ScanComponent>> {
        let mut seg = Cursor {
            data: self.cursor.segment()?,
            pos: 0,
        };
        let count = usize::from(seg.u8()?);
        if count != frame.components.len() {
            return Err(DecodeError::UnsupportedLayout);
        }
        let mut scan = Vec::with_capacity(count);
        for _ in 0..count {
            let id = seg.u8()?;
            let tables = seg.u8()?;
            let (dc, ac) = (usize::from(tables >> 4), usize::from(tables & 0x0f));
            if dc > 1 || ac > 1 {
                return Err(DecodeError::BadTables);
            }
            let component = frame
                .components
                .iter()
                .position(|c| c.id == id)
                .ok_or(DecodeError::UnknownComponent(id))?;
            scan.push(ScanComponent {
                component,
                dc,
                ac: 2 + ac,
            });
        }
        // Luma must lead so block order matches the MCU layout.
        if scan.first().map(|s| s.component) != Some(0) {
            return Err(DecodeError::UnsupportedLayout);
        }

        let (start, end, approx) = (seg.u8()?, seg.u8()?, seg.u8()?);
        if (start, end, approx) != (0, 63, 0) {
            return Err(DecodeError::NotSequential);
        }
        Ok(scan)
    }

    fn table(&self, slot: usize) -> Result<&HuffmanTable> {
        self.huffman[slot]
            .as_ref()
            .or_else(|| {
                trace!(slot, "Using default Huffman table");
                DEFAULT_TABLES[slot].as_ref()
            })
            .ok_or(DecodeError::BadTables)
    }

    /// Decode the entropy-coded segment, writing the visible region into `dst`.
    ///
    /// Returns the bytes consumed and the marker that ended the segment.
    fn decode_scan(
        &self,
        frame: &FrameHeader,
        scan: &[ScanComponent],
        dst: &mut [u8],
        out: &Output,
    ) -> Result<(usize, Option<u8>)> {
        let quant: Vec<ScaledQuant> = frame
            .components
            .iter()
            .map(|c| self.quant[c.quant].as_ref().map(ScaledQuant::new))
            .collect::<Option<_>>()
            .ok_or(DecodeError::BadTables)?;
        let mut tables = Vec::with_capacity(scan.len());
        for s in scan {
            tables.push((self.table(s.dc)?, self.table(s.ac)?));
        }

        let (mcu_w, mcu_h) = frame.layout.mcu_size();
        let mcus_x = frame.width.div_ceil(mcu_w);
        let mcus_y = frame.height.div_ceil(mcu_h);

        let mut bits = BitReader::new(&self.cursor.data[self.cursor.pos..]);
        let mut predictors = [0i32; 4];
        let mut next_restart = RST0;
        let mut samples = McuSamples {
            luma: [[0; 64]; 4],
            cb: [128; 64],
            cr: [128; 64],
        };
        let mut coefficients = [0i32; 64];

        for index in 0..mcus_x * mcus_y {
            if self.restart_interval > 0 && index > 0 && index % self.restart_interval == 0 {
                match bits.take_marker() {
                    Some(marker) if marker == next_restart => {}
                    Some(marker) => return Err(DecodeError::WrongMarker(marker)),
                    None => return Err(DecodeError::Truncated),
                }
                predictors = [0; 4];
                next_restart = RST0 + ((next_restart - RST0 + 1) & 7);
            }

            for (s, &(dc, ac)) in scan.iter().zip(&tables) {
                let blocks = if s.component == 0 {
                    frame.layout.luma_blocks()
                } else {
                    1
                };
                for block in 0..blocks {
                    coefficients.fill(0);
                    let has_ac = decode_block(
                        &mut bits,
                        dc,
                        ac,
                        &mut predictors[s.component],
                        &mut coefficients,
                    )?;
                    let target = match s.component {
                        0 => &mut samples.luma[block],
                        1 => &mut samples.cb,
                        _ => &mut samples.cr,
                    };
                    idct::transform(&coefficients, &quant[s.component], has_ac, target);
                }
            }

            let (mx, my) = (index % mcus_x, index / mcus_x);
            out.write_mcu(frame.layout, &samples, mx * mcu_w, my * mcu_h, dst);
        }

        let marker = bits.take_marker();
        Ok((bits.position(), marker))
    }
}

/// Destination region of a decode
struct Output {
    stride: usize,
    width: usize,
    height: usize,
}

impl Output {
    fn write_mcu(&self, layout: Layout, samples: &McuSamples, x0: usize, y0: usize, dst: &mut [u8]) {
        let (mcu_w, mcu_h) = layout.mcu_size();
        if x0 >= self.width || y0 >= self.height {
            return;
        }
        let cols = mcu_w.min(self.width - x0);
        let rows = mcu_h.min(self.height - y0);

        for r in 0..rows {
            let line = &mut dst[(y0 + r) * self.stride + x0 * 2..][..cols * 2];
            for (pair, out) in line.chunks_exact_mut(4).enumerate() {
                let c = pair * 2;
                let luma = |c: usize| match layout {
                    Layout::Yuv420 => samples.luma[(r / 8) * 2 + c / 8][(r % 8) * 8 + c % 8],
                    Layout::Yuv422 => samples.luma[c / 8][r * 8 + c % 8],
                    Layout::Yuv444 | Layout::Gray => samples.luma[0][r * 8 + c],
                };
                let chroma = match layout {
                    Layout::Yuv420 => (r / 2) * 8 + pair,
                    Layout::Yuv422 => r * 8 + pair,
                    Layout::Yuv444 | Layout::Gray => r * 8 + c,
                };
                out.copy_from_slice(&[luma(c), samples.cb[chroma], luma(c + 1), samples.cr[chroma]]);
            }
        }
    }
}

/// Decode one JPEG image into a YUYV destination of `width` x `height`.
///
/// `stride` is the destination bytes per row. An image larger than the
/// destination is clipped to its top-left region; a smaller one is an error.
pub fn decode_to_yuyv(data: &[u8], dst: &mut [u8], stride: usize, width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 || width % 2 != 0 || height % 2 != 0 {
        return Err(DecodeError::BadDimensions { width, height });
    }
    let (w, h) = (width as usize, height as usize);
    let needed = stride.max(w * 2) * (h - 1) + w * 2;
    if stride < w * 2 || dst.len() < needed {
        return Err(DecodeError::DepthMismatch {
            needed,
            got: dst.len(),
        });
    }

    let mut decoder = Decoder::new(data);
    let mut stage = Stage::ExpectSoi;
    let mut frame = None;
    let mut scan = Vec::new();
    let mut trailer = None;

    while stage != Stage::Done {
        trace!(?stage, offset = decoder.cursor.pos, "JPEG stage");
        stage = match stage {
            Stage::ExpectSoi => match decoder.cursor.marker() {
                Ok(SOI) => Stage::FrameTables,
                _ => return Err(DecodeError::NoSoi),
            },
            Stage::FrameTables => match decoder.read_tables()? {
                SOF0 => Stage::FrameHeader,
                // Extended, progressive, lossless and arithmetic frames
                0xc1..=0xcf => return Err(DecodeError::NotSequential),
                other => return Err(DecodeError::WrongMarker(other)),
            },
            Stage::FrameHeader => {
                let header = decoder.read_frame_header()?;
                if header.width < w {
                    return Err(DecodeError::WidthMismatch {
                        image: header.width as u32,
                        destination: width,
                    });
                }
                if header.height < h {
                    return Err(DecodeError::HeightMismatch {
                        image: header.height as u32,
                        destination: height,
                    });
                }
                frame = Some(header);
                Stage::ScanTables
            }
            Stage::ScanTables => match decoder.read_tables()? {
                SOS => Stage::ScanHeader,
                other => return Err(DecodeError::WrongMarker(other)),
            },
            Stage::ScanHeader => {
                let header = frame.as_ref().ok_or(DecodeError::WrongMarker(SOS))?;
                scan = decoder.read_scan_header(header)?;
                Stage::Entropy
            }
            Stage::Entropy => {
                let header = frame.as_ref().ok_or(DecodeError::WrongMarker(SOS))?;
                let out = Output {
                    stride,
                    width: w,
                    height: h,
                };
                let (consumed, marker) = decoder.decode_scan(header, &scan, dst, &out)?;
                decoder.cursor.pos += consumed;
                trailer = marker;
                Stage::ExpectEoi
            }
            Stage::ExpectEoi => match trailer {
                Some(EOI) => Stage::Done,
                _ => return Err(DecodeError::NoEoi),
            },
            Stage::Done => Stage::Done,
        };
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 16x16 4:2:0 frame with all quantizers 8 and a minimal DHT.
    fn tiny_frame(entropy: &[u8]) -> Vec<u8> {
        let mut jpeg = vec![0xff, SOI];
        jpeg.extend([0xff, DQT, 0x00, 67, 0x00]);
        jpeg.extend([8u8; 64]);
        jpeg.extend([0xff, SOF0, 0x00, 17, 8, 0, 16, 0, 16, 3]);
        jpeg.extend([1, 0x22, 0, 2, 0x11, 0, 3, 0x11, 0]);
        // DC: '0' -> 0, '10' -> 2, '110' -> 3; AC: '0' -> EOB
        jpeg.extend([0xff, DHT, 0x00, 2 + 17 + 3 + 17 + 1, 0x00, 1, 1, 1]);
        jpeg.extend([0u8; 13]);
        jpeg.extend([0, 2, 3, 0x10, 1]);
        jpeg.extend([0u8; 15]);
        jpeg.push(0x00);
        jpeg.extend([0xff, SOS, 0x00, 12, 3, 1, 0x00, 2, 0x00, 3, 0x00, 0, 63, 0]);
        jpeg.extend(entropy);
        jpeg.extend([0xff, EOI]);
        jpeg
    }

    const ENTROPY: [u8; 4] = [0xa5, 0x20, 0x4b, 0x57];

    #[test]
    fn decodes_flat_blocks() {
        let jpeg = tiny_frame(&ENTROPY);
        let mut dst = vec![0u8; 16 * 16 * 2];
        decode_to_yuyv(&jpeg, &mut dst, 32, 16, 16).unwrap();
        assert_eq!(&dst[..4], &[130, 126, 130, 133]);
        assert_eq!(&dst[16..20], &[132, 126, 132, 133]);
        assert_eq!(&dst[8 * 32..8 * 32 + 4], &[129, 126, 129, 133]);
    }

    #[test]
    fn stage_errors() {
        let mut dst = vec![0u8; 16 * 16 * 2];
        assert_eq!(decode_to_yuyv(&[0x00, 0x01], &mut dst, 32, 16, 16), Err(DecodeError::NoSoi));

        let mut jpeg = tiny_frame(&ENTROPY);
        let sof = jpeg.windows(2).position(|w| w == [0xff, SOF0]).unwrap();
        jpeg[sof + 4] = 12;
        assert_eq!(decode_to_yuyv(&jpeg, &mut dst, 32, 16, 16), Err(DecodeError::NotEightBit));

        jpeg[sof + 4] = 8;
        jpeg[sof + 8] = 17;
        assert_eq!(
            decode_to_yuyv(&jpeg, &mut dst, 32, 16, 16),
            Err(DecodeError::BadDimensions { width: 17, height: 16 })
        );

        jpeg[sof + 8] = 16;
        jpeg[sof + 1] = 0xc2;
        assert_eq!(decode_to_yuyv(&jpeg, &mut dst, 32, 16, 16), Err(DecodeError::NotSequential));
    }

    #[test]
    fn destination_checks() {
        let jpeg = tiny_frame(&ENTROPY);
        let mut dst = vec![0u8; 18 * 16 * 2];
        assert_eq!(
            decode_to_yuyv(&jpeg, &mut dst, 36, 18, 16),
            Err(DecodeError::WidthMismatch {
                image: 16,
                destination: 18
            })
        );
        assert!(matches!(
            decode_to_yuyv(&jpeg, &mut dst, 32, 15, 16),
            Err(DecodeError::BadDimensions { .. })
        ));
        assert!(matches!(
            decode_to_yuyv(&jpeg, &mut dst[..100], 32, 16, 16),
            Err(DecodeError::DepthMismatch { .. })
        ));
    }

    #[test]
    fn clips_to_smaller_destination() {
        let jpeg = tiny_frame(&ENTROPY);
        // Only the left 8 columns and top 10 rows, in a padded destination
        let mut dst = vec![0xeeu8; 20 * 10];
        decode_to_yuyv(&jpeg, &mut dst, 20, 8, 10).unwrap();
        assert_eq!(&dst[..4], &[130, 126, 130, 133]);
        assert_eq!(&dst[16..20], &[0xee; 4]);
        assert_eq!(&dst[9 * 20..9 * 20 + 4], &[129, 126, 129, 133]);
    }
}
