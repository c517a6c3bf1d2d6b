//! Huffman tables and block coefficient decoding

use super::bits::BitReader;
use super::tables::ZIGZAG;
use crate::error::DecodeError;

/// Codes up to this length resolve with one table lookup.
const FAST_BITS: u32 = 10;

#[derive(Clone)]
pub struct HuffmanTable {
    /// `(length << 8) | symbol` indexed by the next `FAST_BITS` bits; 0 = slow path
    fast: [u16; 1 << FAST_BITS],
    /// Largest code of each length, -1 when the length is unused
    maxcode: [i32; 17],
    /// Added to a code of a given length to index `values`
    valoffset: [i32; 17],
    values: [u8; 256],
}

impl HuffmanTable {
    /// Build from the DHT code-length counts and symbol list.
    pub fn build(counts: &[u8; 16], symbols: &[u8]) -> Result<Self, DecodeError> {
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        if total > 256 || symbols.len() < total {
            return Err(DecodeError::BadTables);
        }

        let mut table = HuffmanTable {
            fast: [0; 1 << FAST_BITS],
            maxcode: [-1; 17],
            valoffset: [0; 17],
            values: [0; 256],
        };
        table.values[..total].copy_from_slice(&symbols[..total]);

        let mut code: u32 = 0;
        let mut index: usize = 0;
        for len in 1..=16u32 {
            let count = usize::from(counts[len as usize - 1]);
            if count > 0 {
                // Only 2^len codes of this length exist.
                if code as usize + count > 1 << len {
                    return Err(DecodeError::BadTables);
                }
                table.valoffset[len as usize] = index as i32 - code as i32;
                for _ in 0..count {
                    if len <= FAST_BITS {
                        let shift = FAST_BITS - len;
                        let first = (code << shift) as usize;
                        let entry = ((len as u16) << 8) | u16::from(table.values[index]);
                        table.fast[first..first + (1 << shift)].fill(entry);
                    }
                    code += 1;
                    index += 1;
                }
                table.maxcode[len as usize] = code as i32 - 1;
            }
            code <<= 1;
        }
        Ok(table)
    }

    /// Decode one symbol.
    pub fn decode(&self, bits: &mut BitReader<'_>) -> Result<u8, DecodeError> {
        let entry = self.fast[bits.peek(FAST_BITS) as usize];
        if entry != 0 {
            bits.consume(u32::from(entry >> 8));
            return Ok(entry as u8);
        }
        let window = bits.peek(16) as i32;
        for len in FAST_BITS + 1..=16 {
            let code = window >> (16 - len);
            if code <= self.maxcode[len as usize] {
                bits.consume(len);
                let index = (code + self.valoffset[len as usize]) as usize;
                return Ok(self.values[index]);
            }
        }
        Err(DecodeError::BadHuffmanCode)
    }
}

/// Parse a DHT payload into table slots `[dc0, dc1, ac0, ac1]`.
pub fn parse_dht(mut payload: &[u8], slots: &mut [Option<HuffmanTable>; 4]) -> Result<(), DecodeError> {
    while let Some((&class_id, rest)) = payload.split_first() {
        let (class, id) = (usize::from(class_id >> 4), usize::from(class_id & 0x0f));
        if class > 1 || id > 1 {
            return Err(DecodeError::BadTables);
        }
        let counts: &[u8; 16] = rest
            .get(..16)
            .and_then(|c| c.try_into().ok())
            .ok_or(DecodeError::Truncated)?;
        let total: usize = counts.iter().map(|&c| usize::from(c)).sum();
        let symbols = rest.get(16..16 + total).ok_or(DecodeError::Truncated)?;
        slots[class * 2 + id] = Some(HuffmanTable::build(counts, symbols)?);
        payload = &rest[16 + total..];
    }
    Ok(())
}

/// Decode one 8x8 block into natural order.
///
/// `coefficients` must be zeroed by the caller. Returns whether any AC
/// coefficient was coded, which lets the IDCT take its DC-only path.
pub fn decode_block(
    bits: &mut BitReader<'_>,
    dc: &HuffmanTable,
    ac: &HuffmanTable,
    predictor: &mut i32,
    coefficients: &mut [i32; 64],
) -> Result<bool, DecodeError> {
    let size = dc.decode(bits)?;
    if size > 16 {
        return Err(DecodeError::BadHuffmanCode);
    }
    *predictor = predictor.wrapping_add(bits.receive_extend(u32::from(size)));
    coefficients[0] = *predictor;

    let mut has_ac = false;
    let mut k = 1;
    while k < 64 {
        let rs = ac.decode(bits)?;
        let (run, size) = (usize::from(rs >> 4), u32::from(rs & 0x0f));
        if size == 0 {
            if run != 15 {
                break;
            }
            k += 16;
            continue;
        }
        k += run;
        if k > 63 {
            return Err(DecodeError::AcOverflow);
        }
        coefficients[ZIGZAG[k]] = bits.receive_extend(size);
        has_ac = true;
        k += 1;
    }
    Ok(has_ac)
}
