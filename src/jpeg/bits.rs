//! Entropy-coded segment reader
//!
//! Bits are kept left-aligned in a 64-bit accumulator. Stuffed `FF 00`
//! pairs are collapsed to `FF`, and a real marker stops the refill: from
//! then on the reader yields zero bits until [`BitReader::take_marker`]
//! is called.

pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u64,
    nbits: u32,
    /// Marker that stopped the refill; `pos` is already past it.
    marker: Option<u8>,
}

impl<'a> BitReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            acc: 0,
            nbits: 0,
            marker: None,
        }
    }

    /// Bytes consumed from the input so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    fn next_byte(&mut self) -> u8 {
        if self.marker.is_some() {
            return 0;
        }
        let Some(&byte) = self.data.get(self.pos) else {
            return 0;
        };
        if byte != 0xff {
            self.pos += 1;
            return byte;
        }
        // Skip fill bytes in front of whatever follows.
        let mut next = self.pos + 1;
        while self.data.get(next) == Some(&0xff) {
            next += 1;
        }
        match self.data.get(next) {
            Some(0x00) => {
                self.pos = next + 1;
                0xff
            }
            Some(&marker) => {
                self.pos = next + 1;
                self.marker = Some(marker);
                0
            }
            None => {
                self.pos = self.data.len();
                0
            }
        }
    }

    fn fill(&mut self) {
        while self.nbits <= 56 {
            let byte = self.next_byte();
            self.acc |= u64::from(byte) << (56 - self.nbits);
            self.nbits += 8;
        }
    }

    /// Next `n` bits (1..=32) without consuming them.
    pub fn peek(&mut self, n: u32) -> u32 {
        debug_assert!((1..=32).contains(&n));
        if self.nbits < n {
            self.fill();
        }
        (self.acc >> (64 - n)) as u32
    }

    pub fn consume(&mut self, n: u32) {
        debug_assert!(n <= self.nbits);
        self.acc <<= n;
        self.nbits -= n;
    }

    pub fn bits(&mut self, n: u32) -> u32 {
        if n == 0 {
            return 0;
        }
        let value = self.peek(n);
        self.consume(n);
        value
    }

    /// Read `size` magnitude bits and sign-extend them (T.81 F.2.2.1).
    pub fn receive_extend(&mut self, size: u32) -> i32 {
        if size == 0 {
            return 0;
        }
        let value = self.bits(size) as i32;
        if value < 1 << (size - 1) {
            value - (1 << size) + 1
        } else {
            value
        }
    }

    /// Drop buffered bits and return the next marker, if any remains.
    pub fn take_marker(&mut self) -> Option<u8> {
        self.acc = 0;
        self.nbits = 0;
        if self.marker.is_none() {
            // Scan past any unread entropy bytes.
            while self.pos < self.data.len() && self.marker.is_none() {
                self.next_byte();
            }
        }
        self.marker.take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unstuffs_and_stops_at_markers() {
        let data = [0b1010_0000, 0xff, 0x00, 0x12, 0xff, 0xd9];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.bits(3), 0b101);
        assert_eq!(reader.bits(5), 0);
        assert_eq!(reader.bits(8), 0xff);
        assert_eq!(reader.bits(8), 0x12);
        // Past the marker only zero padding is returned.
        assert_eq!(reader.bits(16), 0);
        assert_eq!(reader.take_marker(), Some(0xd9));
        assert_eq!(reader.position(), data.len());
    }

    #[test]
    fn extends_negative_values() {
        // size 3: 010 -> -5, 110 -> 6
        let data = [0b0101_1000];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.receive_extend(3), -5);
        assert_eq!(reader.receive_extend(3), 6);
        assert_eq!(reader.receive_extend(0), 0);
    }

    #[test]
    fn finds_marker_after_unread_bytes() {
        let data = [0x12, 0x34, 0xff, 0xff, 0xd0, 0x00];
        let mut reader = BitReader::new(&data);
        assert_eq!(reader.bits(4), 0x1);
        assert_eq!(reader.take_marker(), Some(0xd0));
        assert_eq!(reader.position(), 5);
        assert_eq!(reader.take_marker(), None);
    }
}
