//! Variable-length quantities and a bounds-checked byte reader.

use crate::error::CodecError;

/// Longest VLQ the file format allows (28 bits of payload).
pub const MAX_VLQ_BYTES: usize = 4;

/// Largest value a four-byte VLQ can carry.
pub const MAX_VLQ_VALUE: u32 = 0x0FFF_FFFF;

/// Write a variable-length quantity, most significant group first.
///
/// Callers must keep `value` within [`MAX_VLQ_VALUE`].
pub fn write_vlq(buf: &mut Vec<u8>, value: u32) {
    let mut groups = [0u8; 5];
    let mut n = 0;
    let mut rest = value;
    loop {
        groups[n] = (rest & 0x7F) as u8;
        n += 1;
        rest >>= 7;
        if rest == 0 {
            break;
        }
    }
    for i in (0..n).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        buf.push(groups[i] | continuation);
    }
}

/// Cursor over an in-memory chunk; offsets in errors are absolute.
#[derive(Debug, Clone)]
pub struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
    base: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// A reader whose reported offsets start at `base`.
    pub fn with_base(data: &'a [u8], base: usize) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next byte.
    pub fn offset(&self) -> usize {
        self.base + self.pos
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn need(&self, n: usize) -> Result<(), CodecError> {
        if self.remaining() < n {
            return Err(CodecError::TruncatedStream {
                offset: self.offset(),
                needed: n - self.remaining(),
            });
        }
        Ok(())
    }

    pub fn peek_u8(&self) -> Result<u8, CodecError> {
        self.need(1)?;
        Ok(self.data[self.pos])
    }

    pub fn read_u8(&mut self) -> Result<u8, CodecError> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Ok(byte)
    }

    pub fn read_u16_be(&mut self) -> Result<u16, CodecError> {
        let bytes = self.read_slice(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn read_u32_be(&mut self) -> Result<u32, CodecError> {
        let bytes = self.read_slice(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    pub fn read_slice(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        self.need(n)?;
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    /// Bytes consumed since `start` (a value from [`position`](Self::position)).
    pub fn since(&self, start: usize) -> &'a [u8] {
        &self.data[start..self.pos]
    }

    /// Read a VLQ of at most four bytes.
    ///
    /// A fifth continuation byte, or input ending mid-quantity, is
    /// `MalformedVarLen`.
    pub fn read_vlq(&mut self) -> Result<u32, CodecError> {
        let start = self.offset();
        let mut value: u32 = 0;
        for _ in 0..MAX_VLQ_BYTES {
            let byte = self
                .read_u8()
                .map_err(|_| CodecError::MalformedVarLen { offset: start })?;
            value = (value << 7) | (byte & 0x7F) as u32;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(CodecError::MalformedVarLen { offset: start })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encode(value: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        write_vlq(&mut buf, value);
        buf
    }

    #[test]
    fn vlq_encoding() {
        assert_eq!(encode(0), vec![0x00]);
        assert_eq!(encode(127), vec![0x7F]);
        assert_eq!(encode(128), vec![0x81, 0x00]);
        assert_eq!(encode(480), vec![0x83, 0x60]);
        assert_eq!(encode(MAX_VLQ_VALUE), vec![0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn vlq_decoding() {
        let mut reader = Reader::new(&[0x83, 0x60, 0x81, 0x80, 0x00, 0x7F]);
        assert_eq!(reader.read_vlq(), Ok(480));
        assert_eq!(reader.read_vlq(), Ok(16_384));
        assert_eq!(reader.read_vlq(), Ok(127));
        assert!(reader.is_empty());
    }

    #[test]
    fn vlq_longer_than_four_bytes_is_rejected() {
        let mut reader = Reader::with_base(&[0x81, 0x80, 0x80, 0x80, 0x00], 10);
        assert_eq!(
            reader.read_vlq(),
            Err(CodecError::MalformedVarLen { offset: 10 })
        );
    }

    #[test]
    fn vlq_cut_off_by_end_of_input_is_rejected() {
        let mut reader = Reader::new(&[0x81, 0x80]);
        assert_eq!(
            reader.read_vlq(),
            Err(CodecError::MalformedVarLen { offset: 0 })
        );
    }

    #[test]
    fn short_reads_report_truncation() {
        let mut reader = Reader::with_base(&[0x00, 0x01], 100);
        assert_eq!(
            reader.read_u32_be(),
            Err(CodecError::TruncatedStream {
                offset: 100,
                needed: 2
            })
        );
    }
}
