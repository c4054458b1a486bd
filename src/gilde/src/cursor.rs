//! Byte cursor for schema-driven parsing
//!
//! Every read either advances by exactly the requested width or fails and
//! leaves the position untouched. The cursor also records which byte ranges
//! were read (including reads made through `pointer` fields) so the pipeline
//! can tell whether a schema consumed the whole asset. Reads made by an
//! attempt that is later abandoned are dropped again through [`Mark`].

use byteorder::{ByteOrder, LittleEndian};
use memchr::memchr;

/// Low-level read failure; the evaluator adds the field path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadError {
    /// Fewer bytes remain than the read needs
    UnexpectedEnd {
        offset: usize,
        needed: usize,
        available: usize,
    },
    /// A constant marker did not match
    Mismatch {
        offset: usize,
        expected: Vec<u8>,
        found: Vec<u8>,
    },
    /// Seek target outside the data
    OutOfBounds { offset: usize, len: usize },
    /// Bytes that are not valid in the requested text encoding
    InvalidText { offset: usize, byte: u8 },
}

impl ReadError {
    /// Where the failure happened; for short reads, the offset at which the data ran out
    pub fn offset(&self) -> usize {
        match self {
            Self::UnexpectedEnd {
                offset, available, ..
            } => offset + available,
            Self::Mismatch { offset, .. }
            | Self::OutOfBounds { offset, .. }
            | Self::InvalidText { offset, .. } => *offset,
        }
    }

    /// Human readable (expected, found) pair
    pub fn describe(&self) -> (String, String) {
        match self {
            Self::UnexpectedEnd {
                needed, available, ..
            } => (
                format!("{} byte(s)", needed),
                format!("end of stream ({} byte(s) left)", available),
            ),
            Self::Mismatch {
                expected, found, ..
            } => (hex_bytes(expected), hex_bytes(found)),
            Self::OutOfBounds { offset, len } => (
                format!("offset within 0..={}", len),
                format!("offset 0x{:x}", offset),
            ),
            Self::InvalidText { byte, .. } => {
                ("ASCII text".to_string(), format!("byte 0x{:02x}", byte))
            }
        }
    }
}

fn hex_bytes(bytes: &[u8]) -> String {
    if bytes.is_empty() {
        return "end of stream".to_string();
    }
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

pub type ReadResult<T> = std::result::Result<T, ReadError>;

/// Saved cursor state for backtracking
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mark {
    pos: usize,
    spans: usize,
    last_end: usize,
}

impl Mark {
    pub fn position(&self) -> usize {
        self.pos
    }
}

/// Position-tracking reader over an in-memory asset
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
    /// Ranges read so far, in read order; adjacent reads extend the last one
    spans: Vec<(usize, usize)>,
}

impl<'a> Cursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            spans: Vec::new(),
        }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    #[inline]
    pub fn at_end(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// Furthest offset any kept read has reached
    pub fn high_water(&self) -> usize {
        self.spans.iter().map(|&(_, end)| end).max().unwrap_or(0)
    }

    /// First byte range no kept read has covered, as `(start, end)`
    pub fn first_gap(&self) -> Option<(usize, usize)> {
        let mut spans = self.spans.clone();
        spans.sort_unstable();
        let mut covered = 0;
        for (start, end) in spans {
            if start > covered {
                return Some((covered, start));
            }
            covered = covered.max(end);
        }
        (covered < self.data.len()).then_some((covered, self.data.len()))
    }

    /// Current state, to [`Cursor::rewind`] to if an attempt fails
    pub fn mark(&self) -> Mark {
        Mark {
            pos: self.pos,
            spans: self.spans.len(),
            last_end: self.spans.last().map_or(0, |&(_, end)| end),
        }
    }

    /// Go back to `mark`, forgetting every read made since
    pub fn rewind(&mut self, mark: Mark) {
        self.pos = mark.pos;
        self.spans.truncate(mark.spans);
        if let Some(last) = self.spans.last_mut() {
            last.1 = mark.last_end;
        }
    }

    /// Move to an absolute offset (end of data is a valid target)
    pub fn seek(&mut self, offset: usize) -> ReadResult<()> {
        if offset > self.data.len() {
            return Err(ReadError::OutOfBounds {
                offset,
                len: self.data.len(),
            });
        }
        self.pos = offset;
        Ok(())
    }

    /// Return to an offset obtained from [`Cursor::position`], keeping what was read
    pub(crate) fn restore(&mut self, offset: usize) {
        self.pos = offset.min(self.data.len());
    }

    /// Look at the next byte without consuming it
    #[inline]
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Consume exactly `n` bytes
    pub fn take(&mut self, n: usize) -> ReadResult<&'a [u8]> {
        let available = self.remaining();
        if n > available {
            return Err(ReadError::UnexpectedEnd {
                offset: self.pos,
                needed: n,
                available,
            });
        }
        let start = self.pos;
        self.pos += n;
        if n > 0 {
            match self.spans.last_mut() {
                Some(last) if last.1 == start => last.1 = self.pos,
                _ => self.spans.push((start, self.pos)),
            }
        }
        Ok(&self.data[start..self.pos])
    }

    pub fn read_u8(&mut self) -> ReadResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_u16(&mut self) -> ReadResult<u16> {
        Ok(LittleEndian::read_u16(self.take(2)?))
    }

    pub fn read_u32(&mut self) -> ReadResult<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_i32(&mut self) -> ReadResult<i32> {
        Ok(LittleEndian::read_i32(self.take(4)?))
    }

    pub fn read_f32(&mut self) -> ReadResult<f32> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    /// Consume `expected` if the next bytes match it; otherwise leave the position alone
    pub fn expect(&mut self, expected: &[u8]) -> ReadResult<()> {
        let end = (self.pos + expected.len()).min(self.data.len());
        let found = &self.data[self.pos..end];
        if found != expected {
            return Err(ReadError::Mismatch {
                offset: self.pos,
                expected: expected.to_vec(),
                found: found.to_vec(),
            });
        }
        self.take(expected.len()).map(|_| ())
    }

    /// Consume bytes up to and including a NUL terminator; returns the bytes before it
    pub fn read_cstring(&mut self) -> ReadResult<&'a [u8]> {
        let rest = &self.data[self.pos..];
        let Some(len) = memchr(0, rest) else {
            return Err(ReadError::UnexpectedEnd {
                offset: self.data.len(),
                needed: 1,
                available: 0,
            });
        };
        let bytes = self.take(len + 1)?;
        Ok(&bytes[..len])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primitive_reads() {
        let data = [
            0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x00, 0x00, 0x80, 0x3f,
        ];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_u8().unwrap(), 1);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        assert_eq!(cursor.read_u32().unwrap(), 0x1234_5678);
        assert_eq!(cursor.read_f32().unwrap(), 1.0);
        assert!(cursor.at_end());
        assert_eq!(cursor.high_water(), data.len());
    }

    #[test]
    fn test_short_read_does_not_move() {
        let data = [0x01, 0x02, 0x03];
        let mut cursor = Cursor::new(&data);
        cursor.read_u8().unwrap();
        let err = cursor.read_u32().unwrap_err();
        assert_eq!(
            err,
            ReadError::UnexpectedEnd {
                offset: 1,
                needed: 4,
                available: 2
            }
        );
        assert_eq!(cursor.position(), 1);
        assert_eq!(err.offset(), 3);
    }

    #[test]
    fn test_expect_mismatch_does_not_move() {
        let data = [0x05, 0x07];
        let mut cursor = Cursor::new(&data);
        assert!(cursor.expect(&[0x05, 0x06]).is_err());
        assert_eq!(cursor.position(), 0);
        cursor.expect(&[0x05]).unwrap();
        assert_eq!(cursor.position(), 1);
    }

    #[test]
    fn test_cstring() {
        let data = b"abc\0de";
        let mut cursor = Cursor::new(data);
        assert_eq!(cursor.read_cstring().unwrap(), b"abc");
        assert_eq!(cursor.position(), 4);
        assert!(cursor.read_cstring().is_err());
        assert_eq!(cursor.position(), 4);
    }

    #[test]
    fn test_seek_and_high_water() {
        let data = [0u8; 16];
        let mut cursor = Cursor::new(&data);
        cursor.seek(12).unwrap();
        cursor.read_u32().unwrap();
        cursor.seek(0).unwrap();
        assert_eq!(cursor.position(), 0);
        assert_eq!(cursor.high_water(), 16);
        assert!(cursor.seek(17).is_err());
    }

    #[test]
    fn test_rewind_forgets_abandoned_reads() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut cursor = Cursor::new(&data);
        cursor.read_u16().unwrap();
        let mark = cursor.mark();
        cursor.read_u16().unwrap();
        cursor.read_u8().unwrap();
        assert_eq!(cursor.high_water(), 5);

        cursor.rewind(mark);
        assert_eq!(cursor.position(), 2);
        assert_eq!(cursor.high_water(), 2);
        assert_eq!(cursor.first_gap(), Some((2, 6)));
    }

    #[test]
    fn test_first_gap_between_reads() {
        let data = [0u8; 12];
        let mut cursor = Cursor::new(&data);
        cursor.read_u32().unwrap();
        cursor.seek(8).unwrap();
        cursor.read_u32().unwrap();
        assert_eq!(cursor.high_water(), 12);
        assert_eq!(cursor.first_gap(), Some((4, 8)));

        cursor.restore(4);
        cursor.read_u32().unwrap();
        assert_eq!(cursor.first_gap(), None);
    }

    #[test]
    fn test_describe_mismatch() {
        let err = ReadError::Mismatch {
            offset: 3,
            expected: vec![0x2f, 0x2d],
            found: vec![0x14],
        };
        let (expected, found) = err.describe();
        assert_eq!(expected, "2F 2D");
        assert_eq!(found, "14");
        assert_eq!(err.offset(), 3);
    }
}
