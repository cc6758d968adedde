//! Low-level wire primitives: varints, zig-zag, fixed-width little-endian,
//! and the `(tag << 3) | wire_type` field keys of the Protocol Buffers wire
//! encoding.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

/// Protocol Buffers wire-type taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireType {
    Varint = 0,
    Fixed64 = 1,
    LengthDelimited = 2,
    Fixed32 = 5,
}

impl WireType {
    pub fn from_value(v: u32) -> Result<WireType, WireError> {
        match v {
            0 => Ok(WireType::Varint),
            1 => Ok(WireType::Fixed64),
            2 => Ok(WireType::LengthDelimited),
            5 => Ok(WireType::Fixed32),
            other => Err(WireError::InvalidWireType(other)),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("unexpected end of input at byte {0}")]
    UnexpectedEof(usize),
    #[error("varint longer than 10 bytes")]
    OverlongVarint,
    #[error("invalid wire type {0}")]
    InvalidWireType(u32),
    #[error("field tag 0 is invalid")]
    ZeroTag,
    #[error("invalid utf-8 in string field")]
    InvalidUtf8,
    #[error("length-delimited payload of {len} bytes exceeds remaining {remaining}")]
    LengthOverrun { len: usize, remaining: usize },
}

pub fn zigzag32(v: i32) -> u32 {
    ((v << 1) ^ (v >> 31)) as u32
}

pub fn unzigzag32(v: u32) -> i32 {
    ((v >> 1) as i32) ^ -((v & 1) as i32)
}

pub fn zigzag64(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

pub fn unzigzag64(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

/// Encoded length of a varint.
pub fn varint_len(mut v: u64) -> usize {
    let mut n = 1;
    while v >= 0x80 {
        v >>= 7;
        n += 1;
    }
    n
}

/// Encoded length of a field key for `tag`.
pub fn key_len(tag: u32) -> usize {
    varint_len((tag as u64) << 3)
}

/// Append-only writer over a byte buffer.
#[derive(Debug, Default)]
pub struct WireWriter {
    buf: Vec<u8>,
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn write_varint(&mut self, mut v: u64) {
        while v >= 0x80 {
            self.buf.push((v as u8) | 0x80);
            v >>= 7;
        }
        self.buf.push(v as u8);
    }

    /// Field key: varint of `(tag << 3) | wire_type`.
    pub fn write_key(&mut self, tag: u32, wire_type: WireType) {
        self.write_varint(((tag as u64) << 3) | wire_type as u64);
    }

    pub fn write_fixed32(&mut self, v: u32) {
        // WriteBytesExt on Vec<u8> cannot fail.
        let _ = self.buf.write_u32::<LittleEndian>(v);
    }

    pub fn write_fixed64(&mut self, v: u64) {
        let _ = self.buf.write_u64::<LittleEndian>(v);
    }

    pub fn write_float(&mut self, v: f32) {
        let _ = self.buf.write_f32::<LittleEndian>(v);
    }

    pub fn write_double(&mut self, v: f64) {
        let _ = self.buf.write_f64::<LittleEndian>(v);
    }

    pub fn write_raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Varint length prefix followed by the payload.
    pub fn write_len_delimited(&mut self, bytes: &[u8]) {
        self.write_varint(bytes.len() as u64);
        self.write_raw(bytes);
    }
}

/// Bounded reader over a byte slice. `begin_message` narrows the limit to a
/// length-delimited submessage; the end-of-message marker is simply reaching
/// that limit.
#[derive(Debug)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
    limit: usize,
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        WireReader { data, pos: 0, limit: data.len() }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.limit
    }

    pub fn read_varint(&mut self) -> Result<u64, WireError> {
        let mut out = 0u64;
        let mut shift = 0u32;
        loop {
            if self.pos >= self.limit {
                return Err(WireError::UnexpectedEof(self.pos));
            }
            if shift >= 70 {
                return Err(WireError::OverlongVarint);
            }
            let b = self.data[self.pos];
            self.pos += 1;
            out |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(out);
            }
            shift += 7;
        }
    }

    /// Next field key, or `None` at the end-of-message marker.
    pub fn read_key(&mut self) -> Result<Option<(u32, WireType)>, WireError> {
        if self.at_end() {
            return Ok(None);
        }
        let key = self.read_varint()?;
        let tag = (key >> 3) as u32;
        if tag == 0 {
            return Err(WireError::ZeroTag);
        }
        let wire_type = WireType::from_value((key & 0x7) as u32)?;
        Ok(Some((tag, wire_type)))
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8], WireError> {
        // pos never exceeds limit, so the subtraction cannot underflow; the
        // comparison must not add to n, which a crafted varint can put near
        // usize::MAX.
        if n > self.limit - self.pos {
            return Err(WireError::UnexpectedEof(self.pos));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub fn read_fixed32(&mut self) -> Result<u32, WireError> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    pub fn read_fixed64(&mut self) -> Result<u64, WireError> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    pub fn read_float(&mut self) -> Result<f32, WireError> {
        Ok(LittleEndian::read_f32(self.take(4)?))
    }

    pub fn read_double(&mut self) -> Result<f64, WireError> {
        Ok(LittleEndian::read_f64(self.take(8)?))
    }

    /// Varint length prefix followed by that many payload bytes.
    pub fn read_len_delimited(&mut self) -> Result<&'a [u8], WireError> {
        let len = self.read_varint()? as usize;
        if len > self.limit - self.pos {
            return Err(WireError::LengthOverrun { len, remaining: self.limit - self.pos });
        }
        self.take(len)
    }

    /// Narrow the limit to one length-delimited submessage. Returns the
    /// previous limit; restore it with [`WireReader::end_message`].
    pub fn begin_message(&mut self) -> Result<usize, WireError> {
        let len = self.read_varint()? as usize;
        if len > self.limit - self.pos {
            return Err(WireError::LengthOverrun { len, remaining: self.limit - self.pos });
        }
        let prev = self.limit;
        self.limit = self.pos + len;
        Ok(prev)
    }

    pub fn end_message(&mut self, prev_limit: usize) {
        self.pos = self.limit;
        self.limit = prev_limit;
    }

    /// Skip one payload of the given wire type; returns the raw bytes.
    /// This is the generic decode-and-discard for unknown tags.
    pub fn skip(&mut self, wire_type: WireType) -> Result<&'a [u8], WireError> {
        let start = self.pos;
        match wire_type {
            WireType::Varint => {
                self.read_varint()?;
            }
            WireType::Fixed64 => {
                self.take(8)?;
            }
            WireType::LengthDelimited => {
                self.read_len_delimited()?;
            }
            WireType::Fixed32 => {
                self.take(4)?;
            }
        }
        Ok(&self.data[start..self.pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_roundtrip() {
        for v in [0u64, 1, 127, 128, 300, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut w = WireWriter::new();
            w.write_varint(v);
            let bytes = w.into_bytes();
            assert_eq!(bytes.len(), varint_len(v));
            let mut r = WireReader::new(&bytes);
            assert_eq!(r.read_varint().unwrap(), v);
            assert!(r.at_end());
        }
    }

    #[test]
    fn zigzag_values() {
        assert_eq!(zigzag32(0), 0);
        assert_eq!(zigzag32(-1), 1);
        assert_eq!(zigzag32(1), 2);
        assert_eq!(zigzag32(-2), 3);
        assert_eq!(unzigzag32(zigzag32(i32::MIN)), i32::MIN);
        assert_eq!(unzigzag64(zigzag64(i64::MIN)), i64::MIN);
        assert_eq!(unzigzag64(zigzag64(-300)), -300);
    }

    #[test]
    fn key_encoding() {
        let mut w = WireWriter::new();
        w.write_key(1, WireType::Varint);
        let bytes = w.into_bytes();
        assert_eq!(bytes, vec![0x08]);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_key().unwrap(), Some((1, WireType::Varint)));
        assert_eq!(r.read_key().unwrap(), None);
    }

    #[test]
    fn submessage_limit() {
        let mut w = WireWriter::new();
        let mut inner = WireWriter::new();
        inner.write_key(1, WireType::Varint);
        inner.write_varint(3);
        w.write_len_delimited(&inner.into_bytes());
        w.write_varint(99);
        let bytes = w.into_bytes();

        let mut r = WireReader::new(&bytes);
        let prev = r.begin_message().unwrap();
        assert_eq!(r.read_key().unwrap(), Some((1, WireType::Varint)));
        assert_eq!(r.read_varint().unwrap(), 3);
        assert!(r.at_end());
        r.end_message(prev);
        assert_eq!(r.read_varint().unwrap(), 99);
    }

    #[test]
    fn oversized_length_prefix_is_an_error() {
        // Key (1, length-delimited) followed by a length of u64::MAX.
        let mut bytes = vec![0x0a];
        bytes.extend([0xff; 9]);
        bytes.push(0x01);
        let mut r = WireReader::new(&bytes);
        assert_eq!(r.read_key().unwrap(), Some((1, WireType::LengthDelimited)));
        assert!(matches!(r.read_len_delimited(), Err(WireError::LengthOverrun { .. })));

        let mut r = WireReader::new(&bytes[1..]);
        assert!(matches!(r.begin_message(), Err(WireError::LengthOverrun { .. })));
    }

    #[test]
    fn zero_tag_rejected() {
        let mut r = WireReader::new(&[0x00]);
        assert!(matches!(r.read_key(), Err(WireError::ZeroTag)));
    }
}
