//! Explicitly ordered integer packing over byte slices.
//!
//! Every multi-byte value in a demo has a fixed byte order (rng seed and
//! extended header trailers are big-endian, save-state counters little-endian),
//! so nothing here depends on the host's endianness.

/// Bounds-checked cursor over a byte slice.
///
/// Every read returns `None` instead of running past the end; the cursor only
/// advances on success.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Starts reading at the beginning of `data`.
    #[must_use]
    pub const fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Starts reading at `pos`.
    #[must_use]
    pub const fn at(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    /// Current offset from the start of the slice.
    #[inline]
    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    /// Total length of the underlying slice.
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the underlying slice is empty.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left after the cursor.
    #[inline]
    #[must_use]
    pub const fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    /// Returns `true` if `n` more bytes can be read.
    #[inline]
    #[must_use]
    pub const fn has(&self, n: usize) -> bool {
        self.remaining() >= n
    }

    /// The unread part of the slice.
    #[must_use]
    pub fn rest(&self) -> &'a [u8] {
        self.data.get(self.pos..).unwrap_or_default()
    }

    /// Reads the next byte without consuming it.
    #[must_use]
    pub fn peek_u8(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Reads `n` bytes.
    pub fn read_bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        let slice = self.data.get(self.pos..end)?;
        self.pos = end;
        Some(slice)
    }

    /// Reads a fixed-size array.
    pub fn read_array<const N: usize>(&mut self) -> Option<[u8; N]> {
        self.read_bytes(N)?.try_into().ok()
    }

    /// Skips `n` bytes.
    pub fn skip(&mut self, n: usize) -> Option<()> {
        self.read_bytes(n).map(|_| ())
    }

    /// Reads one unsigned byte.
    pub fn read_u8(&mut self) -> Option<u8> {
        let byte = self.peek_u8()?;
        self.pos += 1;
        Some(byte)
    }

    /// Reads one signed byte.
    pub fn read_i8(&mut self) -> Option<i8> {
        self.read_u8().map(|b| b as i8)
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> Option<u16> {
        self.read_array().map(u16::from_be_bytes)
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_be_bytes)
    }

    /// Reads a little-endian `u32`.
    pub fn read_u32_le(&mut self) -> Option<u32> {
        self.read_array().map(u32::from_le_bytes)
    }

    /// Reads a little-endian `i32`.
    pub fn read_i32_le(&mut self) -> Option<i32> {
        self.read_array().map(i32::from_le_bytes)
    }

    /// Reads a little-endian `u64`.
    pub fn read_u64_le(&mut self) -> Option<u64> {
        self.read_array().map(u64::from_le_bytes)
    }
}

/// Growable byte sink with explicit byte-order writers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    /// Creates an empty writer.
    #[must_use]
    pub const fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Creates an empty writer with room for `capacity` bytes.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Returns `true` if nothing has been written.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// The bytes written so far.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer, returning its bytes.
    #[must_use]
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Appends one byte.
    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    /// Appends one signed byte.
    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.put_u8(value as u8)
    }

    /// Appends a `bool` as `0` or `1`.
    pub fn put_bool(&mut self, value: bool) -> &mut Self {
        self.put_u8(u8::from(value))
    }

    /// Appends raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    /// Appends `n` zero bytes.
    pub fn put_zeroes(&mut self, n: usize) -> &mut Self {
        self.buf.resize(self.buf.len() + n, 0);
        self
    }

    /// Appends a big-endian `u16`.
    pub fn put_u16_be(&mut self, value: u16) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32_be(&mut self, value: u32) -> &mut Self {
        self.put_bytes(&value.to_be_bytes())
    }

    /// Appends a little-endian `u32`.
    pub fn put_u32_le(&mut self, value: u32) -> &mut Self {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Appends a little-endian `i32`.
    pub fn put_i32_le(&mut self, value: i32) -> &mut Self {
        self.put_bytes(&value.to_le_bytes())
    }

    /// Appends a little-endian `u64`.
    pub fn put_u64_le(&mut self, value: u64) -> &mut Self {
        self.put_bytes(&value.to_le_bytes())
    }
}

/// Overwrites four bytes at `offset` with a big-endian `u32`.
///
/// Returns `None` if the range does not fit in `buf`.
pub fn patch_u32_be(buf: &mut [u8], offset: usize, value: u32) -> Option<()> {
    let end = offset.checked_add(4)?;
    buf.get_mut(offset..end)?
        .copy_from_slice(&value.to_be_bytes());
    Some(())
}

#[cfg(test)]
#[allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn reader_stops_at_end_without_advancing() {
        let mut reader = ByteReader::new(&[1, 2, 3]);
        assert_eq!(reader.read_u8(), Some(1));
        assert_eq!(reader.read_u32_be(), None);
        assert_eq!(reader.position(), 1);
        assert_eq!(reader.read_bytes(2), Some(&[2u8, 3][..]));
        assert_eq!(reader.read_u8(), None);
        assert_eq!(reader.remaining(), 0);
    }

    #[test]
    fn byte_order_is_explicit() {
        let mut writer = ByteWriter::new();
        writer.put_u32_be(0x0102_0304).put_u32_le(0x0102_0304).put_u16_be(0xabcd);
        assert_eq!(
            writer.as_slice(),
            &[1, 2, 3, 4, 4, 3, 2, 1, 0xab, 0xcd]
        );

        let mut reader = ByteReader::new(writer.as_slice());
        assert_eq!(reader.read_u32_be(), Some(0x0102_0304));
        assert_eq!(reader.read_u32_le(), Some(0x0102_0304));
        assert_eq!(reader.read_u16_be(), Some(0xabcd));
    }

    #[test]
    fn signed_bytes_keep_their_bits() {
        let mut writer = ByteWriter::new();
        writer.put_i8(-1).put_i8(i8::MIN);
        assert_eq!(writer.as_slice(), &[0xff, 0x80]);
        let mut reader = ByteReader::new(writer.as_slice());
        assert_eq!(reader.read_i8(), Some(-1));
        assert_eq!(reader.read_i8(), Some(i8::MIN));
    }

    #[test]
    fn patch_in_place() {
        let mut buf = vec![0u8; 8];
        assert!(patch_u32_be(&mut buf, 2, 0xdead_beef).is_some());
        assert_eq!(buf, [0, 0, 0xde, 0xad, 0xbe, 0xef, 0, 0]);
        assert!(patch_u32_be(&mut buf, 6, 1).is_none());
    }

    #[test]
    fn peek_and_skip() {
        let mut reader = ByteReader::at(&[9, 8, 7], 1);
        assert_eq!(reader.peek_u8(), Some(8));
        assert_eq!(reader.position(), 1);
        assert!(reader.skip(2).is_some());
        assert!(reader.skip(1).is_none());
        assert!(reader.rest().is_empty());
    }
}
