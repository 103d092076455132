use byteorder::{BigEndian, ByteOrder};
use std::io;

/// Append-only byte buffer with big-endian primitive writes
///
/// Several class file fields (attribute lengths, table sizes, member counts) are only known once
/// their payload has been written. Those get reserved with a zeroed placeholder and patched
/// afterwards with one of the `overwrite_*` methods.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ByteVector {
    data: Vec<u8>,
}

impl ByteVector {
    pub fn new() -> ByteVector {
        ByteVector { data: Vec::new() }
    }

    pub fn with_capacity(capacity: usize) -> ByteVector {
        ByteVector {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Number of bytes written so far
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.data.push(value);
        self
    }

    pub fn put_i8(&mut self, value: i8) -> &mut Self {
        self.data.push(value as u8);
        self
    }

    pub fn put_u16(&mut self, value: u16) -> &mut Self {
        let at = self.grow(2);
        BigEndian::write_u16(&mut self.data[at..], value);
        self
    }

    pub fn put_i16(&mut self, value: i16) -> &mut Self {
        let at = self.grow(2);
        BigEndian::write_i16(&mut self.data[at..], value);
        self
    }

    pub fn put_u32(&mut self, value: u32) -> &mut Self {
        let at = self.grow(4);
        BigEndian::write_u32(&mut self.data[at..], value);
        self
    }

    pub fn put_i32(&mut self, value: i32) -> &mut Self {
        let at = self.grow(4);
        BigEndian::write_i32(&mut self.data[at..], value);
        self
    }

    pub fn put_u64(&mut self, value: u64) -> &mut Self {
        let at = self.grow(8);
        BigEndian::write_u64(&mut self.data[at..], value);
        self
    }

    pub fn put_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.data.extend_from_slice(bytes);
        self
    }

    /// Reserve a zeroed `u16` and return its offset (to be patched with `overwrite_u16`)
    pub fn reserve_u16(&mut self) -> usize {
        self.grow(2)
    }

    /// Reserve a zeroed `u32` and return its offset (to be patched with `overwrite_u32`)
    pub fn reserve_u32(&mut self) -> usize {
        self.grow(4)
    }

    /// Patch an already written `u16`
    ///
    /// Panics if `offset..offset + 2` was not written yet.
    pub fn overwrite_u16(&mut self, offset: usize, value: u16) {
        BigEndian::write_u16(&mut self.data[offset..offset + 2], value);
    }

    /// Patch an already written `u32`
    ///
    /// Panics if `offset..offset + 4` was not written yet.
    pub fn overwrite_u32(&mut self, offset: usize, value: u32) {
        BigEndian::write_u32(&mut self.data[offset..offset + 4], value);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Extend by `width` zero bytes and return the offset of the first new byte
    fn grow(&mut self, width: usize) -> usize {
        let at = self.data.len();
        self.data.resize(at + width, 0);
        at
    }
}

/// Lets [`crate::jvm::Serialize`] implementations target a `ByteVector` directly
impl io::Write for ByteVector {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.data.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl std::fmt::Debug for ByteVector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ByteVector({} bytes)", self.data.len())
    }
}
