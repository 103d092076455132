use crate::jvm::{Error, MalformedKind};
use byteorder::{BigEndian, ReadBytesExt};
use std::io::Cursor;

/// Big-endian cursor over class file bytes
///
/// Offsets in errors are relative to the start of the whole class file, even for cursors over a
/// single attribute.
#[derive(Clone)]
pub(crate) struct Input<'a> {
    cursor: Cursor<&'a [u8]>,

    /// Offset of `bytes[0]` in the class file
    base: usize,
}

impl<'a> Input<'a> {
    pub fn new(bytes: &'a [u8]) -> Input<'a> {
        Input::at(bytes, 0)
    }

    /// Cursor over a slice that starts at `base` in the class file
    pub fn at(bytes: &'a [u8], base: usize) -> Input<'a> {
        Input {
            cursor: Cursor::new(bytes),
            base,
        }
    }

    /// Position in the class file
    pub fn offset(&self) -> usize {
        self.base + self.position()
    }

    /// Position in the slice
    pub fn position(&self) -> usize {
        self.cursor.position() as usize
    }

    pub fn remaining(&self) -> usize {
        self.cursor.get_ref().len().saturating_sub(self.position())
    }

    pub fn malformed(&self, kind: MalformedKind) -> Error {
        Error::Malformed {
            offset: self.offset(),
            kind,
        }
    }

    fn eof(&self) -> Error {
        self.malformed(MalformedKind::UnexpectedEof)
    }

    /// Run a read, reporting a failure at the offset the read started from
    fn read<T>(
        &mut self,
        read: impl FnOnce(&mut Cursor<&'a [u8]>) -> std::io::Result<T>,
    ) -> Result<T, Error> {
        let offset = self.offset();
        read(&mut self.cursor).map_err(|_| Error::Malformed {
            offset,
            kind: MalformedKind::UnexpectedEof,
        })
    }

    pub fn u8(&mut self) -> Result<u8, Error> {
        self.read(|cursor| cursor.read_u8())
    }

    pub fn i8(&mut self) -> Result<i8, Error> {
        self.read(|cursor| cursor.read_i8())
    }

    pub fn u16(&mut self) -> Result<u16, Error> {
        self.read(|cursor| cursor.read_u16::<BigEndian>())
    }

    pub fn i16(&mut self) -> Result<i16, Error> {
        self.read(|cursor| cursor.read_i16::<BigEndian>())
    }

    pub fn u32(&mut self) -> Result<u32, Error> {
        self.read(|cursor| cursor.read_u32::<BigEndian>())
    }

    pub fn i32(&mut self) -> Result<i32, Error> {
        self.read(|cursor| cursor.read_i32::<BigEndian>())
    }

    pub fn i64(&mut self) -> Result<i64, Error> {
        self.read(|cursor| cursor.read_i64::<BigEndian>())
    }

    pub fn u64(&mut self) -> Result<u64, Error> {
        self.read(|cursor| cursor.read_u64::<BigEndian>())
    }

    /// Borrow the next `len` bytes
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let all: &'a [u8] = *self.cursor.get_ref();
        let start = self.position();
        let end = start.checked_add(len).ok_or_else(|| self.eof())?;
        let slice = all.get(start..end).ok_or_else(|| self.eof())?;
        self.cursor.set_position(end as u64);
        Ok(slice)
    }

    pub fn skip(&mut self, len: usize) -> Result<(), Error> {
        self.bytes(len).map(|_| ())
    }

    /// Skip to the next multiple of 4 (relative to the start of the slice)
    pub fn align_to_4(&mut self) -> Result<(), Error> {
        let padding = (4 - self.position() % 4) % 4;
        self.skip(padding)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let mut input = Input::at(&[0xca, 0xfe, 0xba, 0xbe, 0xff, 0x80, 0x00], 10);
        assert_eq!(input.u32().unwrap(), 0xcafebabe);
        assert_eq!(input.i8().unwrap(), -1);
        assert_eq!(input.offset(), 15);
        assert_eq!(input.remaining(), 2);
        match input.u32() {
            Err(Error::Malformed {
                offset: 15,
                kind: MalformedKind::UnexpectedEof,
            }) => (),
            other => panic!("unexpected {:?}", other),
        }
    }
}
