//! Bounds-checked access to untrusted byte buffers.
//!
//! Every header field read by the PE and ELF parsers goes through
//! [`ByteCursor`]. Offsets are `u64` because ELF64 files declare 64-bit
//! offsets; any offset that does not fit the buffer, or whose end overflows,
//! yields [`OutOfBounds`] instead of a panic.

use byteorder::{ByteOrder, BE, LE};

use crate::error::OutOfBounds;

/// Byte order used to decode multi-byte integers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &'a [u8] {
        self.data
    }

    /// Checks that `width` bytes starting at `offset` lie inside the buffer.
    pub fn check_range(&self, offset: u64, width: u64) -> Result<(), OutOfBounds> {
        let err = OutOfBounds {
            offset,
            width,
            len: self.data.len(),
        };
        match offset.checked_add(width) {
            Some(end) if end <= self.data.len() as u64 => Ok(()),
            _ => Err(err),
        }
    }

    /// Returns `true` when the range is fully contained in the buffer.
    pub fn contains(&self, offset: u64, width: u64) -> bool {
        self.check_range(offset, width).is_ok()
    }

    pub fn read_bytes(&self, offset: u64, length: u64) -> Result<&'a [u8], OutOfBounds> {
        self.check_range(offset, length)?;
        // Both bounds are <= data.len(), so the casts cannot truncate.
        let start = offset as usize;
        Ok(&self.data[start..start + length as usize])
    }

    /// A cursor over the `length` bytes at `offset`.
    ///
    /// Parsers take one of these per fixed-size record and then read fields
    /// at small relative offsets, which keeps the arithmetic overflow-free.
    pub fn sub(&self, offset: u64, length: u64) -> Result<ByteCursor<'a>, OutOfBounds> {
        self.read_bytes(offset, length).map(ByteCursor::new)
    }

    pub fn read_array<const N: usize>(&self, offset: u64) -> Result<[u8; N], OutOfBounds> {
        let bytes = self.read_bytes(offset, N as u64)?;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    pub fn read_u8(&self, offset: u64) -> Result<u8, OutOfBounds> {
        Ok(self.read_bytes(offset, 1)?[0])
    }

    pub fn read_u16(&self, offset: u64, endian: Endianness) -> Result<u16, OutOfBounds> {
        let b = self.read_bytes(offset, 2)?;
        Ok(match endian {
            Endianness::Little => LE::read_u16(b),
            Endianness::Big => BE::read_u16(b),
        })
    }

    pub fn read_u32(&self, offset: u64, endian: Endianness) -> Result<u32, OutOfBounds> {
        let b = self.read_bytes(offset, 4)?;
        Ok(match endian {
            Endianness::Little => LE::read_u32(b),
            Endianness::Big => BE::read_u32(b),
        })
    }

    pub fn read_u64(&self, offset: u64, endian: Endianness) -> Result<u64, OutOfBounds> {
        let b = self.read_bytes(offset, 8)?;
        Ok(match endian {
            Endianness::Little => LE::read_u64(b),
            Endianness::Big => BE::read_u64(b),
        })
    }
}
