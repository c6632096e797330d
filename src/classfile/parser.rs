//! Low-level byte stream parser for class file decoding.
//!
//! This module provides the [`Parser`] type, a cursor-based binary data parser for the
//! big-endian structures of the JVM class file format. Every read is bounds-checked and
//! reports [`crate::Error::OutOfBounds`] instead of panicking on truncated input.
//!
//! # Examples
//!
//! ```rust
//! use classfold::classfile::Parser;
//!
//! let data = [0xCA, 0xFE, 0xBA, 0xBE, 0x00, 0x41];
//! let mut parser = Parser::new(&data);
//!
//! assert_eq!(parser.read_u32()?, 0xCAFE_BABE);
//! assert_eq!(parser.read_u16()?, 0x41);
//! assert!(!parser.has_more_data());
//! # Ok::<(), classfold::Error>(())
//! ```

use crate::Result;

/// A cursor over a byte slice reading big-endian values.
pub struct Parser<'a> {
    /// The binary data being parsed
    data: &'a [u8],
    /// Current position within the data buffer
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new [`Parser`] from a byte slice.
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Returns the length of the underlying data buffer.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns `true` if the parser has no data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns `true` if there is more data available to parse.
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Get the current position of the parser within the data buffer.
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// Move the current position to the specified index.
    ///
    /// Seeking to exactly the end of the data is allowed, which is useful when a caller
    /// skips a trailing structure.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if position is beyond the data length.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Move the position forward by the specified number of bytes.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if advancing by step would exceed the data length.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        if self.position + step > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position += step;
        Ok(())
    }

    /// Read `len` bytes and advance past them.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than `len` bytes remain.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let end = self
            .position
            .checked_add(len)
            .ok_or_else(|| out_of_bounds_error!())?;
        if end > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        let slice = &self.data[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a `u1`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn read_u8(&mut self) -> Result<u8> {
        let byte = *self
            .data
            .get(self.position)
            .ok_or_else(|| out_of_bounds_error!())?;
        self.position += 1;
        Ok(byte)
    }

    /// Read a signed byte.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] at the end of the data.
    pub fn read_i8(&mut self) -> Result<i8> {
        Ok(self.read_u8()? as i8)
    }

    /// Read a big-endian `u2`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 2 bytes remain.
    pub fn read_u16(&mut self) -> Result<u16> {
        let bytes = self.read_bytes(2)?;
        Ok(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    /// Read a big-endian signed 16-bit value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 2 bytes remain.
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(self.read_u16()? as i16)
    }

    /// Read a big-endian `u4`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 4 bytes remain.
    pub fn read_u32(&mut self) -> Result<u32> {
        let bytes = self.read_bytes(4)?;
        Ok(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// Read a big-endian signed 32-bit value.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 4 bytes remain.
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(self.read_u32()? as i32)
    }

    /// Read a big-endian `u8` (eight bytes).
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if fewer than 8 bytes remain.
    pub fn read_u64(&mut self) -> Result<u64> {
        let high = u64::from(self.read_u32()?);
        let low = u64::from(self.read_u32()?);
        Ok((high << 32) | low)
    }

    /// Skip a `u4`-length prefixed attribute body and return it.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the length exceeds the remaining data.
    pub fn read_length_prefixed(&mut self) -> Result<&'a [u8]> {
        let length = self.read_u32()? as usize;
        self.read_bytes(length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_big_endian() {
        let data = [0x12, 0x34, 0x56, 0x78, 0x9A, 0xBC, 0xDE, 0xF0];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_u16().unwrap(), 0x1234);
        assert_eq!(parser.read_u16().unwrap(), 0x5678);
        assert_eq!(parser.read_i16().unwrap(), 0x9ABCu16 as i16);
        assert_eq!(parser.pos(), 6);
    }

    #[test]
    fn reads_u64() {
        let data = [0, 0, 0, 1, 0, 0, 0, 2];
        let mut parser = Parser::new(&data);
        assert_eq!(parser.read_u64().unwrap(), (1u64 << 32) | 2);
    }

    #[test]
    fn out_of_bounds() {
        let data = [0x01];
        let mut parser = Parser::new(&data);
        assert!(parser.read_u16().is_err());
        // failed reads leave the cursor untouched
        assert_eq!(parser.pos(), 0);
        assert_eq!(parser.read_u8().unwrap(), 1);
        assert!(matches!(
            parser.read_u8(),
            Err(crate::Error::OutOfBounds { .. })
        ));
    }

    #[test]
    fn seek_to_end_is_allowed() {
        let data = [0x01, 0x02];
        let mut parser = Parser::new(&data);
        parser.seek(2).unwrap();
        assert!(!parser.has_more_data());
        assert!(parser.seek(3).is_err());
    }
}
