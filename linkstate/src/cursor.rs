//! Bounds-checked big-endian cursors used by every wire codec in the crate.
//!
//! Reads past the end of a buffer and writes beyond its capacity return a
//! [`WireError`] instead of panicking, so a truncated datagram can never take
//! the parser outside the bytes it was handed.

use crate::feedback::WireError;

pub type WireResult<T> = Result<T, WireError>;

macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> WireResult<$type> {
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(self.read_bytes($size)?);
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

macro_rules! impl_write_be {
    ($name:ident, $type:ty) => {
        pub fn $name(&mut self, value: $type) -> WireResult<()> {
            self.write_bytes(&value.to_be_bytes())
        }
    };
}

/// Read cursor over a received buffer.
#[derive(Clone)]
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_be!(read_u16, u16, 2);
    impl_read_be!(read_u32, u32, 4);

    pub fn read_u8(&mut self) -> WireResult<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    pub fn read_bytes(&mut self, len: usize) -> WireResult<&'a [u8]> {
        if len > self.remaining() {
            return Err(WireError::Underrun {
                offset: self.offset,
                needed: len,
                remaining: self.remaining(),
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Skips `len` bytes (reserved fields).
    pub fn skip(&mut self, len: usize) -> WireResult<()> {
        self.read_bytes(len).map(|_| ())
    }

    /// Splits off the next `len` bytes as an independent cursor and advances past them.
    pub fn sub_cursor(&mut self, len: usize) -> WireResult<Cursor<'a>> {
        Ok(Cursor::new(self.read_bytes(len)?))
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.remaining() == 0
    }
}

/// Write cursor over a fixed-capacity buffer.
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_be!(write_u16, u16);
    impl_write_be!(write_u32, u32);

    pub fn write_u8(&mut self, value: u8) -> WireResult<()> {
        self.write_bytes(&[value])
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> WireResult<()> {
        if data.len() > self.remaining() {
            return Err(WireError::Overrun {
                offset: self.offset,
                needed: data.len(),
                remaining: self.remaining(),
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_reports_underrun_with_offset() {
        let data = [0x12, 0x34, 0x56];
        let mut cursor = Cursor::new(&data);
        assert_eq!(cursor.read_u16().unwrap(), 0x1234);
        match cursor.read_u16() {
            Err(WireError::Underrun {
                offset,
                needed,
                remaining,
            }) => {
                assert_eq!(offset, 2);
                assert_eq!(needed, 2);
                assert_eq!(remaining, 1);
            }
            other => panic!("expected underrun, got {other:?}"),
        }
        // a failed read does not advance the cursor
        assert_eq!(cursor.read_u8().unwrap(), 0x56);
        assert!(cursor.is_eof());
    }

    #[test]
    fn write_is_big_endian_and_bounded() {
        let mut buffer = [0u8; 5];
        let mut cursor = CursorMut::new(&mut buffer);
        cursor.write_u32(0xDEAD_BEEF).unwrap();
        assert!(matches!(
            cursor.write_u16(1),
            Err(WireError::Overrun { offset: 4, .. })
        ));
        cursor.write_u8(7).unwrap();
        assert_eq!(cursor.remaining(), 0);
        assert_eq!(buffer, [0xDE, 0xAD, 0xBE, 0xEF, 7]);
    }

    #[test]
    fn sub_cursor_is_confined() {
        let data = [1, 2, 3, 4];
        let mut cursor = Cursor::new(&data);
        let mut inner = cursor.sub_cursor(2).unwrap();
        assert_eq!(inner.read_u16().unwrap(), 0x0102);
        assert!(inner.read_u8().is_err());
        assert_eq!(cursor.read_u16().unwrap(), 0x0304);
    }
}
