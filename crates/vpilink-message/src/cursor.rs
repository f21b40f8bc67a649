//! Bounds-checked cursors over payload bytes.
//!
//! Every read checks the remaining length first and fails with
//! [`MessageError::Truncated`] instead of reading past the end.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{MessageError, Result};

/// Sequential reader over a payload.
#[derive(Debug, Clone)]
pub struct ByteReader {
    buf: Bytes,
}

impl ByteReader {
    pub fn new(buf: Bytes) -> Self {
        Self { buf }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.buf.remaining()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.buf.remaining() < needed {
            return Err(MessageError::Truncated {
                needed,
                remaining: self.buf.remaining(),
            });
        }
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        Ok(self.buf.get_u8())
    }

    pub fn read_u32_le(&mut self) -> Result<u32> {
        self.ensure(4)?;
        Ok(self.buf.get_u32_le())
    }

    /// Read exactly `len` bytes without copying.
    pub fn read_bytes(&mut self, len: usize) -> Result<Bytes> {
        self.ensure(len)?;
        Ok(self.buf.split_to(len))
    }

    /// Read a NUL-terminated UTF-8 name and consume its terminator.
    ///
    /// The terminator must lie inside the remaining bytes. Empty names are
    /// rejected.
    pub fn read_cstr(&mut self) -> Result<String> {
        let nul = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(MessageError::UnterminatedName)?;
        if nul == 0 {
            return Err(MessageError::InvalidName("name is empty"));
        }
        let raw = self.buf.split_to(nul);
        self.buf.advance(1);
        String::from_utf8(raw.to_vec()).map_err(|_| MessageError::InvalidName("name is not UTF-8"))
    }

    /// Take everything that is left.
    pub fn read_rest(&mut self) -> Bytes {
        self.buf.split_off(0)
    }
}

/// Sequential writer that refuses values the wire layout cannot express.
#[derive(Debug)]
pub struct ByteWriter<'a> {
    dst: &'a mut BytesMut,
}

impl<'a> ByteWriter<'a> {
    pub fn new(dst: &'a mut BytesMut) -> Self {
        Self { dst }
    }

    pub fn put_u8(&mut self, value: u8) -> &mut Self {
        self.dst.put_u8(value);
        self
    }

    pub fn put_u32_le(&mut self, value: u32) -> &mut Self {
        self.dst.put_u32_le(value);
        self
    }

    /// Write `name` followed by a NUL terminator.
    pub fn put_cstr(&mut self, name: &str) -> Result<&mut Self> {
        if name.is_empty() {
            return Err(MessageError::InvalidName("name is empty"));
        }
        if name.as_bytes().contains(&0) {
            return Err(MessageError::InvalidName("name contains a NUL byte"));
        }
        self.dst.put_slice(name.as_bytes());
        self.dst.put_u8(0);
        Ok(self)
    }

    /// Write a one-byte chunk count followed by the chunks.
    pub fn put_chunks(&mut self, chunks: &[u8]) -> Result<&mut Self> {
        let count = u8::try_from(chunks.len()).map_err(|_| MessageError::ChunkTooLong(chunks.len()))?;
        self.dst.put_u8(count);
        self.dst.put_slice(chunks);
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_fields_in_order() {
        let mut reader = ByteReader::new(Bytes::from_static(b"clk\0\x07\x00\x00\x01\x02\xAA\xBB"));
        assert_eq!(reader.read_cstr().unwrap(), "clk");
        assert_eq!(reader.read_u32_le().unwrap(), 0x0100_0007);
        assert_eq!(reader.read_u8().unwrap(), 2);
        assert_eq!(reader.read_bytes(2).unwrap().as_ref(), &[0xAA, 0xBB]);
        assert!(reader.is_empty());
    }

    #[test]
    fn fixed_width_reads_fail_past_end() {
        let mut reader = ByteReader::new(Bytes::from_static(&[1, 2, 3]));
        assert_eq!(
            reader.read_u32_le(),
            Err(MessageError::Truncated {
                needed: 4,
                remaining: 3
            })
        );
        // A failed read consumes nothing.
        assert_eq!(reader.remaining(), 3);
        assert!(reader.read_bytes(4).is_err());
        assert_eq!(reader.read_bytes(3).unwrap().len(), 3);
        assert!(reader.read_u8().is_err());
    }

    #[test]
    fn cstr_requires_terminator_in_bounds() {
        let mut reader = ByteReader::new(Bytes::from_static(b"no-terminator"));
        assert_eq!(reader.read_cstr(), Err(MessageError::UnterminatedName));
    }

    #[test]
    fn cstr_rejects_empty_and_non_utf8() {
        let mut reader = ByteReader::new(Bytes::from_static(b"\0rest"));
        assert!(matches!(reader.read_cstr(), Err(MessageError::InvalidName(_))));

        let mut reader = ByteReader::new(Bytes::from_static(b"\xFF\xFE\0"));
        assert!(matches!(reader.read_cstr(), Err(MessageError::InvalidName(_))));
    }

    #[test]
    fn writer_layout() {
        let mut buf = BytesMut::new();
        let mut writer = ByteWriter::new(&mut buf);
        writer.put_cstr("sig").unwrap().put_u32_le(3);
        writer.put_chunks(&[1, 2]).unwrap();
        assert_eq!(buf.as_ref(), b"sig\0\x03\0\0\0\x02\x01\x02");
    }

    #[test]
    fn writer_rejects_unrepresentable_values() {
        let mut buf = BytesMut::new();
        let mut writer = ByteWriter::new(&mut buf);
        assert!(writer.put_cstr("").is_err());
        assert!(writer.put_cstr("a\0b").is_err());
        assert_eq!(
            writer.put_chunks(&[0u8; 256]).unwrap_err(),
            MessageError::ChunkTooLong(256)
        );
        assert!(buf.is_empty());
    }
}
