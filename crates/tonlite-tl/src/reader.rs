//! TL message parser.

use crate::{TlError, TlResult, BOOL_FALSE, BOOL_TRUE};

/// A cursor over a TL-encoded byte slice.
pub struct TlReader<'a> {
    data: &'a [u8],
    offset: usize,
}

impl<'a> TlReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, offset: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.offset
    }

    pub fn is_empty(&self) -> bool {
        self.offset >= self.data.len()
    }

    /// Current position in the underlying slice.
    pub fn position(&self) -> usize {
        self.offset
    }

    /// Read `len` raw bytes without TL framing.
    pub fn read_raw(&mut self, len: usize) -> TlResult<&'a [u8]> {
        if self.remaining() < len {
            return Err(TlError::UnexpectedEof {
                needed: len,
                available: self.remaining(),
            });
        }
        let out = &self.data[self.offset..self.offset + len];
        self.offset += len;
        Ok(out)
    }

    /// Read a constructor ID.
    pub fn read_id(&mut self) -> TlResult<u32> {
        self.read_u32()
    }

    /// Peek at the next constructor ID without consuming it.
    pub fn peek_id(&self) -> TlResult<u32> {
        if self.remaining() < 4 {
            return Err(TlError::UnexpectedEof {
                needed: 4,
                available: self.remaining(),
            });
        }
        let bytes = &self.data[self.offset..self.offset + 4];
        Ok(u32::from_le_bytes(bytes.try_into().unwrap()))
    }

    pub fn read_i32(&mut self) -> TlResult<i32> {
        Ok(i32::from_le_bytes(self.read_raw(4)?.try_into().unwrap()))
    }

    pub fn read_u32(&mut self) -> TlResult<u32> {
        Ok(u32::from_le_bytes(self.read_raw(4)?.try_into().unwrap()))
    }

    pub fn read_i64(&mut self) -> TlResult<i64> {
        Ok(i64::from_le_bytes(self.read_raw(8)?.try_into().unwrap()))
    }

    pub fn read_u64(&mut self) -> TlResult<u64> {
        Ok(u64::from_le_bytes(self.read_raw(8)?.try_into().unwrap()))
    }

    /// Read a 256-bit value (32 raw bytes).
    pub fn read_u256(&mut self) -> TlResult<[u8; 32]> {
        Ok(self.read_raw(32)?.try_into().unwrap())
    }

    /// Read a TL boolean constructor.
    pub fn read_bool(&mut self) -> TlResult<bool> {
        match self.read_u32()? {
            BOOL_TRUE => Ok(true),
            BOOL_FALSE => Ok(false),
            other => Err(TlError::InvalidData(format!(
                "expected bool constructor, got 0x{other:08x}"
            ))),
        }
    }

    /// Read a length-prefixed padded byte string.
    pub fn read_bytes(&mut self) -> TlResult<Vec<u8>> {
        if self.is_empty() {
            return Err(TlError::UnexpectedEof {
                needed: 1,
                available: 0,
            });
        }

        let first = self.data[self.offset];
        let (header, len) = if first < 254 {
            (1usize, first as usize)
        } else {
            if self.remaining() < 4 {
                return Err(TlError::UnexpectedEof {
                    needed: 4,
                    available: self.remaining(),
                });
            }
            let len = (self.data[self.offset + 1] as usize)
                | ((self.data[self.offset + 2] as usize) << 8)
                | ((self.data[self.offset + 3] as usize) << 16);
            (4usize, len)
        };

        let padding = (4 - (header + len) % 4) % 4;
        let consumed = header + len + padding;
        if self.remaining() < consumed {
            return Err(TlError::UnexpectedEof {
                needed: consumed,
                available: self.remaining(),
            });
        }

        let out = self.data[self.offset + header..self.offset + header + len].to_vec();
        self.offset += consumed;
        Ok(out)
    }

    /// Read a TL string (UTF-8 validated `bytes`).
    pub fn read_string(&mut self) -> TlResult<String> {
        String::from_utf8(self.read_bytes()?).map_err(|_| TlError::InvalidUtf8)
    }

    /// Read a bare vector: 4-byte count followed by the items.
    pub fn read_vector_bare<T, F>(&mut self, mut read_item: F) -> TlResult<Vec<T>>
    where
        F: FnMut(&mut Self) -> TlResult<T>,
    {
        let count = self.read_u32()? as usize;
        let mut items = Vec::with_capacity(count.min(1024));
        for _ in 0..count {
            items.push(read_item(self)?);
        }
        Ok(items)
    }

    /// Skip `count` bytes.
    pub fn skip(&mut self, count: usize) -> TlResult<()> {
        self.read_raw(count).map(|_| ())
    }
}
