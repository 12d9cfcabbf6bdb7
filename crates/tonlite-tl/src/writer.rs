//! TL message builder.

use crate::{BOOL_FALSE, BOOL_TRUE};

/// A growable buffer for composing TL messages field by field.
#[derive(Default)]
pub struct TlWriter {
    buffer: Vec<u8>,
}

impl TlWriter {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Create a writer with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    /// Write a constructor ID (little-endian u32).
    pub fn write_id(&mut self, id: u32) {
        self.write_u32(id);
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buffer.extend_from_slice(&value.to_le_bytes());
    }

    /// Write a 256-bit value (32 raw bytes).
    pub fn write_u256(&mut self, value: &[u8; 32]) {
        self.buffer.extend_from_slice(value);
    }

    /// Write a TL boolean (`boolTrue` / `boolFalse` constructor).
    pub fn write_bool(&mut self, value: bool) {
        self.write_u32(if value { BOOL_TRUE } else { BOOL_FALSE });
    }

    /// Write a length-prefixed byte string, padded to a 4-byte boundary.
    ///
    /// Lengths below 254 use a 1-byte prefix; longer values use the 0xFE
    /// marker followed by a 3-byte little-endian length.
    pub fn write_bytes(&mut self, data: &[u8]) {
        let len = data.len();

        let header = if len < 254 {
            self.buffer.push(len as u8);
            1
        } else {
            self.buffer.push(0xFE);
            self.buffer.push((len & 0xFF) as u8);
            self.buffer.push(((len >> 8) & 0xFF) as u8);
            self.buffer.push(((len >> 16) & 0xFF) as u8);
            4
        };
        self.buffer.extend_from_slice(data);

        let padding = (4 - (header + len) % 4) % 4;
        self.buffer.extend(std::iter::repeat_n(0u8, padding));
    }

    /// Write a string (TL `string` is the `bytes` encoding of its UTF-8).
    pub fn write_string(&mut self, s: &str) {
        self.write_bytes(s.as_bytes());
    }

    /// Write raw bytes without any TL framing.
    pub fn write_raw(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Write a bare vector: 4-byte count followed by the items.
    pub fn write_vector_bare<T, F>(&mut self, items: &[T], mut write_item: F)
    where
        F: FnMut(&mut Self, &T),
    {
        self.write_u32(items.len() as u32);
        for item in items {
            write_item(self, item);
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the writer and return the finished message.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buffer
    }
}
