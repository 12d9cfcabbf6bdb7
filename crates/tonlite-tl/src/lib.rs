//! TL (Type Language) serialization primitives.
//!
//! Every message in the liteserver protocol is a 32-bit constructor ID
//! (the CRC32 of the TL schema line, little-endian) followed by the
//! constructor's fields:
//!
//! ```text
//! [constructor_id: 4 bytes][field1][field2]...[fieldN]
//! ```
//!
//! Scalars are little-endian; `int256` is 32 raw bytes; `bytes` and
//! `string` are length-prefixed and padded to a 4-byte boundary; vectors
//! are a 4-byte count followed by the items.
//!
//! This crate is deliberately schema-free: the client composes messages
//! field by field with [`TlWriter`] and takes them apart with [`TlReader`].

use thiserror::Error;

mod reader;
mod writer;

pub use reader::TlReader;
pub use writer::TlWriter;

/// TL boolean constructors (`boolTrue` / `boolFalse`).
pub const BOOL_TRUE: u32 = 0x997275b5;
pub const BOOL_FALSE: u32 = 0xbc799737;

/// Errors from TL deserialization.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TlError {
    /// Not enough bytes left to read the expected value.
    #[error("unexpected end of data: need {needed} bytes, have {available}")]
    UnexpectedEof { needed: usize, available: usize },

    /// The data does not follow TL encoding rules.
    #[error("invalid TL data: {0}")]
    InvalidData(String),

    /// A string field holds invalid UTF-8.
    #[error("invalid UTF-8 string")]
    InvalidUtf8,
}

/// Result type for TL operations.
pub type TlResult<T> = std::result::Result<T, TlError>;
