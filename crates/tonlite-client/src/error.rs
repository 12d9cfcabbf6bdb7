//! Client error taxonomy.

use thiserror::Error;
use tonlite_tl::TlError;

/// Errors surfaced by the liteserver client.
#[derive(Debug, Error)]
pub enum LiteError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The ADNL handshake did not complete.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// A frame violated the wire format before checksum verification.
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A frame's SHA256(nonce || payload) did not match its trailer.
    #[error("frame checksum mismatch")]
    ChecksumMismatch,

    /// A frame declared a length above the allowed maximum.
    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    /// An inbound message carried a constructor the client does not handle.
    #[error("unexpected message constructor 0x{0:08x}")]
    UnexpectedMessage(u32),

    #[error("TL decode error: {0}")]
    Tl(#[from] TlError),

    /// The liteserver answered with `liteServer.error`.
    #[error("server error {code}: {message}")]
    Server { code: i32, message: String },

    /// The per-query deadline elapsed before an answer arrived.
    #[error("query timed out")]
    QueryTimeout,

    /// The engine was closed before or during the query.
    #[error("engine is closed")]
    EngineClosed,

    /// The query was dropped without an answer (engine shutdown mid-flight).
    #[error("query cancelled")]
    QueryCancelled,

    /// The session has no live connection to write to.
    #[error("session is not ready")]
    NotReady,

    /// No balancer member became ready within the wait ceiling.
    #[error("no liteservers available")]
    NoServersAvailable,

    /// The rate limiter's wait queue is at capacity.
    #[error("rate limit queue is full")]
    RateLimitQueueFull,

    #[error("config error: {0}")]
    Config(String),

    #[error("crypto error: {0}")]
    Crypto(String),
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, LiteError>;
