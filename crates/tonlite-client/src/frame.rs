//! ADNL TCP frame codec.
//!
//! Every message on an established connection is a frame:
//!
//! ```text
//! [length: 4 bytes LE][nonce: 32 bytes][payload][checksum: 32 bytes]
//! ```
//!
//! The length covers everything after itself (nonce + payload + checksum),
//! so it is at least 64. The checksum is `SHA256(nonce || payload)` and is
//! verified before a payload is handed to anyone. The whole frame,
//! length prefix included, is encrypted on the wire; this module only sees
//! plaintext.

use tonlite_crypto::{random_id, sha256_concat};

use crate::error::{LiteError, Result};

/// Bytes of nonce plus checksum around every payload.
pub const FRAME_OVERHEAD: usize = 64;

/// Smallest complete frame: length prefix plus an empty payload.
pub const MIN_FRAME_LEN: usize = 4 + FRAME_OVERHEAD;

/// Largest declared frame length accepted, 10 MiB.
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// A decoded frame: verified payload plus the nonce it arrived under.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub nonce: [u8; 32],
    pub payload: Vec<u8>,
}

impl Frame {
    /// Encode a payload under a fresh random nonce.
    pub fn encode(payload: &[u8]) -> Vec<u8> {
        Self::encode_with_nonce(payload, &random_id())
    }

    /// Encode a payload under a caller-supplied nonce.
    pub fn encode_with_nonce(payload: &[u8], nonce: &[u8; 32]) -> Vec<u8> {
        let declared = FRAME_OVERHEAD + payload.len();
        let mut out = Vec::with_capacity(4 + declared);
        out.extend_from_slice(&(declared as u32).to_le_bytes());
        out.extend_from_slice(nonce);
        out.extend_from_slice(payload);
        out.extend_from_slice(&sha256_concat(&[nonce, payload]));
        out
    }

    /// Total frame size declared by the buffer's length prefix, if the
    /// prefix has arrived yet.
    pub fn expected_len(buf: &[u8]) -> Option<usize> {
        if buf.len() < 4 {
            return None;
        }
        let declared = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        Some(4 + declared)
    }

    /// Whether the buffer holds at least one complete frame.
    pub fn is_complete(buf: &[u8]) -> bool {
        matches!(Self::expected_len(buf), Some(total) if buf.len() >= total)
    }

    /// Try to decode one frame from the front of `buf`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete, and
    /// `Ok(Some((frame, consumed)))` once a full frame has been verified.
    /// A malformed length or a bad checksum is an error; the connection
    /// cannot be resynchronized after either.
    pub fn try_decode(buf: &[u8]) -> Result<Option<(Frame, usize)>> {
        let Some(total) = Self::expected_len(buf) else {
            return Ok(None);
        };
        let declared = total - 4;
        if declared < FRAME_OVERHEAD {
            return Err(LiteError::InvalidFrame(format!(
                "declared length {declared} below minimum {FRAME_OVERHEAD}"
            )));
        }
        if declared > MAX_FRAME_LEN {
            return Err(LiteError::FrameTooLarge {
                size: declared,
                max: MAX_FRAME_LEN,
            });
        }
        if buf.len() < total {
            return Ok(None);
        }

        let nonce: [u8; 32] = buf[4..36].try_into().unwrap_or([0u8; 32]);
        let payload = &buf[36..total - 32];
        let checksum = &buf[total - 32..total];
        if sha256_concat(&[&nonce, payload]) != checksum {
            return Err(LiteError::ChecksumMismatch);
        }

        Ok(Some((
            Frame {
                nonce,
                payload: payload.to_vec(),
            },
            total,
        )))
    }
}

/// Reassembles frames from an arbitrarily chunked byte stream.
#[derive(Default)]
pub struct FrameBuffer {
    buf: Vec<u8>,
}

impl FrameBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append decrypted bytes from the stream.
    pub fn extend(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Pop the next complete frame, if one has fully arrived.
    pub fn next_frame(&mut self) -> Result<Option<Frame>> {
        match Frame::try_decode(&self.buf)? {
            Some((frame, consumed)) => {
                self.buf.drain(..consumed);
                Ok(Some(frame))
            }
            None => Ok(None),
        }
    }

    /// Bytes buffered but not yet consumed by a complete frame.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let encoded = Frame::encode(b"hello liteserver");
        assert_eq!(encoded.len(), 4 + FRAME_OVERHEAD + 16);

        let (frame, consumed) = Frame::try_decode(&encoded).unwrap().unwrap();
        assert_eq!(consumed, encoded.len());
        assert_eq!(frame.payload, b"hello liteserver");
    }

    #[test]
    fn empty_payload_is_minimum_size() {
        let encoded = Frame::encode(&[]);
        assert_eq!(encoded.len(), MIN_FRAME_LEN);
        let (frame, _) = Frame::try_decode(&encoded).unwrap().unwrap();
        assert!(frame.payload.is_empty());
    }

    #[test]
    fn nonce_changes_bytes_not_payload() {
        let a = Frame::encode_with_nonce(b"same", &[1u8; 32]);
        let b = Frame::encode_with_nonce(b"same", &[2u8; 32]);
        assert_ne!(a, b);

        let (fa, _) = Frame::try_decode(&a).unwrap().unwrap();
        let (fb, _) = Frame::try_decode(&b).unwrap().unwrap();
        assert_eq!(fa.payload, fb.payload);
    }

    #[test]
    fn incomplete_frame_is_not_an_error() {
        let encoded = Frame::encode(b"partial");
        for cut in [0, 3, 4, 36, encoded.len() - 1] {
            assert!(Frame::try_decode(&encoded[..cut]).unwrap().is_none());
        }
    }

    #[test]
    fn bit_flip_fails_checksum() {
        let mut encoded = Frame::encode(b"integrity");
        encoded[40] ^= 0x01;
        assert!(matches!(
            Frame::try_decode(&encoded),
            Err(LiteError::ChecksumMismatch)
        ));
    }

    #[test]
    fn undersized_declared_length_rejected() {
        let mut bad = vec![0u8; MIN_FRAME_LEN];
        bad[0..4].copy_from_slice(&63u32.to_le_bytes());
        assert!(matches!(
            Frame::try_decode(&bad),
            Err(LiteError::InvalidFrame(_))
        ));
    }

    #[test]
    fn oversized_declared_length_rejected() {
        let mut bad = vec![0u8; 8];
        bad[0..4].copy_from_slice(&((MAX_FRAME_LEN + 1) as u32).to_le_bytes());
        assert!(matches!(
            Frame::try_decode(&bad),
            Err(LiteError::FrameTooLarge { .. })
        ));
    }

    #[test]
    fn buffer_reassembles_split_and_coalesced_frames() {
        let f1 = Frame::encode(b"first");
        let f2 = Frame::encode(b"second");
        let mut stream = f1.clone();
        stream.extend_from_slice(&f2);

        let mut buffer = FrameBuffer::new();
        // Feed one byte at a time; frames must pop out exactly twice.
        let mut seen = Vec::new();
        for byte in stream {
            buffer.extend(&[byte]);
            while let Some(frame) = buffer.next_frame().unwrap() {
                seen.push(frame.payload);
            }
        }
        assert_eq!(seen, vec![b"first".to_vec(), b"second".to_vec()]);
        assert_eq!(buffer.pending_len(), 0);
    }
}
