//! AES-256-CTR keystreams for ADNL session encryption.
//!
//! CTR mode makes encryption and decryption the same operation: XOR with a
//! keystream. A [`Cipher`] is stateful; each call continues the keystream
//! where the previous call stopped, which is exactly what a TCP byte stream
//! needs.

use aes::cipher::{KeyIvInit, StreamCipher};
use thiserror::Error;

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

/// Errors from building a cipher out of raw byte slices.
#[derive(Debug, Error)]
pub enum CipherError {
    #[error("invalid key length: expected 32, got {0}")]
    InvalidKey(usize),

    #[error("invalid IV length: expected 16, got {0}")]
    InvalidIv(usize),
}

/// A stateful AES-256-CTR keystream.
pub struct Cipher {
    inner: Aes256Ctr,
}

impl Cipher {
    /// Create a cipher from a 32-byte key and 16-byte IV.
    pub fn new(key: &[u8; 32], iv: &[u8; 16]) -> Self {
        Self {
            inner: Aes256Ctr::new(key.into(), iv.into()),
        }
    }

    /// Create a cipher from byte slices, validating lengths.
    pub fn from_slices(key: &[u8], iv: &[u8]) -> Result<Self, CipherError> {
        let key: &[u8; 32] = key
            .try_into()
            .map_err(|_| CipherError::InvalidKey(key.len()))?;
        let iv: &[u8; 16] = iv.try_into().map_err(|_| CipherError::InvalidIv(iv.len()))?;
        Ok(Self::new(key, iv))
    }

    /// Transform `data` in place under the keystream.
    ///
    /// The same call both encrypts and decrypts.
    pub fn apply(&mut self, data: &mut [u8]) {
        self.inner.apply_keystream(data);
    }

    /// Transform `data` and return the result, leaving the input untouched.
    pub fn transform(&mut self, data: &[u8]) -> Vec<u8> {
        let mut out = data.to_vec();
        self.inner.apply_keystream(&mut out);
        out
    }
}

/// The two directional ciphers of an established session.
///
/// `rx` decrypts server-to-client bytes, `tx` encrypts client-to-server
/// bytes. Built from the 160-byte handshake parameter block.
pub struct SessionKeys {
    pub rx: Cipher,
    pub tx: Cipher,
}

/// Derive the cipher that protects the handshake parameter block.
///
/// Follows the TON key schedule (`keys/encryptor.cpp`):
/// `key = secret[0..16] || digest[16..32]`,
/// `iv  = digest[0..4]  || secret[20..32]`,
/// where `digest` is the SHA256 of the plaintext parameters.
pub fn derive_handshake_cipher(secret: &[u8; 32], digest: &[u8; 32]) -> Cipher {
    let mut key = [0u8; 32];
    key[0..16].copy_from_slice(&secret[0..16]);
    key[16..32].copy_from_slice(&digest[16..32]);

    let mut iv = [0u8; 16];
    iv[0..4].copy_from_slice(&digest[0..4]);
    iv[4..16].copy_from_slice(&secret[20..32]);

    Cipher::new(&key, &iv)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip() {
        let key = [0x42u8; 32];
        let iv = [0x24u8; 16];

        let mut enc = Cipher::new(&key, &iv);
        let mut dec = Cipher::new(&key, &iv);

        let plaintext = b"Hello, TON!";
        let ciphertext = enc.transform(plaintext);
        assert_ne!(&ciphertext[..], plaintext);

        let decrypted = dec.transform(&ciphertext);
        assert_eq!(&decrypted[..], plaintext);
    }

    #[test]
    fn keystream_continues_across_calls() {
        let key = [7u8; 32];
        let iv = [9u8; 16];

        let mut chunked = Cipher::new(&key, &iv);
        let mut a = chunked.transform(b"Hello, ");
        a.extend(chunked.transform(b"TON!"));

        let mut whole = Cipher::new(&key, &iv);
        let b = whole.transform(b"Hello, TON!");
        assert_eq!(a, b);
    }

    #[test]
    fn from_slices_rejects_bad_lengths() {
        assert!(Cipher::from_slices(&[0u8; 16], &[0u8; 16]).is_err());
        assert!(Cipher::from_slices(&[0u8; 32], &[0u8; 8]).is_err());
        assert!(Cipher::from_slices(&[0u8; 32], &[0u8; 16]).is_ok());
    }

    #[test]
    fn keystream_matches_reference() {
        // Reference keystream produced by the python cryptography library
        // for key = 0x20..0x3f, iv = 0x50..0x5f.
        let key: [u8; 32] = core::array::from_fn(|i| 0x20 + i as u8);
        let iv: [u8; 16] = core::array::from_fn(|i| 0x50 + i as u8);

        let mut cipher = Cipher::new(&key, &iv);
        let keystream = cipher.transform(&[0u8; 16]);

        let expected = [
            0x44, 0xab, 0x3a, 0xd8, 0x52, 0xf5, 0x57, 0x29, 0x90, 0x8b, 0xb4, 0xf3, 0x77, 0xf6,
            0x39, 0xfb,
        ];
        assert_eq!(&keystream[..], &expected[..]);
    }

    #[test]
    fn handshake_cipher_is_deterministic() {
        let secret = [0x11u8; 32];
        let digest = [0x22u8; 32];

        let mut c1 = derive_handshake_cipher(&secret, &digest);
        let mut c2 = derive_handshake_cipher(&secret, &digest);
        assert_eq!(c1.transform(b"params"), c2.transform(b"params"));
    }
}
