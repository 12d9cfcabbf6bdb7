//! Ed25519 keypairs and ADNL key IDs.
//!
//! Liteservers are identified by an Ed25519 public key; the handshake
//! addresses them by key ID, `SHA256(pub.ed25519_prefix || public_key)`.

use ed25519_dalek::SigningKey;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::sha256::sha256_concat;

/// TL constructor of `pub.ed25519 key:int256 = PublicKey`, little-endian.
pub const ED25519_TL_PREFIX: [u8; 4] = [0xC6, 0xB4, 0x13, 0x48];

/// An Ed25519 keypair.
///
/// The secret seed is zeroized on drop. For the liteserver client the
/// keypair is ephemeral: generated per handshake, used once for ECDH.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Keypair {
    secret: [u8; 32],
    /// The 32-byte public key (not secret).
    #[zeroize(skip)]
    pub public_key: [u8; 32],
}

impl Keypair {
    /// Generate a fresh random keypair from the OS RNG.
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        Self {
            secret: signing_key.to_bytes(),
            public_key: signing_key.verifying_key().to_bytes(),
        }
    }

    /// Rebuild a keypair from a 32-byte seed.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        Self {
            secret: seed,
            public_key: signing_key.verifying_key().to_bytes(),
        }
    }

    /// The 32-byte secret seed.
    pub fn secret_bytes(&self) -> &[u8; 32] {
        &self.secret
    }

    /// The key ID (ADNL address) of this keypair's public key.
    pub fn id(&self) -> [u8; 32] {
        key_id(&self.public_key)
    }
}

/// Compute the ADNL key ID for an Ed25519 public key.
pub fn key_id(public_key: &[u8; 32]) -> [u8; 32] {
    sha256_concat(&[&ED25519_TL_PREFIX, public_key])
}
