//! ADNL TCP handshake.
//!
//! The client opens a session by sending a single 256-byte packet:
//!
//! ```text
//! [server key ID: 32][client public key: 32][SHA256(params): 32][encrypted params: 160]
//! ```
//!
//! The 160-byte parameter block carries the session keys:
//!
//! ```text
//! [rx_key: 32][tx_key: 32][rx_iv: 16][tx_iv: 16][random padding: 64]
//! ```
//!
//! `rx`/`tx` are from the client's point of view. The block is encrypted
//! with a cipher derived from the ECDH shared secret and the block's own
//! digest, so only the addressed server can open it and any tampering
//! breaks the digest check. The server confirms by sending an empty frame
//! under the new session keys.

use tonlite_crypto::{
    derive_handshake_cipher, fill_random, key_id, shared_secret_ed25519, sha256, Cipher, Keypair,
    SessionKeys,
};

use crate::error::{LiteError, Result};

/// Size of the handshake packet on the wire.
pub const HANDSHAKE_LEN: usize = 256;

/// Size of the session parameter block inside the packet.
pub const PARAMS_LEN: usize = 160;

/// A prepared client handshake: the packet to send and the session keys
/// the connection will use once the server confirms.
pub struct ClientHandshake {
    pub packet: [u8; HANDSHAKE_LEN],
    pub keys: SessionKeys,
}

/// Build a handshake packet for a server, generating fresh ephemeral
/// client keys and random session parameters.
pub fn build_client_handshake(server_public: &[u8; 32]) -> Result<ClientHandshake> {
    let client = Keypair::generate();
    let mut params = [0u8; PARAMS_LEN];
    fill_random(&mut params);
    build_client_handshake_with(server_public, &client, &params)
}

/// Build a handshake packet from explicit client keys and parameters.
///
/// Split out from [`build_client_handshake`] so tests can run the
/// handshake deterministically.
pub fn build_client_handshake_with(
    server_public: &[u8; 32],
    client: &Keypair,
    params: &[u8; PARAMS_LEN],
) -> Result<ClientHandshake> {
    let secret = shared_secret_ed25519(client.secret_bytes(), server_public)
        .map_err(|e| LiteError::Handshake(format!("ECDH failed: {e}")))?;
    let digest = sha256(params);

    let mut packet = [0u8; HANDSHAKE_LEN];
    packet[0..32].copy_from_slice(&key_id(server_public));
    packet[32..64].copy_from_slice(&client.public_key);
    packet[64..96].copy_from_slice(&digest);
    packet[96..256].copy_from_slice(params);
    derive_handshake_cipher(&secret, &digest).apply(&mut packet[96..256]);

    Ok(ClientHandshake {
        packet,
        keys: session_keys_from_params(params, Direction::Client)?,
    })
}

/// Accept a client handshake packet on the server side.
///
/// Returns the server's session keys (the mirror image of the client's).
/// Used by in-process test servers; a real liteserver does the same work.
pub fn accept_server_handshake(
    packet: &[u8; HANDSHAKE_LEN],
    server: &Keypair,
) -> Result<SessionKeys> {
    if packet[0..32] != server.id() {
        return Err(LiteError::Handshake(
            "packet addressed to a different key ID".into(),
        ));
    }

    let client_public: [u8; 32] = packet[32..64].try_into().unwrap_or([0u8; 32]);
    let digest: [u8; 32] = packet[64..96].try_into().unwrap_or([0u8; 32]);
    let secret = shared_secret_ed25519(server.secret_bytes(), &client_public)
        .map_err(|e| LiteError::Handshake(format!("ECDH failed: {e}")))?;

    let mut params = [0u8; PARAMS_LEN];
    params.copy_from_slice(&packet[96..256]);
    derive_handshake_cipher(&secret, &digest).apply(&mut params);

    if sha256(&params) != digest {
        return Err(LiteError::Handshake("parameter digest mismatch".into()));
    }

    session_keys_from_params(&params, Direction::Server)
}

enum Direction {
    Client,
    Server,
}

fn session_keys_from_params(params: &[u8; PARAMS_LEN], dir: Direction) -> Result<SessionKeys> {
    let mk = |key: &[u8], iv: &[u8]| {
        Cipher::from_slices(key, iv).map_err(|e| LiteError::Crypto(e.to_string()))
    };
    let rx = mk(&params[0..32], &params[64..80])?;
    let tx = mk(&params[32..64], &params[80..96])?;
    Ok(match dir {
        // The server encrypts with what the client will decrypt with.
        Direction::Client => SessionKeys { rx, tx },
        Direction::Server => SessionKeys { rx: tx, tx: rx },
    })
}
