//! TON global config parsing.
//!
//! The network publishes a JSON config listing its public liteservers.
//! Only the `liteservers` array matters here: each entry has an IPv4
//! address packed into a signed integer, a port, and a base64 Ed25519
//! public key.

use std::net::{Ipv4Addr, SocketAddr};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{LiteError, Result};
use crate::session::SessionConfig;

/// One liteserver from the global config.
#[derive(Debug, Clone)]
pub struct LiteserverInfo {
    pub addr: SocketAddr,
    pub public_key: [u8; 32],
}

impl LiteserverInfo {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig::new(self.addr, self.public_key)
    }
}

#[derive(Deserialize)]
struct RawGlobalConfig {
    liteservers: Vec<RawLiteserver>,
}

#[derive(Deserialize)]
struct RawLiteserver {
    ip: i64,
    port: u16,
    id: RawServerId,
}

#[derive(Deserialize)]
struct RawServerId {
    #[serde(rename = "@type")]
    #[allow(dead_code)]
    key_type: Option<String>,
    key: String,
}

/// Parse the `liteservers` section of a global config document.
pub fn parse_global_config(json: &str) -> Result<Vec<LiteserverInfo>> {
    let raw: RawGlobalConfig =
        serde_json::from_str(json).map_err(|e| LiteError::Config(e.to_string()))?;
    if raw.liteservers.is_empty() {
        return Err(LiteError::Config("config lists no liteservers".into()));
    }
    raw.liteservers.iter().map(liteserver_info).collect()
}

fn liteserver_info(raw: &RawLiteserver) -> Result<LiteserverInfo> {
    // The config packs the IPv4 address into a signed 32-bit integer.
    let octets = (raw.ip as u32).to_be_bytes();
    let addr = SocketAddr::from((Ipv4Addr::from(octets), raw.port));

    let key = BASE64
        .decode(&raw.id.key)
        .map_err(|e| LiteError::Config(format!("bad server key base64: {e}")))?;
    let public_key: [u8; 32] = key
        .try_into()
        .map_err(|_| LiteError::Config("server key is not 32 bytes".into()))?;

    Ok(LiteserverInfo { addr, public_key })
}
