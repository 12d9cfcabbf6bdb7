//! TON liteserver client over ADNL TCP.
//!
//! The pieces stack bottom-up:
//!
//! - [`frame`]: the checksummed wire frame around every message
//! - [`handshake`]: the 256-byte packet that establishes session keys
//! - [`session`]: one encrypted, auto-reconnecting TCP connection
//! - [`engine`]: concurrent queries correlated by random 256-bit IDs,
//!   resent verbatim after a reconnect
//! - [`balancer`]: round-robin failover over several engines
//! - [`rate_limit`]: token-bucket pacing around any engine
//! - [`config`]: the network's global config with its liteserver list
//!
//! ```no_run
//! use std::time::Duration;
//! use tonlite_client::{BalancerConfig, EngineExt, LiteBalancer};
//!
//! # async fn demo(config_json: &str) -> tonlite_client::Result<()> {
//! let servers = tonlite_client::parse_global_config(config_json)?
//!     .iter()
//!     .map(|s| s.session_config())
//!     .collect();
//! let client = LiteBalancer::connect(servers, BalancerConfig::default());
//! let info = client.get_masterchain_info(Duration::from_secs(10)).await?;
//! println!("masterchain seqno: {}", info.last.seqno);
//! # Ok(())
//! # }
//! ```

pub mod balancer;
pub mod config;
pub mod engine;
pub mod error;
pub mod frame;
pub mod handshake;
pub mod rate_limit;
pub mod session;
pub mod tl;
pub mod types;

pub use balancer::{BalancerConfig, LiteBalancer};
pub use config::{parse_global_config, LiteserverInfo};
pub use engine::{Engine, EngineExt, LiteEngine};
pub use error::{LiteError, Result};
pub use frame::{Frame, FrameBuffer};
pub use rate_limit::{RateLimitConfig, RateLimited};
pub use session::{Session, SessionConfig, SessionEvent, SessionState};
pub use types::{BlockIdExt, MasterchainInfo, ZeroStateIdExt};

/// Lock a mutex, recovering the guard if a holder panicked.
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
