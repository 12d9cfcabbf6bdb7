//! Round-robin failover across several liteservers.
//!
//! The balancer tracks which members are ready by watching their
//! lifecycle events, so picking a server never requires probing it. A
//! cursor rotates through the ready set; a member that drops out of
//! `Ready` is skipped until its session recovers.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use crate::engine::{Engine, LiteEngine};
use crate::error::{LiteError, Result};
use crate::lock;
use crate::session::{SessionConfig, SessionEvent};

/// Retry policy for balanced queries.
#[derive(Debug, Clone)]
pub struct BalancerConfig {
    /// Poll interval while no member is ready.
    pub wait_poll: Duration,
    /// How many polls to wait for a ready member before giving up.
    pub max_wait_attempts: usize,
    /// Non-timeout errors tolerated per query; 0 means twice the member
    /// count.
    pub max_errors_per_query: usize,
    /// Member timeouts tolerated per query before the query itself is
    /// reported timed out; 0 means twice the member count.
    pub max_timeouts_per_query: usize,
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            wait_poll: Duration::from_millis(100),
            max_wait_attempts: 50,
            max_errors_per_query: 0,
            max_timeouts_per_query: 0,
        }
    }
}

#[derive(Default)]
struct ReadySet {
    ready: BTreeSet<usize>,
    cursor: usize,
}

/// An [`Engine`] that spreads queries over several [`LiteEngine`]s.
pub struct LiteBalancer {
    members: Vec<Arc<LiteEngine>>,
    shared: Arc<Mutex<ReadySet>>,
    events: broadcast::Sender<SessionEvent>,
    closed: Arc<AtomicBool>,
    config: BalancerConfig,
    watchers: Vec<JoinHandle<()>>,
}

impl LiteBalancer {
    /// Build a balancer over already-connected engines.
    pub fn new(members: Vec<LiteEngine>, config: BalancerConfig) -> Self {
        let members: Vec<Arc<LiteEngine>> = members.into_iter().map(Arc::new).collect();
        let shared = Arc::new(Mutex::new(ReadySet::default()));
        let (events, _) = broadcast::channel(64);

        let watchers = members
            .iter()
            .enumerate()
            .map(|(idx, member)| {
                tokio::spawn(watch_member(
                    idx,
                    member.clone(),
                    shared.clone(),
                    events.clone(),
                ))
            })
            .collect();

        Self {
            members,
            shared,
            events,
            closed: Arc::new(AtomicBool::new(false)),
            config,
            watchers,
        }
    }

    /// Connect one engine per server and balance over them.
    pub fn connect(servers: Vec<SessionConfig>, config: BalancerConfig) -> Self {
        let members = servers.into_iter().map(LiteEngine::connect).collect();
        Self::new(members, config)
    }

    /// Connect to every liteserver listed in a global config document.
    pub fn connect_global_config(json: &str, config: BalancerConfig) -> Result<Self> {
        let servers = crate::config::parse_global_config(json)?
            .iter()
            .map(|server| server.session_config())
            .collect();
        Ok(Self::connect(servers, config))
    }

    pub fn member_count(&self) -> usize {
        self.members.len()
    }

    fn max_errors(&self) -> usize {
        if self.config.max_errors_per_query == 0 {
            2 * self.members.len().max(1)
        } else {
            self.config.max_errors_per_query
        }
    }

    fn max_timeouts(&self) -> usize {
        if self.config.max_timeouts_per_query == 0 {
            2 * self.members.len().max(1)
        } else {
            self.config.max_timeouts_per_query
        }
    }

    /// Next ready member at or after the cursor, advancing the cursor
    /// past it.
    fn pick_next(&self) -> Option<Arc<LiteEngine>> {
        let mut shared = lock(&self.shared);
        let n = self.members.len();
        for offset in 0..n {
            let idx = (shared.cursor + offset) % n;
            if shared.ready.contains(&idx) {
                shared.cursor = (idx + 1) % n;
                return Some(self.members[idx].clone());
            }
        }
        None
    }
}

#[async_trait]
impl Engine for LiteBalancer {
    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !lock(&self.shared).ready.is_empty()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn query_raw(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let max_errors = self.max_errors();
        let max_timeouts = self.max_timeouts();
        let mut waits = 0usize;
        let mut errors = 0usize;
        let mut timeouts = 0usize;

        loop {
            if self.closed.load(Ordering::SeqCst) {
                return Err(LiteError::EngineClosed);
            }

            let Some(member) = self.pick_next() else {
                waits += 1;
                if waits > self.config.max_wait_attempts {
                    return Err(LiteError::NoServersAvailable);
                }
                tokio::time::sleep(self.config.wait_poll).await;
                continue;
            };

            match member.query_raw(request, timeout).await {
                Ok(answer) => return Ok(answer),
                // A slow server is not a broken query; move to the next
                // member without spending the error budget. Timeouts have
                // their own ceiling so an all-silent member set still
                // terminates.
                Err(LiteError::QueryTimeout) => {
                    trace!(addr = %member.addr(), "member timed out, rotating");
                    timeouts += 1;
                    if timeouts >= max_timeouts {
                        return Err(LiteError::QueryTimeout);
                    }
                }
                Err(e) => {
                    debug!(addr = %member.addr(), error = %e, "member failed");
                    errors += 1;
                    if errors >= max_errors {
                        return Err(e);
                    }
                }
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        for watcher in &self.watchers {
            watcher.abort();
        }
        let mut closing = Vec::with_capacity(self.members.len());
        for member in &self.members {
            let member = member.clone();
            closing.push(tokio::spawn(async move { member.close().await }));
        }
        for handle in closing {
            let _ = handle.await;
        }
        let _ = self.events.send(SessionEvent::Closed);
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }
}

/// Keep the ready set in sync with one member's lifecycle and forward
/// its events to balancer subscribers.
async fn watch_member(
    idx: usize,
    member: Arc<LiteEngine>,
    shared: Arc<Mutex<ReadySet>>,
    events: broadcast::Sender<SessionEvent>,
) {
    let mut rx = member.subscribe();
    if member.is_ready() {
        lock(&shared).ready.insert(idx);
    }
    loop {
        match rx.recv().await {
            Ok(event) => {
                match event {
                    SessionEvent::Ready => {
                        lock(&shared).ready.insert(idx);
                    }
                    SessionEvent::Closed => {
                        lock(&shared).ready.remove(&idx);
                    }
                    SessionEvent::Connected | SessionEvent::Faulted => {}
                }
                let _ = events.send(event);
            }
            Err(broadcast::error::RecvError::Lagged(_)) => {
                // Resync from the member's current state.
                if member.is_ready() {
                    lock(&shared).ready.insert(idx);
                } else {
                    lock(&shared).ready.remove(&idx);
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;

    fn dummy_engine(port: u16) -> LiteEngine {
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        LiteEngine::connect(SessionConfig::new(addr, [0u8; 32]))
    }

    #[tokio::test]
    async fn cursor_rotates_over_ready_members() {
        let balancer = LiteBalancer::new(
            vec![dummy_engine(3901), dummy_engine(3902), dummy_engine(3903)],
            BalancerConfig::default(),
        );
        {
            let mut shared = lock(&balancer.shared);
            shared.ready.extend([0, 1, 2]);
        }

        let picks: Vec<u16> = (0..4)
            .map(|_| balancer.pick_next().unwrap().addr().port())
            .collect();
        assert_eq!(picks, vec![3901, 3902, 3903, 3901]);
        balancer.close().await;
    }

    #[tokio::test]
    async fn unready_members_are_skipped() {
        let balancer = LiteBalancer::new(
            vec![dummy_engine(3911), dummy_engine(3912), dummy_engine(3913)],
            BalancerConfig::default(),
        );
        {
            let mut shared = lock(&balancer.shared);
            shared.ready.extend([0, 2]);
        }

        let picks: Vec<u16> = (0..4)
            .map(|_| balancer.pick_next().unwrap().addr().port())
            .collect();
        assert_eq!(picks, vec![3911, 3913, 3911, 3913]);
        balancer.close().await;
    }

    #[tokio::test]
    async fn empty_ready_set_yields_none() {
        let balancer = LiteBalancer::new(
            vec![dummy_engine(3921)],
            BalancerConfig::default(),
        );
        lock(&balancer.shared).ready.clear();
        assert!(balancer.pick_next().is_none());
        balancer.close().await;
    }
}
