//! Token-bucket rate limiting for any [`Engine`].
//!
//! Wraps an engine so queries pass through a token bucket. Callers that
//! arrive while the bucket is empty wait in a bounded queue; once the
//! queue is full, further queries are rejected immediately instead of
//! piling up.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use tokio::sync::{broadcast, Semaphore};
use tracing::trace;

use crate::engine::Engine;
use crate::error::{LiteError, Result};
use crate::session::SessionEvent;

type DirectLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Throughput policy for [`RateLimited`].
#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    /// Sustained queries per second.
    pub per_second: u32,
    /// Burst size the bucket can accumulate.
    pub burst: u32,
    /// Callers allowed to wait for a token at once.
    pub max_queue: usize,
}

impl RateLimitConfig {
    pub fn per_second(per_second: u32) -> Self {
        Self {
            per_second,
            burst: per_second.max(1),
            max_queue: 64,
        }
    }
}

/// An [`Engine`] decorator that paces queries through a token bucket.
pub struct RateLimited<E> {
    inner: E,
    limiter: DirectLimiter,
    queue: Semaphore,
}

impl<E: Engine> RateLimited<E> {
    pub fn new(inner: E, config: RateLimitConfig) -> Result<Self> {
        let per_second = NonZeroU32::new(config.per_second)
            .ok_or_else(|| LiteError::Config("rate limit must be at least 1/s".into()))?;
        let burst = NonZeroU32::new(config.burst)
            .ok_or_else(|| LiteError::Config("burst must be at least 1".into()))?;

        Ok(Self {
            inner,
            limiter: RateLimiter::direct(Quota::per_second(per_second).allow_burst(burst)),
            queue: Semaphore::new(config.max_queue),
        })
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }
}

#[async_trait]
impl<E: Engine> Engine for RateLimited<E> {
    fn is_ready(&self) -> bool {
        self.inner.is_ready()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    async fn query_raw(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let permit = self
            .queue
            .try_acquire()
            .map_err(|_| LiteError::RateLimitQueueFull)?;
        self.limiter.until_ready().await;
        drop(permit);
        trace!("token acquired");
        self.inner.query_raw(request, timeout).await
    }

    async fn close(&self) {
        self.inner.close().await;
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.subscribe()
    }
}
