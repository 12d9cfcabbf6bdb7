//! Query engine over a single liteserver session.
//!
//! Queries are correlated by a random 256-bit ID, so any number can be in
//! flight at once. Each pending query keeps its exact serialized bytes;
//! when the session reconnects and becomes `Ready` again, every pending
//! query is resent verbatim, so the server sees the same query ID and
//! callers never observe the reconnect (beyond latency).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use tonlite_crypto::random_id;
use tonlite_tl::{TlReader, TlResult, TlWriter};

use crate::error::{LiteError, Result};
use crate::lock;
use crate::session::{Session, SessionConfig, SessionEvent};
use crate::tl;
use crate::types::MasterchainInfo;

/// Something queries can be sent through: a single engine, a balancer
/// over several, or a rate-limited wrapper around either.
#[async_trait]
pub trait Engine: Send + Sync {
    /// Whether a query sent now would go out immediately.
    fn is_ready(&self) -> bool;

    /// Whether the engine has been permanently closed.
    fn is_closed(&self) -> bool;

    /// Send a liteserver request body and await the raw answer bytes.
    ///
    /// `liteServer.error` answers surface as [`LiteError::Server`].
    async fn query_raw(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>>;

    /// Permanently close the engine, cancelling pending queries.
    async fn close(&self);

    /// Subscribe to lifecycle events.
    fn subscribe(&self) -> broadcast::Receiver<SessionEvent>;
}

/// Typed queries on top of any [`Engine`].
#[async_trait]
pub trait EngineExt: Engine {
    /// Send a request and decode the answer with `decode`.
    async fn query<R, F>(&self, request: &[u8], timeout: Duration, decode: F) -> Result<R>
    where
        F: for<'a> FnOnce(&mut TlReader<'a>) -> TlResult<R> + Send,
        R: Send;

    async fn get_masterchain_info(&self, timeout: Duration) -> Result<MasterchainInfo>;

    /// The server's wall clock, unix seconds.
    async fn get_time(&self, timeout: Duration) -> Result<i32>;
}

#[async_trait]
impl<E: Engine + ?Sized> EngineExt for E {
    async fn query<R, F>(&self, request: &[u8], timeout: Duration, decode: F) -> Result<R>
    where
        F: for<'a> FnOnce(&mut TlReader<'a>) -> TlResult<R> + Send,
        R: Send,
    {
        let answer = self.query_raw(request, timeout).await?;
        let mut reader = TlReader::new(&answer);
        Ok(decode(&mut reader)?)
    }

    async fn get_masterchain_info(&self, timeout: Duration) -> Result<MasterchainInfo> {
        let mut writer = TlWriter::with_capacity(4);
        writer.write_id(tl::GET_MASTERCHAIN_INFO);
        self.query(writer.as_bytes(), timeout, MasterchainInfo::read)
            .await
    }

    async fn get_time(&self, timeout: Duration) -> Result<i32> {
        let mut writer = TlWriter::with_capacity(4);
        writer.write_id(tl::GET_TIME);
        self.query(writer.as_bytes(), timeout, |reader| {
            let id = reader.read_id()?;
            if id != tl::CURRENT_TIME {
                return Err(tonlite_tl::TlError::InvalidData(format!(
                    "expected liteServer.currentTime, got 0x{id:08x}"
                )));
            }
            reader.read_i32()
        })
        .await
    }
}

struct PendingQuery {
    /// The exact bytes sent, resent verbatim after a reconnect.
    raw: Vec<u8>,
    tx: oneshot::Sender<Result<Vec<u8>>>,
    /// The ready epoch this query was last transmitted in. A query goes
    /// out at most once per epoch, whether by the direct send path or by
    /// the resend hook.
    sent_epoch: Option<u64>,
}

#[derive(Default)]
struct PendingTable {
    entries: HashMap<[u8; 32], PendingQuery>,
    /// Bumped on every `Ready` transition of the session.
    ready_epoch: u64,
}

type PendingMap = Arc<Mutex<PendingTable>>;

/// Bump the epoch and take the raw bytes of every entry not yet sent in
/// the new epoch, marking them sent.
fn collect_for_resend(table: &mut PendingTable) -> Vec<Vec<u8>> {
    table.ready_epoch += 1;
    let epoch = table.ready_epoch;
    table
        .entries
        .values_mut()
        .filter(|p| p.sent_epoch != Some(epoch))
        .map(|p| {
            p.sent_epoch = Some(epoch);
            p.raw.clone()
        })
        .collect()
}

/// Take one entry's raw bytes for immediate transmission, unless it
/// already went out in the current epoch.
fn take_for_send(table: &mut PendingTable, query_id: &[u8; 32]) -> Option<Vec<u8>> {
    let epoch = table.ready_epoch;
    match table.entries.get_mut(query_id) {
        Some(entry) if entry.sent_epoch != Some(epoch) => {
            entry.sent_epoch = Some(epoch);
            Some(entry.raw.clone())
        }
        _ => None,
    }
}

/// Concurrent query engine over one liteserver.
pub struct LiteEngine {
    session: Session,
    pending: PendingMap,
    closed: Arc<AtomicBool>,
    lifecycle: JoinHandle<()>,
}

impl LiteEngine {
    /// Connect to a liteserver. Returns immediately; queries issued before
    /// the session is ready are held and sent once it is.
    pub fn connect(config: SessionConfig) -> Self {
        let (session, inbound) = Session::connect(config);
        let pending: PendingMap = Arc::new(Mutex::new(PendingTable::default()));

        tokio::spawn(dispatch_inbound(inbound, pending.clone()));

        let events = session.subscribe();
        let lifecycle = tokio::spawn(resend_on_ready(events, pending.clone(), session.clone()));

        Self {
            session,
            pending,
            closed: Arc::new(AtomicBool::new(false)),
            lifecycle,
        }
    }

    pub fn addr(&self) -> std::net::SocketAddr {
        self.session.addr()
    }
}

#[async_trait]
impl Engine for LiteEngine {
    fn is_ready(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.session.is_ready()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn query_raw(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(LiteError::EngineClosed);
        }

        let query_id = random_id();
        let raw = tl::wrap_adnl_query(&query_id, &tl::wrap_lite_query(request));
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).entries.insert(
            query_id,
            PendingQuery {
                raw,
                tx,
                sent_epoch: None,
            },
        );

        if self.session.is_ready() {
            // The epoch check keeps this from doubling up with the resend
            // hook when a Ready transition races the insert above.
            let to_send = take_for_send(&mut lock(&self.pending), &query_id);
            if let Some(bytes) = to_send {
                if let Err(e) = self.session.send(bytes).await {
                    // Stays pending; the resend hook picks it up after
                    // reconnect.
                    trace!(error = %e, "send deferred until reconnect");
                }
            }
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(LiteError::QueryCancelled),
            Err(_) => {
                lock(&self.pending).entries.remove(&query_id);
                Err(LiteError::QueryTimeout)
            }
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        let drained: Vec<PendingQuery> = {
            let mut table = lock(&self.pending);
            table.entries.drain().map(|(_, pending)| pending).collect()
        };
        for pending in drained {
            let _ = pending.tx.send(Err(LiteError::QueryCancelled));
        }
        self.lifecycle.abort();
        self.session.close();
    }

    fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.session.subscribe()
    }
}

/// Route inbound payloads: pongs are logged, answers resolve their
/// pending query, anything else is dropped with a note.
async fn dispatch_inbound(mut inbound: mpsc::Receiver<Vec<u8>>, pending: PendingMap) {
    while let Some(payload) = inbound.recv().await {
        let constructor = match TlReader::new(&payload).peek_id() {
            Ok(id) => id,
            Err(_) => {
                debug!(len = payload.len(), "dropping truncated message");
                continue;
            }
        };
        match constructor {
            tl::TCP_PONG => match tl::parse_pong(&payload) {
                Ok(id) => trace!(random_id = id, "pong"),
                Err(e) => debug!(error = %e, "malformed pong"),
            },
            tl::ADNL_MESSAGE_ANSWER => match tl::unwrap_adnl_answer(&payload) {
                Ok((query_id, answer)) => resolve(&pending, &query_id, answer),
                Err(e) => debug!(error = %e, "malformed answer"),
            },
            other => {
                debug!(constructor = format!("0x{other:08x}"), "unexpected message");
            }
        }
    }
}

/// Resolve a pending query at most once; answers for unknown IDs (already
/// timed out, duplicates) are dropped.
fn resolve(pending: &PendingMap, query_id: &[u8; 32], answer: Vec<u8>) {
    let Some(entry) = lock(pending).entries.remove(query_id) else {
        trace!("answer for unknown query id, dropping");
        return;
    };
    let _ = entry.tx.send(classify_answer(answer));
}

/// Turn `liteServer.error` answers into [`LiteError::Server`].
fn classify_answer(answer: Vec<u8>) -> Result<Vec<u8>> {
    let mut reader = TlReader::new(&answer);
    if matches!(reader.peek_id(), Ok(tl::LITE_ERROR)) {
        reader.read_id()?;
        let code = reader.read_i32()?;
        let message = reader.read_string()?;
        return Err(LiteError::Server { code, message });
    }
    Ok(answer)
}

/// Resend every pending query, byte for byte, each time the session
/// becomes ready again.
async fn resend_on_ready(
    mut events: broadcast::Receiver<SessionEvent>,
    pending: PendingMap,
    session: Session,
) {
    loop {
        match events.recv().await {
            Ok(SessionEvent::Ready) => {
                let raws = collect_for_resend(&mut lock(&pending));
                if raws.is_empty() {
                    continue;
                }
                debug!(count = raws.len(), "resending pending queries");
                for raw in raws {
                    if let Err(e) = session.send(raw).await {
                        trace!(error = %e, "resend failed, will retry next ready");
                        break;
                    }
                }
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                debug!(skipped, "lifecycle events lagged");
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}
