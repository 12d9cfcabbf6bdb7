//! Encrypted ADNL TCP session with automatic reconnect.
//!
//! A [`Session`] owns one logical connection to one liteserver. A driver
//! task dials the server, performs the handshake, then splits into a
//! reader (decrypt, reassemble frames, deliver payloads) and a writer
//! (frame, encrypt, send), plus a keepalive pinger. When the connection
//! drops the driver tears everything down and dials again after a delay,
//! until [`Session::close`] is called.
//!
//! State machine:
//!
//! ```text
//! Disconnected -> Connecting -> Connected -> Ready
//!       ^                                      |
//!       +------------- connection lost --------+
//! ```
//!
//! `Connected` means the handshake packet went out; `Ready` means the
//! server's confirmation frame arrived and queries may flow. `Closed` is
//! terminal.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, mpsc, oneshot, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use tonlite_crypto::{Cipher, SessionKeys};

use crate::error::{LiteError, Result};
use crate::frame::{Frame, FrameBuffer};
use crate::handshake::build_client_handshake;
use crate::lock;
use crate::tl;

/// Connection parameters for one liteserver.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub addr: SocketAddr,
    /// The server's Ed25519 public key from the global config.
    pub server_public: [u8; 32],
    pub connect_timeout: Duration,
    pub reconnect_delay: Duration,
    pub ping_interval: Duration,
}

impl SessionConfig {
    pub fn new(addr: SocketAddr, server_public: [u8; 32]) -> Self {
        Self {
            addr,
            server_public,
            connect_timeout: Duration::from_secs(10),
            reconnect_delay: Duration::from_millis(500),
            ping_interval: Duration::from_secs(5),
        }
    }
}

/// Lifecycle of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connecting,
    Connected,
    Ready,
    Closed,
}

/// Lifecycle notifications broadcast to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// Handshake packet sent, waiting for confirmation.
    Connected,
    /// Confirmation frame received, queries may flow.
    Ready,
    /// The current connection attempt failed; a `Closed` follows unless
    /// the failure happened while dialing.
    Faulted,
    /// The current connection was lost or the session was closed.
    Closed,
}

/// One auto-reconnecting connection to a liteserver.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct Session {
    addr: SocketAddr,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    outbound: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
}

impl Session {
    /// Spawn the driver task and return the session together with the
    /// stream of inbound payloads. Connecting happens in the background;
    /// subscribe to events or poll [`Session::is_ready`] to observe it.
    pub fn connect(config: SessionConfig) -> (Self, mpsc::Receiver<Vec<u8>>) {
        let (inbound_tx, inbound_rx) = mpsc::channel(256);
        let (events, _) = broadcast::channel(64);
        let state = Arc::new(Mutex::new(SessionState::Disconnected));
        let outbound = Arc::new(Mutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(Notify::new());

        let session = Self {
            addr: config.addr,
            state: state.clone(),
            events: events.clone(),
            outbound: outbound.clone(),
            closed: closed.clone(),
            shutdown: shutdown.clone(),
        };

        tokio::spawn(drive(
            config, state, events, outbound, closed, shutdown, inbound_tx,
        ));

        (session, inbound_rx)
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn state(&self) -> SessionState {
        *lock(&self.state)
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Queue a payload for the current connection.
    ///
    /// Fails with [`LiteError::NotReady`] when no connection is live; the
    /// caller decides whether to retry after the next `Ready` event.
    pub async fn send(&self, payload: Vec<u8>) -> Result<()> {
        let sender = lock(&self.outbound).clone();
        match sender {
            Some(tx) => tx.send(payload).await.map_err(|_| LiteError::NotReady),
            None => Err(LiteError::NotReady),
        }
    }

    /// Permanently close the session. Idempotent.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        *lock(&self.outbound) = None;
        self.shutdown.notify_one();
        set_state(&self.state, SessionState::Closed);
        let _ = self.events.send(SessionEvent::Closed);
        debug!(addr = %self.addr, "session closed");
    }
}

fn set_state(state: &Mutex<SessionState>, next: SessionState) {
    let mut guard = lock(state);
    if *guard != next {
        trace!(from = ?*guard, to = ?next, "session state");
        *guard = next;
    }
}

async fn drive(
    config: SessionConfig,
    state: Arc<Mutex<SessionState>>,
    events: broadcast::Sender<SessionEvent>,
    outbound: Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    closed: Arc<AtomicBool>,
    shutdown: Arc<Notify>,
    inbound: mpsc::Sender<Vec<u8>>,
) {
    loop {
        if closed.load(Ordering::SeqCst) {
            break;
        }
        set_state(&state, SessionState::Connecting);

        match establish(&config).await {
            Ok((stream, keys)) => {
                set_state(&state, SessionState::Connected);
                let _ = events.send(SessionEvent::Connected);

                let result =
                    run_connection(stream, keys, &config, &state, &events, &outbound, &shutdown, &inbound)
                        .await;
                *lock(&outbound) = None;
                if let Err(e) = &result {
                    debug!(addr = %config.addr, error = %e, "connection lost");
                    let _ = events.send(SessionEvent::Faulted);
                }
                if !closed.load(Ordering::SeqCst) {
                    let _ = events.send(SessionEvent::Closed);
                }
            }
            Err(e) => {
                warn!(addr = %config.addr, error = %e, "connect failed");
                let _ = events.send(SessionEvent::Faulted);
            }
        }

        if closed.load(Ordering::SeqCst) {
            break;
        }
        set_state(&state, SessionState::Disconnected);
        tokio::select! {
            _ = tokio::time::sleep(config.reconnect_delay) => {}
            _ = shutdown.notified() => break,
        }
    }
    set_state(&state, SessionState::Closed);
}

/// Dial the server and send the handshake packet.
async fn establish(config: &SessionConfig) -> Result<(TcpStream, SessionKeys)> {
    let handshake = build_client_handshake(&config.server_public)?;
    let mut stream = tokio::time::timeout(config.connect_timeout, TcpStream::connect(config.addr))
        .await
        .map_err(|_| LiteError::Handshake("connect timed out".into()))??;
    stream.set_nodelay(true)?;
    stream.write_all(&handshake.packet).await?;
    stream.flush().await?;
    trace!(addr = %config.addr, "handshake sent");
    Ok((stream, handshake.keys))
}

#[allow(clippy::too_many_arguments)]
async fn run_connection(
    stream: TcpStream,
    keys: SessionKeys,
    config: &SessionConfig,
    state: &Arc<Mutex<SessionState>>,
    events: &broadcast::Sender<SessionEvent>,
    outbound: &Arc<Mutex<Option<mpsc::Sender<Vec<u8>>>>>,
    shutdown: &Arc<Notify>,
    inbound: &mpsc::Sender<Vec<u8>>,
) -> Result<()> {
    let SessionKeys { mut rx, tx } = keys;
    let (read_half, write_half) = stream.into_split();
    let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(256);
    *lock(outbound) = Some(out_tx.clone());

    // Payloads queue in the channel until the server's confirmation
    // frame releases the writer; nothing hits the wire before `Ready`.
    let (confirmed_tx, confirmed_rx) = oneshot::channel();
    let writer = tokio::spawn(write_loop(write_half, tx, out_rx, confirmed_rx));
    let pinger = tokio::spawn(ping_loop(out_tx, config.ping_interval));

    let result = tokio::select! {
        r = read_loop(read_half, &mut rx, state, events, inbound, confirmed_tx) => r,
        _ = shutdown.notified() => Ok(()),
    };

    pinger.abort();
    writer.abort();
    result
}

/// Decrypt the inbound byte stream, reassemble frames and deliver
/// non-empty payloads. The first frame of a connection is the server's
/// handshake confirmation and flips the session to `Ready`.
async fn read_loop(
    mut read_half: OwnedReadHalf,
    rx: &mut Cipher,
    state: &Arc<Mutex<SessionState>>,
    events: &broadcast::Sender<SessionEvent>,
    inbound: &mpsc::Sender<Vec<u8>>,
    confirmed: oneshot::Sender<()>,
) -> Result<()> {
    let mut buffer = FrameBuffer::new();
    let mut chunk = [0u8; 4096];
    let mut ready = false;
    let mut confirmed = Some(confirmed);

    loop {
        let n = read_half.read(&mut chunk).await?;
        if n == 0 {
            return Err(LiteError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "server closed connection",
            )));
        }
        rx.apply(&mut chunk[..n]);
        buffer.extend(&chunk[..n]);

        while let Some(frame) = buffer.next_frame()? {
            if !ready {
                ready = true;
                if let Some(tx) = confirmed.take() {
                    let _ = tx.send(());
                }
                set_state(state, SessionState::Ready);
                let _ = events.send(SessionEvent::Ready);
                trace!("session ready");
                if frame.payload.is_empty() {
                    continue;
                }
            }
            // Empty frames after confirmation are server keepalives.
            if frame.payload.is_empty() {
                continue;
            }
            if inbound.send(frame.payload).await.is_err() {
                return Ok(());
            }
        }
    }
}

/// Frame, encrypt and write queued payloads, starting only after the
/// handshake confirmation.
async fn write_loop(
    mut write_half: OwnedWriteHalf,
    mut tx: Cipher,
    mut out_rx: mpsc::Receiver<Vec<u8>>,
    confirmed: oneshot::Receiver<()>,
) {
    if confirmed.await.is_err() {
        return;
    }
    while let Some(payload) = out_rx.recv().await {
        let mut wire = Frame::encode(&payload);
        tx.apply(&mut wire);
        if let Err(e) = write_half.write_all(&wire).await {
            debug!(error = %e, "write failed");
            return;
        }
    }
}

/// Send `tcp.ping` at a fixed interval to keep the connection alive.
async fn ping_loop(out_tx: mpsc::Sender<Vec<u8>>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker.tick().await;
    loop {
        ticker.tick().await;
        let id = rand::random::<u64>();
        if out_tx.send(tl::build_ping(id)).await.is_err() {
            return;
        }
        trace!(random_id = id, "keepalive ping");
    }
}
