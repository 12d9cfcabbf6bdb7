//! In-process liteserver for integration tests.
//!
//! Speaks the real protocol end to end: accepts the 256-byte handshake,
//! confirms with an empty frame, then answers queries under the session
//! ciphers. Per-connection behavior is scripted so tests can simulate
//! crashes, silence and server errors.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use tonlite_client::frame::{Frame, FrameBuffer};
use tonlite_client::handshake::{accept_server_handshake, HANDSHAKE_LEN};
use tonlite_client::session::SessionConfig;
use tonlite_client::tl;
use tonlite_client::types::{BlockIdExt, MasterchainInfo, ZeroStateIdExt};
use tonlite_crypto::{Cipher, Keypair};
use tonlite_tl::{TlReader, TlWriter};

/// What a scripted connection does with the queries it receives.
#[derive(Debug, Clone, Copy)]
pub enum Behavior {
    /// Answer every query.
    Answer,
    /// Record the first query, then drop the connection without answering.
    DropAfterFirstQuery,
    /// Accept and record queries but never answer.
    NeverAnswer,
    /// Answer every query with `liteServer.error` of this code.
    ServerError(i32),
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub public_key: [u8; 32],
    /// Query IDs in arrival order, across all connections.
    pub seen_query_ids: Arc<Mutex<Vec<[u8; 32]>>>,
    handle: JoinHandle<()>,
}

impl MockServer {
    /// Bind a listener and serve connections. The Nth connection uses the
    /// Nth behavior; the last behavior repeats.
    pub async fn spawn(behaviors: Vec<Behavior>) -> Self {
        assert!(!behaviors.is_empty());
        let keypair = Keypair::generate();
        let public_key = keypair.public_key;
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let handle = tokio::spawn({
            let seen = seen.clone();
            async move {
                let mut index = 0usize;
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        return;
                    };
                    let behavior = behaviors[index.min(behaviors.len() - 1)];
                    index += 1;
                    let server = keypair.clone();
                    let seen = seen.clone();
                    tokio::spawn(async move {
                        let _ = handle_connection(stream, server, behavior, seen).await;
                    });
                }
            }
        });

        Self {
            addr,
            public_key,
            seen_query_ids: seen,
            handle,
        }
    }

    /// Session config pointed at this server, with a short reconnect
    /// delay so failover tests run quickly.
    pub fn session_config(&self) -> SessionConfig {
        let mut config = SessionConfig::new(self.addr, self.public_key);
        config.reconnect_delay = Duration::from_millis(100);
        config
    }

    pub fn seen_count(&self) -> usize {
        self.seen_query_ids.lock().unwrap().len()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// The fixed chain head every `Answer` connection reports.
pub fn sample_masterchain_info() -> MasterchainInfo {
    MasterchainInfo {
        last: BlockIdExt {
            workchain: -1,
            shard: 0x8000000000000000,
            seqno: 12345678,
            root_hash: [0xAA; 32],
            file_hash: [0xBB; 32],
        },
        state_root_hash: [0xCC; 32],
        init: ZeroStateIdExt {
            workchain: -1,
            root_hash: [0xDD; 32],
            file_hash: [0xEE; 32],
        },
    }
}

pub const SAMPLE_TIME: i32 = 1_756_100_000;

async fn handle_connection(
    mut stream: TcpStream,
    server: Keypair,
    behavior: Behavior,
    seen: Arc<Mutex<Vec<[u8; 32]>>>,
) -> std::io::Result<()> {
    let mut packet = [0u8; HANDSHAKE_LEN];
    stream.read_exact(&mut packet).await?;
    let Ok(mut keys) = accept_server_handshake(&packet, &server) else {
        return Ok(());
    };

    // Handshake confirmation.
    send_frame(&mut stream, &mut keys.tx, &[]).await?;

    let mut buffer = FrameBuffer::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = stream.read(&mut chunk).await?;
        if n == 0 {
            return Ok(());
        }
        keys.rx.apply(&mut chunk[..n]);
        buffer.extend(&chunk[..n]);

        while let Ok(Some(frame)) = buffer.next_frame() {
            let mut reader = TlReader::new(&frame.payload);
            match reader.read_id() {
                Ok(tl::TCP_PING) => {
                    let id = reader.read_u64().unwrap_or(0);
                    let mut pong = TlWriter::new();
                    pong.write_id(tl::TCP_PONG);
                    pong.write_u64(id);
                    send_frame(&mut stream, &mut keys.tx, pong.as_bytes()).await?;
                }
                Ok(tl::ADNL_MESSAGE_QUERY) => {
                    let query_id = reader.read_u256().unwrap_or([0u8; 32]);
                    let wrapped = reader.read_bytes().unwrap_or_default();
                    seen.lock().unwrap().push(query_id);

                    match behavior {
                        Behavior::NeverAnswer => {}
                        Behavior::DropAfterFirstQuery => return Ok(()),
                        Behavior::ServerError(code) => {
                            let mut err = TlWriter::new();
                            err.write_id(tl::LITE_ERROR);
                            err.write_i32(code);
                            err.write_string("mock failure");
                            reply(&mut stream, &mut keys.tx, &query_id, err.as_bytes()).await?;
                        }
                        Behavior::Answer => {
                            let mut inner = TlReader::new(&wrapped);
                            let body = if matches!(inner.read_id(), Ok(tl::LITE_QUERY)) {
                                inner.read_bytes().unwrap_or_default()
                            } else {
                                wrapped.clone()
                            };
                            let answer = answer_for(&body);
                            reply(&mut stream, &mut keys.tx, &query_id, &answer).await?;
                        }
                    }
                }
                _ => {}
            }
        }
    }
}

fn answer_for(body: &[u8]) -> Vec<u8> {
    let mut reader = TlReader::new(body);
    let mut writer = TlWriter::new();
    match reader.read_id() {
        Ok(tl::GET_MASTERCHAIN_INFO) => sample_masterchain_info().write(&mut writer),
        Ok(tl::GET_TIME) => {
            writer.write_id(tl::CURRENT_TIME);
            writer.write_i32(SAMPLE_TIME);
        }
        _ => {
            writer.write_id(tl::LITE_ERROR);
            writer.write_i32(228);
            writer.write_string("unknown method");
        }
    }
    writer.into_bytes()
}

async fn reply(
    stream: &mut TcpStream,
    tx: &mut Cipher,
    query_id: &[u8; 32],
    answer: &[u8],
) -> std::io::Result<()> {
    let mut writer = TlWriter::new();
    writer.write_id(tl::ADNL_MESSAGE_ANSWER);
    writer.write_u256(query_id);
    writer.write_bytes(answer);
    send_frame(stream, tx, writer.as_bytes()).await
}

async fn send_frame(
    stream: &mut TcpStream,
    tx: &mut Cipher,
    payload: &[u8],
) -> std::io::Result<()> {
    let mut wire = Frame::encode(payload);
    tx.apply(&mut wire);
    stream.write_all(&wire).await
}
