//! Constructor IDs and message envelopes of the liteserver protocol.
//!
//! A query travels double-wrapped: the request body goes inside
//! `liteServer.query`, which goes inside `adnl.message.query` together
//! with a random 256-bit query ID. Answers come back as
//! `adnl.message.answer` carrying the same ID.

use tonlite_tl::{TlReader, TlWriter};

use crate::error::{LiteError, Result};

/// `tcp.ping random_id:long = tcp.Pong`
pub const TCP_PING: u32 = 0x9a2b084d;
/// `tcp.pong random_id:long = tcp.Pong`
pub const TCP_PONG: u32 = 0x4f15c5d8;

/// `adnl.message.query query_id:int256 query:bytes = adnl.Message`
pub const ADNL_MESSAGE_QUERY: u32 = 0x7af98bb4;
/// `adnl.message.answer query_id:int256 answer:bytes = adnl.Message`
pub const ADNL_MESSAGE_ANSWER: u32 = 0x1684ac0f;

/// `liteServer.query data:bytes = Object`
pub const LITE_QUERY: u32 = 0xdf068c79;
/// `liteServer.error code:int message:string = liteServer.Error`
pub const LITE_ERROR: u32 = 0xbba9e148;

/// `liteServer.getMasterchainInfo = liteServer.MasterchainInfo`
pub const GET_MASTERCHAIN_INFO: u32 = 0x89b5e62e;
/// `liteServer.masterchainInfo`
pub const MASTERCHAIN_INFO: u32 = 0x85832881;
/// `liteServer.getTime = liteServer.CurrentTime`
pub const GET_TIME: u32 = 0x16ad5a34;
/// `liteServer.currentTime now:int = liteServer.CurrentTime`
pub const CURRENT_TIME: u32 = 0xe953000d;

/// Wrap a request body in `liteServer.query`.
pub fn wrap_lite_query(data: &[u8]) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(data.len() + 8);
    writer.write_id(LITE_QUERY);
    writer.write_bytes(data);
    writer.into_bytes()
}

/// Wrap a message in `adnl.message.query` under the given query ID.
pub fn wrap_adnl_query(query_id: &[u8; 32], data: &[u8]) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(data.len() + 40);
    writer.write_id(ADNL_MESSAGE_QUERY);
    writer.write_u256(query_id);
    writer.write_bytes(data);
    writer.into_bytes()
}

/// Take apart an `adnl.message.answer`, returning its query ID and body.
pub fn unwrap_adnl_answer(payload: &[u8]) -> Result<([u8; 32], Vec<u8>)> {
    let mut reader = TlReader::new(payload);
    let id = reader.read_id()?;
    if id != ADNL_MESSAGE_ANSWER {
        return Err(LiteError::UnexpectedMessage(id));
    }
    let query_id = reader.read_u256()?;
    let answer = reader.read_bytes()?;
    Ok((query_id, answer))
}

/// Build a `tcp.ping` with the given random ID.
pub fn build_ping(random_id: u64) -> Vec<u8> {
    let mut writer = TlWriter::with_capacity(12);
    writer.write_id(TCP_PING);
    writer.write_u64(random_id);
    writer.into_bytes()
}

/// Parse a `tcp.pong`, returning the echoed random ID.
pub fn parse_pong(payload: &[u8]) -> Result<u64> {
    let mut reader = TlReader::new(payload);
    let id = reader.read_id()?;
    if id != TCP_PONG {
        return Err(LiteError::UnexpectedMessage(id));
    }
    Ok(reader.read_u64()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adnl_query_answer_envelopes() {
        let query_id = [0xAB; 32];
        let body = b"inner request";

        let query = wrap_adnl_query(&query_id, body);
        let mut reader = TlReader::new(&query);
        assert_eq!(reader.read_id().unwrap(), ADNL_MESSAGE_QUERY);
        assert_eq!(reader.read_u256().unwrap(), query_id);
        assert_eq!(reader.read_bytes().unwrap(), body);

        // Build the matching answer and unwrap it.
        let mut writer = TlWriter::new();
        writer.write_id(ADNL_MESSAGE_ANSWER);
        writer.write_u256(&query_id);
        writer.write_bytes(b"the answer");
        let (id, answer) = unwrap_adnl_answer(writer.as_bytes()).unwrap();
        assert_eq!(id, query_id);
        assert_eq!(answer, b"the answer");
    }

    #[test]
    fn unwrap_rejects_foreign_constructor() {
        let mut writer = TlWriter::new();
        writer.write_id(TCP_PONG);
        writer.write_u64(7);
        assert!(matches!(
            unwrap_adnl_answer(writer.as_bytes()),
            Err(LiteError::UnexpectedMessage(TCP_PONG))
        ));
    }

    #[test]
    fn ping_pong_ids() {
        let ping = build_ping(0xDEADBEEF);
        let mut reader = TlReader::new(&ping);
        assert_eq!(reader.read_id().unwrap(), TCP_PING);
        assert_eq!(reader.read_u64().unwrap(), 0xDEADBEEF);

        let mut writer = TlWriter::new();
        writer.write_id(TCP_PONG);
        writer.write_u64(0xDEADBEEF);
        assert_eq!(parse_pong(writer.as_bytes()).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn lite_query_wraps_body_as_bytes() {
        let wrapped = wrap_lite_query(&[0x2e, 0xe6, 0xb5, 0x89]);
        let mut reader = TlReader::new(&wrapped);
        assert_eq!(reader.read_id().unwrap(), LITE_QUERY);
        assert_eq!(reader.read_bytes().unwrap(), vec![0x2e, 0xe6, 0xb5, 0x89]);
    }
}
