//! Typed liteserver answers.

use tonlite_tl::{TlError, TlReader, TlResult, TlWriter};

use crate::tl;

/// `tonNode.blockIdExt workchain:int shard:long seqno:int
/// root_hash:int256 file_hash:int256`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIdExt {
    pub workchain: i32,
    pub shard: u64,
    pub seqno: u32,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
}

impl BlockIdExt {
    pub fn read(reader: &mut TlReader<'_>) -> TlResult<Self> {
        Ok(Self {
            workchain: reader.read_i32()?,
            shard: reader.read_u64()?,
            seqno: reader.read_u32()?,
            root_hash: reader.read_u256()?,
            file_hash: reader.read_u256()?,
        })
    }

    pub fn write(&self, writer: &mut TlWriter) {
        writer.write_i32(self.workchain);
        writer.write_u64(self.shard);
        writer.write_u32(self.seqno);
        writer.write_u256(&self.root_hash);
        writer.write_u256(&self.file_hash);
    }
}

/// `tonNode.zeroStateIdExt workchain:int root_hash:int256 file_hash:int256`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZeroStateIdExt {
    pub workchain: i32,
    pub root_hash: [u8; 32],
    pub file_hash: [u8; 32],
}

impl ZeroStateIdExt {
    pub fn read(reader: &mut TlReader<'_>) -> TlResult<Self> {
        Ok(Self {
            workchain: reader.read_i32()?,
            root_hash: reader.read_u256()?,
            file_hash: reader.read_u256()?,
        })
    }

    pub fn write(&self, writer: &mut TlWriter) {
        writer.write_i32(self.workchain);
        writer.write_u256(&self.root_hash);
        writer.write_u256(&self.file_hash);
    }
}

/// `liteServer.masterchainInfo last:tonNode.blockIdExt
/// state_root_hash:int256 init:tonNode.zeroStateIdExt`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MasterchainInfo {
    pub last: BlockIdExt,
    pub state_root_hash: [u8; 32],
    pub init: ZeroStateIdExt,
}

impl MasterchainInfo {
    /// Read a boxed `liteServer.masterchainInfo`, constructor included.
    pub fn read(reader: &mut TlReader<'_>) -> TlResult<Self> {
        let id = reader.read_id()?;
        if id != tl::MASTERCHAIN_INFO {
            return Err(TlError::InvalidData(format!(
                "expected liteServer.masterchainInfo, got 0x{id:08x}"
            )));
        }
        Ok(Self {
            last: BlockIdExt::read(reader)?,
            state_root_hash: reader.read_u256()?,
            init: ZeroStateIdExt::read(reader)?,
        })
    }

    pub fn write(&self, writer: &mut TlWriter) {
        writer.write_id(tl::MASTERCHAIN_INFO);
        self.last.write(writer);
        writer.write_u256(&self.state_root_hash);
        self.init.write(writer);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MasterchainInfo {
        MasterchainInfo {
            last: BlockIdExt {
                workchain: -1,
                shard: 0x8000000000000000,
                seqno: 34945812,
                root_hash: [0x11; 32],
                file_hash: [0x22; 32],
            },
            state_root_hash: [0x33; 32],
            init: ZeroStateIdExt {
                workchain: -1,
                root_hash: [0x44; 32],
                file_hash: [0x55; 32],
            },
        }
    }

    #[test]
    fn masterchain_info_roundtrip() {
        let info = sample();
        let mut writer = TlWriter::new();
        info.write(&mut writer);
        let bytes = writer.into_bytes();

        let mut reader = TlReader::new(&bytes);
        assert_eq!(MasterchainInfo::read(&mut reader).unwrap(), info);
        assert!(reader.is_empty());
    }

    #[test]
    fn wrong_constructor_rejected() {
        let mut writer = TlWriter::new();
        writer.write_id(tl::CURRENT_TIME);
        writer.write_i32(0);
        let bytes = writer.into_bytes();

        let mut reader = TlReader::new(&bytes);
        assert!(matches!(
            MasterchainInfo::read(&mut reader),
            Err(TlError::InvalidData(_))
        ));
    }
}
