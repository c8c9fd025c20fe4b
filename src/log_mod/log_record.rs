use std::collections::BTreeMap;
use std::io::{self, Read};

use serde::{Deserialize, Serialize};

use crate::common::{DbError, PageID, Result, TransactionID, LSN};

/// Encoded "no previous record".
pub const NO_LSN: u64 = u64::MAX;

const FIXED_HEADER_LEN: u64 = 4 + 8 + 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogRecordType {
    BeginRecord = 0,
    CommitRecord = 1,
    AbortRecord = 2,
    UpdateRecord = 3,
    CheckpointRecord = 4,
}

impl TryFrom<u32> for LogRecordType {
    type Error = u32;

    fn try_from(value: u32) -> std::result::Result<Self, u32> {
        match value {
            0 => Ok(LogRecordType::BeginRecord),
            1 => Ok(LogRecordType::CommitRecord),
            2 => Ok(LogRecordType::AbortRecord),
            3 => Ok(LogRecordType::UpdateRecord),
            4 => Ok(LogRecordType::CheckpointRecord),
            other => Err(other),
        }
    }
}

/// Transactions active when a checkpoint was taken, with the offset of
/// each one's first record.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointData {
    pub active: BTreeMap<TransactionID, LSN>,
    pub max_txn_id: TransactionID,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogBody {
    Begin,
    Commit,
    Abort,
    Update {
        page_id: PageID,
        before_img: Vec<u8>,
        after_img: Vec<u8>,
    },
    Checkpoint(CheckpointData),
}

/// One log entry. `prev` links to the issuing transaction's previous
/// record so a transaction can be undone back to front.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub txn_id: TransactionID,
    pub prev: Option<LSN>,
    pub body: LogBody,
}

impl LogRecord {
    pub fn record_type(&self) -> LogRecordType {
        match self.body {
            LogBody::Begin => LogRecordType::BeginRecord,
            LogBody::Commit => LogRecordType::CommitRecord,
            LogBody::Abort => LogRecordType::AbortRecord,
            LogBody::Update { .. } => LogRecordType::UpdateRecord,
            LogBody::Checkpoint(_) => LogRecordType::CheckpointRecord,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(self.record_type() as u32).to_le_bytes());
        buf.extend_from_slice(&self.txn_id.0.to_le_bytes());
        buf.extend_from_slice(&self.prev.map_or(NO_LSN, |lsn| lsn.0).to_le_bytes());

        match &self.body {
            LogBody::Begin | LogBody::Commit | LogBody::Abort => {}
            LogBody::Update {
                page_id,
                before_img,
                after_img,
            } => {
                if before_img.len() != after_img.len() {
                    return Err(DbError::Other(format!(
                        "before image is {} bytes but after image is {}",
                        before_img.len(),
                        after_img.len()
                    )));
                }
                buf.extend_from_slice(&page_id.table_id.to_le_bytes());
                buf.extend_from_slice(&page_id.page_no.to_le_bytes());
                buf.extend_from_slice(&(before_img.len() as u32).to_le_bytes());
                buf.extend_from_slice(before_img);
                buf.extend_from_slice(after_img);
            }
            LogBody::Checkpoint(data) => {
                let payload = bincode::serialize(data)?;
                buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
                buf.extend_from_slice(&payload);
            }
        }
        Ok(buf)
    }

    /// Decodes the record starting at `offset`, with `remaining` bytes of log
    /// left after it. Returns `None` for a record cut short by the end of
    /// the log, and the record with its encoded size otherwise.
    pub fn decode<R: Read>(reader: &mut R, offset: u64, remaining: u64) -> Result<Option<(Self, u64)>> {
        match Self::try_decode(reader, offset, remaining) {
            Ok(decoded) => Ok(decoded),
            Err(DbError::IOError(e)) if e.kind() == io::ErrorKind::UnexpectedEof => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn try_decode<R: Read>(reader: &mut R, offset: u64, remaining: u64) -> Result<Option<(Self, u64)>> {
        let tag = read_u32(reader)?;
        let record_type = LogRecordType::try_from(tag).map_err(|tag| DbError::CorruptLog {
            offset,
            reason: format!("unknown record type {}", tag),
        })?;
        let txn_id = TransactionID(read_u64(reader)?);
        let prev = match read_u64(reader)? {
            NO_LSN => None,
            lsn => Some(LSN(lsn)),
        };

        let mut size = FIXED_HEADER_LEN;
        let body = match record_type {
            LogRecordType::BeginRecord => LogBody::Begin,
            LogRecordType::CommitRecord => LogBody::Commit,
            LogRecordType::AbortRecord => LogBody::Abort,
            LogRecordType::UpdateRecord => {
                let page_id = PageID::new(read_u32(reader)?, read_u32(reader)?);
                let len = read_u32(reader)? as u64;
                size += 12 + 2 * len;
                if size > remaining {
                    return Ok(None);
                }
                let before_img = read_bytes(reader, len as usize)?;
                let after_img = read_bytes(reader, len as usize)?;
                LogBody::Update {
                    page_id,
                    before_img,
                    after_img,
                }
            }
            LogRecordType::CheckpointRecord => {
                let len = read_u32(reader)? as u64;
                size += 4 + len;
                if size > remaining {
                    return Ok(None);
                }
                let payload = read_bytes(reader, len as usize)?;
                let data = bincode::deserialize(&payload).map_err(|e| DbError::CorruptLog {
                    offset,
                    reason: format!("bad checkpoint payload: {}", e),
                })?;
                LogBody::Checkpoint(data)
            }
        };

        if size > remaining {
            return Ok(None);
        }
        Ok(Some((LogRecord { txn_id, prev, body }, size)))
    }
}

fn read_u32<R: Read>(reader: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    reader.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64<R: Read>(reader: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    reader.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn read_bytes<R: Read>(reader: &mut R, len: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}
