use thiserror::Error;

use super::{PageID, TransactionID};

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Transaction {0} aborted")]
    TransactionAborted(TransactionID),

    #[error("Buffer full: all {0} cached pages are dirty or pinned")]
    BufferFull(usize),

    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("{page_id} out of range: file has {num_pages} pages")]
    PageOutOfRange { page_id: PageID, num_pages: u32 },

    #[error("Malformed {page_id}: {reason}")]
    MalformedPage { page_id: PageID, reason: String },

    #[error("Corrupt log record at offset {offset}: {reason}")]
    CorruptLog { offset: u64, reason: String },

    #[error("{0} is not in the buffer pool")]
    PageNotCached(PageID),

    #[error("Transaction {0} not found")]
    UnknownTransaction(TransactionID),

    #[error("Table {0} not found")]
    UnknownTable(u32),

    #[error("Field {0} not found")]
    UnknownField(String),

    #[error("Invalid slot index: {0}")]
    InvalidSlotIndex(usize),

    #[error("Slot {0} is empty")]
    EmptySlot(usize),

    #[error("{0} is full")]
    PageFull(PageID),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Tuple has no record id")]
    MissingRecordId,

    #[error("Other error: {0}")]
    Other(String),
}

impl DbError {
    /// True when the caller must abort the whole transaction.
    pub fn is_abort(&self) -> bool {
        matches!(self, DbError::TransactionAborted(_))
    }
}

pub type Result<T> = std::result::Result<T, DbError>;
