mod config;
mod error;
mod record_id;

pub use config::DatabaseConfig;
pub use error::*;
pub use record_id::RecordID;

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity of one physical page: the owning table and its page number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PageID {
    pub table_id: u32,
    pub page_no: u32,
}

impl PageID {
    pub fn new(table_id: u32, page_no: u32) -> Self {
        Self { table_id, page_no }
    }
}

impl fmt::Display for PageID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Page({},{})", self.table_id, self.page_no)
    }
}

/// Byte offset of a record in the write-ahead log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LSN(pub u64);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TransactionID(pub u64);

impl TransactionID {
    /// Issuer of records that belong to no transaction, such as checkpoints.
    pub const SYSTEM: TransactionID = TransactionID(0);
}

impl fmt::Display for TransactionID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockMode {
    Shared,
    Exclusive,
}
