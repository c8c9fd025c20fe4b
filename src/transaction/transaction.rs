use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::{debug, warn};
use parking_lot::Mutex;

use crate::buffer::BufferPool;
use crate::common::{DbError, Result, TransactionID};

/// Hands out transaction ids. Ids are never reused; 0 is reserved for
/// system records.
#[derive(Debug)]
pub struct TransactionIdGenerator {
    next: AtomicU64,
}

impl TransactionIdGenerator {
    /// A generator whose first id is one past `last_used`.
    pub fn starting_after(last_used: TransactionID) -> Self {
        Self {
            next: AtomicU64::new(last_used.0 + 1),
        }
    }

    pub fn next_id(&self) -> TransactionID {
        TransactionID(self.next.fetch_add(1, Ordering::SeqCst))
    }
}

impl Default for TransactionIdGenerator {
    fn default() -> Self {
        Self::starting_after(TransactionID::SYSTEM)
    }
}

pub struct TransactionManager {
    ids: TransactionIdGenerator,
    active_transactions: Mutex<HashSet<TransactionID>>,
    buffer_pool: Arc<BufferPool>,
}

impl TransactionManager {
    pub fn new(buffer_pool: Arc<BufferPool>, ids: TransactionIdGenerator) -> Self {
        Self {
            ids,
            active_transactions: Mutex::new(HashSet::new()),
            buffer_pool,
        }
    }

    pub fn start_txn(&self) -> Result<TransactionID> {
        let txn_id = self.ids.next_id();
        self.buffer_pool.begin_transaction(txn_id)?;
        self.active_transactions.lock().insert(txn_id);
        debug!("Started transaction {}", txn_id);
        Ok(txn_id)
    }

    pub fn commit_txn(&self, txn_id: TransactionID) -> Result<()> {
        self.finish(txn_id, true)
    }

    pub fn abort_txn(&self, txn_id: TransactionID) -> Result<()> {
        self.finish(txn_id, false)
    }

    /// Ends `txn_id` either way. A failed commit has already been rolled
    /// back and its locks released, so the transaction is gone afterwards
    /// even when an error is returned.
    fn finish(&self, txn_id: TransactionID, commit: bool) -> Result<()> {
        if !self.is_active(txn_id) {
            return Err(DbError::UnknownTransaction(txn_id));
        }
        let outcome = self.buffer_pool.transaction_complete(txn_id, commit);
        self.active_transactions.lock().remove(&txn_id);
        if let Err(e) = &outcome {
            warn!("Transaction {} failed to complete: {}", txn_id, e);
        }
        outcome
    }

    pub fn is_active(&self, txn_id: TransactionID) -> bool {
        self.active_transactions.lock().contains(&txn_id)
    }

    pub fn active_transactions(&self) -> Vec<TransactionID> {
        let mut active: Vec<TransactionID> = self.active_transactions.lock().iter().copied().collect();
        active.sort();
        active
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }
}
