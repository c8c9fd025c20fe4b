use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use log::{debug, info, warn};
use parking_lot::{Mutex, RwLock};

use crate::common::{DatabaseConfig, DbError, LockMode, PageID, Result, TransactionID};
use crate::log_mod::{LogManager, RecoveryReport};
use crate::storage::{Catalog, HeapPage};
use crate::transaction::LockManager;
use crate::tuple::Tuple;

/// A cached page. Holding a clone outside the pool pins the page.
pub type PageRef = Arc<RwLock<HeapPage>>;

struct FrameTable {
    slots: Vec<Option<PageRef>>,
    /// Empty slots set aside for a page being read from disk.
    reserved: Vec<bool>,
    index: HashMap<PageID, usize>,
    clock_hand: usize,
}

impl FrameTable {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
            reserved: vec![false; capacity],
            index: HashMap::with_capacity(capacity),
            clock_hand: 0,
        }
    }

    fn lookup(&self, page_id: PageID) -> Option<PageRef> {
        let idx = *self.index.get(&page_id)?;
        self.slots[idx].clone()
    }

    fn free_slot(&self) -> Option<usize> {
        (0..self.slots.len()).find(|&idx| self.slots[idx].is_none() && !self.reserved[idx])
    }

    fn remove(&mut self, page_id: PageID) -> Option<PageRef> {
        let idx = self.index.remove(&page_id)?;
        self.slots[idx].take()
    }

    /// Sweeps from the clock hand for a page that is neither dirty nor
    /// pinned and frees its slot. Gives up after one full revolution.
    fn evict(&mut self) -> Option<usize> {
        let capacity = self.slots.len();
        for step in 0..capacity {
            let idx = (self.clock_hand + step) % capacity;
            let victim = match &self.slots[idx] {
                None if self.reserved[idx] => continue,
                None => return Some(idx),
                Some(page) => page,
            };
            if Arc::strong_count(victim) > 1 {
                continue;
            }
            let page_id = {
                let guard = victim.read();
                if guard.is_dirty() {
                    continue;
                }
                guard.id()
            };

            self.slots[idx] = None;
            self.index.remove(&page_id);
            self.clock_hand = (idx + 1) % capacity;
            debug!("Evicted {} from slot {}", page_id, idx);
            return Some(idx);
        }
        None
    }
}

/// Fixed-capacity page cache that fronts every heap file.
///
/// Pages are handed out under page-level locks from the `LockManager`.
/// Dirty pages are never evicted (no-steal); a committing transaction's
/// pages are logged, forced and written before its locks are released
/// (force).
pub struct BufferPool {
    frames: Mutex<FrameTable>,
    capacity: usize,
    lock_manager: LockManager,
    log: Mutex<LogManager>,
    catalog: Arc<Catalog>,
}

impl BufferPool {
    pub fn new(config: &DatabaseConfig, catalog: Arc<Catalog>, log: LogManager) -> Self {
        let capacity = config.buffer_pool_size.max(1);
        Self {
            frames: Mutex::new(FrameTable::new(capacity)),
            capacity,
            lock_manager: LockManager::new(
                Duration::from_millis(config.lock_timeout_min_ms),
                Duration::from_millis(config.lock_timeout_max_ms),
            ),
            log: Mutex::new(log),
            catalog,
        }
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.lock_manager
    }

    pub fn log(&self) -> &Mutex<LogManager> {
        &self.log
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Fetches a page for `tid`, blocking until the lock is granted. Fails
    /// with `TransactionAborted` if the lock manager picked `tid` as a
    /// deadlock victim, and with `BufferFull` if a miss finds every cached
    /// page dirty or pinned. A victim's changes are rolled back before its
    /// locks are given up.
    pub fn get_page(&self, tid: TransactionID, page_id: PageID, mode: LockMode) -> Result<PageRef> {
        self.lock_manager
            .acquire_with(tid, page_id, mode, || self.roll_back(tid))?;

        let idx = {
            let mut frames = self.frames.lock();
            if let Some(page) = frames.lookup(page_id) {
                return Ok(page);
            }
            let idx = match frames.free_slot() {
                Some(idx) => idx,
                None => frames.evict().ok_or_else(|| {
                    warn!("Cannot load {}: no clean unpinned page to evict", page_id);
                    DbError::BufferFull(self.capacity)
                })?,
            };
            frames.reserved[idx] = true;
            idx
        };

        let loaded = self
            .catalog
            .file(page_id.table_id)
            .and_then(|file| file.read_page(page_id));

        let mut frames = self.frames.lock();
        frames.reserved[idx] = false;
        let page = loaded?;
        // Another reader of the same page may have installed it meanwhile
        if let Some(page) = frames.lookup(page_id) {
            return Ok(page);
        }
        let page = Arc::new(RwLock::new(page));
        frames.slots[idx] = Some(Arc::clone(&page));
        frames.index.insert(page_id, idx);
        debug!("Loaded {} into slot {} for transaction {}", page_id, idx, tid);
        Ok(page)
    }

    /// Releases `tid`'s lock on a cached page before the transaction ends.
    /// Only safe for pages the transaction has not modified.
    pub fn release_page(&self, tid: TransactionID, page_id: PageID) -> Result<()> {
        if !self.frames.lock().index.contains_key(&page_id) {
            return Err(DbError::PageNotCached(page_id));
        }
        self.lock_manager.release(tid, page_id);
        Ok(())
    }

    pub fn holds_lock(&self, tid: TransactionID, page_id: PageID) -> bool {
        self.lock_manager.holds(tid, page_id)
    }

    pub fn is_cached(&self, page_id: PageID) -> bool {
        self.frames.lock().index.contains_key(&page_id)
    }

    fn cached(&self, page_id: PageID) -> Option<PageRef> {
        self.frames.lock().lookup(page_id)
    }

    pub fn begin_transaction(&self, tid: TransactionID) -> Result<()> {
        self.log.lock().log_txn_begin(tid)?;
        Ok(())
    }

    pub fn insert_tuple(&self, tid: TransactionID, table_id: u32, tuple: &mut Tuple) -> Result<()> {
        let file = self.catalog.file(table_id)?;
        for page in file.insert_tuple(self, tid, tuple)? {
            page.write().mark_dirty(true, tid);
        }
        Ok(())
    }

    pub fn delete_tuple(&self, tid: TransactionID, tuple: &Tuple) -> Result<()> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        let file = self.catalog.file(record_id.page_id.table_id)?;
        let page = file.delete_tuple(self, tid, tuple)?;
        page.write().mark_dirty(true, tid);
        Ok(())
    }

    /// Ends `tid`. Commit flushes every page it locked and logs the commit;
    /// abort undoes anything already on disk, logs the abort and drops its
    /// modified pages from the cache. A commit that fails partway is rolled
    /// back like an abort. Locks are released last either way.
    pub fn transaction_complete(&self, tid: TransactionID, commit: bool) -> Result<()> {
        let outcome = if commit {
            self.commit_pages(tid).map_err(|e| {
                warn!("Commit of transaction {} failed, rolling back: {}", tid, e);
                if let Err(undo) = self.roll_back(tid) {
                    warn!("Rollback of transaction {} failed: {}", tid, undo);
                }
                e
            })
        } else {
            self.roll_back(tid)
        };

        let released = self.lock_manager.release_all(tid);
        debug!(
            "Transaction {} {} and released {} locks",
            tid,
            if commit && outcome.is_ok() { "committed" } else { "aborted" },
            released
        );
        outcome
    }

    fn commit_pages(&self, tid: TransactionID) -> Result<()> {
        // Already rolled back as a deadlock victim
        if !self.log.lock().is_active(tid) {
            return Err(DbError::TransactionAborted(tid));
        }
        for (page_id, _) in self.lock_manager.pages_held(tid) {
            self.flush_page(page_id)?;
        }
        self.log.lock().log_commit(tid)?;
        Ok(())
    }

    /// Drops every cached page `tid` dirtied or holds exclusively, then
    /// restores on disk whatever of it was already written and logs the
    /// abort. Runs while `tid` still holds its locks; a second call for the
    /// same transaction finds nothing left to do.
    fn roll_back(&self, tid: TransactionID) -> Result<()> {
        let exclusive: HashSet<PageID> = self
            .lock_manager
            .pages_held(tid)
            .into_iter()
            .filter(|(_, mode)| *mode == LockMode::Exclusive)
            .map(|(page_id, _)| page_id)
            .collect();
        {
            let mut frames = self.frames.lock();
            let doomed: Vec<PageID> = frames
                .slots
                .iter()
                .flatten()
                .filter_map(|page| {
                    let page = page.read();
                    let page_id = page.id();
                    (page.dirtier() == Some(tid) || exclusive.contains(&page_id)).then_some(page_id)
                })
                .collect();
            for page_id in doomed {
                frames.remove(page_id);
            }
        }

        let mut log = self.log.lock();
        if !log.is_active(tid) {
            return Ok(());
        }
        // The abort is logged even if undo fails; recovery undoes it again
        let undo = log.rollback(tid, &self.catalog);
        log.log_abort(tid)?;
        let restored = undo?;
        if restored > 0 {
            debug!("Restored {} page images written by transaction {}", restored, tid);
        }
        Ok(())
    }

    /// Writes a dirty page to its file, logging and forcing its images first.
    pub fn flush_page(&self, page_id: PageID) -> Result<()> {
        let page = match self.cached(page_id) {
            Some(page) => page,
            None => return Ok(()),
        };
        let mut guard = page.write();
        let dirtier = match guard.dirtier() {
            Some(dirtier) => dirtier,
            None => return Ok(()),
        };

        let after = guard.page_data();
        {
            let mut log = self.log.lock();
            log.log_write(dirtier, page_id, &guard.before_image(), &after)?;
            log.force()?;
        }
        self.catalog
            .file(page_id.table_id)?
            .write_page_data(page_id.page_no, &after)?;

        guard.mark_dirty(false, dirtier);
        guard.set_before_image();
        debug!("Flushed {} dirtied by transaction {}", page_id, dirtier);
        Ok(())
    }

    /// Flushes the pages `tid` holds locks on without ending it.
    pub fn flush_pages(&self, tid: TransactionID) -> Result<()> {
        for (page_id, _) in self.lock_manager.pages_held(tid) {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Writes every dirty page, including uncommitted ones. Each write is
    /// logged first so recovery can undo it.
    pub fn flush_all_pages(&self) -> Result<()> {
        let page_ids: Vec<PageID> = self.frames.lock().index.keys().copied().collect();
        for page_id in page_ids {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Drops a page from the cache without writing it.
    pub fn discard_page(&self, page_id: PageID) {
        self.frames.lock().remove(page_id);
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.log.lock().log_checkpoint()?;
        Ok(())
    }

    /// Replays the log against the table files and empties the cache.
    pub fn recover(&self) -> Result<RecoveryReport> {
        let report = self.log.lock().recover(&self.catalog)?;
        *self.frames.lock() = FrameTable::new(self.capacity);
        info!("Buffer pool ready after recovery of {} unfinished transactions", report.losers.len());
        Ok(report)
    }
}
