//! Page-level shared/exclusive locks with timeout-based deadlock handling.
//!
//! Every wait is bounded by a jittered timeout. When it expires the waiter
//! gives up every lock it holds; if that freed anything it is reported as
//! the deadlock victim, otherwise it cannot be part of a cycle and keeps
//! waiting without a bound.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use parking_lot::{Condvar, Mutex, RwLock};
use rand::Rng;

use crate::common::{DbError, LockMode, PageID, Result, TransactionID};

#[derive(Debug, Default)]
struct LockState {
    readers: HashSet<TransactionID>,
    writer: Option<TransactionID>,
}

impl LockState {
    fn mode_held(&self, tid: TransactionID) -> Option<LockMode> {
        if self.writer == Some(tid) {
            Some(LockMode::Exclusive)
        } else if self.readers.contains(&tid) {
            Some(LockMode::Shared)
        } else {
            None
        }
    }

    fn already_granted(&self, tid: TransactionID, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => self.mode_held(tid).is_some(),
            LockMode::Exclusive => self.writer == Some(tid),
        }
    }

    /// Our own read lock never blocks an upgrade.
    fn compatible(&self, tid: TransactionID, mode: LockMode) -> bool {
        let writer_ok = self.writer.map_or(true, |w| w == tid);
        match mode {
            LockMode::Shared => writer_ok,
            LockMode::Exclusive => writer_ok && self.readers.iter().all(|r| *r == tid),
        }
    }

    fn grant(&mut self, tid: TransactionID, mode: LockMode) {
        match mode {
            LockMode::Shared => {
                if self.writer != Some(tid) {
                    self.readers.insert(tid);
                }
            }
            LockMode::Exclusive => {
                self.readers.remove(&tid);
                self.writer = Some(tid);
            }
        }
        debug_assert!(self.writer.is_none() || self.readers.is_empty());
    }

    fn is_free(&self) -> bool {
        self.writer.is_none() && self.readers.is_empty()
    }

    fn release(&mut self, tid: TransactionID) -> bool {
        if self.writer == Some(tid) {
            self.writer = None;
            true
        } else {
            self.readers.remove(&tid)
        }
    }
}

#[derive(Debug, Default)]
struct PageLock {
    state: Mutex<LockState>,
    released: Condvar,
}

pub struct LockManager {
    pages: RwLock<HashMap<PageID, Arc<PageLock>>>,
    held: Mutex<HashMap<TransactionID, HashSet<PageID>>>,
    timeout_ms: (u64, u64),
}

impl LockManager {
    pub fn new(min_timeout: Duration, max_timeout: Duration) -> Self {
        let min = min_timeout.as_millis() as u64;
        let max = (max_timeout.as_millis() as u64).max(min);
        Self {
            pages: RwLock::new(HashMap::new()),
            held: Mutex::new(HashMap::new()),
            timeout_ms: (min, max),
        }
    }

    fn page_lock(&self, page_id: PageID) -> Arc<PageLock> {
        if let Some(lock) = self.pages.read().get(&page_id) {
            return Arc::clone(lock);
        }
        Arc::clone(self.pages.write().entry(page_id).or_default())
    }

    fn wait_timeout(&self) -> Duration {
        let (min, max) = self.timeout_ms;
        Duration::from_millis(rand::thread_rng().gen_range(min..=max))
    }

    fn record_grant(&self, tid: TransactionID, page_id: PageID) {
        self.held.lock().entry(tid).or_default().insert(page_id);
    }

    /// Blocks until `tid` holds `page_id` in `mode`. Returns
    /// `TransactionAborted` if the wait timed out and `tid` had to give up
    /// its other locks; the caller must then abort the transaction.
    pub fn acquire(&self, tid: TransactionID, page_id: PageID, mode: LockMode) -> Result<()> {
        self.acquire_with(tid, page_id, mode, || Ok(()))
    }

    /// Like `acquire`, but runs `on_victim` when `tid` is picked as the
    /// deadlock victim, while it still holds every lock it had. Its locks
    /// are released afterwards whatever `on_victim` returns.
    pub fn acquire_with<F>(&self, tid: TransactionID, page_id: PageID, mode: LockMode, on_victim: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        let lock = self.page_lock(page_id);
        let mut state = lock.state.lock();
        if state.already_granted(tid, mode) {
            return Ok(());
        }

        let deadline = Instant::now() + self.wait_timeout();
        while !state.compatible(tid, mode) {
            if lock.released.wait_until(&mut state, deadline).timed_out()
                && !state.compatible(tid, mode)
            {
                drop(state);
                if self.held_count(tid) > 0 {
                    drop(lock);
                    let cleanup = on_victim();
                    let freed = self.release_all(tid);
                    warn!(
                        "Transaction {} timed out waiting for {:?} lock on {}; released {} locks and aborting",
                        tid, mode, page_id, freed
                    );
                    cleanup?;
                    return Err(DbError::TransactionAborted(tid));
                }

                debug!(
                    "Transaction {} holds no locks; waiting on {} without a timeout",
                    tid, page_id
                );
                state = lock.state.lock();
                while !state.compatible(tid, mode) {
                    lock.released.wait(&mut state);
                }
                break;
            }
        }

        state.grant(tid, mode);
        self.record_grant(tid, page_id);
        Ok(())
    }

    fn held_count(&self, tid: TransactionID) -> usize {
        self.held.lock().get(&tid).map_or(0, |pages| pages.len())
    }

    /// Drops whatever lock `tid` holds on `page_id`.
    pub fn release(&self, tid: TransactionID, page_id: PageID) -> bool {
        let lock = match self.pages.read().get(&page_id) {
            Some(lock) => Arc::clone(lock),
            None => return false,
        };

        let released = lock.state.lock().release(tid);
        if released {
            lock.released.notify_all();
            let mut held = self.held.lock();
            if let Some(pages) = held.get_mut(&tid) {
                pages.remove(&page_id);
                if pages.is_empty() {
                    held.remove(&tid);
                }
            }
        }
        drop(lock);
        self.prune(page_id);
        released
    }

    /// Releases every lock `tid` holds and returns how many there were.
    pub fn release_all(&self, tid: TransactionID) -> usize {
        let pages = self.held.lock().remove(&tid).unwrap_or_default();
        let mut freed = 0;
        for page_id in pages {
            let lock = match self.pages.read().get(&page_id) {
                Some(lock) => Arc::clone(lock),
                None => continue,
            };
            if lock.state.lock().release(tid) {
                freed += 1;
                lock.released.notify_all();
            }
            drop(lock);
            self.prune(page_id);
        }
        freed
    }

    /// Forgets the lock of a page nobody holds or waits on.
    fn prune(&self, page_id: PageID) {
        let mut pages = self.pages.write();
        let idle = pages
            .get(&page_id)
            .map_or(false, |lock| Arc::strong_count(lock) == 1 && lock.state.lock().is_free());
        if idle {
            pages.remove(&page_id);
        }
    }

    /// Number of pages with lock state, held or waited on.
    pub fn tracked_pages(&self) -> usize {
        self.pages.read().len()
    }

    pub fn holds(&self, tid: TransactionID, page_id: PageID) -> bool {
        self.lock_mode(tid, page_id).is_some()
    }

    pub fn lock_mode(&self, tid: TransactionID, page_id: PageID) -> Option<LockMode> {
        let lock = Arc::clone(self.pages.read().get(&page_id)?);
        let mode = lock.state.lock().mode_held(tid);
        mode
    }

    /// Pages `tid` currently holds a lock on, with the mode held.
    pub fn pages_held(&self, tid: TransactionID) -> Vec<(PageID, LockMode)> {
        let pages: Vec<PageID> = match self.held.lock().get(&tid) {
            Some(pages) => pages.iter().copied().collect(),
            None => return Vec::new(),
        };
        let mut held: Vec<(PageID, LockMode)> = pages
            .into_iter()
            .filter_map(|page_id| self.lock_mode(tid, page_id).map(|mode| (page_id, mode)))
            .collect();
        held.sort_by_key(|(page_id, _)| *page_id);
        held
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_never_mixes_readers_and_writer() {
        let mut state = LockState::default();
        let (a, b) = (TransactionID(1), TransactionID(2));

        state.grant(a, LockMode::Shared);
        assert!(state.compatible(b, LockMode::Shared));
        assert!(state.compatible(a, LockMode::Exclusive));
        state.grant(b, LockMode::Shared);
        assert!(!state.compatible(a, LockMode::Exclusive));

        state.release(b);
        state.grant(a, LockMode::Exclusive);
        assert!(state.readers.is_empty());
        assert_eq!(state.writer, Some(a));
        assert!(!state.compatible(b, LockMode::Shared));

        // Re-requesting a weaker mode keeps the exclusive grant
        state.grant(a, LockMode::Shared);
        assert!(state.readers.is_empty());
        assert_eq!(state.mode_held(a), Some(LockMode::Exclusive));
    }

    #[test]
    fn test_released_pages_are_forgotten() {
        let lm = LockManager::new(Duration::from_millis(10), Duration::from_millis(20));
        let (a, b) = (TransactionID(1), TransactionID(2));
        let pid = |n| PageID::new(1, n);

        lm.acquire(a, pid(0), LockMode::Shared).unwrap();
        lm.acquire(b, pid(0), LockMode::Shared).unwrap();
        lm.acquire(a, pid(1), LockMode::Exclusive).unwrap();
        lm.acquire(a, pid(2), LockMode::Shared).unwrap();
        assert_eq!(lm.tracked_pages(), 3);

        assert!(lm.release(a, pid(2)));
        assert_eq!(lm.tracked_pages(), 2);

        // Page 0 is still shared by b
        assert_eq!(lm.release_all(a), 2);
        assert_eq!(lm.tracked_pages(), 1);
        assert!(lm.release(b, pid(0)));
        assert_eq!(lm.tracked_pages(), 0);
        assert!(!lm.release(b, pid(0)));
    }

    #[test]
    fn test_victim_cleanup_runs_before_locks_drop() {
        let lm = LockManager::new(Duration::from_millis(10), Duration::from_millis(20));
        let (a, b) = (TransactionID(1), TransactionID(2));
        let pid = |n| PageID::new(1, n);

        lm.acquire(a, pid(0), LockMode::Exclusive).unwrap();
        lm.acquire(b, pid(1), LockMode::Exclusive).unwrap();

        let mut held_during_cleanup = None;
        let result = lm.acquire_with(a, pid(1), LockMode::Exclusive, || {
            held_during_cleanup = lm.lock_mode(a, pid(0));
            Ok(())
        });
        assert!(matches!(result, Err(DbError::TransactionAborted(t)) if t == a));
        assert_eq!(held_during_cleanup, Some(LockMode::Exclusive));
        assert!(!lm.holds(a, pid(0)));
    }
}
