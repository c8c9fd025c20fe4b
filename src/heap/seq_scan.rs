use std::collections::VecDeque;
use std::sync::Arc;

use crate::buffer::BufferPool;
use crate::common::{DbError, LockMode, PageID, Result, TransactionID};
use crate::tuple::{Tuple, TupleDesc};

/// Pull-based tuple stream. `next` returns `Ok(None)` at end of stream.
pub trait TupleIterator {
    fn open(&mut self) -> Result<()>;
    fn next(&mut self) -> Result<Option<Tuple>>;
    fn rewind(&mut self) -> Result<()>;
    fn close(&mut self);
    fn tuple_desc(&self) -> &Arc<TupleDesc>;
}

/// Reads every tuple of a table in page order under shared locks.
pub struct SeqScan {
    pool: Arc<BufferPool>,
    tid: TransactionID,
    table_id: u32,
    desc: Arc<TupleDesc>,
    next_page: u32,
    pending: VecDeque<Tuple>,
    opened: bool,
}

impl SeqScan {
    pub fn new(pool: Arc<BufferPool>, tid: TransactionID, table_id: u32) -> Result<Self> {
        let desc = pool.catalog().tuple_desc(table_id)?;
        Ok(Self {
            pool,
            tid,
            table_id,
            desc,
            next_page: 0,
            pending: VecDeque::new(),
            opened: false,
        })
    }

    fn fill_from_next_page(&mut self) -> Result<bool> {
        let num_pages = self.pool.catalog().file(self.table_id)?.num_pages()?;
        while self.next_page < num_pages {
            let page_id = PageID::new(self.table_id, self.next_page);
            self.next_page += 1;

            let page = self.pool.get_page(self.tid, page_id, LockMode::Shared)?;
            let guard = page.read();
            self.pending.extend(guard.iter().cloned());
            if !self.pending.is_empty() {
                return Ok(true);
            }
        }
        Ok(false)
    }
}

impl TupleIterator for SeqScan {
    fn open(&mut self) -> Result<()> {
        self.next_page = 0;
        self.pending.clear();
        self.opened = true;
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        if !self.opened {
            return Err(DbError::Other("scan is not open".to_string()));
        }
        if self.pending.is_empty() && !self.fill_from_next_page()? {
            return Ok(None);
        }
        Ok(self.pending.pop_front())
    }

    fn rewind(&mut self) -> Result<()> {
        self.close();
        self.open()
    }

    fn close(&mut self) {
        self.next_page = 0;
        self.pending.clear();
        self.opened = false;
    }

    fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }
}
