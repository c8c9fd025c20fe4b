use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::buffer::{BufferPool, PageRef};
use crate::common::{DbError, LockMode, PageID, Result, TransactionID};
use crate::storage::{File, HeapPage};
use crate::tuple::{Tuple, TupleDesc};

/// An unordered collection of tuples stored in fixed-size pages.
///
/// Page `n` occupies bytes `[n * page_size, (n + 1) * page_size)` of the
/// backing file; there is no file header. All reads and writes are whole
/// pages.
pub struct HeapFile {
    table_id: u32,
    desc: Arc<TupleDesc>,
    page_size: usize,
    file: Mutex<Box<dyn File>>,
    append_lock: Mutex<()>,
}

impl HeapFile {
    pub fn new(table_id: u32, desc: Arc<TupleDesc>, page_size: usize, file: Box<dyn File>) -> Self {
        Self {
            table_id,
            desc,
            page_size,
            file: Mutex::new(file),
            append_lock: Mutex::new(()),
        }
    }

    pub fn table_id(&self) -> u32 {
        self.table_id
    }

    pub fn tuple_desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn num_pages(&self) -> Result<u32> {
        let size = self.file.lock().size()?;
        Ok((size / self.page_size as u64) as u32)
    }

    pub fn read_page(&self, page_id: PageID) -> Result<HeapPage> {
        self.check_table(page_id)?;
        let data = {
            let mut file = self.file.lock();
            let num_pages = (file.size()? / self.page_size as u64) as u32;
            if page_id.page_no >= num_pages {
                return Err(DbError::PageOutOfRange { page_id, num_pages });
            }
            file.read_block(self.offset_of(page_id.page_no), self.page_size)?
        };
        HeapPage::from_bytes(page_id, Arc::clone(&self.desc), &data)
    }

    pub fn write_page(&self, page: &HeapPage) -> Result<()> {
        self.check_table(page.id())?;
        self.write_page_data(page.id().page_no, &page.page_data())
    }

    /// Writes raw page bytes and forces them to disk. Writing page
    /// `num_pages()` appends; anything further out is rejected.
    pub fn write_page_data(&self, page_no: u32, data: &[u8]) -> Result<()> {
        if data.len() != self.page_size {
            return Err(DbError::MalformedPage {
                page_id: PageID::new(self.table_id, page_no),
                reason: format!("image is {} bytes, expected {}", data.len(), self.page_size),
            });
        }

        let mut file = self.file.lock();
        let num_pages = (file.size()? / self.page_size as u64) as u32;
        if page_no > num_pages {
            return Err(DbError::PageOutOfRange {
                page_id: PageID::new(self.table_id, page_no),
                num_pages,
            });
        }
        file.write_block(data, self.offset_of(page_no))?;
        file.sync()
    }

    /// Places `tuple` in the first page with a free slot, appending a page
    /// when every existing one is full. Returns the page that changed; the
    /// caller marks it dirty.
    pub fn insert_tuple(
        &self,
        pool: &BufferPool,
        tid: TransactionID,
        tuple: &mut Tuple,
    ) -> Result<Vec<PageRef>> {
        if tuple.tuple_desc().as_ref() != self.desc.as_ref() {
            return Err(DbError::SchemaMismatch(format!(
                "tuple {} does not match table {} schema {}",
                tuple.tuple_desc(),
                self.table_id,
                self.desc
            )));
        }

        let mut page_no = 0;
        loop {
            let num_pages = self.num_pages()?;
            while page_no < num_pages {
                let page_id = PageID::new(self.table_id, page_no);
                page_no += 1;

                let held_before = pool.holds_lock(tid, page_id);
                let page = pool.get_page(tid, page_id, LockMode::Shared)?;
                if page.read().num_empty_slots() == 0 {
                    if !held_before {
                        pool.release_page(tid, page_id)?;
                    }
                    continue;
                }

                let page = pool.get_page(tid, page_id, LockMode::Exclusive)?;
                let mut guard = page.write();
                if guard.num_empty_slots() > 0 {
                    guard.insert_tuple(tuple)?;
                    drop(guard);
                    return Ok(vec![page]);
                }
            }

            // Every page we saw was full; grow the file unless someone
            // else already did.
            {
                let _append = self.append_lock.lock();
                let current = self.num_pages()?;
                if current == page_no {
                    self.write_page_data(current, &HeapPage::empty_page_data(self.page_size))?;
                    debug!("Table {} grew to {} pages", self.table_id, current + 1);
                }
            }
        }
    }

    pub fn delete_tuple(&self, pool: &BufferPool, tid: TransactionID, tuple: &Tuple) -> Result<PageRef> {
        let record_id = tuple.record_id().ok_or(DbError::MissingRecordId)?;
        self.check_table(record_id.page_id)?;

        let page = pool.get_page(tid, record_id.page_id, LockMode::Exclusive)?;
        page.write().delete_tuple(tuple)?;
        Ok(page)
    }

    fn check_table(&self, page_id: PageID) -> Result<()> {
        if page_id.table_id != self.table_id {
            return Err(DbError::Other(format!(
                "{} does not belong to table {}",
                page_id, self.table_id
            )));
        }
        Ok(())
    }

    fn offset_of(&self, page_no: u32) -> u64 {
        page_no as u64 * self.page_size as u64
    }
}
