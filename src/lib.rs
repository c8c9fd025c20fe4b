pub mod buffer;
pub mod common;
pub mod heap;
pub mod log_mod;
pub mod storage;
pub mod transaction;
pub mod tuple;

pub use buffer::BufferPool;
pub use common::{DatabaseConfig, DbError, LockMode, PageID, RecordID, Result, TransactionID, LSN};
pub use log_mod::{LogManager, RecoveryReport};
pub use storage::{Catalog, DBFiles};
pub use transaction::{TransactionIdGenerator, TransactionManager};

use std::path::Path;
use std::sync::Arc;

use log::info;

use heap::HeapFile;
use storage::{DbPath, FileMode, PosixFile};
use tuple::TupleDesc;

pub struct Database {
    files: DBFiles,
    config: DatabaseConfig,
    catalog: Arc<Catalog>,
    buffer_pool: Arc<BufferPool>,
    transaction_manager: TransactionManager,
    last_recovery: RecoveryReport,
}

impl Database {
    /// Opens (or creates) the database in `db_path` and recovers it from
    /// its log before handing it out.
    pub fn open(db_path: &Path, config: DatabaseConfig) -> Result<Self> {
        let files = DBFiles::new(db_path)?;
        let catalog = Arc::new(Catalog::load(&files, config.page_size)?);
        let log_manager = LogManager::new(&files.path(DbPath::Log))?;
        let buffer_pool = Arc::new(BufferPool::new(&config, Arc::clone(&catalog), log_manager));

        let last_recovery = buffer_pool.recover()?;
        let ids = TransactionIdGenerator::starting_after(last_recovery.max_txn_id);
        let transaction_manager = TransactionManager::new(Arc::clone(&buffer_pool), ids);
        info!("Opened database at {}", files.root().display());

        Ok(Self {
            files,
            config,
            catalog,
            buffer_pool,
            transaction_manager,
            last_recovery,
        })
    }

    /// Creates an empty table and persists the catalog.
    pub fn create_table(&self, name: &str, desc: TupleDesc) -> Result<u32> {
        let table_id = self.catalog.create_table(name, |table_id| {
            let file = PosixFile::new(&self.files.path(DbPath::Table(table_id)), FileMode::WRITE)?;
            Ok(HeapFile::new(table_id, Arc::new(desc), self.config.page_size, Box::new(file)))
        })?;
        self.catalog.save(&self.files.path(DbPath::Catalog))?;
        info!("Created table {} with id {}", name, table_id);
        Ok(table_id)
    }

    pub fn begin(&self) -> Result<TransactionID> {
        self.transaction_manager.start_txn()
    }

    pub fn commit(&self, txn_id: TransactionID) -> Result<()> {
        self.transaction_manager.commit_txn(txn_id)
    }

    pub fn abort(&self, txn_id: TransactionID) -> Result<()> {
        self.transaction_manager.abort_txn(txn_id)
    }

    pub fn checkpoint(&self) -> Result<()> {
        self.buffer_pool.checkpoint()
    }

    pub fn catalog(&self) -> &Arc<Catalog> {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPool> {
        &self.buffer_pool
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.transaction_manager
    }

    pub fn last_recovery(&self) -> &RecoveryReport {
        &self.last_recovery
    }

    /// Aborts whatever is still running, writes out the cache and leaves a
    /// checkpoint so the next open has nothing to replay.
    pub fn close(self) -> Result<()> {
        self.shutdown()
    }

    /// Closes the database and deletes everything it stored on disk.
    pub fn destroy(self) -> Result<()> {
        self.shutdown()?;
        self.files.remove_all()
    }

    fn shutdown(&self) -> Result<()> {
        for txn_id in self.transaction_manager.active_transactions() {
            self.transaction_manager.abort_txn(txn_id)?;
        }
        self.buffer_pool.flush_all_pages()?;
        self.buffer_pool.checkpoint()?;
        Ok(())
    }
}
