mod lock_manager;
mod transaction;

pub use lock_manager::LockManager;
pub use transaction::{TransactionIdGenerator, TransactionManager};
