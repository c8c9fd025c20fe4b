mod catalog;
mod db_files;
mod file;
mod heap_page;

pub use catalog::Catalog;
pub use db_files::{DBFiles, DbPath};
pub use file::{File, FileMode, MemoryFile, PosixFile};
pub use heap_page::HeapPage;
