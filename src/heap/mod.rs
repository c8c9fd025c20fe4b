mod heap_file;
mod seq_scan;

pub use heap_file::HeapFile;
pub use seq_scan::{SeqScan, TupleIterator};
