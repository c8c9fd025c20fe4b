#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use heapstore::{
    heap::{SeqScan, TupleIterator},
    tuple::{Field, FieldType, Tuple, TupleDesc},
    BufferPool, Database, DatabaseConfig, Result, TransactionID,
};

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// 16 byte pages hold exactly three single-int tuples.
pub fn tiny_page_config(pool_size: usize) -> DatabaseConfig {
    DatabaseConfig::default()
        .with_page_size(16)
        .with_buffer_pool_size(pool_size)
        .with_lock_timeout(Duration::from_millis(20), Duration::from_millis(40))
}

pub fn int_desc() -> TupleDesc {
    TupleDesc::new(&[FieldType::Int], &["v"])
}

pub fn int_tuple(desc: &Arc<TupleDesc>, v: i32) -> Tuple {
    Tuple::new(Arc::clone(desc), vec![Field::Int(v)]).unwrap()
}

/// Opens a database in `dir` with one single-int table named "t".
pub fn open_with_table(dir: &Path, config: DatabaseConfig) -> Result<(Database, u32)> {
    let db = Database::open(dir, config)?;
    let table_id = match db.catalog().table_id("t") {
        Some(id) => id,
        None => db.create_table("t", int_desc())?,
    };
    Ok((db, table_id))
}

pub fn insert_values(db: &Database, tid: TransactionID, table_id: u32, values: &[i32]) -> Result<()> {
    let desc = db.catalog().tuple_desc(table_id)?;
    for v in values {
        db.buffer_pool().insert_tuple(tid, table_id, &mut int_tuple(&desc, *v))?;
    }
    Ok(())
}

pub fn scan_values(pool: &Arc<BufferPool>, tid: TransactionID, table_id: u32) -> Result<Vec<i32>> {
    let mut scan = SeqScan::new(Arc::clone(pool), tid, table_id)?;
    scan.open()?;
    let mut values = Vec::new();
    while let Some(tuple) = scan.next()? {
        if let Some(Field::Int(v)) = tuple.get_field(0) {
            values.push(*v);
        }
    }
    scan.close();
    Ok(values)
}
