use env_logger::Builder;
use log::{info, LevelFilter};
use std::path::Path;
use std::sync::Arc;

use heapstore::{
    heap::{SeqScan, TupleIterator},
    tuple::{Field, FieldType, Tuple, TupleDesc},
    DatabaseConfig, Database,
};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    Builder::new().filter_level(LevelFilter::Info).init();

    info!("Transactional page store demo");

    let db_path = Path::new("temp_db");
    let db = Database::open(db_path, DatabaseConfig::default())?;

    let desc = TupleDesc::new(&[FieldType::Int, FieldType::Str], &["id", "name"]);
    let table_id = match db.catalog().table_id("people") {
        Some(id) => id,
        None => db.create_table("people", desc)?,
    };
    let desc = db.catalog().tuple_desc(table_id)?;

    let txn_id = db.begin()?;
    for (id, name) in [(1, "ada"), (2, "grace"), (3, "edsger")] {
        let mut tuple = Tuple::new(Arc::clone(&desc), vec![Field::Int(id), Field::Str(name.into())])?;
        db.buffer_pool().insert_tuple(txn_id, table_id, &mut tuple)?;
    }
    db.commit(txn_id)?;
    info!("Committed transaction {}", txn_id);

    let reader = db.begin()?;
    let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), reader, table_id)?;
    scan.open()?;
    while let Some(tuple) = scan.next()? {
        info!("{}", tuple);
    }
    scan.close();
    db.commit(reader)?;

    db.destroy()?;
    Ok(())
}
