mod common;

use std::sync::Arc;

use common::*;
use heapstore::{
    heap::{SeqScan, TupleIterator},
    tuple::{Field, FieldType, Tuple, TupleDesc},
    Database, DatabaseConfig, DbError, PageID, Result,
};
use tempfile::tempdir;

fn people_desc() -> TupleDesc {
    TupleDesc::new(&[FieldType::Int, FieldType::Str], &["id", "name"])
}

#[test]
fn test_create_insert_scan() -> Result<()> {
    init_logging();
    let dir = tempdir()?;
    let db = Database::open(dir.path(), DatabaseConfig::default())?;
    let table_id = db.create_table("people", people_desc())?;
    let desc = db.catalog().tuple_desc(table_id)?;
    assert_eq!(desc.index_of("people.name")?, 1);

    let tid = db.begin()?;
    for (id, name) in [(1, "ada"), (2, "grace")] {
        let mut tuple = Tuple::new(Arc::clone(&desc), vec![Field::Int(id), Field::Str(name.into())])?;
        db.buffer_pool().insert_tuple(tid, table_id, &mut tuple)?;
        assert!(tuple.record_id().is_some());
    }
    db.commit(tid)?;

    let reader = db.begin()?;
    let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), reader, table_id)?;
    scan.open()?;
    let mut names = Vec::new();
    while let Some(tuple) = scan.next()? {
        if let Some(Field::Str(name)) = tuple.get_field(1) {
            names.push(name.clone());
        }
    }
    assert_eq!(names, vec!["ada".to_string(), "grace".to_string()]);

    scan.rewind()?;
    assert!(scan.next()?.is_some());
    scan.close();
    db.commit(reader)?;
    db.close()?;
    Ok(())
}

#[test]
fn test_unopened_scan_fails() -> Result<()> {
    let dir = tempdir()?;
    let (db, table_id) = open_with_table(dir.path(), tiny_page_config(4))?;
    let tid = db.begin()?;
    let mut scan = SeqScan::new(Arc::clone(db.buffer_pool()), tid, table_id)?;
    assert!(scan.next().is_err());
    db.commit(tid)?;
    Ok(())
}

#[test]
fn test_tuple_rejects_wrong_fields() {
    let desc = Arc::new(people_desc());
    assert!(matches!(
        Tuple::new(Arc::clone(&desc), vec![Field::Int(1)]),
        Err(DbError::SchemaMismatch(_))
    ));
    assert!(matches!(
        Tuple::new(Arc::clone(&desc), vec![Field::Str("x".into()), Field::Int(1)]),
        Err(DbError::SchemaMismatch(_))
    ));

    let mut tuple = Tuple::new(desc, vec![Field::Int(1), Field::Str("ada".into())]).unwrap();
    assert!(tuple.set_field(1, Field::Int(2)).is_err());
    tuple.set_field(1, Field::Str("grace".into())).unwrap();
    assert_eq!(tuple.to_string(), "1\tgrace");
}

#[test]
fn test_unknown_table() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path(), DatabaseConfig::default())?;
    assert!(db.catalog().table_id("missing").is_none());
    assert!(matches!(db.catalog().file(42), Err(DbError::UnknownTable(42))));
    Ok(())
}

#[test]
fn test_long_strings_are_truncated() -> Result<()> {
    let dir = tempdir()?;
    let db = Database::open(dir.path(), DatabaseConfig::default())?;
    let table_id = db.create_table("people", people_desc())?;
    let desc = db.catalog().tuple_desc(table_id)?;

    let tid = db.begin()?;
    let long = "x".repeat(300);
    let mut tuple = Tuple::new(Arc::clone(&desc), vec![Field::Int(1), Field::Str(long)])?;
    db.buffer_pool().insert_tuple(tid, table_id, &mut tuple)?;
    db.commit(tid)?;

    let page = db.catalog().file(table_id)?.read_page(PageID::new(table_id, 0))?;
    let stored = page.iter().next().expect("one tuple");
    assert!(matches!(stored.get_field(1), Some(Field::Str(s)) if s.len() == 128));
    Ok(())
}
