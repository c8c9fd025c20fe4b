mod common;

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use common::*;
use heapstore::{
    heap::HeapFile,
    log_mod::{LogBody, LogRecord, LogRecordType, LOG_HEADER_LEN},
    storage::{FileMode, HeapPage, MemoryFile},
    tuple::TupleDesc,
    Catalog, LogManager, PageID, Result, TransactionID, LSN,
};
use tempfile::tempdir;

const PAGE_SIZE: usize = 16;

/// A catalog holding table 1 backed by memory, with `pages` empty pages.
fn memory_catalog(pages: u32) -> Result<(Catalog, Arc<TupleDesc>)> {
    let desc = Arc::new(int_desc());
    let file = HeapFile::new(1, Arc::clone(&desc), PAGE_SIZE, Box::new(MemoryFile::new(FileMode::WRITE)));
    for n in 0..pages {
        file.write_page_data(n, &HeapPage::empty_page_data(PAGE_SIZE))?;
    }
    let catalog = Catalog::new();
    catalog.add_table("t", Arc::new(file));
    Ok((catalog, desc))
}

/// Page image holding `values`.
fn page_image(desc: &Arc<TupleDesc>, values: &[i32]) -> Result<Vec<u8>> {
    let mut page = HeapPage::new_empty(PageID::new(1, 0), Arc::clone(desc), PAGE_SIZE)?;
    for v in values {
        page.insert_tuple(&mut int_tuple(desc, *v))?;
    }
    Ok(page.page_data())
}

fn on_disk(catalog: &Catalog, page_no: u32) -> Result<Vec<u8>> {
    Ok(catalog.file(1)?.read_page(PageID::new(1, page_no))?.page_data())
}

fn log_path(dir: &Path) -> std::path::PathBuf {
    dir.join("wal.log")
}

#[test]
fn test_record_counts() -> Result<()> {
    let dir = tempdir()?;
    let mut log = LogManager::new(&log_path(dir.path()))?;
    let empty = HeapPage::empty_page_data(PAGE_SIZE);
    let t1 = TransactionID(1);
    let t2 = TransactionID(2);

    log.log_txn_begin(t1)?;
    log.log_txn_begin(t2)?;
    log.log_write(t1, PageID::new(1, 0), &empty, &empty)?;
    log.log_commit(t1)?;
    log.log_abort(t2)?;
    log.log_checkpoint()?;

    assert_eq!(log.get_total_log_records(), 6);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::BeginRecord), 2);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::UpdateRecord), 1);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::CommitRecord), 1);
    assert_eq!(log.get_total_log_records_of_type(LogRecordType::AbortRecord), 1);
    assert!(!log.is_active(t1));
    assert!(log.last_checkpoint().is_some());
    Ok(())
}

#[test]
fn test_records_chain_back_per_transaction() -> Result<()> {
    let dir = tempdir()?;
    let mut log = LogManager::new(&log_path(dir.path()))?;
    let empty = HeapPage::empty_page_data(PAGE_SIZE);
    let t1 = TransactionID(1);

    let begin = log.log_txn_begin(t1)?;
    log.log_txn_begin(TransactionID(2))?;
    let update = log.log_write(t1, PageID::new(1, 0), &empty, &empty)?;
    let commit = log.log_commit(t1)?;

    assert_eq!(begin, LSN(LOG_HEADER_LEN));
    assert_eq!(log.read_record_at(commit)?.prev, Some(update));
    assert_eq!(log.read_record_at(update)?.prev, Some(begin));
    assert_eq!(log.read_record_at(begin)?.prev, None);
    Ok(())
}

#[test]
fn test_reopened_log_reads_same_records() -> Result<()> {
    let dir = tempdir()?;
    {
        let mut log = LogManager::new(&log_path(dir.path()))?;
        log.log_txn_begin(TransactionID(7))?;
        log.log_commit(TransactionID(7))?;
    }
    let mut log = LogManager::new(&log_path(dir.path()))?;
    let bodies: Vec<LogBody> = log.read_all_records()?.into_iter().map(|(_, r)| r.body).collect();
    assert_eq!(bodies, vec![LogBody::Begin, LogBody::Commit]);
    Ok(())
}

#[test]
fn test_torn_tail_is_truncated() -> Result<()> {
    let dir = tempdir()?;
    let path = log_path(dir.path());
    {
        let mut log = LogManager::new(&path)?;
        log.log_txn_begin(TransactionID(1))?;
        log.log_commit(TransactionID(1))?;
    }
    let intact_len = fs::metadata(&path)?.len();

    let empty = HeapPage::empty_page_data(PAGE_SIZE);
    let partial = LogRecord {
        txn_id: TransactionID(2),
        prev: None,
        body: LogBody::Update {
            page_id: PageID::new(1, 0),
            before_img: empty.clone(),
            after_img: empty,
        },
    }
    .encode()?;
    OpenOptions::new()
        .append(true)
        .open(&path)?
        .write_all(&partial[..partial.len() / 2])?;

    let mut log = LogManager::new(&path)?;
    assert_eq!(log.read_all_records()?.len(), 2);
    assert_eq!(fs::metadata(&path)?.len(), intact_len);

    // The log keeps working after the cut
    log.log_txn_begin(TransactionID(3))?;
    assert_eq!(log.read_all_records()?.len(), 3);
    Ok(())
}

#[test]
fn test_recovery_redoes_committed_update_missing_from_disk() -> Result<()> {
    init_logging();
    let dir = tempdir()?;
    let (catalog, desc) = memory_catalog(1)?;
    let before = on_disk(&catalog, 0)?;
    let after = page_image(&desc, &[10, 20])?;
    {
        let mut log = LogManager::new(&log_path(dir.path()))?;
        log.log_txn_begin(TransactionID(1))?;
        log.log_write(TransactionID(1), PageID::new(1, 0), &before, &after)?;
        log.log_commit(TransactionID(1))?;
        // Crash before the page write
    }

    let mut log = LogManager::new(&log_path(dir.path()))?;
    let report = log.recover(&catalog)?;
    assert_eq!(report.redone, 1);
    assert!(report.losers.is_empty());
    assert_eq!(report.max_txn_id, TransactionID(1));
    assert_eq!(on_disk(&catalog, 0)?, after);
    Ok(())
}

#[test]
fn test_recovery_undoes_unfinished_transaction() -> Result<()> {
    let dir = tempdir()?;
    let path = log_path(dir.path());
    let (catalog, desc) = memory_catalog(1)?;
    let before = on_disk(&catalog, 0)?;
    let after = page_image(&desc, &[5])?;
    {
        let mut log = LogManager::new(&path)?;
        log.log_txn_begin(TransactionID(4))?;
        log.log_write(TransactionID(4), PageID::new(1, 0), &before, &after)?;
        log.force()?;
        catalog.file(1)?.write_page_data(0, &after)?;
    }

    let mut log = LogManager::new(&path)?;
    let report = log.recover(&catalog)?;
    assert_eq!(report.losers, vec![TransactionID(4)]);
    assert_eq!(report.undone, 1);
    assert_eq!(on_disk(&catalog, 0)?, before);

    // The loser is now on record as aborted
    let last = log.read_all_records()?.into_iter().rev().nth(1).map(|(_, r)| r);
    assert!(matches!(
        last,
        Some(LogRecord { txn_id: TransactionID(4), body: LogBody::Abort, .. })
    ));
    Ok(())
}

#[test]
fn test_recovery_is_repeatable() -> Result<()> {
    let dir = tempdir()?;
    let path = log_path(dir.path());
    let crashed = dir.path().join("wal.crashed");
    let (catalog, desc) = memory_catalog(2)?;
    let empty = on_disk(&catalog, 0)?;
    let committed = page_image(&desc, &[1])?;
    let uncommitted = page_image(&desc, &[2])?;
    {
        let mut log = LogManager::new(&path)?;
        log.log_txn_begin(TransactionID(1))?;
        log.log_write(TransactionID(1), PageID::new(1, 0), &empty, &committed)?;
        log.log_commit(TransactionID(1))?;
        log.log_txn_begin(TransactionID(2))?;
        log.log_write(TransactionID(2), PageID::new(1, 1), &empty, &uncommitted)?;
        log.force()?;
        catalog.file(1)?.write_page_data(1, &uncommitted)?;
    }
    fs::copy(&path, &crashed)?;

    let first = LogManager::new(&path)?.recover(&catalog)?;

    // Crash again partway and rerun recovery from the same log
    fs::copy(&crashed, &path)?;
    catalog.file(1)?.write_page_data(1, &uncommitted)?;
    let second = LogManager::new(&path)?.recover(&catalog)?;

    assert_eq!(first, second);
    assert_eq!(on_disk(&catalog, 0)?, committed);
    assert_eq!(on_disk(&catalog, 1)?, empty);

    // A clean log recovers to the same pages with nothing left to do
    let third = LogManager::new(&path)?.recover(&catalog)?;
    assert_eq!(third.redone + third.undone, 0);
    assert_eq!(on_disk(&catalog, 0)?, committed);
    assert_eq!(on_disk(&catalog, 1)?, empty);
    Ok(())
}

#[test]
fn test_recovery_reaches_updates_before_checkpoint() -> Result<()> {
    let dir = tempdir()?;
    let path = log_path(dir.path());
    let (catalog, desc) = memory_catalog(1)?;
    let before = on_disk(&catalog, 0)?;
    let after = page_image(&desc, &[9])?;
    {
        let mut log = LogManager::new(&path)?;
        log.log_txn_begin(TransactionID(3))?;
        log.log_write(TransactionID(3), PageID::new(1, 0), &before, &after)?;
        log.log_checkpoint()?;
        catalog.file(1)?.write_page_data(0, &after)?;
    }

    let report = LogManager::new(&path)?.recover(&catalog)?;
    assert_eq!(report.losers, vec![TransactionID(3)]);
    assert_eq!(on_disk(&catalog, 0)?, before);
    Ok(())
}

#[test]
fn test_recovery_undoes_logged_abort_missing_from_disk() -> Result<()> {
    let dir = tempdir()?;
    let path = log_path(dir.path());
    let (catalog, desc) = memory_catalog(1)?;
    let before = on_disk(&catalog, 0)?;
    let after = page_image(&desc, &[8])?;
    {
        let mut log = LogManager::new(&path)?;
        log.log_txn_begin(TransactionID(1))?;
        log.log_write(TransactionID(1), PageID::new(1, 0), &before, &after)?;
        log.force()?;
        catalog.file(1)?.write_page_data(0, &after)?;
        // Abort logged but the restoring write never happened
        log.log_abort(TransactionID(1))?;
    }

    let report = LogManager::new(&path)?.recover(&catalog)?;
    assert!(report.losers.is_empty());
    assert_eq!(report.undone, 1);
    assert_eq!(on_disk(&catalog, 0)?, before);
    Ok(())
}
