use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use log::{debug, info, warn};

use super::log_record::{CheckpointData, LogBody, LogRecord, LogRecordType, NO_LSN};
use crate::common::{DbError, PageID, Result, TransactionID, LSN};
use crate::storage::Catalog;

/// Size of the file header holding the offset of the last checkpoint.
pub const LOG_HEADER_LEN: u64 = 8;

#[derive(Debug, Clone, Copy)]
struct TxnOffsets {
    first: LSN,
    last: LSN,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub redone: usize,
    pub undone: usize,
    pub losers: Vec<TransactionID>,
    pub max_txn_id: TransactionID,
}

/// Append-only write-ahead log of transaction lifecycle events and page
/// images.
pub struct LogManager {
    log_file: File,
    current_offset: u64,
    last_checkpoint: Option<LSN>,
    active: HashMap<TransactionID, TxnOffsets>,
    max_txn_id: TransactionID,
    record_counts: HashMap<LogRecordType, u64>,
}

impl LogManager {
    pub fn new(log_file_path: &Path) -> Result<Self> {
        let mut log_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(log_file_path)?;

        let len = log_file.metadata()?.len();
        let last_checkpoint = if len < LOG_HEADER_LEN {
            log_file.set_len(0)?;
            log_file.write_all(&NO_LSN.to_le_bytes())?;
            log_file.sync_all()?;
            None
        } else {
            let mut header = [0u8; 8];
            log_file.seek(SeekFrom::Start(0))?;
            log_file.read_exact(&mut header)?;
            match u64::from_le_bytes(header) {
                NO_LSN => None,
                lsn => Some(LSN(lsn)),
            }
        };

        Ok(Self {
            log_file,
            current_offset: len.max(LOG_HEADER_LEN),
            last_checkpoint,
            active: HashMap::new(),
            max_txn_id: TransactionID::SYSTEM,
            record_counts: HashMap::new(),
        })
    }

    /// Appends one record at the end of the log. Not forced.
    pub fn append(&mut self, record: &LogRecord) -> Result<LSN> {
        let bytes = record.encode()?;
        let lsn = LSN(self.current_offset);

        self.log_file.seek(SeekFrom::Start(self.current_offset))?;
        self.log_file.write_all(&bytes)?;
        self.current_offset += bytes.len() as u64;

        *self.record_counts.entry(record.record_type()).or_insert(0) += 1;
        self.max_txn_id = self.max_txn_id.max(record.txn_id);
        Ok(lsn)
    }

    pub fn force(&mut self) -> Result<()> {
        self.log_file.sync_data()?;
        Ok(())
    }

    fn append_for(&mut self, txn_id: TransactionID, body: LogBody) -> Result<LSN> {
        let prev = self.active.get(&txn_id).map(|offsets| offsets.last);
        let lsn = self.append(&LogRecord { txn_id, prev, body })?;
        self.active
            .entry(txn_id)
            .and_modify(|offsets| offsets.last = lsn)
            .or_insert(TxnOffsets { first: lsn, last: lsn });
        Ok(lsn)
    }

    pub fn log_txn_begin(&mut self, txn_id: TransactionID) -> Result<LSN> {
        if self.active.contains_key(&txn_id) {
            return Err(DbError::Other(format!(
                "Transaction {} already began",
                txn_id
            )));
        }
        self.append_for(txn_id, LogBody::Begin)
    }

    /// Logs a page write. The caller must `force` before the page itself
    /// reaches disk.
    pub fn log_write(
        &mut self,
        txn_id: TransactionID,
        page_id: PageID,
        before_img: &[u8],
        after_img: &[u8],
    ) -> Result<LSN> {
        self.append_for(
            txn_id,
            LogBody::Update {
                page_id,
                before_img: before_img.to_vec(),
                after_img: after_img.to_vec(),
            },
        )
    }

    pub fn log_commit(&mut self, txn_id: TransactionID) -> Result<LSN> {
        let lsn = self.append_for(txn_id, LogBody::Commit)?;
        self.force()?;
        self.active.remove(&txn_id);
        Ok(lsn)
    }

    pub fn log_abort(&mut self, txn_id: TransactionID) -> Result<LSN> {
        let lsn = self.append_for(txn_id, LogBody::Abort)?;
        self.force()?;
        self.active.remove(&txn_id);
        Ok(lsn)
    }

    /// Records the active transactions and points the file header at the
    /// new checkpoint.
    pub fn log_checkpoint(&mut self) -> Result<LSN> {
        let data = CheckpointData {
            active: self
                .active
                .iter()
                .map(|(txn_id, offsets)| (*txn_id, offsets.first))
                .collect(),
            max_txn_id: self.max_txn_id,
        };
        let active = data.active.len();
        let lsn = self.append(&LogRecord {
            txn_id: TransactionID::SYSTEM,
            prev: None,
            body: LogBody::Checkpoint(data),
        })?;
        self.force()?;

        self.log_file.seek(SeekFrom::Start(0))?;
        self.log_file.write_all(&lsn.0.to_le_bytes())?;
        self.force()?;
        self.last_checkpoint = Some(lsn);

        info!("Checkpoint at offset {} with {} active transactions", lsn.0, active);
        Ok(lsn)
    }

    /// Restores on disk the before-images of every update `txn_id` has
    /// already logged. Returns how many images were applied.
    pub fn rollback(&mut self, txn_id: TransactionID, catalog: &Catalog) -> Result<usize> {
        let last = match self.active.get(&txn_id) {
            Some(offsets) => offsets.last,
            None => return Ok(0),
        };
        self.undo_chain(Some(last), catalog)
    }

    fn undo_chain(&self, from: Option<LSN>, catalog: &Catalog) -> Result<usize> {
        let mut undone = 0;
        let mut next = from;
        while let Some(lsn) = next {
            let record = self.read_record_at(lsn)?;
            match &record.body {
                LogBody::Update {
                    page_id,
                    before_img,
                    ..
                } => {
                    catalog
                        .file(page_id.table_id)?
                        .write_page_data(page_id.page_no, before_img)?;
                    undone += 1;
                }
                LogBody::Begin => break,
                _ => {}
            }
            next = record.prev;
        }
        Ok(undone)
    }

    pub fn read_record_at(&self, lsn: LSN) -> Result<LogRecord> {
        if lsn.0 < LOG_HEADER_LEN || lsn.0 >= self.current_offset {
            return Err(DbError::CorruptLog {
                offset: lsn.0,
                reason: "offset outside the log".to_string(),
            });
        }

        let mut reader = BufReader::new(&self.log_file);
        reader.seek(SeekFrom::Start(lsn.0))?;
        match LogRecord::decode(&mut reader, lsn.0, self.current_offset - lsn.0)? {
            Some((record, _)) => Ok(record),
            None => Err(DbError::CorruptLog {
                offset: lsn.0,
                reason: "record runs past the end of the log".to_string(),
            }),
        }
    }

    /// Decodes every record from `start` to the end of the log. A record
    /// cut short by a crash ends the scan and is truncated away.
    pub fn read_records_from(&mut self, start: LSN) -> Result<Vec<(LSN, LogRecord)>> {
        let mut records = Vec::new();
        let mut offset = start.0;
        {
            let mut reader = BufReader::new(&self.log_file);
            reader.seek(SeekFrom::Start(offset))?;
            while offset < self.current_offset {
                match LogRecord::decode(&mut reader, offset, self.current_offset - offset)? {
                    Some((record, size)) => {
                        records.push((LSN(offset), record));
                        offset += size;
                    }
                    None => break,
                }
            }
        }

        if offset < self.current_offset {
            warn!(
                "Torn log record at offset {}; truncating {} bytes",
                offset,
                self.current_offset - offset
            );
            self.log_file.set_len(offset)?;
            self.current_offset = offset;
            self.force()?;
        }
        Ok(records)
    }

    pub fn read_all_records(&mut self) -> Result<Vec<(LSN, LogRecord)>> {
        self.read_records_from(LSN(LOG_HEADER_LEN))
    }

    fn scan_start(&self) -> Result<(LSN, TransactionID)> {
        let checkpoint = match self.last_checkpoint {
            Some(lsn) => lsn,
            None => return Ok((LSN(LOG_HEADER_LEN), TransactionID::SYSTEM)),
        };
        match self.read_record_at(checkpoint)?.body {
            LogBody::Checkpoint(data) => {
                let start = data.active.values().copied().min().map_or(checkpoint, |first| first.min(checkpoint));
                Ok((start, data.max_txn_id))
            }
            _ => Err(DbError::CorruptLog {
                offset: checkpoint.0,
                reason: "header does not point at a checkpoint".to_string(),
            }),
        }
    }

    /// Brings the table files to a transaction-consistent state after a
    /// crash: committed updates are redone, aborted ones undone where their
    /// abort was logged, and transactions that never finished are undone
    /// and marked aborted.
    pub fn recover(&mut self, catalog: &Catalog) -> Result<RecoveryReport> {
        let (start, checkpoint_max) = self.scan_start()?;
        let records = self.read_records_from(start)?;

        let mut committed = HashSet::new();
        let mut finished = HashSet::new();
        let mut offsets: HashMap<TransactionID, TxnOffsets> = HashMap::new();
        let mut max_txn_id = checkpoint_max;
        for (lsn, record) in &records {
            max_txn_id = max_txn_id.max(record.txn_id);
            match record.body {
                LogBody::Commit => {
                    committed.insert(record.txn_id);
                    finished.insert(record.txn_id);
                }
                LogBody::Abort => {
                    finished.insert(record.txn_id);
                }
                LogBody::Checkpoint(_) => continue,
                _ => {}
            }
            offsets
                .entry(record.txn_id)
                .and_modify(|o| o.last = *lsn)
                .or_insert(TxnOffsets { first: *lsn, last: *lsn });
        }

        let mut report = RecoveryReport::default();
        for (_, record) in &records {
            match &record.body {
                LogBody::Update {
                    page_id, after_img, ..
                } if committed.contains(&record.txn_id) => {
                    catalog
                        .file(page_id.table_id)?
                        .write_page_data(page_id.page_no, after_img)?;
                    report.redone += 1;
                }
                LogBody::Abort => {
                    report.undone += self.undo_chain(record.prev, catalog)?;
                }
                _ => {}
            }
        }

        let mut losers: Vec<TransactionID> = offsets
            .keys()
            .filter(|txn_id| !finished.contains(txn_id))
            .copied()
            .collect();
        losers.sort();
        for txn_id in &losers {
            let loser = offsets[txn_id];
            report.undone += self.undo_chain(Some(loser.last), catalog)?;
            self.active.insert(*txn_id, loser);
            self.log_abort(*txn_id)?;
            debug!("Rolled back unfinished transaction {}", txn_id);
        }

        self.active.clear();
        self.max_txn_id = self.max_txn_id.max(max_txn_id);
        self.log_checkpoint()?;

        report.losers = losers;
        report.max_txn_id = self.max_txn_id;
        info!(
            "Recovery scanned {} records: {} redone, {} undone, {} unfinished transactions",
            records.len(),
            report.redone,
            report.undone,
            report.losers.len()
        );
        Ok(report)
    }

    pub fn get_total_log_records(&self) -> u64 {
        self.record_counts.values().sum()
    }

    pub fn get_total_log_records_of_type(&self, record_type: LogRecordType) -> u64 {
        *self.record_counts.get(&record_type).unwrap_or(&0)
    }

    pub fn is_active(&self, txn_id: TransactionID) -> bool {
        self.active.contains_key(&txn_id)
    }

    pub fn last_checkpoint(&self) -> Option<LSN> {
        self.last_checkpoint
    }
}
