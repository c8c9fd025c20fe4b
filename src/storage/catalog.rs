use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use log::info;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::{DBFiles, DbPath, FileMode, PosixFile};
use crate::common::{DbError, Result};
use crate::heap::HeapFile;
use crate::tuple::TupleDesc;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct TableEntry {
    name: String,
    table_id: u32,
    desc: TupleDesc,
}

#[derive(Default)]
struct Tables {
    files: HashMap<u32, Arc<HeapFile>>,
    names: HashMap<String, u32>,
    entries: Vec<TableEntry>,
}

impl Tables {
    fn insert(&mut self, name: &str, file: Arc<HeapFile>) {
        let table_id = file.table_id();
        if let Some(old_id) = self.names.insert(name.to_string(), table_id) {
            self.files.remove(&old_id);
            self.entries.retain(|e| e.table_id != old_id);
        }
        self.entries.push(TableEntry {
            name: name.to_string(),
            table_id,
            desc: file.tuple_desc().as_ref().clone(),
        });
        self.files.insert(table_id, file);
    }
}

/// Maps table names and ids to their heap files.
#[derive(Default)]
pub struct Catalog {
    tables: RwLock<Tables>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reopens every table listed in the persisted catalog.
    pub fn load(files: &DBFiles, page_size: usize) -> Result<Self> {
        let catalog = Self::new();
        let path = files.path(DbPath::Catalog);
        if !path.exists() {
            return Ok(catalog);
        }

        let entries: Vec<TableEntry> = bincode::deserialize(&fs::read(&path)?)?;
        for entry in entries {
            let file = PosixFile::new(&files.path(DbPath::Table(entry.table_id)), FileMode::WRITE)?;
            let heap_file = HeapFile::new(
                entry.table_id,
                Arc::new(entry.desc.clone()),
                page_size,
                Box::new(file),
            );
            catalog.add_table(&entry.name, Arc::new(heap_file));
        }
        info!("Loaded {} tables from catalog", catalog.table_ids().len());
        Ok(catalog)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        // Exclusive: two saves must not interleave their writes
        let tables = self.tables.write();
        let bytes = bincode::serialize(&tables.entries)?;
        fs::write(path, bytes)?;
        Ok(())
    }

    /// Registers `file` under `name`, replacing any table of the same name.
    pub fn add_table(&self, name: &str, file: Arc<HeapFile>) {
        self.tables.write().insert(name, file);
    }

    /// Assigns the next table id and registers the file `open` builds for
    /// it. Concurrent callers never receive the same id.
    pub fn create_table<F>(&self, name: &str, open: F) -> Result<u32>
    where
        F: FnOnce(u32) -> Result<HeapFile>,
    {
        let mut tables = self.tables.write();
        let table_id = tables.files.keys().max().map_or(1, |id| id + 1);
        let file = open(table_id)?;
        tables.insert(name, Arc::new(file));
        Ok(table_id)
    }

    pub fn file(&self, table_id: u32) -> Result<Arc<HeapFile>> {
        self.tables
            .read()
            .files
            .get(&table_id)
            .cloned()
            .ok_or(DbError::UnknownTable(table_id))
    }

    pub fn table_id(&self, name: &str) -> Option<u32> {
        self.tables.read().names.get(name).copied()
    }

    pub fn tuple_desc(&self, table_id: u32) -> Result<Arc<TupleDesc>> {
        Ok(Arc::clone(self.file(table_id)?.tuple_desc()))
    }

    pub fn table_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = self.tables.read().files.keys().copied().collect();
        ids.sort_unstable();
        ids
    }
}
