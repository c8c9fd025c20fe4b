use std::fs;
use std::path::{Path, PathBuf};

use crate::common::Result;

/// Something the database keeps on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbPath {
    Table(u32),
    Log,
    Catalog,
}

impl DbPath {
    fn dir(self) -> &'static str {
        match self {
            DbPath::Table(_) => "data",
            DbPath::Log => "log",
            DbPath::Catalog => "catalog",
        }
    }

    fn file_name(self) -> String {
        match self {
            DbPath::Table(table_id) => format!("table_{}.dat", table_id),
            DbPath::Log => "wal.log".to_string(),
            DbPath::Catalog => "catalog.dat".to_string(),
        }
    }
}

/// On-disk layout of one database: `data/` for table files, `log/` for the
/// write-ahead log and `catalog/` for the table list.
#[derive(Debug, Clone)]
pub struct DBFiles {
    root: PathBuf,
}

impl DBFiles {
    /// Opens the layout under `root`, creating missing directories.
    pub fn new(root: &Path) -> Result<Self> {
        let files = Self {
            root: root.to_path_buf(),
        };
        for kind in [DbPath::Table(0), DbPath::Log, DbPath::Catalog] {
            fs::create_dir_all(files.root.join(kind.dir()))?;
        }
        Ok(files)
    }

    pub fn path(&self, of: DbPath) -> PathBuf {
        self.root.join(of.dir()).join(of.file_name())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Deletes the whole database directory.
    pub fn remove_all(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout() {
        let dir = tempfile::tempdir().unwrap();
        let files = DBFiles::new(dir.path()).unwrap();

        assert_eq!(files.path(DbPath::Table(7)), dir.path().join("data").join("table_7.dat"));
        assert_eq!(files.path(DbPath::Log), dir.path().join("log").join("wal.log"));
        assert!(files.path(DbPath::Catalog).parent().unwrap().is_dir());

        files.remove_all().unwrap();
        assert!(!files.root().exists());
    }
}
