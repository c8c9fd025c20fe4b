use std::fs::{File as StdFile, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::{DbError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileMode {
    READ,
    WRITE,
}

/// Block-addressed storage behind a heap file. Real files and in-memory
/// buffers are interchangeable so page logic can be tested without disk.
pub trait File: Send {
    fn get_mode(&self) -> FileMode;
    fn size(&self) -> Result<u64>;
    fn resize(&mut self, new_size: u64) -> Result<()>;
    fn read_block(&mut self, offset: u64, size: usize) -> Result<Vec<u8>>;
    fn write_block(&mut self, block: &[u8], offset: u64) -> Result<()>;
    /// Force written blocks to stable storage.
    fn sync(&mut self) -> Result<()>;
}

fn read_only_error(action: &str) -> DbError {
    DbError::Other(format!("Cannot {} a read-only file", action))
}

fn past_end_error(offset: u64, size: usize, file_size: u64) -> DbError {
    DbError::Other(format!(
        "Attempt to read past end of file: offset={}, size={}, filesize={}",
        offset, size, file_size
    ))
}

pub struct PosixFile {
    mode: FileMode,
    file: StdFile,
    cached_size: u64,
}

impl PosixFile {
    pub fn new(path: &Path, mode: FileMode) -> Result<Self> {
        let file = match mode {
            FileMode::READ => OpenOptions::new().read(true).open(path)?,
            FileMode::WRITE => OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .open(path)?,
        };
        let cached_size = file.metadata()?.len();

        Ok(Self {
            mode,
            file,
            cached_size,
        })
    }

    pub fn make_temporary() -> Result<Self> {
        use std::env::temp_dir;
        use uuid::Uuid;

        let temp_path = temp_dir().join(format!("heapstore-temp-{}.tmp", Uuid::new_v4()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&temp_path)?;

        // Unlink right away; the handle keeps the data alive until dropped
        std::fs::remove_file(&temp_path)?;

        Ok(Self {
            mode: FileMode::WRITE,
            file,
            cached_size: 0,
        })
    }
}

impl File for PosixFile {
    fn get_mode(&self) -> FileMode {
        self.mode
    }

    fn size(&self) -> Result<u64> {
        Ok(self.cached_size)
    }

    fn resize(&mut self, new_size: u64) -> Result<()> {
        if new_size == self.cached_size {
            return Ok(());
        }
        if self.mode == FileMode::READ {
            return Err(read_only_error("resize"));
        }

        self.file.set_len(new_size)?;
        self.cached_size = new_size;
        Ok(())
    }

    fn read_block(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        if offset + size as u64 > self.cached_size {
            return Err(past_end_error(offset, size, self.cached_size));
        }

        let mut buffer = vec![0u8; size];
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn write_block(&mut self, block: &[u8], offset: u64) -> Result<()> {
        if self.mode == FileMode::READ {
            return Err(read_only_error("write to"));
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(block)?;
        self.cached_size = self.cached_size.max(offset + block.len() as u64);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}

/// In-memory file; `sync` is a no-op.
pub struct MemoryFile {
    mode: FileMode,
    data: Vec<u8>,
}

impl MemoryFile {
    pub fn new(mode: FileMode) -> Self {
        Self {
            mode,
            data: Vec::new(),
        }
    }

    pub fn with_data(data: Vec<u8>, mode: FileMode) -> Self {
        Self { mode, data }
    }

    pub fn get_data(&self) -> &[u8] {
        &self.data
    }
}

impl File for MemoryFile {
    fn get_mode(&self) -> FileMode {
        self.mode
    }

    fn size(&self) -> Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn resize(&mut self, new_size: u64) -> Result<()> {
        if self.mode == FileMode::READ {
            return Err(read_only_error("resize"));
        }
        self.data.resize(new_size as usize, 0);
        Ok(())
    }

    fn read_block(&mut self, offset: u64, size: usize) -> Result<Vec<u8>> {
        let start = offset as usize;
        if start + size > self.data.len() {
            return Err(past_end_error(offset, size, self.data.len() as u64));
        }
        Ok(self.data[start..start + size].to_vec())
    }

    fn write_block(&mut self, block: &[u8], offset: u64) -> Result<()> {
        if self.mode == FileMode::READ {
            return Err(read_only_error("write to"));
        }

        let start = offset as usize;
        if start + block.len() > self.data.len() {
            self.data.resize(start + block.len(), 0);
        }
        self.data[start..start + block.len()].copy_from_slice(block);
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        Ok(())
    }
}
