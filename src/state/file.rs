//! File-backed word store.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::WordStore;
use crate::error::Result;

/// Little-endian words kept in a small file
///
/// Bytes beyond the end of the file read as `0xFF`, like blank EEPROM.
/// `flush` syncs file data so a completed save survives a crash.
#[derive(Debug)]
pub struct FileWords {
    path: PathBuf,
    file: File,
}

impl FileWords {
    /// Open or create the state file
    pub fn open(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WordStore for FileWords {
    fn read_word(&mut self, offset: u32) -> Result<u32> {
        let len = self.file.metadata()?.len();
        let start = u64::from(offset);
        let mut word = [0xFFu8; 4];

        if start < len {
            let available = ((len - start) as usize).min(4);
            self.file.seek(SeekFrom::Start(start))?;
            self.file.read_exact(&mut word[..available])?;
        }
        Ok(u32::from_le_bytes(word))
    }

    fn write_word(&mut self, offset: u32, value: u32) -> Result<()> {
        // Keep the gap before a far offset blank instead of zero-filled
        let len = self.file.metadata()?.len();
        let start = u64::from(offset);
        if start > len {
            self.file.seek(SeekFrom::Start(len))?;
            self.file.write_all(&vec![0xFF; (start - len) as usize])?;
        }

        self.file.seek(SeekFrom::Start(start))?;
        self.file.write_all(&value.to_le_bytes())?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.file.sync_data()?;
        Ok(())
    }
}
