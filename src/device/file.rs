//! File-backed flash image.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{BlockDevice, Geometry, ERASED_BYTE};
use crate::error::Result;

/// A flash chip image stored in a regular file
///
/// The file always holds exactly `size` bytes. A new (or short) image is
/// padded with the erased value. Writes follow NOR rules: new bits are ANDed
/// into the existing bytes, so only an erase can set bits again.
///
/// # Example
///
/// ```no_run
/// use flashlog::device::{BlockDevice, FileFlash};
/// use std::path::Path;
///
/// let mut flash = FileFlash::open(Path::new("flash.img"), 64 * 1024, 256, 4096).unwrap();
/// flash.erase(0).unwrap();
/// flash.write(0, b"record").unwrap();
/// flash.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileFlash {
    path: PathBuf,
    file: File,
    geometry: Geometry,
}

impl FileFlash {
    /// Open or create a flash image of `size` bytes
    pub fn open(path: &Path, size: u32, page_size: u32, sector_size: u32) -> Result<Self> {
        let geometry = Geometry::new(size, page_size, sector_size)?;

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        // Pad a new or short image with erased bytes, drop anything beyond size
        let current = file.metadata()?.len();
        let size64 = u64::from(size);
        if current < size64 {
            file.seek(SeekFrom::Start(current))?;
            let padding = vec![ERASED_BYTE; (size64 - current) as usize];
            file.write_all(&padding)?;
            debug!(path = %path.display(), from = current, to = size, "extended flash image");
        } else if current > size64 {
            file.set_len(size64)?;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            geometry,
        })
    }

    /// Path of the image file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush file contents and metadata to disk
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }
}

impl BlockDevice for FileFlash {
    fn read(&mut self, addr: u32, buf: &mut [u8]) -> Result<()> {
        self.geometry.check_range(addr, buf.len())?;
        self.file.seek(SeekFrom::Start(u64::from(addr)))?;
        self.file.read_exact(buf)?;
        Ok(())
    }

    fn write(&mut self, addr: u32, data: &[u8]) -> Result<()> {
        self.geometry.check_write(addr, data.len())?;
        if data.is_empty() {
            return Ok(());
        }

        // Program: only clear bits, never set them
        let mut current = vec![0u8; data.len()];
        self.file.seek(SeekFrom::Start(u64::from(addr)))?;
        self.file.read_exact(&mut current)?;
        for (dst, src) in current.iter_mut().zip(data) {
            *dst &= *src;
        }

        self.file.seek(SeekFrom::Start(u64::from(addr)))?;
        self.file.write_all(&current)?;
        Ok(())
    }

    fn erase(&mut self, sector_addr: u32) -> Result<()> {
        self.geometry.check_erase(sector_addr)?;
        let blank = vec![ERASED_BYTE; self.geometry.sector_size as usize];
        self.file.seek(SeekFrom::Start(u64::from(sector_addr)))?;
        self.file.write_all(&blank)?;
        Ok(())
    }

    fn size(&self) -> u32 {
        self.geometry.size
    }
}
