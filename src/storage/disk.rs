//! Page-granular file I/O.
//!
//! One `DiskManager` owns one backing file. All access goes through
//! `read_page` / `write_page`, which seek to `page_id * PAGE_SIZE` under an
//! internal mutex. Short reads (a page that has never been written) zero-fill
//! the tail of the buffer so callers always observe a full page.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

use crate::config::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

pub struct DiskManager {
    file: Mutex<File>,
    path: PathBuf,
}

impl DiskManager {
    /// Opens the backing file, creating it if it does not exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file {}", path.display()))?;

        Ok(Self {
            file: Mutex::new(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads one page into `buf`. Bytes past the end of the file read as
    /// zeroes.
    pub fn read_page(&self, page_id: PageId, buf: &mut [u8]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot read the invalid page id");
        ensure!(
            buf.len() == PAGE_SIZE,
            "page buffer must be {} bytes, got {}",
            PAGE_SIZE,
            buf.len()
        );

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("seek to page {} failed", page_id))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            match file.read(&mut buf[filled..])? {
                0 => break,
                n => filled += n,
            }
        }
        buf[filled..].fill(0);
        Ok(())
    }

    /// Writes one page, extending the file as needed.
    pub fn write_page(&self, page_id: PageId, buf: &[u8]) -> Result<()> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot write the invalid page id");
        ensure!(
            buf.len() == PAGE_SIZE,
            "page buffer must be {} bytes, got {}",
            PAGE_SIZE,
            buf.len()
        );

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("seek to page {} failed", page_id))?;
        file.write_all(buf)
            .wrap_err_with(|| format!("write of page {} failed", page_id))?;
        Ok(())
    }

    /// Number of whole pages the file currently covers. Used by the buffer
    /// pool to resume page-id allocation after reopening a file.
    pub fn num_pages(&self) -> Result<u32> {
        let file = self.file.lock();
        let len = file.metadata()?.len();
        Ok((len / PAGE_SIZE as u64) as u32)
    }

    /// Flushes file contents to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }
}
