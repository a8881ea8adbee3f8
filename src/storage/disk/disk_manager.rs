use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use log::debug;
use parking_lot::Mutex;

use crate::common::{CrabError, PageId, Result, HEADER_PAGE_ID, PAGE_SIZE};

/// DiskManager reads and writes fixed-size pages of a single database file.
///
/// Page 0 is the header page. It is written out when the file is created, so
/// the first page handed out by [`allocate_page`](Self::allocate_page) is 1.
pub struct DiskManager {
    db_file: Mutex<File>,
    db_path: String,
    /// Number of pages currently allocated (including the header page)
    num_pages: AtomicU32,
    num_reads: AtomicU32,
    num_writes: AtomicU32,
}

impl DiskManager {
    /// Opens the database file at `db_path`, creating it if needed.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path_str = db_path.as_ref().to_string_lossy().to_string();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&db_path)?;

        let file_size = file.metadata()?.len();
        let num_pages = file_size.div_ceil(PAGE_SIZE as u64) as u32;

        let dm = Self {
            db_file: Mutex::new(file),
            db_path: path_str,
            num_pages: AtomicU32::new(num_pages),
            num_reads: AtomicU32::new(0),
            num_writes: AtomicU32::new(0),
        };

        if num_pages == 0 {
            let page_id = dm.allocate_page()?;
            debug_assert_eq!(page_id, HEADER_PAGE_ID);
            debug!("created database file {} with an empty header page", dm.db_path);
        }

        Ok(dm)
    }

    fn offset_of(page_id: PageId) -> u64 {
        (page_id.as_u32() as u64) * (PAGE_SIZE as u64)
    }

    fn check_allocated(&self, page_id: PageId) -> Result<()> {
        if !page_id.is_valid() {
            return Err(CrabError::InvalidPageId(page_id));
        }
        if page_id.as_u32() >= self.get_num_pages() {
            return Err(CrabError::PageNotFound(page_id));
        }
        Ok(())
    }

    /// Reads a page into `data`, which must be exactly PAGE_SIZE bytes.
    /// Bytes past the end of the file read as zero.
    pub fn read_page(&self, page_id: PageId, data: &mut [u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_allocated(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;

        let mut filled = 0;
        while filled < PAGE_SIZE {
            match file.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        data[filled..].fill(0);

        self.num_reads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Writes `data`, which must be exactly PAGE_SIZE bytes, to a page.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        assert_eq!(data.len(), PAGE_SIZE, "Buffer must be PAGE_SIZE bytes");
        self.check_allocated(page_id)?;

        let mut file = self.db_file.lock();
        file.seek(SeekFrom::Start(Self::offset_of(page_id)))?;
        file.write_all(data)?;
        file.flush()?;

        self.num_writes.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Allocates a zeroed page at the end of the file and returns its id.
    pub fn allocate_page(&self) -> Result<PageId> {
        let page_id = PageId::new(self.num_pages.fetch_add(1, Ordering::SeqCst));
        self.write_page(page_id, &[0u8; PAGE_SIZE])?;
        Ok(page_id)
    }

    /// Releases a page. Space is not reclaimed; the id is simply never reused.
    pub fn deallocate_page(&self, page_id: PageId) -> Result<()> {
        self.check_allocated(page_id)?;
        if page_id == HEADER_PAGE_ID {
            return Err(CrabError::InvalidPageId(page_id));
        }
        Ok(())
    }

    /// Returns the number of pages currently allocated.
    pub fn get_num_pages(&self) -> u32 {
        self.num_pages.load(Ordering::SeqCst)
    }

    pub fn get_num_reads(&self) -> u32 {
        self.num_reads.load(Ordering::Relaxed)
    }

    pub fn get_num_writes(&self) -> u32 {
        self.num_writes.load(Ordering::Relaxed)
    }

    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }

    /// Forces written pages to stable storage.
    pub fn sync(&self) -> Result<()> {
        self.db_file.lock().sync_all()?;
        Ok(())
    }
}

impl Drop for DiskManager {
    fn drop(&mut self) {
        let _ = self.db_file.get_mut().sync_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_disk_manager_reserves_header_page() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();
        assert_eq!(dm.get_num_pages(), 1);

        let mut data = [7u8; PAGE_SIZE];
        dm.read_page(HEADER_PAGE_ID, &mut data).unwrap();
        assert!(data.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_disk_manager_allocate_page() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        assert_eq!(dm.allocate_page().unwrap(), PageId::new(1));
        assert_eq!(dm.allocate_page().unwrap(), PageId::new(2));
        assert_eq!(dm.get_num_pages(), 3);
    }

    #[test]
    fn test_disk_manager_rejects_unallocated_pages() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let mut data = [0u8; PAGE_SIZE];
        assert!(matches!(
            dm.read_page(PageId::new(5), &mut data),
            Err(CrabError::PageNotFound(_))
        ));
        assert!(matches!(
            dm.write_page(crate::common::INVALID_PAGE_ID, &data),
            Err(CrabError::InvalidPageId(_))
        ));
        assert!(dm.deallocate_page(HEADER_PAGE_ID).is_err());
    }

    #[test]
    fn test_disk_manager_read_write() {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = DiskManager::new(temp_file.path()).unwrap();

        let page_id = dm.allocate_page().unwrap();

        let mut write_data = [0u8; PAGE_SIZE];
        write_data[0] = 42;
        write_data[PAGE_SIZE - 1] = 128;
        dm.write_page(page_id, &write_data).unwrap();

        let mut read_data = [0u8; PAGE_SIZE];
        dm.read_page(page_id, &mut read_data).unwrap();

        assert_eq!(read_data[0], 42);
        assert_eq!(read_data[PAGE_SIZE - 1], 128);
        assert_eq!(dm.get_num_reads(), 1);
    }
}
