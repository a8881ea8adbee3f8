use std::collections::LinkedList;
use std::sync::Arc;

use log::{debug, trace};
use parking_lot::Mutex;

use crate::common::{CrabError, FrameId, PageId, Result, DEFAULT_BUCKET_SIZE, PAGE_SIZE};
use crate::storage::disk::{DiskManager, DiskScheduler};

use super::{
    ExtendibleHashTable, FrameHeader, LruReplacer, ReadPageGuard, ReleaseCallback, Replacer,
    WritePageGuard,
};

/// State reachable from page guards' release callbacks
struct BufferPoolState {
    frames: Vec<FrameHeader>,
    /// Pool latch. Serialises page-table, replacer, pin and free-list
    /// bookkeeping. Never held while waiting on a page latch.
    free_list: Mutex<LinkedList<FrameId>>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    replacer: Box<dyn Replacer>,
}

impl BufferPoolState {
    /// Drops one pin on `frame_id`. At zero the frame becomes evictable.
    fn unpin_frame(&self, frame_id: FrameId, is_dirty: bool) -> bool {
        let _latch = self.free_list.lock();
        self.unpin_locked(frame_id, is_dirty)
    }

    /// Same as `unpin_frame`, for callers already holding the pool latch.
    fn unpin_locked(&self, frame_id: FrameId, is_dirty: bool) -> bool {
        let frame = &self.frames[frame_id.as_usize()];

        if is_dirty {
            frame.set_dirty(true);
        }
        match frame.unpin() {
            Some(0) => {
                self.replacer.insert(frame_id);
                true
            }
            Some(_) => true,
            None => false,
        }
    }
}

/// BufferPoolManager caches disk pages in a fixed set of frames.
///
/// Resident pages are located through an extendible-hash page table. When no
/// frame is free, the replacer picks an unpinned victim, which is written
/// back first if dirty. Callers reach page bytes only through guards that
/// hold a pin plus the page latch.
pub struct BufferPoolManager {
    pool_size: usize,
    state: Arc<BufferPoolState>,
    disk_scheduler: DiskScheduler,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames with LRU replacement.
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_replacer(pool_size, disk_manager, Box::new(LruReplacer::new(pool_size)))
    }

    /// Creates a pool of `pool_size` frames with a caller-supplied policy.
    pub fn with_replacer(
        pool_size: usize,
        disk_manager: Arc<DiskManager>,
        replacer: Box<dyn Replacer>,
    ) -> Self {
        let mut frames = Vec::with_capacity(pool_size);
        let mut free_list = LinkedList::new();

        for i in 0..pool_size {
            let frame_id = FrameId::new(i as u32);
            frames.push(FrameHeader::new(frame_id));
            free_list.push_back(frame_id);
        }

        let state = Arc::new(BufferPoolState {
            frames,
            free_list: Mutex::new(free_list),
            page_table: ExtendibleHashTable::new(DEFAULT_BUCKET_SIZE),
            replacer,
        });

        Self {
            pool_size,
            state,
            disk_scheduler: DiskScheduler::new(disk_manager),
        }
    }

    /// Allocates a fresh zeroed page and returns it pinned and exclusively
    /// latched. Fails with `OutOfMemory` when every frame is pinned.
    pub fn new_page(&self) -> Result<WritePageGuard> {
        let (page_id, frame_id) = {
            let mut free_list = self.state.free_list.lock();
            let frame_id = self.get_free_frame(&mut free_list)?;

            let page_id = match self.disk_scheduler.disk_manager().allocate_page() {
                Ok(page_id) => page_id,
                Err(e) => {
                    free_list.push_back(frame_id);
                    return Err(e);
                }
            };

            let frame = &self.state.frames[frame_id.as_usize()];
            frame.reset();
            frame.set_page_id(page_id);
            frame.set_dirty(true);
            frame.pin();
            self.state.page_table.insert(page_id, frame_id);

            (page_id, frame_id)
        };

        trace!("new page {} in frame {}", page_id, frame_id);
        Ok(self.write_guard(page_id, frame_id))
    }

    /// Pins `page_id` and takes its shared latch, blocking on writers.
    pub fn read_page(&self, page_id: PageId) -> Result<ReadPageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        let latch = self.state.frames[frame_id.as_usize()].data.read_arc();
        Ok(ReadPageGuard::new(page_id, latch, self.release_callback(frame_id)))
    }

    /// Pins `page_id` and takes its exclusive latch, blocking on other holders.
    pub fn write_page(&self, page_id: PageId) -> Result<WritePageGuard> {
        let frame_id = self.fetch_frame(page_id)?;
        Ok(self.write_guard(page_id, frame_id))
    }

    /// Pins `page_id` and tries its shared latch without blocking. Returns
    /// `None`, with the pin dropped again, when a writer holds the latch.
    pub fn try_read_page(&self, page_id: PageId) -> Result<Option<ReadPageGuard>> {
        let frame_id = self.fetch_frame(page_id)?;

        match self.state.frames[frame_id.as_usize()].data.try_read_arc() {
            Some(latch) => Ok(Some(ReadPageGuard::new(
                page_id,
                latch,
                self.release_callback(frame_id),
            ))),
            None => {
                self.state.unpin_frame(frame_id, false);
                Ok(None)
            }
        }
    }

    /// Drops one pin on a resident page. Returns false if the page is not
    /// resident or was not pinned.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let _latch = self.state.free_list.lock();
        match self.state.page_table.find(&page_id) {
            Some(frame_id) => self.state.unpin_locked(frame_id, is_dirty),
            None => false,
        }
    }

    /// Removes a page from the pool and releases it on disk. Fails with
    /// `PageStillPinned` while anyone holds the page.
    pub fn delete_page(&self, page_id: PageId) -> Result<bool> {
        let mut free_list = self.state.free_list.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            let frame = &self.state.frames[frame_id.as_usize()];
            if frame.pin_count() > 0 {
                return Err(CrabError::PageStillPinned(page_id));
            }

            self.state.page_table.remove(&page_id);
            self.state.replacer.erase(frame_id);
            frame.reset();
            free_list.push_back(frame_id);
        }

        self.disk_scheduler.disk_manager().deallocate_page(page_id)?;
        trace!("deleted page {}", page_id);
        Ok(true)
    }

    /// Writes a resident page back to disk. Returns false if it is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        if !page_id.is_valid() {
            return Err(CrabError::InvalidPageId(page_id));
        }

        let frame_id = {
            let _latch = self.state.free_list.lock();
            match self.state.page_table.find(&page_id) {
                Some(frame_id) => {
                    self.pin_resident(frame_id);
                    frame_id
                }
                None => return Ok(false),
            }
        };

        let frame = &self.state.frames[frame_id.as_usize()];
        let mut data = [0u8; PAGE_SIZE];
        {
            let bytes = frame.data.read();
            // cleared under the latch: a writer that lands later re-marks it
            frame.set_dirty(false);
            data.copy_from_slice(&bytes[..]);
        }

        let result = self.disk_scheduler.schedule_write_sync(page_id, &data);
        if result.is_err() {
            frame.set_dirty(true);
        }
        self.state.unpin_frame(frame_id, false);

        result.map(|_| true)
    }

    /// Writes every dirty resident page back to disk.
    pub fn flush_all_pages(&self) -> Result<()> {
        let dirty: Vec<PageId> = {
            let _latch = self.state.free_list.lock();
            self.state
                .frames
                .iter()
                .filter(|f| f.page_id().is_valid() && f.is_dirty())
                .map(|f| f.page_id())
                .collect()
        };

        for page_id in dirty {
            self.flush_page(page_id)?;
        }
        Ok(())
    }

    /// Returns the pin count of a resident page.
    pub fn get_pin_count(&self, page_id: PageId) -> Option<u32> {
        let _latch = self.state.free_list.lock();
        self.state
            .page_table
            .find(&page_id)
            .map(|frame_id| self.state.frames[frame_id.as_usize()].pin_count())
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    pub fn free_frame_count(&self) -> usize {
        self.state.free_list.lock().len()
    }

    /// Returns true when no frame holds a pin.
    pub fn check_all_unpinned(&self) -> bool {
        let _latch = self.state.free_list.lock();
        self.state.frames.iter().all(|f| {
            let pins = f.pin_count();
            if pins > 0 {
                debug!("page {} still has {} pin(s)", f.page_id(), pins);
            }
            pins == 0
        })
    }

    pub fn disk_manager(&self) -> &Arc<DiskManager> {
        self.disk_scheduler.disk_manager()
    }

    fn write_guard(&self, page_id: PageId, frame_id: FrameId) -> WritePageGuard {
        let latch = self.state.frames[frame_id.as_usize()].data.write_arc();
        WritePageGuard::new(page_id, latch, self.release_callback(frame_id))
    }

    fn release_callback(&self, frame_id: FrameId) -> ReleaseCallback {
        let state = Arc::clone(&self.state);
        Box::new(move |_page_id, is_dirty| {
            state.unpin_frame(frame_id, is_dirty);
        })
    }

    /// Pins a frame already known to be resident. Pool latch must be held.
    fn pin_resident(&self, frame_id: FrameId) {
        self.state.frames[frame_id.as_usize()].pin();
        self.state.replacer.erase(frame_id);
    }

    /// Makes `page_id` resident and pins it, returning its frame.
    fn fetch_frame(&self, page_id: PageId) -> Result<FrameId> {
        if !page_id.is_valid() {
            return Err(CrabError::InvalidPageId(page_id));
        }

        let mut free_list = self.state.free_list.lock();

        if let Some(frame_id) = self.state.page_table.find(&page_id) {
            self.pin_resident(frame_id);
            return Ok(frame_id);
        }

        if page_id.as_u32() >= self.disk_scheduler.disk_manager().get_num_pages() {
            return Err(CrabError::PageNotFound(page_id));
        }

        let frame_id = self.get_free_frame(&mut free_list)?;
        let frame = &self.state.frames[frame_id.as_usize()];

        let mut data = [0u8; PAGE_SIZE];
        if let Err(e) = self.disk_scheduler.schedule_read_sync(page_id, &mut data) {
            free_list.push_back(frame_id);
            return Err(e);
        }

        frame.copy_from(&data);
        frame.set_page_id(page_id);
        frame.set_dirty(false);
        frame.pin();
        self.state.page_table.insert(page_id, frame_id);

        Ok(frame_id)
    }

    /// Takes a frame from the free list, or evicts the replacer's victim.
    /// Pool latch must be held (passed in as the free list).
    fn get_free_frame(&self, free_list: &mut LinkedList<FrameId>) -> Result<FrameId> {
        if let Some(frame_id) = free_list.pop_front() {
            return Ok(frame_id);
        }

        let frame_id = self.state.replacer.victim().ok_or(CrabError::OutOfMemory)?;
        let frame = &self.state.frames[frame_id.as_usize()];
        let old_page_id = frame.page_id();
        debug_assert_eq!(frame.pin_count(), 0);

        if frame.is_dirty() {
            let mut data = [0u8; PAGE_SIZE];
            frame.copy_to(&mut data);
            if let Err(e) = self.disk_scheduler.schedule_write_sync(old_page_id, &data) {
                self.state.replacer.insert(frame_id);
                return Err(e);
            }
            debug!("wrote back dirty page {} before eviction", old_page_id);
        }

        trace!("evicting page {} from frame {}", old_page_id, frame_id);
        self.state.page_table.remove(&old_page_id);
        frame.reset();

        Ok(frame_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_bpm(pool_size: usize) -> (BufferPoolManager, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = BufferPoolManager::new(pool_size, dm);
        (bpm, temp_file)
    }

    #[test]
    fn test_buffer_pool_manager_new_page_is_pinned() {
        let (bpm, _temp) = create_bpm(10);

        let guard = bpm.new_page().unwrap();
        let page_id = guard.page_id();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
        assert_eq!(bpm.free_frame_count(), 9);

        drop(guard);
        assert_eq!(bpm.get_pin_count(page_id), Some(0));
        assert!(bpm.check_all_unpinned());
    }

    #[test]
    fn test_buffer_pool_manager_unpin_never_below_zero() {
        let (bpm, _temp) = create_bpm(4);

        let page_id = bpm.new_page().unwrap().page_id();
        assert!(!bpm.unpin_page(page_id, false));
        assert!(!bpm.unpin_page(PageId::new(77), false));
    }

    #[test]
    fn test_buffer_pool_manager_try_read_page_contended() {
        let (bpm, _temp) = create_bpm(4);

        let writer = bpm.new_page().unwrap();
        let page_id = writer.page_id();

        assert!(bpm.try_read_page(page_id).unwrap().is_none());
        assert_eq!(bpm.get_pin_count(page_id), Some(1));

        drop(writer);
        let reader = bpm.try_read_page(page_id).unwrap();
        assert!(reader.is_some());
        assert_eq!(bpm.get_pin_count(page_id), Some(1));
    }

    #[test]
    fn test_buffer_pool_manager_out_of_memory() {
        let (bpm, _temp) = create_bpm(2);

        let _g1 = bpm.new_page().unwrap();
        let _g2 = bpm.new_page().unwrap();

        assert!(matches!(bpm.new_page(), Err(CrabError::OutOfMemory)));
    }

    #[test]
    fn test_buffer_pool_manager_fetch_unknown_page() {
        let (bpm, _temp) = create_bpm(2);

        assert!(matches!(
            bpm.read_page(PageId::new(40)),
            Err(CrabError::PageNotFound(_))
        ));
        assert!(matches!(
            bpm.read_page(crate::common::INVALID_PAGE_ID),
            Err(CrabError::InvalidPageId(_))
        ));
        assert_eq!(bpm.free_frame_count(), 2);
    }
}
