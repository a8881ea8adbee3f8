use std::ops::{Deref, DerefMut};

use parking_lot::lock_api::{ArcRwLockReadGuard, ArcRwLockWriteGuard};
use parking_lot::RawRwLock;

use crate::common::{PageId, PAGE_SIZE};

/// Callback invoked once a guard has released its latch: `(page_id, is_dirty)`.
pub(crate) type ReleaseCallback = Box<dyn FnOnce(PageId, bool) + Send + Sync>;

/// Owned shared latch on a page's bytes.
pub(crate) type ReadLatch = ArcRwLockReadGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;

/// Owned exclusive latch on a page's bytes.
pub(crate) type WriteLatch = ArcRwLockWriteGuard<RawRwLock, Box<[u8; PAGE_SIZE]>>;

/// Pin bookkeeping shared by both guard kinds
struct PageGuardBase {
    page_id: PageId,
    release_callback: Option<ReleaseCallback>,
    is_dirty: bool,
}

impl PageGuardBase {
    fn new(page_id: PageId, release_callback: ReleaseCallback) -> Self {
        Self {
            page_id,
            release_callback: Some(release_callback),
            is_dirty: false,
        }
    }

    fn release(&mut self) {
        if let Some(callback) = self.release_callback.take() {
            callback(self.page_id, self.is_dirty);
        }
    }
}

/// RAII guard for read-only access to a page.
///
/// Holds one pin and the page's shared latch. On drop the latch is released
/// first, then the page is unpinned.
pub struct ReadPageGuard {
    base: PageGuardBase,
    latch: Option<ReadLatch>,
}

impl ReadPageGuard {
    pub(crate) fn new(page_id: PageId, latch: ReadLatch, release_callback: ReleaseCallback) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => unreachable!("latch is only taken on drop"),
        }
    }
}

impl Deref for ReadPageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl Drop for ReadPageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.base.release();
    }
}

/// RAII guard for read-write access to a page.
///
/// Holds one pin and the page's exclusive latch. Any call to [`data_mut`]
/// marks the page dirty; the flag travels with the unpin on drop.
///
/// [`data_mut`]: WritePageGuard::data_mut
pub struct WritePageGuard {
    base: PageGuardBase,
    latch: Option<WriteLatch>,
}

impl WritePageGuard {
    pub(crate) fn new(
        page_id: PageId,
        latch: WriteLatch,
        release_callback: ReleaseCallback,
    ) -> Self {
        Self {
            base: PageGuardBase::new(page_id, release_callback),
            latch: Some(latch),
        }
    }

    pub fn page_id(&self) -> PageId {
        self.base.page_id
    }

    /// Returns the page bytes.
    pub fn data(&self) -> &[u8] {
        match &self.latch {
            Some(latch) => &latch[..],
            None => unreachable!("latch is only taken on drop"),
        }
    }

    /// Returns the page bytes for writing and marks the page dirty.
    pub fn data_mut(&mut self) -> &mut [u8] {
        self.base.is_dirty = true;
        match &mut self.latch {
            Some(latch) => &mut latch[..],
            None => unreachable!("latch is only taken on drop"),
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.base.is_dirty
    }
}

impl Deref for WritePageGuard {
    type Target = [u8];

    fn deref(&self) -> &Self::Target {
        self.data()
    }
}

impl DerefMut for WritePageGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.data_mut()
    }
}

impl Drop for WritePageGuard {
    fn drop(&mut self) {
        self.latch.take();
        self.base.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::FrameHeader;
    use crate::common::FrameId;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_read_page_guard_releases_once() {
        let frame = FrameHeader::new(FrameId::new(0));
        let mut data = [0u8; PAGE_SIZE];
        data[0] = 42;
        frame.copy_from(&data);

        let released = Arc::new(AtomicBool::new(false));
        let released_clone = released.clone();

        let guard = ReadPageGuard::new(
            PageId::new(1),
            frame.data.read_arc(),
            Box::new(move |_, dirty| {
                assert!(!dirty);
                released_clone.store(true, Ordering::SeqCst);
            }),
        );

        assert_eq!(guard.page_id(), PageId::new(1));
        assert_eq!(guard[0], 42);
        // a second reader is admitted, a writer is not
        assert!(frame.data.try_read().is_some());
        assert!(frame.data.try_write().is_none());
        assert!(!released.load(Ordering::SeqCst));

        drop(guard);
        assert!(released.load(Ordering::SeqCst));
        assert!(frame.data.try_write().is_some());
    }

    #[test]
    fn test_write_page_guard_marks_dirty() {
        let frame = FrameHeader::new(FrameId::new(0));

        let dirty = Arc::new(AtomicBool::new(false));
        let dirty_clone = dirty.clone();
        let latch = frame.data.clone();

        let mut guard = WritePageGuard::new(
            PageId::new(1),
            frame.data.write_arc(),
            Box::new(move |_, is_dirty| {
                // the latch is already free when the unpin runs
                assert!(latch.try_write().is_some());
                dirty_clone.store(is_dirty, Ordering::SeqCst);
            }),
        );

        assert!(!guard.is_dirty());
        guard.data_mut()[0] = 42;
        assert!(guard.is_dirty());
        assert!(frame.data.try_read().is_none());

        drop(guard);
        assert!(dirty.load(Ordering::SeqCst));

        let mut read_data = [0u8; PAGE_SIZE];
        frame.copy_to(&mut read_data);
        assert_eq!(read_data[0], 42);
    }

    #[test]
    fn test_write_page_guard_clean_when_only_read() {
        let frame = FrameHeader::new(FrameId::new(0));

        let dirty = Arc::new(AtomicBool::new(true));
        let dirty_clone = dirty.clone();

        let guard = WritePageGuard::new(
            PageId::new(2),
            frame.data.write_arc(),
            Box::new(move |_, is_dirty| dirty_clone.store(is_dirty, Ordering::SeqCst)),
        );
        assert_eq!(guard.data()[0], 0);
        drop(guard);

        assert!(!dirty.load(Ordering::SeqCst));
    }
}
