use std::collections::VecDeque;

use parking_lot::RwLockWriteGuard;

use crate::buffer::WritePageGuard;
use crate::common::PageId;

/// Per-operation scratch state for a tree mutation.
///
/// Holds the exclusive root-id latch (while the root may still change), the
/// write-latched pages in acquisition order, and the pages to delete once
/// every latch is gone. Owned by one thread for one call; torn down exactly
/// once by [`OperationContext::release_all`].
pub(crate) struct OperationContext<'a> {
    root_latch: Option<RwLockWriteGuard<'a, PageId>>,
    write_set: VecDeque<WritePageGuard>,
    deleted: Vec<PageId>,
}

impl<'a> OperationContext<'a> {
    pub fn new(root_latch: RwLockWriteGuard<'a, PageId>) -> Self {
        Self {
            root_latch: Some(root_latch),
            write_set: VecDeque::new(),
            deleted: Vec::new(),
        }
    }

    /// Current root id. Only meaningful while the root latch is held.
    pub fn root_id(&self) -> Option<PageId> {
        self.root_latch.as_deref().copied()
    }

    pub fn holds_root_latch(&self) -> bool {
        self.root_latch.is_some()
    }

    /// Installs a new root id. The root latch must still be held.
    pub fn set_root_id(&mut self, root_id: PageId) {
        let latch = self
            .root_latch
            .as_mut()
            .expect("root id changed without holding the root latch");
        **latch = root_id;
    }

    pub fn push(&mut self, guard: WritePageGuard) {
        self.write_set.push_back(guard);
    }

    /// Drops the root latch and every held page but the most recent one.
    pub fn release_ancestors(&mut self) {
        self.root_latch = None;
        while self.write_set.len() > 1 {
            self.write_set.pop_front();
        }
    }

    /// Held pages, oldest first.
    pub fn pages(&self) -> impl DoubleEndedIterator<Item = &WritePageGuard> + '_ {
        self.write_set.iter()
    }

    pub fn last_mut(&mut self) -> &mut WritePageGuard {
        self.write_set
            .back_mut()
            .expect("operation context holds no page")
    }

    pub fn last(&self) -> &WritePageGuard {
        self.write_set.back().expect("operation context holds no page")
    }

    pub fn holds(&self, page_id: PageId) -> bool {
        self.write_set.iter().any(|g| g.page_id() == page_id)
    }

    pub fn get_mut(&mut self, page_id: PageId) -> Option<&mut WritePageGuard> {
        self.write_set.iter_mut().find(|g| g.page_id() == page_id)
    }

    /// Like [`get_mut`](Self::get_mut) for a page the protocol guarantees is held.
    pub fn retained(&mut self, page_id: PageId) -> &mut WritePageGuard {
        match self.get_mut(page_id) {
            Some(guard) => guard,
            None => panic!("page {} was not retained by the operation", page_id),
        }
    }

    /// Two distinct held pages at once.
    pub fn pair_mut(
        &mut self,
        a: PageId,
        b: PageId,
    ) -> (&mut WritePageGuard, &mut WritePageGuard) {
        assert_ne!(a, b);
        let slice = self.write_set.make_contiguous();
        let ia = slice.iter().position(|g| g.page_id() == a);
        let ib = slice.iter().position(|g| g.page_id() == b);
        let (Some(ia), Some(ib)) = (ia, ib) else {
            panic!("pages {} and {} were not both retained", a, b);
        };

        if ia < ib {
            let (lo, hi) = slice.split_at_mut(ib);
            (&mut lo[ia], &mut hi[0])
        } else {
            let (lo, hi) = slice.split_at_mut(ia);
            (&mut hi[0], &mut lo[ib])
        }
    }

    pub fn mark_deleted(&mut self, page_id: PageId) {
        if !self.deleted.contains(&page_id) {
            self.deleted.push(page_id);
        }
    }

    /// Releases the root latch and then every page latch and pin in
    /// acquisition order. Returns the pages queued for deletion.
    pub fn release_all(mut self) -> Vec<PageId> {
        self.root_latch = None;
        while let Some(guard) = self.write_set.pop_front() {
            drop(guard);
        }
        std::mem::take(&mut self.deleted)
    }
}
