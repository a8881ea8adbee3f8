use parking_lot::Mutex;

use crate::common::FrameId;

use super::Replacer;

/// Link slot for one frame. Slots are addressed by frame id, so the list
/// order lives entirely in these indices.
#[derive(Debug, Clone, Copy, Default)]
struct Link {
    prev: Option<u32>,
    next: Option<u32>,
    linked: bool,
}

/// Intrusive doubly-linked recency list over a fixed arena of frame slots.
/// `head` is the most recently unpinned frame, `tail` the least recent.
#[derive(Debug)]
struct LruList {
    slots: Vec<Link>,
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl LruList {
    fn new(capacity: usize) -> Self {
        Self {
            slots: vec![Link::default(); capacity],
            head: None,
            tail: None,
            len: 0,
        }
    }

    fn contains(&self, idx: u32) -> bool {
        self.slots[idx as usize].linked
    }

    fn push_front(&mut self, idx: u32) {
        debug_assert!(!self.contains(idx));

        let old_head = self.head;
        {
            let link = &mut self.slots[idx as usize];
            link.prev = None;
            link.next = old_head;
            link.linked = true;
        }
        match old_head {
            Some(h) => self.slots[h as usize].prev = Some(idx),
            None => self.tail = Some(idx),
        }
        self.head = Some(idx);
        self.len += 1;
    }

    fn unlink(&mut self, idx: u32) {
        let Link { prev, next, .. } = self.slots[idx as usize];

        match prev {
            Some(p) => self.slots[p as usize].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n as usize].prev = prev,
            None => self.tail = prev,
        }

        self.slots[idx as usize] = Link::default();
        self.len -= 1;
    }

    fn pop_back(&mut self) -> Option<u32> {
        let tail = self.tail?;
        self.unlink(tail);
        Some(tail)
    }
}

/// LRU Replacement Policy
///
/// Tracks the frames whose pin count dropped to zero and evicts the one that
/// has been unpinned the longest. Strict recency: no frequency weighting and
/// no second-chance bit. All operations are O(1) under a single lock.
///
/// The replacer can track at most `capacity` frames; ids at or beyond the
/// capacity are ignored.
pub struct LruReplacer {
    capacity: usize,
    list: Mutex<LruList>,
}

impl LruReplacer {
    /// Creates a replacer for frame ids in `0..capacity`.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            list: Mutex::new(LruList::new(capacity)),
        }
    }

    /// Returns the number of frame slots.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn slot(&self, frame_id: FrameId) -> Option<u32> {
        (frame_id.as_usize() < self.capacity).then(|| frame_id.as_u32())
    }
}

impl Replacer for LruReplacer {
    fn insert(&self, frame_id: FrameId) {
        let Some(idx) = self.slot(frame_id) else {
            return;
        };

        let mut list = self.list.lock();
        if list.contains(idx) {
            list.unlink(idx);
        }
        list.push_front(idx);
    }

    fn victim(&self) -> Option<FrameId> {
        self.list.lock().pop_back().map(FrameId::new)
    }

    fn erase(&self, frame_id: FrameId) -> bool {
        let Some(idx) = self.slot(frame_id) else {
            return false;
        };

        let mut list = self.list.lock();
        if list.contains(idx) {
            list.unlink(idx);
            true
        } else {
            false
        }
    }

    fn size(&self) -> usize {
        self.list.lock().len
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lru_replacer_new() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.size(), 0);
        assert_eq!(replacer.capacity(), 10);
    }

    #[test]
    fn test_lru_replacer_victim_empty() {
        let replacer = LruReplacer::new(10);
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_basic() {
        let replacer = LruReplacer::new(10);

        replacer.insert(FrameId::new(0));
        replacer.insert(FrameId::new(1));
        replacer.insert(FrameId::new(2));
        assert_eq!(replacer.size(), 3);

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.size(), 2);
    }

    #[test]
    fn test_lru_replacer_reinsert_moves_to_front() {
        let replacer = LruReplacer::new(10);

        replacer.insert(FrameId::new(0));
        replacer.insert(FrameId::new(1));
        replacer.insert(FrameId::new(0));

        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn test_lru_replacer_erase() {
        let replacer = LruReplacer::new(10);

        replacer.insert(FrameId::new(0));
        replacer.insert(FrameId::new(1));
        replacer.insert(FrameId::new(2));

        assert!(replacer.erase(FrameId::new(1)));
        assert!(!replacer.erase(FrameId::new(1)));
        assert_eq!(replacer.size(), 2);

        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
    }

    #[test]
    fn test_lru_replacer_erase_head_and_tail() {
        let replacer = LruReplacer::new(4);

        for i in 0..4 {
            replacer.insert(FrameId::new(i));
        }

        // 3 is the head, 0 the tail
        assert!(replacer.erase(FrameId::new(3)));
        assert!(replacer.erase(FrameId::new(0)));

        replacer.insert(FrameId::new(0));
        assert_eq!(replacer.victim(), Some(FrameId::new(1)));
        assert_eq!(replacer.victim(), Some(FrameId::new(2)));
        assert_eq!(replacer.victim(), Some(FrameId::new(0)));
        assert_eq!(replacer.size(), 0);
    }

    #[test]
    fn test_lru_replacer_ignores_out_of_range() {
        let replacer = LruReplacer::new(2);

        replacer.insert(FrameId::new(5));
        assert_eq!(replacer.size(), 0);
        assert!(!replacer.erase(FrameId::new(5)));
    }
}
