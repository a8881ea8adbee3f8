use std::cmp::Ordering;

use crate::common::{PageId, PAGE_SIZE};

use super::btree_page::{assert_page_type, Marker, PageType, TreePage, TreePageMut, HEADER_SIZE};
use super::{KeyComparator, Storable};

/// Internal page: `size` pairs of `(key, child page id)`.
///
/// ```text
/// | header (24) | k0(unused) c0 | k1 c1 | ... |
/// ```
/// `c_i` covers keys in `[k_i, k_{i+1})`. Key 0 is never compared.
pub struct InternalPage<B, K> {
    data: B,
    _marker: Marker<K>,
}

impl<B, K: Storable> InternalPage<B, K> {
    const ENTRY_SIZE: usize = K::SIZE + 4;

    /// Largest `max_size` an internal page of this key width supports.
    pub fn capacity() -> usize {
        (PAGE_SIZE - HEADER_SIZE) / Self::ENTRY_SIZE - 1
    }

    fn offset(index: usize) -> usize {
        HEADER_SIZE + index * Self::ENTRY_SIZE
    }
}

impl<B: AsRef<[u8]>, K: Storable> InternalPage<B, K> {
    /// Wraps an initialised internal page. Panics if the tag says otherwise.
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        assert_page_type(data.as_ref(), PageType::Internal);
        Self {
            data,
            _marker: Marker::default(),
        }
    }

    pub fn key_at(&self, index: usize) -> K {
        K::decode(&self.raw()[Self::offset(index)..])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        PageId::decode(&self.raw()[Self::offset(index) + K::SIZE..])
    }

    /// Position of `child` among this page's children.
    pub fn value_index(&self, child: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == child)
    }

    /// Child whose range covers `key`: the greatest `i` with `k_i <= key`,
    /// or child 0 when `key` is below every separator.
    pub fn lookup<C: KeyComparator<K> + ?Sized>(&self, key: &K, cmp: &C) -> PageId {
        let size = self.size();
        assert!(size >= 2, "lookup on internal page {} with {} entries", self.page_id(), size);

        // first separator strictly greater than key
        let (mut lo, mut hi) = (1, size);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.key_at(mid), key) == Ordering::Greater {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.value_at(lo - 1)
    }

    /// Child page ids in order.
    pub fn children(&self) -> Vec<PageId> {
        (0..self.size()).map(|i| self.value_at(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: Storable> InternalPage<B, K> {
    /// Formats `data` as an empty internal page.
    pub fn init(mut data: B, page_id: PageId, parent: PageId, max_size: usize) -> Self {
        assert!(
            max_size <= Self::capacity(),
            "internal max size exceeds page capacity"
        );
        super::BTreePage::new(data.as_mut()).init_header(
            PageType::Internal,
            page_id,
            parent,
            max_size,
        );
        Self::new(data)
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        let off = Self::offset(index);
        key.encode(&mut self.raw_mut()[off..]);
    }

    pub fn set_value_at(&mut self, index: usize, child: PageId) {
        let off = Self::offset(index) + K::SIZE;
        child.encode(&mut self.raw_mut()[off..]);
    }

    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let src = Self::offset(from)..Self::offset(size);
        let dst = (Self::offset(from) as isize + delta * Self::ENTRY_SIZE as isize) as usize;
        self.raw_mut().copy_within(src, dst);
    }

    /// Turns an empty page into a root over two children.
    pub fn populate_new_root(&mut self, old_child: PageId, key: &K, new_child: PageId) {
        assert_eq!(self.size(), 0);
        self.set_value_at(0, old_child);
        self.set_key_at(1, key);
        self.set_value_at(1, new_child);
        self.set_size(2);
    }

    /// Inserts `(key, new_child)` right after `old_child`; returns the new size.
    pub fn insert_node_after(&mut self, old_child: PageId, key: &K, new_child: PageId) -> usize {
        let size = self.size();
        assert!(size <= self.max_size(), "internal page {} overflowed", self.page_id());

        let idx = self
            .value_index(old_child)
            .expect("split child is not referenced by its parent")
            + 1;
        self.shift(idx, 1);
        self.set_key_at(idx, key);
        self.set_value_at(idx, new_child);
        self.increase_size(1);
        size + 1
    }

    /// Removes the entry at `index`.
    pub fn remove(&mut self, index: usize) {
        assert!(index < self.size());
        self.shift(index + 1, -1);
        self.increase_size(-1);
    }

    /// Empties a page that has a single child and returns that child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        assert_eq!(self.size(), 1);
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Moves the upper part of an overflowing page into the empty
    /// `recipient`, keeping `(max_size + 1) / 2` entries here. The
    /// recipient's key 0 is the separator to push up. Returns the moved
    /// children, whose parent pointers the caller must update.
    pub fn move_half_to<R>(&mut self, recipient: &mut InternalPage<R, K>) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        assert_eq!(recipient.size(), 0);
        let size = self.size();
        let keep = (self.max_size() + 1) / 2;

        let (start, end) = (Self::offset(keep), Self::offset(size));
        recipient.raw_mut()[HEADER_SIZE..HEADER_SIZE + (end - start)]
            .copy_from_slice(&self.raw()[start..end]);
        recipient.set_size(size - keep);
        self.set_size(keep);

        recipient.children()
    }

    /// Appends every entry to `recipient`, the left neighbour. `middle_key`
    /// is the parent's separator for this page and becomes the key of this
    /// page's first child. Returns the moved children.
    pub fn move_all_to<R>(&mut self, recipient: &mut InternalPage<R, K>, middle_key: &K) -> Vec<PageId>
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let start = recipient.size();
        assert!(start + size <= recipient.max_size(), "merged internal page would overflow");

        self.set_key_at(0, middle_key);
        let len = size * Self::ENTRY_SIZE;
        let dst = Self::offset(start);
        recipient.raw_mut()[dst..dst + len]
            .copy_from_slice(&self.raw()[HEADER_SIZE..HEADER_SIZE + len]);
        recipient.increase_size(size as isize);

        let moved = self.children();
        self.set_size(0);
        moved
    }

    /// Moves the first child to the end of `recipient`, the left neighbour,
    /// keyed by `middle_key`. Returns the moved child and the new separator
    /// between the two pages.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut InternalPage<R, K>, middle_key: &K) -> (PageId, K)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let child = self.value_at(0);
        let separator = self.key_at(1);
        self.shift(1, -1);
        self.increase_size(-1);

        let end = recipient.size();
        recipient.set_key_at(end, middle_key);
        recipient.set_value_at(end, child);
        recipient.increase_size(1);

        (child, separator)
    }

    /// Moves the last child to the front of `recipient`, the right
    /// neighbour. `middle_key` becomes the key of the recipient's old first
    /// child. Returns the moved child and the new separator.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut InternalPage<R, K>, middle_key: &K) -> (PageId, K)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let last = self.size() - 1;
        let child = self.value_at(last);
        let separator = self.key_at(last);
        self.increase_size(-1);

        recipient.shift(0, 1);
        recipient.set_value_at(0, child);
        recipient.set_key_at(1, middle_key);
        recipient.increase_size(1);

        (child, separator)
    }
}

impl<B: AsRef<[u8]>, K> TreePage for InternalPage<B, K> {
    fn raw(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K> TreePageMut for InternalPage<B, K> {
    fn raw_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::INVALID_PAGE_ID;
    use crate::index::OrdComparator;

    type Internal<'a> = InternalPage<&'a mut [u8], i64>;

    fn p(id: u32) -> PageId {
        PageId::new(id)
    }

    /// children 10, 11, ... separated by keys 100, 200, ...
    fn internal_with(data: &mut [u8], id: u32, children: usize) -> Internal<'_> {
        let mut node = Internal::init(data, p(id), INVALID_PAGE_ID, 4);
        node.populate_new_root(p(10), &100, p(11));
        for i in 2..children {
            node.insert_node_after(p(10 + i as u32 - 1), &(100 * i as i64), p(10 + i as u32));
        }
        node
    }

    #[test]
    fn test_internal_lookup() {
        let mut data = [0u8; PAGE_SIZE];
        let node = internal_with(&mut data, 1, 4);

        assert_eq!(node.children(), vec![p(10), p(11), p(12), p(13)]);
        assert_eq!(node.lookup(&5, &OrdComparator), p(10));
        assert_eq!(node.lookup(&100, &OrdComparator), p(11));
        assert_eq!(node.lookup(&199, &OrdComparator), p(11));
        assert_eq!(node.lookup(&300, &OrdComparator), p(13));
        assert_eq!(node.lookup(&9999, &OrdComparator), p(13));
        assert_eq!(node.value_index(p(12)), Some(2));
    }

    #[test]
    #[should_panic]
    fn test_internal_lookup_single_child_panics() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = internal_with(&mut data, 1, 2);
        node.remove(1);
        node.lookup(&1, &OrdComparator);
    }

    #[test]
    fn test_internal_split() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];

        let mut left = internal_with(&mut left_data, 1, 5);
        let mut right = Internal::init(&mut right_data[..], p(2), INVALID_PAGE_ID, 4);

        let moved = left.move_half_to(&mut right);

        assert_eq!(left.children(), vec![p(10), p(11)]);
        assert_eq!(moved, vec![p(12), p(13), p(14)]);
        // separator pushed to the parent
        assert_eq!(right.key_at(0), 200);
        assert_eq!(right.key_at(1), 300);
    }

    #[test]
    fn test_internal_merge_pulls_separator_down() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];

        let mut left = Internal::init(&mut left_data[..], p(1), INVALID_PAGE_ID, 4);
        left.populate_new_root(p(10), &100, p(11));
        let mut right = Internal::init(&mut right_data[..], p(2), INVALID_PAGE_ID, 4);
        right.populate_new_root(p(20), &600, p(21));

        let moved = right.move_all_to(&mut left, &500);

        assert_eq!(moved, vec![p(20), p(21)]);
        assert_eq!(left.children(), vec![p(10), p(11), p(20), p(21)]);
        assert_eq!(left.key_at(2), 500);
        assert_eq!(left.key_at(3), 600);
        assert_eq!(right.size(), 0);
    }

    #[test]
    fn test_internal_redistribute() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];

        let mut left = internal_with(&mut left_data, 1, 3);
        let mut right = Internal::init(&mut right_data[..], p(2), INVALID_PAGE_ID, 4);
        right.populate_new_root(p(20), &700, p(21));

        // parent separator between the two pages is 500
        let (child, sep) = left.move_last_to_front_of(&mut right, &500);
        assert_eq!(child, p(12));
        assert_eq!(sep, 200);
        assert_eq!(right.children(), vec![p(12), p(20), p(21)]);
        assert_eq!(right.key_at(1), 500);

        let (child, sep) = right.move_first_to_end_of(&mut left, &200);
        assert_eq!(child, p(12));
        assert_eq!(sep, 500);
        assert_eq!(left.children(), vec![p(10), p(11), p(12)]);
        assert_eq!(left.key_at(2), 200);
        assert_eq!(right.children(), vec![p(20), p(21)]);
        assert_eq!(right.key_at(1), 700);
    }

    #[test]
    fn test_internal_collapse() {
        let mut data = [0u8; PAGE_SIZE];
        let mut node = internal_with(&mut data, 1, 2);
        node.remove(0);
        assert_eq!(node.remove_and_return_only_child(), p(11));
        assert_eq!(node.size(), 0);
    }
}
