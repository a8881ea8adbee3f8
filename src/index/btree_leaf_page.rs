use std::cmp::Ordering;

use crate::common::{PageId, INVALID_PAGE_ID, PAGE_SIZE};

use super::btree_page::{
    assert_page_type, read_u32, write_u32, Marker, PageType, TreePage, TreePageMut, HEADER_SIZE,
    NEXT_PAGE_OFFSET,
};
use super::{KeyComparator, Storable};

/// Leaf page: sorted `(key, value)` pairs plus a link to the next leaf.
///
/// ```text
/// | header (24) | k0 v0 | k1 v1 | ... |
/// ```
/// One slot beyond `max_size` is reserved so an insert can overflow the page
/// before it is split.
pub struct LeafPage<B, K, V> {
    data: B,
    _marker: Marker<(K, V)>,
}

impl<B, K: Storable, V: Storable> LeafPage<B, K, V> {
    const ENTRY_SIZE: usize = K::SIZE + V::SIZE;

    /// Largest `max_size` a leaf of this key/value width supports.
    pub fn capacity() -> usize {
        (PAGE_SIZE - HEADER_SIZE) / Self::ENTRY_SIZE - 1
    }

    fn offset(index: usize) -> usize {
        HEADER_SIZE + index * Self::ENTRY_SIZE
    }
}

impl<B: AsRef<[u8]>, K: Storable, V: Storable> LeafPage<B, K, V> {
    /// Wraps an initialised leaf page. Panics if the tag says otherwise.
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        assert_page_type(data.as_ref(), PageType::Leaf);
        Self {
            data,
            _marker: Marker::default(),
        }
    }

    pub fn key_at(&self, index: usize) -> K {
        K::decode(&self.raw()[Self::offset(index)..])
    }

    pub fn value_at(&self, index: usize) -> V {
        V::decode(&self.raw()[Self::offset(index) + K::SIZE..])
    }

    pub fn item(&self, index: usize) -> (K, V) {
        (self.key_at(index), self.value_at(index))
    }

    pub fn next_page_id(&self) -> PageId {
        PageId::new(read_u32(self.raw(), NEXT_PAGE_OFFSET))
    }

    /// Index of the first key `>= key` (`size()` if every key is smaller).
    pub fn key_index<C: KeyComparator<K> + ?Sized>(&self, key: &K, cmp: &C) -> usize {
        let (mut lo, mut hi) = (0, self.size());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if cmp.compare(&self.key_at(mid), key) == Ordering::Less {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    /// Returns the value stored under exactly `key`.
    pub fn lookup<C: KeyComparator<K> + ?Sized>(&self, key: &K, cmp: &C) -> Option<V> {
        let idx = self.key_index(key, cmp);
        (idx < self.size() && cmp.compare(&self.key_at(idx), key) == Ordering::Equal)
            .then(|| self.value_at(idx))
    }

    /// Copies out every entry.
    pub fn items(&self) -> Vec<(K, V)> {
        (0..self.size()).map(|i| self.item(i)).collect()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K: Storable, V: Storable> LeafPage<B, K, V> {
    /// Formats `data` as an empty leaf.
    pub fn init(mut data: B, page_id: PageId, parent: PageId, max_size: usize) -> Self {
        assert!(max_size <= Self::capacity(), "leaf max size exceeds page capacity");
        {
            let mut header = super::BTreePage::new(data.as_mut());
            header.init_header(PageType::Leaf, page_id, parent, max_size);
        }
        write_u32(data.as_mut(), NEXT_PAGE_OFFSET, INVALID_PAGE_ID.as_u32());
        Self::new(data)
    }

    pub fn set_next_page_id(&mut self, next: PageId) {
        write_u32(self.raw_mut(), NEXT_PAGE_OFFSET, next.as_u32());
    }

    fn set_item(&mut self, index: usize, key: &K, value: &V) {
        let off = Self::offset(index);
        key.encode(&mut self.raw_mut()[off..]);
        value.encode(&mut self.raw_mut()[off + K::SIZE..]);
    }

    /// Shifts entries `[from, size)` by `delta` slots (positive = right).
    fn shift(&mut self, from: usize, delta: isize) {
        let size = self.size();
        let src = Self::offset(from)..Self::offset(size);
        let dst = (Self::offset(from) as isize + delta * Self::ENTRY_SIZE as isize) as usize;
        self.raw_mut().copy_within(src, dst);
    }

    /// Inserts in key order and returns the new size. The caller rules out
    /// duplicates beforehand.
    pub fn insert<C: KeyComparator<K> + ?Sized>(&mut self, key: &K, value: &V, cmp: &C) -> usize {
        let size = self.size();
        assert!(size <= self.max_size(), "leaf {} overflowed", self.page_id());

        let idx = self.key_index(key, cmp);
        debug_assert!(idx == size || cmp.compare(&self.key_at(idx), key) != Ordering::Equal);

        self.shift(idx, 1);
        self.set_item(idx, key, value);
        self.increase_size(1);
        size + 1
    }

    /// Deletes `key` if present and returns the resulting size.
    pub fn remove_and_delete_record<C: KeyComparator<K> + ?Sized>(
        &mut self,
        key: &K,
        cmp: &C,
    ) -> usize {
        let size = self.size();
        let idx = self.key_index(key, cmp);
        if idx >= size || cmp.compare(&self.key_at(idx), key) != Ordering::Equal {
            return size;
        }

        self.shift(idx + 1, -1);
        self.increase_size(-1);
        size - 1
    }

    /// Moves the upper part of an overflowing leaf into the empty
    /// `recipient`, which is linked in right after this leaf. This leaf keeps
    /// `(max_size + 1) / 2` entries.
    pub fn move_half_to<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
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

        recipient.set_next_page_id(self.next_page_id());
        self.set_next_page_id(recipient.page_id());
    }

    /// Appends every entry to `recipient`, the left neighbour, and hands over
    /// this leaf's next link.
    pub fn move_all_to<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let size = self.size();
        let start = recipient.size();
        assert!(start + size <= recipient.max_size(), "merged leaf would overflow");

        let len = size * Self::ENTRY_SIZE;
        let dst = Self::offset(start);
        recipient.raw_mut()[dst..dst + len]
            .copy_from_slice(&self.raw()[HEADER_SIZE..HEADER_SIZE + len]);
        recipient.increase_size(size as isize);
        recipient.set_next_page_id(self.next_page_id());
        self.set_size(0);
    }

    /// Moves the first entry to the end of `recipient`, the left neighbour.
    pub fn move_first_to_end_of<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let (key, value) = self.item(0);
        self.shift(1, -1);
        self.increase_size(-1);

        let end = recipient.size();
        recipient.set_item(end, &key, &value);
        recipient.increase_size(1);
    }

    /// Moves the last entry to the front of `recipient`, the right neighbour.
    pub fn move_last_to_front_of<R>(&mut self, recipient: &mut LeafPage<R, K, V>)
    where
        R: AsRef<[u8]> + AsMut<[u8]>,
    {
        let last = self.size() - 1;
        let (key, value) = self.item(last);
        self.increase_size(-1);

        recipient.shift(0, 1);
        recipient.set_item(0, &key, &value);
        recipient.increase_size(1);
    }
}

impl<B: AsRef<[u8]>, K, V> TreePage for LeafPage<B, K, V> {
    fn raw(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>, K, V> TreePageMut for LeafPage<B, K, V> {
    fn raw_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::OrdComparator;

    type Leaf<'a> = LeafPage<&'a mut [u8], i64, i64>;

    fn leaf_with<'a>(data: &'a mut [u8], id: u32, keys: &[i64]) -> Leaf<'a> {
        let mut leaf = Leaf::init(data, PageId::new(id), PageId::new(1), 4);
        for &k in keys {
            leaf.insert(&k, &(k * 10), &OrdComparator);
        }
        leaf
    }

    #[test]
    fn test_leaf_insert_keeps_order() {
        let mut data = [0u8; PAGE_SIZE];
        let leaf = leaf_with(&mut data, 2, &[30, 10, 20]);

        assert_eq!(leaf.size(), 3);
        assert_eq!(leaf.items(), vec![(10, 100), (20, 200), (30, 300)]);
        assert_eq!(leaf.lookup(&20, &OrdComparator), Some(200));
        assert_eq!(leaf.lookup(&25, &OrdComparator), None);
        assert_eq!(leaf.key_index(&25, &OrdComparator), 2);
        assert_eq!(leaf.next_page_id(), INVALID_PAGE_ID);
    }

    #[test]
    fn test_leaf_remove() {
        let mut data = [0u8; PAGE_SIZE];
        let mut leaf = leaf_with(&mut data, 2, &[1, 2, 3]);

        assert_eq!(leaf.remove_and_delete_record(&2, &OrdComparator), 2);
        assert_eq!(leaf.remove_and_delete_record(&2, &OrdComparator), 2);
        assert_eq!(leaf.items(), vec![(1, 10), (3, 30)]);
    }

    #[test]
    fn test_leaf_split_keeps_lower_half() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];

        let mut left = leaf_with(&mut left_data, 2, &[1, 2, 3, 4, 5]);
        left.set_next_page_id(PageId::new(9));
        let mut right = Leaf::init(&mut right_data[..], PageId::new(3), PageId::new(1), 4);

        left.move_half_to(&mut right);

        assert_eq!(left.items(), vec![(1, 10), (2, 20)]);
        assert_eq!(right.items(), vec![(3, 30), (4, 40), (5, 50)]);
        assert_eq!(left.next_page_id(), PageId::new(3));
        assert_eq!(right.next_page_id(), PageId::new(9));
    }

    #[test]
    fn test_leaf_merge_and_borrow() {
        let mut left_data = [0u8; PAGE_SIZE];
        let mut right_data = [0u8; PAGE_SIZE];

        let mut left = leaf_with(&mut left_data, 2, &[1, 2]);
        let mut right = leaf_with(&mut right_data, 3, &[5, 6, 7]);
        right.set_next_page_id(PageId::new(8));

        right.move_first_to_end_of(&mut left);
        assert_eq!(left.items(), vec![(1, 10), (2, 20), (5, 50)]);
        assert_eq!(right.items(), vec![(6, 60), (7, 70)]);

        left.move_last_to_front_of(&mut right);
        assert_eq!(left.items(), vec![(1, 10), (2, 20)]);
        assert_eq!(right.items(), vec![(5, 50), (6, 60), (7, 70)]);

        right.remove_and_delete_record(&7, &OrdComparator);
        right.move_all_to(&mut left);
        assert_eq!(left.items(), vec![(1, 10), (2, 20), (5, 50), (6, 60)]);
        assert_eq!(left.next_page_id(), PageId::new(8));
        assert_eq!(right.size(), 0);
    }
}
