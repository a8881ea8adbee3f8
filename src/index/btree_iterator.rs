use std::collections::VecDeque;

use log::trace;

use crate::common::Result;

use super::btree_index::Cursor;
use super::{BPlusTree, KeyComparator, Storable};

/// Forward iterator over a tree's entries in key order.
///
/// Entries are copied out one leaf at a time, so no latch or pin is held
/// between calls. Each refill descends from the root to the leaf that follows
/// the last key handed out. Moving to the next leaf only try-latches it while
/// the current one is held; on contention everything is released and the
/// refill restarts from the root, so a scan never waits on a writer that may
/// in turn be waiting on it.
pub struct TreeIterator<'a, K, V, C> {
    tree: &'a BPlusTree<K, V, C>,
    cursor: Cursor<K>,
    buffer: VecDeque<(K, V)>,
    done: bool,
}

impl<'a, K, V, C> TreeIterator<'a, K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    pub(crate) fn new(tree: &'a BPlusTree<K, V, C>, cursor: Cursor<K>) -> Self {
        Self {
            tree,
            cursor,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Whether the scan has nothing left to return.
    pub fn is_end(&mut self) -> Result<bool> {
        if self.buffer.is_empty() && !self.done {
            self.refill()?;
        }
        Ok(self.buffer.is_empty())
    }

    pub fn next(&mut self) -> Result<Option<(K, V)>> {
        if self.is_end()? {
            return Ok(None);
        }

        let Some((key, value)) = self.buffer.pop_front() else {
            return Ok(None);
        };
        self.cursor = Cursor::After(key);
        Ok(Some((key, value)))
    }

    fn refill(&mut self) -> Result<()> {
        loop {
            match self.tree.scan_from(&self.cursor)? {
                Some(batch) => {
                    self.done = batch.is_empty();
                    self.buffer.extend(batch);
                    return Ok(());
                }
                None => {
                    trace!("{}: leaf hop contended, restarting scan", self.tree.name());
                    std::thread::yield_now();
                }
            }
        }
    }
}

impl<K, V, C> Iterator for TreeIterator<'_, K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    type Item = Result<(K, V)>;

    fn next(&mut self) -> Option<Self::Item> {
        match TreeIterator::next(self) {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                self.buffer.clear();
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::NamedTempFile;

    use crate::buffer::BufferPoolManager;
    use crate::index::OrdComparator;
    use crate::storage::disk::DiskManager;

    use super::*;

    fn tree_with(keys: impl IntoIterator<Item = i64>) -> (BPlusTree<i64, i64, OrdComparator>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(32, dm));
        let tree = BPlusTree::with_max_sizes("iter", bpm, OrdComparator, 3, 4).unwrap();
        for k in keys {
            tree.insert(&k, &(k * 2)).unwrap();
        }
        (tree, temp_file)
    }

    #[test]
    fn test_empty_tree_is_end() {
        let (tree, _temp) = tree_with([]);
        let mut iter = tree.begin();
        assert!(iter.is_end().unwrap());
        assert!(TreeIterator::next(&mut iter).unwrap().is_none());
    }

    #[test]
    fn test_begin_walks_all_leaves() {
        let (tree, _temp) = tree_with((1..=20).rev());
        let items: Vec<_> = tree.begin().map(|r| r.unwrap()).collect();
        let expected: Vec<_> = (1..=20).map(|k| (k, k * 2)).collect();
        assert_eq!(items, expected);
    }

    #[test]
    fn test_begin_at_missing_key() {
        let (tree, _temp) = tree_with((0..30).map(|k| k * 10));

        let keys: Vec<_> = tree.begin_at(&95).map(|r| r.unwrap().0).take(3).collect();
        assert_eq!(keys, vec![100, 110, 120]);

        let mut past_end = tree.begin_at(&1000);
        assert!(past_end.is_end().unwrap());
    }

    #[test]
    fn test_iterator_sees_later_inserts_ahead_of_cursor() {
        let (tree, _temp) = tree_with(1..=5);
        let mut iter = tree.begin();

        assert_eq!(TreeIterator::next(&mut iter).unwrap(), Some((1, 2)));
        // the buffered leaf is already copied; keys past it are picked up
        tree.insert(&100, &200).unwrap();
        let rest: Vec<_> = iter.map(|r| r.unwrap().0).collect();
        assert_eq!(rest.last(), Some(&100));
    }
}
