use std::fmt::{Display, Write as _};

use crate::common::{CrabError, PageId, Result, INVALID_PAGE_ID};

use super::{BPlusTree, BTreeNode, KeyComparator, LeafPage, Storable, TreePage};

/// Shape summary returned by a successful [`BPlusTree::check`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    pub height: usize,
    pub leaf_count: usize,
    pub internal_count: usize,
    pub key_count: usize,
}

fn corrupted(msg: String) -> CrabError {
    CrabError::IndexCorrupted(msg)
}

/// Key range a subtree must stay within: `[lower, upper)`.
struct Bounds<K> {
    lower: Option<K>,
    upper: Option<K>,
}

struct Walk {
    stats: TreeStats,
    leaf_depth: Option<usize>,
    leaves: Vec<PageId>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Verifies the structural invariants of the whole tree: key order,
    /// separator bounds, page sizes, parent links, uniform leaf depth and the
    /// leaf chain. Meant for a quiescent tree.
    pub fn check(&self) -> Result<TreeStats> {
        let root_latch = self.root_page_id.read();
        let root_id = *root_latch;
        if !root_id.is_valid() {
            return Ok(TreeStats::default());
        }

        let mut walk = Walk {
            stats: TreeStats::default(),
            leaf_depth: None,
            leaves: Vec::new(),
        };
        let bounds = Bounds {
            lower: None,
            upper: None,
        };
        self.check_subtree(root_id, INVALID_PAGE_ID, &bounds, 1, &mut walk)?;
        self.check_leaf_chain(&walk.leaves)?;

        walk.stats.height = walk.leaf_depth.unwrap_or(0);
        Ok(walk.stats)
    }

    /// [`check`](Self::check), plus no page may be left pinned.
    pub fn check_quiescent(&self) -> Result<TreeStats> {
        let stats = self.check()?;
        if !self.bpm.check_all_unpinned() {
            return Err(corrupted("pages left pinned after the last operation".into()));
        }
        Ok(stats)
    }

    fn check_subtree(
        &self,
        page_id: PageId,
        parent_id: PageId,
        bounds: &Bounds<K>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        let guard = self.bpm.read_page(page_id)?;
        let node = BTreeNode::<_, K, V>::parse(guard.data())?;
        let header = node.header();

        if header.page_id() != page_id {
            return Err(corrupted(format!(
                "page {} records its id as {}",
                page_id,
                header.page_id()
            )));
        }
        if header.parent_page_id() != parent_id {
            return Err(corrupted(format!(
                "page {} points at parent {}, expected {}",
                page_id,
                header.parent_page_id(),
                parent_id
            )));
        }
        if header.size() > header.max_size() || header.size() < header.min_size() {
            return Err(corrupted(format!(
                "page {} holds {} entries, allowed {}..={}",
                page_id,
                header.size(),
                header.min_size(),
                header.max_size()
            )));
        }

        let keys: Vec<K> = match &node {
            BTreeNode::Leaf(leaf) => (0..leaf.size()).map(|i| leaf.key_at(i)).collect(),
            BTreeNode::Internal(internal) => (1..internal.size()).map(|i| internal.key_at(i)).collect(),
        };
        self.check_keys(page_id, &keys, bounds)?;

        let children = match node {
            BTreeNode::Leaf(_) => {
                match walk.leaf_depth {
                    None => walk.leaf_depth = Some(depth),
                    Some(d) if d != depth => {
                        return Err(corrupted(format!(
                            "leaf {} at depth {}, other leaves at depth {}",
                            page_id, depth, d
                        )))
                    }
                    Some(_) => {}
                }
                walk.stats.leaf_count += 1;
                walk.stats.key_count += keys.len();
                walk.leaves.push(page_id);
                return Ok(());
            }
            BTreeNode::Internal(internal) => internal.children(),
        };
        drop(guard);
        walk.stats.internal_count += 1;

        for (i, child) in children.into_iter().enumerate() {
            let child_bounds = Bounds {
                lower: if i == 0 { bounds.lower } else { Some(keys[i - 1]) },
                upper: keys.get(i).copied().or(bounds.upper),
            };
            self.check_subtree(child, page_id, &child_bounds, depth + 1, walk)?;
        }
        Ok(())
    }

    /// Keys strictly ascending and inside `bounds`.
    fn check_keys(&self, page_id: PageId, keys: &[K], bounds: &Bounds<K>) -> Result<()> {
        for pair in keys.windows(2) {
            if self.comparator.compare(&pair[0], &pair[1]).is_ge() {
                return Err(corrupted(format!(
                    "page {} keys out of order: {:?} then {:?}",
                    page_id, pair[0], pair[1]
                )));
            }
        }

        let (Some(first), Some(last)) = (keys.first(), keys.last()) else {
            return Ok(());
        };
        if let Some(lower) = &bounds.lower {
            if self.comparator.compare(first, lower).is_lt() {
                return Err(corrupted(format!(
                    "page {} key {:?} below separator {:?}",
                    page_id, first, lower
                )));
            }
        }
        if let Some(upper) = &bounds.upper {
            if self.comparator.compare(last, upper).is_ge() {
                return Err(corrupted(format!(
                    "page {} key {:?} not below separator {:?}",
                    page_id, last, upper
                )));
            }
        }
        Ok(())
    }

    /// Following next links from the leftmost leaf must visit exactly the
    /// leaves found by the descent, in the same order.
    fn check_leaf_chain(&self, leaves: &[PageId]) -> Result<()> {
        let mut expected = leaves.iter();
        let mut page_id = leaves.first().copied().unwrap_or(INVALID_PAGE_ID);

        while page_id.is_valid() {
            if expected.next() != Some(&page_id) {
                return Err(corrupted(format!(
                    "leaf chain reaches page {} out of order",
                    page_id
                )));
            }
            let guard = self.bpm.read_page(page_id)?;
            page_id = LeafPage::<_, K, V>::new(guard.data()).next_page_id();
        }

        if expected.next().is_some() {
            return Err(corrupted("leaf chain ends before the last leaf".into()));
        }
        Ok(())
    }
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + Display,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Renders the tree level by level, one line per level.
    ///
    /// Internal pages print as `(k1 k2)`, skipping the unused first key, and
    /// leaves as `[k0 k1 k2]`. With `verbose` each page is prefixed by its
    /// id, parent and (for leaves) next link.
    pub fn dump(&self, verbose: bool) -> Result<String> {
        let root_latch = self.root_page_id.read();
        if !root_latch.is_valid() {
            return Ok("Empty tree".to_string());
        }

        let mut out = String::new();
        let mut level = vec![*root_latch];
        while !level.is_empty() {
            let mut next_level = Vec::new();
            for (i, page_id) in level.iter().enumerate() {
                if i > 0 {
                    out.push(' ');
                }
                let guard = self.bpm.read_page(*page_id)?;
                match BTreeNode::<_, K, V>::parse(guard.data())? {
                    BTreeNode::Leaf(leaf) => {
                        if verbose {
                            let _ = write!(
                                out,
                                "<{} p:{} n:{}>",
                                page_id,
                                leaf.parent_page_id(),
                                leaf.next_page_id()
                            );
                        }
                        let keys: Vec<String> = (0..leaf.size()).map(|j| leaf.key_at(j).to_string()).collect();
                        let _ = write!(out, "[{}]", keys.join(" "));
                    }
                    BTreeNode::Internal(internal) => {
                        if verbose {
                            let _ = write!(out, "<{} p:{}>", page_id, internal.parent_page_id());
                        }
                        let keys: Vec<String> =
                            (1..internal.size()).map(|j| internal.key_at(j).to_string()).collect();
                        let _ = write!(out, "({})", keys.join(" "));
                        next_level.extend(internal.children());
                    }
                }
            }
            out.push('\n');
            level = next_level;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::NamedTempFile;

    use crate::buffer::BufferPoolManager;
    use crate::index::{OrdComparator, TreePageMut};
    use crate::storage::disk::DiskManager;

    use super::*;

    fn setup() -> (BPlusTree<i64, i64, OrdComparator>, NamedTempFile) {
        let temp_file = NamedTempFile::new().unwrap();
        let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
        let bpm = Arc::new(BufferPoolManager::new(16, dm));
        let tree = BPlusTree::with_max_sizes("check", bpm, OrdComparator, 4, 4).unwrap();
        (tree, temp_file)
    }

    #[test]
    fn test_dump_shapes() {
        let (tree, _temp) = setup();
        assert_eq!(tree.dump(false).unwrap(), "Empty tree");

        for k in 1..=5 {
            tree.insert(&k, &k).unwrap();
        }
        assert_eq!(tree.dump(false).unwrap(), "(3)\n[1 2] [3 4 5]\n");
    }

    #[test]
    fn test_check_stats() {
        let (tree, _temp) = setup();
        assert_eq!(tree.check().unwrap(), TreeStats::default());

        for k in 1..=5 {
            tree.insert(&k, &k).unwrap();
        }
        let stats = tree.check_quiescent().unwrap();
        assert_eq!(
            stats,
            TreeStats {
                height: 2,
                leaf_count: 2,
                internal_count: 1,
                key_count: 5,
            }
        );
    }

    #[test]
    fn test_check_detects_bad_parent_link() {
        let (tree, _temp) = setup();
        for k in 1..=5 {
            tree.insert(&k, &k).unwrap();
        }

        let leaf_id = {
            let guard = tree.bpm.read_page(tree.root_page_id()).unwrap();
            match BTreeNode::<_, i64, i64>::parse(guard.data()).unwrap() {
                BTreeNode::Internal(root) => root.value_at(0),
                BTreeNode::Leaf(_) => panic!("root should be internal"),
            }
        };
        {
            let mut guard = tree.bpm.write_page(leaf_id).unwrap();
            crate::index::BTreePage::new(guard.data_mut()).set_parent_page_id(PageId::new(999));
        }

        assert!(matches!(tree.check(), Err(CrabError::IndexCorrupted(_))));
    }
}
