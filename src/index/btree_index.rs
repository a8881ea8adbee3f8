use std::path::Path;
use std::sync::Arc;

use log::{debug, trace, warn};
use parking_lot::RwLock;

use crate::buffer::{BufferPoolManager, ReadPageGuard, WritePageGuard};
use crate::common::{
    CrabError, PageId, Result, HEADER_PAGE_ID, INDEX_NAME_SIZE, INVALID_PAGE_ID,
};
use crate::storage::page::HeaderPage;

use super::btree_page::Marker;
use super::context::OperationContext;
use super::{
    BTreeNode, BTreePage, FromInteger, InternalPage, KeyComparator, LeafPage, Storable,
    TreeIterator, TreePage, TreePageMut,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteOp {
    Insert,
    Delete,
}

/// Where an index scan resumes.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Cursor<K> {
    Start,
    AtOrAfter(K),
    After(K),
}

impl<K> Cursor<K> {
    fn seek_key(&self) -> Option<&K> {
        match self {
            Cursor::Start => None,
            Cursor::AtOrAfter(k) | Cursor::After(k) => Some(k),
        }
    }

    fn admits<C: KeyComparator<K>>(&self, key: &K, cmp: &C) -> bool {
        match self {
            Cursor::Start => true,
            Cursor::AtOrAfter(k) => cmp.compare(key, k).is_ge(),
            Cursor::After(k) => cmp.compare(key, k).is_gt(),
        }
    }
}

/// Concurrent B+Tree index over buffer pool pages.
///
/// Keys are unique. Readers crab down with shared latches, releasing each
/// parent once the child is latched. Writers crab down with exclusive latches
/// and keep ancestors (and the root-id latch) only while the newly latched
/// child could still split or underflow. Structural changes then run on the
/// retained pages and everything is released in one teardown per call.
///
/// The root page id is persisted in the header page under the index name.
pub struct BPlusTree<K, V, C> {
    pub(super) index_name: String,
    pub(super) root_page_id: RwLock<PageId>,
    pub(super) bpm: Arc<BufferPoolManager>,
    pub(super) comparator: C,
    leaf_max_size: usize,
    internal_max_size: usize,
    _marker: Marker<(K, V)>,
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable,
    V: Storable,
    C: KeyComparator<K>,
{
    /// Creates an empty index whose node capacities fill a page.
    pub fn new(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
    ) -> Result<Self> {
        Self::with_max_sizes(
            name,
            bpm,
            comparator,
            LeafPage::<&[u8], K, V>::capacity(),
            InternalPage::<&[u8], K>::capacity(),
        )
    }

    /// Creates an empty index with smaller node capacities.
    pub fn with_max_sizes(
        name: impl Into<String>,
        bpm: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self> {
        let index_name = name.into();
        if index_name.is_empty() || index_name.len() > INDEX_NAME_SIZE {
            return Err(CrabError::IndexNameTooLong(index_name));
        }

        assert!(
            (2..=LeafPage::<&[u8], K, V>::capacity()).contains(&leaf_max_size),
            "leaf max size {} out of range",
            leaf_max_size
        );
        assert!(
            (4..=InternalPage::<&[u8], K>::capacity()).contains(&internal_max_size),
            "internal max size {} out of range",
            internal_max_size
        );

        Ok(Self {
            index_name,
            root_page_id: RwLock::new(INVALID_PAGE_ID),
            bpm,
            comparator,
            leaf_max_size,
            internal_max_size,
            _marker: Marker::default(),
        })
    }

    /// Reattaches to an index registered in the header page. Node
    /// capacities are taken from the stored pages.
    pub fn open(name: impl Into<String>, bpm: Arc<BufferPoolManager>, comparator: C) -> Result<Self> {
        let mut tree = Self::new(name, bpm, comparator)?;

        let root_id = {
            let guard = tree.bpm.read_page(HEADER_PAGE_ID)?;
            HeaderPage::new(guard.data()).get_root_id(&tree.index_name)
        }
        .ok_or_else(|| CrabError::IndexNotFound(tree.index_name.clone()))?;

        // walk the left spine to pick up the stored capacities
        let mut page_id = root_id;
        while page_id.is_valid() {
            let guard = tree.bpm.read_page(page_id)?;
            page_id = match BTreeNode::<_, K, V>::parse(guard.data())? {
                BTreeNode::Leaf(leaf) => {
                    tree.leaf_max_size = leaf.max_size();
                    INVALID_PAGE_ID
                }
                BTreeNode::Internal(node) => {
                    tree.internal_max_size = node.max_size();
                    node.value_at(0)
                }
            };
        }

        *tree.root_page_id.get_mut() = root_id;
        debug!("opened index {} at root {}", tree.index_name, root_id);
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn root_page_id(&self) -> PageId {
        *self.root_page_id.read()
    }

    pub fn is_empty(&self) -> bool {
        !self.root_page_id.read().is_valid()
    }

    pub fn leaf_max_size(&self) -> usize {
        self.leaf_max_size
    }

    pub fn internal_max_size(&self) -> usize {
        self.internal_max_size
    }

    pub fn buffer_pool(&self) -> &Arc<BufferPoolManager> {
        &self.bpm
    }

    /// Returns the value stored under `key`.
    pub fn get_value(&self, key: &K) -> Result<Option<V>> {
        let Some(guard) = self.find_leaf_read(Some(key))? else {
            return Ok(None);
        };
        Ok(LeafPage::<_, K, V>::new(guard.data()).lookup(key, &self.comparator))
    }

    /// Shared-latch descent to the leaf covering `key`, or the leftmost leaf.
    /// Returns `None` on an empty tree.
    fn find_leaf_read(&self, key: Option<&K>) -> Result<Option<ReadPageGuard>> {
        let root_latch = self.root_page_id.read();
        if !root_latch.is_valid() {
            return Ok(None);
        }

        let mut guard = self.bpm.read_page(*root_latch)?;
        let mut root_latch = Some(root_latch);

        loop {
            let child_id = match BTreeNode::<_, K, V>::parse(guard.data())? {
                BTreeNode::Leaf(_) => None,
                BTreeNode::Internal(node) => Some(match key {
                    Some(key) => node.lookup(key, &self.comparator),
                    None => node.value_at(0),
                }),
            };
            let Some(child_id) = child_id else {
                return Ok(Some(guard));
            };

            guard = self.bpm.read_page(child_id)?;
            drop(root_latch.take());
        }
    }

    /// Copies the entries admitted by `cursor` from the first leaf that has
    /// any. Returns `None` when a leaf hop lost a latch race; the caller
    /// restarts from the root.
    pub(crate) fn scan_from(&self, cursor: &Cursor<K>) -> Result<Option<Vec<(K, V)>>> {
        let Some(mut guard) = self.find_leaf_read(cursor.seek_key())? else {
            return Ok(Some(Vec::new()));
        };

        loop {
            let (batch, next_id) = {
                let leaf = LeafPage::<_, K, V>::new(guard.data());
                let batch: Vec<_> = leaf
                    .items()
                    .into_iter()
                    .filter(|(k, _)| cursor.admits(k, &self.comparator))
                    .collect();
                (batch, leaf.next_page_id())
            };

            if !batch.is_empty() || !next_id.is_valid() {
                return Ok(Some(batch));
            }

            // the current leaf stays latched until the next one is held
            match self.bpm.try_read_page(next_id)? {
                Some(next) => guard = next,
                None => return Ok(None),
            }
        }
    }

    /// Iterates over every entry in key order.
    pub fn begin(&self) -> TreeIterator<'_, K, V, C> {
        TreeIterator::new(self, Cursor::Start)
    }

    /// Iterates over the entries with keys `>= key`.
    pub fn begin_at(&self, key: &K) -> TreeIterator<'_, K, V, C> {
        TreeIterator::new(self, Cursor::AtOrAfter(*key))
    }

    /// Inserts a unique key. Returns false, leaving the tree untouched, if
    /// the key is already present. An error also leaves the tree untouched.
    pub fn insert(&self, key: &K, value: &V) -> Result<bool> {
        let mut ctx = OperationContext::new(self.root_page_id.write());
        let result = self.insert_with(key, value, &mut ctx);
        self.finish(ctx);
        result
    }

    fn insert_with(&self, key: &K, value: &V, ctx: &mut OperationContext<'_>) -> Result<bool> {
        let root_id = ctx.root_id().unwrap_or(INVALID_PAGE_ID);
        if !root_id.is_valid() {
            self.start_new_tree(key, value, ctx)?;
            return Ok(true);
        }

        self.descend_for_write(root_id, key, WriteOp::Insert, ctx)?;
        let leaf_id = ctx.last().page_id();

        if LeafPage::<_, K, V>::new(ctx.last().data())
            .lookup(key, &self.comparator)
            .is_some()
        {
            return Ok(false);
        }

        let mut spare = self.prepare_insert(ctx)?;

        let overflow = {
            let mut leaf = LeafPage::<_, K, V>::new(ctx.retained(leaf_id).data_mut());
            leaf.insert(key, value, &self.comparator) > leaf.max_size()
        };

        if overflow {
            let mut sibling_guard = spare.pop().expect("split page was reserved");
            let sibling_id = sibling_guard.page_id();

            let separator = {
                let mut leaf = LeafPage::<_, K, V>::new(ctx.retained(leaf_id).data_mut());
                let mut sibling = LeafPage::<_, K, V>::init(
                    sibling_guard.data_mut(),
                    sibling_id,
                    leaf.parent_page_id(),
                    leaf.max_size(),
                );
                leaf.move_half_to(&mut sibling);
                sibling.key_at(0)
            };
            ctx.push(sibling_guard);
            debug!("{}: split leaf {} into {}", self.index_name, leaf_id, sibling_id);

            self.insert_into_parent(ctx, leaf_id, &separator, sibling_id, &mut spare);
        }

        debug_assert!(spare.is_empty());
        for guard in spare {
            ctx.mark_deleted(guard.page_id());
        }
        Ok(true)
    }

    fn start_new_tree(&self, key: &K, value: &V, ctx: &mut OperationContext<'_>) -> Result<()> {
        self.hold(ctx, HEADER_PAGE_ID)?;
        let mut guard = self.bpm.new_page()?;
        let root_id = guard.page_id();

        LeafPage::<_, K, V>::init(guard.data_mut(), root_id, INVALID_PAGE_ID, self.leaf_max_size)
            .insert(key, value, &self.comparator);
        ctx.push(guard);

        let recorded = {
            let mut header = HeaderPage::new(ctx.retained(HEADER_PAGE_ID).data_mut());
            if header.update_record(&self.index_name, root_id) {
                Ok(true)
            } else {
                header.insert_record(&self.index_name, root_id)
            }
        };
        if let Err(e) = recorded {
            ctx.mark_deleted(root_id);
            return Err(e);
        }

        ctx.set_root_id(root_id);
        debug!("{}: started tree at root {}", self.index_name, root_id);
        Ok(())
    }

    /// Pins every page the pending insert can touch before the leaf changes:
    /// a spare page per split (plus a new root when the root splits), the
    /// children each internal split hands to its new sibling, and the header
    /// page when the root moves. Past this point the insert cannot fail; if
    /// this fails nothing has been modified.
    fn prepare_insert(&self, ctx: &mut OperationContext<'_>) -> Result<Vec<WritePageGuard>> {
        let mut needed = 0;
        let mut movers = Vec::new();
        let mut root_splits = false;
        let mut path_child = None;

        for guard in ctx.pages().rev() {
            let page = BTreePage::new(guard.data());
            if page.size() < page.max_size() {
                break;
            }
            needed += 1;
            if let Some(child) = path_child {
                movers.extend(Self::split_movers(&InternalPage::<_, K>::new(guard.data()), child));
            }
            if page.is_root() {
                debug_assert!(ctx.holds_root_latch());
                needed += 1;
                root_splits = true;
            }
            path_child = Some(guard.page_id());
        }

        let mut spare = Vec::with_capacity(needed);
        if let Err(e) = self.pin_for_insert(ctx, needed, &movers, root_splits, &mut spare) {
            for guard in spare {
                ctx.mark_deleted(guard.page_id());
            }
            return Err(e);
        }
        Ok(spare)
    }

    fn pin_for_insert(
        &self,
        ctx: &mut OperationContext<'_>,
        needed: usize,
        movers: &[PageId],
        root_splits: bool,
        spare: &mut Vec<WritePageGuard>,
    ) -> Result<()> {
        for _ in 0..needed {
            spare.push(self.bpm.new_page()?);
        }
        for &child in movers {
            self.hold(ctx, child)?;
        }
        if root_splits {
            self.hold(ctx, HEADER_PAGE_ID)?;
        }
        Ok(())
    }

    /// Children of a full internal page that end up in its new sibling once
    /// the entry for `path_child`'s split lands right after `path_child`.
    /// `path_child` itself is already held and left out.
    fn split_movers<B: AsRef<[u8]>>(node: &InternalPage<B, K>, path_child: PageId) -> Vec<PageId> {
        let at = node
            .value_index(path_child)
            .expect("split child is not referenced by its parent");
        let keep = (node.max_size() + 1) / 2;

        (0..node.size())
            .filter(|&i| {
                let after_insert = if i <= at { i } else { i + 1 };
                after_insert >= keep
            })
            .map(|i| node.value_at(i))
            .filter(|&child| child != path_child)
            .collect()
    }

    /// Hooks `new_id`, split off from `old_id`, into the parent under
    /// `key`, splitting upward as needed. Every page involved is held.
    fn insert_into_parent(
        &self,
        ctx: &mut OperationContext<'_>,
        old_id: PageId,
        key: &K,
        new_id: PageId,
        spare: &mut Vec<WritePageGuard>,
    ) {
        let parent_id = BTreePage::new(ctx.retained(old_id).data()).parent_page_id();

        if !parent_id.is_valid() {
            let mut root_guard = spare.pop().expect("root page was reserved");
            let root_id = root_guard.page_id();
            InternalPage::<_, K>::init(
                root_guard.data_mut(),
                root_id,
                INVALID_PAGE_ID,
                self.internal_max_size,
            )
            .populate_new_root(old_id, key, new_id);
            ctx.push(root_guard);

            Self::set_parent(ctx, old_id, root_id);
            Self::set_parent(ctx, new_id, root_id);
            self.set_root(ctx, root_id);
            debug!("{}: grew new root {}", self.index_name, root_id);
            return;
        }

        let overflow = {
            let mut parent = InternalPage::<_, K>::new(ctx.retained(parent_id).data_mut());
            parent.insert_node_after(old_id, key, new_id) > parent.max_size()
        };
        if !overflow {
            return;
        }

        let mut sibling_guard = spare.pop().expect("split page was reserved");
        let sibling_id = sibling_guard.page_id();

        let (moved, separator) = {
            let mut parent = InternalPage::<_, K>::new(ctx.retained(parent_id).data_mut());
            let mut sibling = InternalPage::<_, K>::init(
                sibling_guard.data_mut(),
                sibling_id,
                parent.parent_page_id(),
                parent.max_size(),
            );
            let moved = parent.move_half_to(&mut sibling);
            (moved, sibling.key_at(0))
        };
        ctx.push(sibling_guard);

        for child in moved {
            Self::set_parent(ctx, child, sibling_id);
        }
        debug!(
            "{}: split internal page {} into {}",
            self.index_name, parent_id, sibling_id
        );

        self.insert_into_parent(ctx, parent_id, &separator, sibling_id, spare)
    }

    /// Deletes `key`. Returns whether it was present. An error leaves the
    /// tree untouched.
    pub fn remove(&self, key: &K) -> Result<bool> {
        let mut ctx = OperationContext::new(self.root_page_id.write());
        let result = self.remove_with(key, &mut ctx);
        self.finish(ctx);
        result
    }

    fn remove_with(&self, key: &K, ctx: &mut OperationContext<'_>) -> Result<bool> {
        let root_id = ctx.root_id().unwrap_or(INVALID_PAGE_ID);
        if !root_id.is_valid() {
            return Ok(false);
        }

        self.descend_for_write(root_id, key, WriteOp::Delete, ctx)?;
        let leaf_id = ctx.last().page_id();

        if LeafPage::<_, K, V>::new(ctx.last().data())
            .lookup(key, &self.comparator)
            .is_none()
        {
            return Ok(false);
        }

        self.prepare_remove(ctx, leaf_id)?;

        let underflow = {
            let mut leaf = LeafPage::<_, K, V>::new(ctx.retained(leaf_id).data_mut());
            leaf.remove_and_delete_record(key, &self.comparator) < leaf.min_size()
        };
        if underflow {
            self.coalesce_or_redistribute(ctx, leaf_id);
        }
        Ok(true)
    }

    /// Pins every page the pending removal can touch before the leaf
    /// changes. Walks up from the leaf for as long as a page would
    /// underflow, holding the sibling that repairs it and the children a
    /// merge or borrow moves, and the header page when the root changes.
    /// Each level loses exactly one entry: the key, or the separator of the
    /// page merged away below it.
    fn prepare_remove(&self, ctx: &mut OperationContext<'_>, leaf_id: PageId) -> Result<()> {
        let mut node_id = leaf_id;

        loop {
            let (size, min_size, max_size, is_root, is_leaf, parent_id) = {
                let node = BTreePage::new(ctx.retained(node_id).data());
                (
                    node.size() - 1,
                    node.min_size(),
                    node.max_size(),
                    node.is_root(),
                    node.is_leaf(),
                    node.parent_page_id(),
                )
            };
            if size >= min_size {
                return Ok(());
            }
            if is_root {
                debug_assert!(ctx.holds_root_latch());
                return self.hold(ctx, HEADER_PAGE_ID);
            }

            let (index, sibling_id) = Self::sibling_of(ctx, parent_id, node_id);
            self.hold(ctx, sibling_id)?;
            let sibling_size = BTreePage::new(ctx.retained(sibling_id).data()).size();

            if size + sibling_size <= max_size {
                if !is_leaf {
                    let right_id = if index == 0 { sibling_id } else { node_id };
                    let children = InternalPage::<_, K>::new(ctx.retained(right_id).data()).children();
                    for child in children {
                        self.hold(ctx, child)?;
                    }
                }
                node_id = parent_id;
                continue;
            }

            if !is_leaf {
                let child = {
                    let sibling = InternalPage::<_, K>::new(ctx.retained(sibling_id).data());
                    if index == 0 {
                        sibling.value_at(0)
                    } else {
                        sibling.value_at(sibling.size() - 1)
                    }
                };
                self.hold(ctx, child)?;
            }
            return Ok(());
        }
    }

    /// Repairs `node_id` after it fell below its minimum size.
    fn coalesce_or_redistribute(&self, ctx: &mut OperationContext<'_>, node_id: PageId) {
        let (is_root, is_leaf, node_size, max_size, parent_id) = {
            let node = BTreePage::new(ctx.retained(node_id).data());
            (
                node.is_root(),
                node.is_leaf(),
                node.size(),
                node.max_size(),
                node.parent_page_id(),
            )
        };

        if is_root {
            if self.adjust_root(ctx, node_id) {
                ctx.mark_deleted(node_id);
            }
            return;
        }

        let (index, sibling_id) = Self::sibling_of(ctx, parent_id, node_id);
        let sibling_size = BTreePage::new(ctx.retained(sibling_id).data()).size();

        if node_size + sibling_size <= max_size {
            if index == 0 {
                self.coalesce(ctx, parent_id, node_id, sibling_id, 1, is_leaf)
            } else {
                self.coalesce(ctx, parent_id, sibling_id, node_id, index, is_leaf)
            }
        } else {
            self.redistribute(ctx, parent_id, node_id, sibling_id, index, is_leaf)
        }
    }

    /// The sibling that repairs `node_id`: its left neighbour, or the right
    /// one when it is the first child. Returns the node's index in the
    /// parent alongside.
    fn sibling_of(ctx: &mut OperationContext<'_>, parent_id: PageId, node_id: PageId) -> (usize, PageId) {
        let parent = InternalPage::<_, K>::new(ctx.retained(parent_id).data());
        let index = parent
            .value_index(node_id)
            .expect("underflowing page is not referenced by its parent");
        let sibling_index = if index == 0 { 1 } else { index - 1 };
        (index, parent.value_at(sibling_index))
    }

    /// Merges `right_id` into `left_id` and drops the parent entry at
    /// `right_index`, recursing if the parent underflows.
    fn coalesce(
        &self,
        ctx: &mut OperationContext<'_>,
        parent_id: PageId,
        left_id: PageId,
        right_id: PageId,
        right_index: usize,
        is_leaf: bool,
    ) {
        let middle_key = InternalPage::<_, K>::new(ctx.retained(parent_id).data()).key_at(right_index);

        let moved = {
            let (left_guard, right_guard) = ctx.pair_mut(left_id, right_id);
            if is_leaf {
                let mut left = LeafPage::<_, K, V>::new(left_guard.data_mut());
                LeafPage::<_, K, V>::new(right_guard.data_mut()).move_all_to(&mut left);
                Vec::new()
            } else {
                let mut left = InternalPage::<_, K>::new(left_guard.data_mut());
                InternalPage::<_, K>::new(right_guard.data_mut()).move_all_to(&mut left, &middle_key)
            }
        };
        for child in moved {
            Self::set_parent(ctx, child, left_id);
        }

        let parent_underflow = {
            let mut parent = InternalPage::<_, K>::new(ctx.retained(parent_id).data_mut());
            parent.remove(right_index);
            parent.size() < parent.min_size()
        };
        ctx.mark_deleted(right_id);
        debug!("{}: merged page {} into {}", self.index_name, right_id, left_id);

        if parent_underflow {
            self.coalesce_or_redistribute(ctx, parent_id);
        }
    }

    /// Borrows one entry from the sibling and rewrites the parent separator.
    /// `index` is the node's position in the parent; at 0 the sibling is the
    /// right neighbour, otherwise the left one.
    fn redistribute(
        &self,
        ctx: &mut OperationContext<'_>,
        parent_id: PageId,
        node_id: PageId,
        sibling_id: PageId,
        index: usize,
        is_leaf: bool,
    ) {
        let sep_index = if index == 0 { 1 } else { index };
        let middle_key = InternalPage::<_, K>::new(ctx.retained(parent_id).data()).key_at(sep_index);

        let (moved_child, separator) = {
            let (node_guard, sibling_guard) = ctx.pair_mut(node_id, sibling_id);
            match (is_leaf, index == 0) {
                (true, true) => {
                    let mut sibling = LeafPage::<_, K, V>::new(sibling_guard.data_mut());
                    sibling.move_first_to_end_of(&mut LeafPage::<_, K, V>::new(node_guard.data_mut()));
                    (None, sibling.key_at(0))
                }
                (true, false) => {
                    let mut node = LeafPage::<_, K, V>::new(node_guard.data_mut());
                    LeafPage::<_, K, V>::new(sibling_guard.data_mut()).move_last_to_front_of(&mut node);
                    (None, node.key_at(0))
                }
                (false, true) => {
                    let mut node = InternalPage::<_, K>::new(node_guard.data_mut());
                    let (child, sep) = InternalPage::<_, K>::new(sibling_guard.data_mut())
                        .move_first_to_end_of(&mut node, &middle_key);
                    (Some(child), sep)
                }
                (false, false) => {
                    let mut node = InternalPage::<_, K>::new(node_guard.data_mut());
                    let (child, sep) = InternalPage::<_, K>::new(sibling_guard.data_mut())
                        .move_last_to_front_of(&mut node, &middle_key);
                    (Some(child), sep)
                }
            }
        };

        InternalPage::<_, K>::new(ctx.retained(parent_id).data_mut()).set_key_at(sep_index, &separator);
        if let Some(child) = moved_child {
            Self::set_parent(ctx, child, node_id);
        }
        debug!(
            "{}: redistributed between page {} and sibling {}",
            self.index_name, node_id, sibling_id
        );
    }

    /// Handles underflow at the root. Returns whether the old root page is
    /// now unreferenced and must be deleted.
    fn adjust_root(&self, ctx: &mut OperationContext<'_>, root_id: PageId) -> bool {
        let (is_leaf, size) = {
            let root = BTreePage::new(ctx.retained(root_id).data());
            (root.is_leaf(), root.size())
        };

        if !is_leaf && size == 1 {
            let child =
                InternalPage::<_, K>::new(ctx.retained(root_id).data_mut()).remove_and_return_only_child();
            Self::set_parent(ctx, child, INVALID_PAGE_ID);
            self.set_root(ctx, child);
            debug!("{}: root {} collapsed into {}", self.index_name, root_id, child);
            return true;
        }

        if is_leaf && size == 0 {
            self.set_root(ctx, INVALID_PAGE_ID);
            debug!("{}: last key removed, tree is empty", self.index_name);
            return true;
        }

        false
    }

    /// Exclusive-latch descent to the leaf for `key`. Ancestors and the root
    /// latch are released whenever the newly latched page is safe for `op`.
    fn descend_for_write(
        &self,
        root_id: PageId,
        key: &K,
        op: WriteOp,
        ctx: &mut OperationContext<'_>,
    ) -> Result<()> {
        let root = self.bpm.write_page(root_id)?;
        let safe = Self::is_safe(root.data(), op);
        ctx.push(root);
        if safe {
            ctx.release_ancestors();
        }

        loop {
            let child_id = match BTreeNode::<_, K, V>::parse(ctx.last().data())? {
                BTreeNode::Leaf(_) => return Ok(()),
                BTreeNode::Internal(node) => node.lookup(key, &self.comparator),
            };

            let child = self.bpm.write_page(child_id)?;
            let safe = Self::is_safe(child.data(), op);
            ctx.push(child);
            if safe {
                ctx.release_ancestors();
            }
        }
    }

    /// Whether `op` cannot propagate a structural change above this page.
    fn is_safe(data: &[u8], op: WriteOp) -> bool {
        let page = BTreePage::new(data);
        match op {
            WriteOp::Insert => page.size() < page.max_size(),
            WriteOp::Delete => page.size() > page.min_size() + 1,
        }
    }

    /// Write-latches `page_id` into the context unless it is already held.
    fn hold(&self, ctx: &mut OperationContext<'_>, page_id: PageId) -> Result<()> {
        if !ctx.holds(page_id) {
            let guard = self.bpm.write_page(page_id)?;
            ctx.push(guard);
        }
        Ok(())
    }

    /// Points `child` at `parent`. The child is held by the operation.
    fn set_parent(ctx: &mut OperationContext<'_>, child: PageId, parent: PageId) {
        BTreePage::new(ctx.retained(child).data_mut()).set_parent_page_id(parent);
    }

    /// Installs `root_id` and records it in the header page the operation
    /// holds. The record exists once the tree has had a root.
    fn set_root(&self, ctx: &mut OperationContext<'_>, root_id: PageId) {
        let recorded = HeaderPage::new(ctx.retained(HEADER_PAGE_ID).data_mut())
            .update_record(&self.index_name, root_id);
        if !recorded {
            warn!("{}: no header record for root {}", self.index_name, root_id);
        }
        ctx.set_root_id(root_id);
        trace!("{}: header root set to {}", self.index_name, root_id);
    }

    /// Single teardown per operation: release every latch and pin in
    /// acquisition order, then delete the pages the operation emptied.
    fn finish(&self, ctx: OperationContext<'_>) {
        for page_id in ctx.release_all() {
            if let Err(e) = self.bpm.delete_page(page_id) {
                warn!(
                    "{}: could not delete page {} after the operation: {}",
                    self.index_name, page_id, e
                );
            }
        }
    }
}

impl<K, V, C> BPlusTree<K, V, C>
where
    K: Storable + FromInteger,
    V: Storable + FromInteger,
    C: KeyComparator<K>,
{
    /// Inserts every whitespace-separated integer in the file as both key
    /// and value. Returns the number of new keys.
    pub fn insert_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut inserted = 0;
        for n in read_integers(path.as_ref())? {
            if self.insert(&K::from_integer(n), &V::from_integer(n))? {
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    /// Removes every whitespace-separated integer key in the file. Returns
    /// the number of keys that were present.
    pub fn remove_from_file(&self, path: impl AsRef<Path>) -> Result<usize> {
        let mut removed = 0;
        for n in read_integers(path.as_ref())? {
            if self.remove(&K::from_integer(n))? {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

fn read_integers(path: &Path) -> Result<Vec<i64>> {
    let text = std::fs::read_to_string(path)?;
    let mut out = Vec::new();
    for token in text.split_whitespace() {
        match token.parse::<i64>() {
            Ok(n) => out.push(n),
            Err(_) => {
                warn!("stopping at non-integer token {:?} in {}", token, path.display());
                break;
            }
        }
    }
    Ok(out)
}
