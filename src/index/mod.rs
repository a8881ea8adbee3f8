mod btree_check;
mod btree_index;
mod btree_internal_page;
mod btree_iterator;
mod btree_leaf_page;
mod btree_page;
mod context;
mod generic_key;
mod key_comparator;

pub use btree_check::TreeStats;
pub use btree_index::BPlusTree;
pub use btree_internal_page::InternalPage;
pub use btree_iterator::TreeIterator;
pub use btree_leaf_page::LeafPage;
pub use btree_page::{BTreeNode, BTreePage, PageType, TreePage, TreePageMut, HEADER_SIZE};
pub use generic_key::{FromInteger, GenericKey, Storable};
pub use key_comparator::{BytewiseComparator, IntegerComparator, KeyComparator, OrdComparator};
