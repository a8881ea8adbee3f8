use std::marker::PhantomData;

use crate::common::{CrabError, PageId, Result, PAGE_SIZE};

use super::{InternalPage, LeafPage, Storable};

/// Size of the header shared by leaf and internal pages
pub const HEADER_SIZE: usize = 24;

const PAGE_TYPE_OFFSET: usize = 0;
const SIZE_OFFSET: usize = 4;
const MAX_SIZE_OFFSET: usize = 8;
const PARENT_PAGE_OFFSET: usize = 12;
const PAGE_ID_OFFSET: usize = 16;
pub(crate) const NEXT_PAGE_OFFSET: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PageType {
    Invalid = 0,
    Leaf = 1,
    Internal = 2,
}

impl PageType {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            1 => PageType::Leaf,
            2 => PageType::Internal,
            _ => PageType::Invalid,
        }
    }
}

pub(crate) fn read_u32(data: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes(data[offset..offset + 4].try_into().unwrap())
}

pub(crate) fn write_u32(data: &mut [u8], offset: usize, value: u32) {
    data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
}

/// Header fields common to every tree page.
///
/// ```text
/// | page_type (1) | pad (3) | size (4) | max_size (4) | parent (4) | page_id (4) | next (4) |
/// ```
pub trait TreePage {
    fn raw(&self) -> &[u8];

    fn page_type(&self) -> PageType {
        PageType::from_u8(self.raw()[PAGE_TYPE_OFFSET])
    }

    fn is_leaf(&self) -> bool {
        self.page_type() == PageType::Leaf
    }

    /// Number of live entries.
    fn size(&self) -> usize {
        read_u32(self.raw(), SIZE_OFFSET) as usize
    }

    fn max_size(&self) -> usize {
        read_u32(self.raw(), MAX_SIZE_OFFSET) as usize
    }

    fn parent_page_id(&self) -> PageId {
        PageId::new(read_u32(self.raw(), PARENT_PAGE_OFFSET))
    }

    fn page_id(&self) -> PageId {
        PageId::new(read_u32(self.raw(), PAGE_ID_OFFSET))
    }

    fn is_root(&self) -> bool {
        !self.parent_page_id().is_valid()
    }

    /// Fewest entries the page may hold once an operation completes.
    fn min_size(&self) -> usize {
        match (self.is_root(), self.is_leaf()) {
            (true, true) => 1,
            (true, false) => 2,
            (false, _) => self.max_size() / 2,
        }
    }
}

pub trait TreePageMut: TreePage {
    fn raw_mut(&mut self) -> &mut [u8];

    fn set_page_type(&mut self, page_type: PageType) {
        self.raw_mut()[PAGE_TYPE_OFFSET] = page_type as u8;
    }

    fn set_size(&mut self, size: usize) {
        write_u32(self.raw_mut(), SIZE_OFFSET, size as u32);
    }

    fn increase_size(&mut self, delta: isize) {
        let size = self.size() as isize + delta;
        assert!(size >= 0, "page size would become negative");
        self.set_size(size as usize);
    }

    fn set_max_size(&mut self, max_size: usize) {
        write_u32(self.raw_mut(), MAX_SIZE_OFFSET, max_size as u32);
    }

    fn set_parent_page_id(&mut self, parent: PageId) {
        write_u32(self.raw_mut(), PARENT_PAGE_OFFSET, parent.as_u32());
    }

    fn set_page_id(&mut self, page_id: PageId) {
        write_u32(self.raw_mut(), PAGE_ID_OFFSET, page_id.as_u32());
    }

    /// Clears the page and writes a fresh header.
    fn init_header(&mut self, page_type: PageType, page_id: PageId, parent: PageId, max_size: usize) {
        self.raw_mut().fill(0);
        self.set_page_type(page_type);
        self.set_size(0);
        self.set_max_size(max_size);
        self.set_parent_page_id(parent);
        self.set_page_id(page_id);
    }
}

/// Untyped view over any tree page. Used where only the header matters.
pub struct BTreePage<B> {
    data: B,
}

impl<B: AsRef<[u8]>> BTreePage<B> {
    pub fn new(data: B) -> Self {
        assert_eq!(data.as_ref().len(), PAGE_SIZE);
        Self { data }
    }
}

impl<B: AsRef<[u8]>> TreePage for BTreePage<B> {
    fn raw(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> TreePageMut for BTreePage<B> {
    fn raw_mut(&mut self) -> &mut [u8] {
        self.data.as_mut()
    }
}

/// A tree page resolved to its kind by the header tag.
pub enum BTreeNode<B, K, V> {
    Leaf(LeafPage<B, K, V>),
    Internal(InternalPage<B, K>),
}

impl<B: AsRef<[u8]>, K: Storable, V: Storable> BTreeNode<B, K, V> {
    /// Reads the tag and wraps the page in the matching view. Fails with
    /// `InvalidPageType` on anything other than a leaf or internal page.
    pub fn parse(data: B) -> Result<Self> {
        let header = BTreePage::new(data.as_ref());
        match header.page_type() {
            PageType::Leaf => Ok(BTreeNode::Leaf(LeafPage::new(data))),
            PageType::Internal => Ok(BTreeNode::Internal(InternalPage::new(data))),
            PageType::Invalid => Err(CrabError::InvalidPageType {
                page_id: header.page_id(),
                found: header.raw()[PAGE_TYPE_OFFSET],
                expected: "leaf or internal",
            }),
        }
    }

    pub fn header(&self) -> &dyn TreePage {
        match self {
            BTreeNode::Leaf(leaf) => leaf,
            BTreeNode::Internal(internal) => internal,
        }
    }
}

pub(crate) fn assert_page_type(data: &[u8], expected: PageType) {
    let found = BTreePage::new(data).page_type();
    assert_eq!(
        found,
        expected,
        "page {} is not a {:?} page",
        BTreePage::new(data).page_id(),
        expected
    );
}

pub(crate) type Marker<T> = PhantomData<fn() -> T>;
