use super::types::PageId;

/// Size of a page in bytes (4 KB)
pub const PAGE_SIZE: usize = 4096;

/// Invalid page ID constant
pub const INVALID_PAGE_ID: PageId = PageId(u32::MAX);

/// Page 0 holds the catalog of `(index name, root page id)` records
pub const HEADER_PAGE_ID: PageId = PageId(0);

/// Default buffer pool size (number of frames)
pub const DEFAULT_BUFFER_POOL_SIZE: usize = 1024;

/// Default number of entries a page-table bucket holds before it splits
pub const DEFAULT_BUCKET_SIZE: usize = 8;

/// Local depth at which a page-table bucket stops splitting
pub const MAX_DIRECTORY_DEPTH: u32 = 16;

/// Fixed width of an index name inside a header page record
pub const INDEX_NAME_SIZE: usize = 32;
