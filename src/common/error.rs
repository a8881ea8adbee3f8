use thiserror::Error;

use super::types::PageId;

/// Database error types
#[derive(Error, Debug)]
pub enum CrabError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Page {0} not found")]
    PageNotFound(PageId),

    #[error("Out of memory: no free or evictable frame in the buffer pool")]
    OutOfMemory,

    #[error("Invalid page ID: {0}")]
    InvalidPageId(PageId),

    #[error("Page {0} is still pinned")]
    PageStillPinned(PageId),

    #[error("Disk scheduler error: {0}")]
    DiskScheduler(String),

    #[error("Header page is full")]
    HeaderPageFull,

    #[error("Index name too long: {0}")]
    IndexNameTooLong(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Page {page_id} has page type {found}, expected {expected}")]
    InvalidPageType {
        page_id: PageId,
        found: u8,
        expected: &'static str,
    },

    #[error("Index corrupted: {0}")]
    IndexCorrupted(String),
}

pub type Result<T> = std::result::Result<T, CrabError>;
