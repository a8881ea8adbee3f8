//! CrabDB - storage and indexing core of a disk-oriented RDBMS in Rust
//!
//! This crate provides the layers an index needs below the query engine:
//! pages live on disk, a buffer pool caches them in memory, and a concurrent
//! B+Tree stores unique keys in those pages.
//!
//! # Architecture
//!
//! - **Storage Layer** (`storage`): Disk I/O and the header page
//!   - `DiskManager`: Reads and writes fixed-size pages in one database file
//!   - `DiskScheduler`: Background worker that serves page I/O requests
//!   - `HeaderPage`: Page 0, mapping index names to root page ids
//!
//! - **Buffer Pool** (`buffer`): Memory management for database pages
//!   - `BufferPoolManager`: Fetches pages from disk and caches them in frames
//!   - `ExtendibleHashTable`: Page table from page id to frame
//!   - `LruReplacer`: Picks the least recently unpinned frame for eviction
//!   - `ReadPageGuard`/`WritePageGuard`: RAII guards holding a pin and a page latch
//!
//! - **Index** (`index`): B+Tree over buffer pool pages
//!   - `BPlusTree`: Unique-key index with latch crabbing
//!   - `LeafPage`/`InternalPage`: Typed views over tree pages
//!   - `TreeIterator`: Ordered forward scan
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use crabdb::buffer::BufferPoolManager;
//! use crabdb::index::{BPlusTree, OrdComparator};
//! use crabdb::storage::disk::DiskManager;
//!
//! let disk_manager = Arc::new(DiskManager::new("test.db").unwrap());
//! let bpm = Arc::new(BufferPoolManager::new(64, disk_manager));
//!
//! let tree: BPlusTree<i64, i64, OrdComparator> =
//!     BPlusTree::new("orders_pk", bpm.clone(), OrdComparator).unwrap();
//! tree.insert(&42, &4200).unwrap();
//! assert_eq!(tree.get_value(&42).unwrap(), Some(4200));
//!
//! for entry in tree.begin() {
//!     let (key, value) = entry.unwrap();
//!     println!("{} -> {}", key, value);
//! }
//!
//! bpm.flush_all_pages().unwrap();
//! ```

pub mod buffer;
pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used types at the crate root
pub use common::{CrabError, PageId, RecordId, Result, SlotId};
