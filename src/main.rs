use std::sync::Arc;

use crabdb::buffer::BufferPoolManager;
use crabdb::common::DEFAULT_BUFFER_POOL_SIZE;
use crabdb::index::{BPlusTree, OrdComparator};
use crabdb::storage::disk::DiskManager;
use crabdb::{PageId, RecordId, SlotId};

fn main() {
    env_logger::init();

    println!("CrabDB - B+Tree index over a buffer pool");
    println!("========================================\n");

    let db_path = "demo.db";

    let disk_manager = Arc::new(DiskManager::new(db_path).expect("Failed to create disk manager"));
    println!("Created disk manager for: {}", db_path);

    let bpm = Arc::new(BufferPoolManager::new(DEFAULT_BUFFER_POOL_SIZE, disk_manager));
    println!("Created buffer pool manager with {} frames\n", DEFAULT_BUFFER_POOL_SIZE);

    // small nodes so the demo shows a few levels
    let tree: BPlusTree<i64, RecordId, OrdComparator> =
        BPlusTree::with_max_sizes("demo_index", bpm.clone(), OrdComparator, 4, 4)
            .expect("Failed to create index");

    for key in [10, 3, 27, 14, 8, 21, 1, 30, 17, 5, 12, 25] {
        let rid = RecordId::new(PageId::new(key as u32), SlotId::new(0));
        tree.insert(&key, &rid).expect("Failed to insert");
    }
    println!("Inserted 12 keys:\n{}", tree.dump(false).expect("Failed to dump"));

    for key in [14, 3, 21] {
        tree.remove(&key).expect("Failed to remove");
    }
    println!("After removing 14, 3, 21:\n{}", tree.dump(true).expect("Failed to dump"));

    println!("Lookup 17: {:?}", tree.get_value(&17).expect("Failed lookup"));
    println!("Lookup 14: {:?}", tree.get_value(&14).expect("Failed lookup"));

    print!("\nScan from 10:");
    for entry in tree.begin_at(&10) {
        let (key, _) = entry.expect("Failed to scan");
        print!(" {}", key);
    }
    println!();

    let stats = tree.check().expect("Index check failed");
    println!("\nTree stats: {:?}", stats);

    bpm.flush_all_pages().expect("Failed to flush pages");
    println!("Flushed all pages to disk");

    // Clean up
    drop(tree);
    drop(bpm);
    std::fs::remove_file(db_path).ok();
    println!("\nDemo completed successfully!");
}
