//! Integration tests for the extendible hash page table

use std::sync::Arc;
use std::thread;

use crabdb::buffer::ExtendibleHashTable;

#[test]
fn test_hash_table_many_keys() {
    let table = ExtendibleHashTable::new(4);

    for i in 0..1000u32 {
        table.insert(i, i * 3);
    }
    assert_eq!(table.len(), 1000);
    for i in 0..1000u32 {
        assert_eq!(table.find(&i), Some(i * 3));
    }

    // every directory slot's bucket is no deeper than the directory
    let global = table.global_depth();
    for slot in 0..(1usize << global) {
        let local = table.local_depth(slot).unwrap();
        assert!(local <= global);
    }
    assert!(table.num_buckets() <= 1 << global);

    for i in (0..1000u32).step_by(2) {
        assert!(table.remove(&i));
    }
    assert_eq!(table.len(), 500);
    assert_eq!(table.find(&10), None);
    assert_eq!(table.find(&11), Some(33));
}

#[test]
fn test_hash_table_concurrent() {
    let table = Arc::new(ExtendibleHashTable::new(8));

    let handles: Vec<_> = (0..4u64)
        .map(|t| {
            let table = Arc::clone(&table);
            thread::spawn(move || {
                for i in 0..500 {
                    let key = t * 1000 + i;
                    table.insert(key, key + 1);
                    assert_eq!(table.find(&key), Some(key + 1));
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(table.len(), 2000);
}
