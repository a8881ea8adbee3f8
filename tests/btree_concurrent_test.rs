//! Multi-threaded B+Tree tests

use std::sync::Arc;
use std::thread;

use crabdb::buffer::BufferPoolManager;
use crabdb::index::{BPlusTree, OrdComparator};
use crabdb::storage::disk::DiskManager;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::NamedTempFile;

type Tree = BPlusTree<i64, i64, OrdComparator>;

const THREADS: i64 = 8;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn create_tree(pool_size: usize, leaf_max: usize, internal_max: usize) -> (Arc<Tree>, NamedTempFile) {
    let temp_file = NamedTempFile::new().unwrap();
    let dm = Arc::new(DiskManager::new(temp_file.path()).unwrap());
    let bpm = Arc::new(BufferPoolManager::new(pool_size, dm));
    let tree = Tree::with_max_sizes("concurrent", bpm, OrdComparator, leaf_max, internal_max).unwrap();
    (Arc::new(tree), temp_file)
}

fn run_threads<F>(tree: &Arc<Tree>, f: F)
where
    F: Fn(&Tree, i64) + Send + Sync + 'static,
{
    let f = Arc::new(f);
    let handles: Vec<_> = (0..THREADS)
        .map(|t| {
            let tree = Arc::clone(tree);
            let f = Arc::clone(&f);
            thread::spawn(move || f(&tree, t))
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }
}

#[test]
fn test_concurrent_insert_then_lookup() {
    init_logger();
    let (tree, _temp) = create_tree(256, 32, 32);
    const PER_THREAD: i64 = 1250;

    run_threads(&tree, |tree, t| {
        let mut keys: Vec<i64> = (t * PER_THREAD..(t + 1) * PER_THREAD).collect();
        keys.shuffle(&mut StdRng::seed_from_u64(t as u64));
        for k in keys {
            assert!(tree.insert(&k, &(k * 10)).unwrap());
        }
    });

    run_threads(&tree, |tree, _| {
        for k in 0..THREADS * PER_THREAD {
            assert_eq!(tree.get_value(&k).unwrap(), Some(k * 10), "key {} lost", k);
        }
    });

    let stats = tree.check_quiescent().unwrap();
    assert_eq!(stats.key_count, (THREADS * PER_THREAD) as usize);
    let keys: Vec<_> = tree.begin().map(|e| e.unwrap().0).collect();
    assert_eq!(keys, (0..THREADS * PER_THREAD).collect::<Vec<_>>());
}

#[test]
fn test_concurrent_interleaved_keys() {
    init_logger();
    let (tree, _temp) = create_tree(256, 4, 4);

    // every thread writes into the same leaves
    run_threads(&tree, |tree, t| {
        for i in 0..200 {
            let k = i * THREADS + t;
            tree.insert(&k, &k).unwrap();
        }
    });

    let stats = tree.check_quiescent().unwrap();
    assert_eq!(stats.key_count, 200 * THREADS as usize);
}

#[test]
fn test_concurrent_mixed_insert_remove() {
    init_logger();
    let (tree, _temp) = create_tree(256, 4, 5);

    for k in 0..1600 {
        tree.insert(&k, &k).unwrap();
    }

    // odd threads remove their range, even threads insert a fresh one
    run_threads(&tree, |tree, t| {
        let base = t * 200;
        for k in base..base + 200 {
            if t % 2 == 1 {
                assert!(tree.remove(&k).unwrap());
            } else {
                assert!(tree.insert(&(k + 10_000), &k).unwrap());
            }
        }
    });

    tree.check_quiescent().unwrap();
    for t in 0..THREADS {
        let base = t * 200;
        for k in base..base + 200 {
            let present = tree.get_value(&k).unwrap().is_some();
            assert_eq!(present, t % 2 == 0, "key {}", k);
            if t % 2 == 0 {
                assert_eq!(tree.get_value(&(k + 10_000)).unwrap(), Some(k));
            }
        }
    }
}

#[test]
fn test_scans_during_writes() {
    init_logger();
    let (tree, _temp) = create_tree(256, 4, 4);

    // keys below 1000 stay put; writers churn keys above it
    for k in 0..1000 {
        tree.insert(&k, &k).unwrap();
    }

    run_threads(&tree, |tree, t| {
        if t < THREADS / 2 {
            for round in 0..5 {
                let keys: Vec<_> = tree.begin().map(|e| e.unwrap().0).collect();
                assert!(keys.windows(2).all(|w| w[0] < w[1]), "scan out of order");
                let stable: Vec<_> = keys.iter().copied().filter(|&k| k < 1000).collect();
                assert_eq!(stable.len(), 1000, "round {}", round);
            }
        } else {
            let base = 1000 + t * 500;
            for k in base..base + 300 {
                tree.insert(&k, &k).unwrap();
            }
            for k in base..base + 300 {
                tree.remove(&k).unwrap();
            }
        }
    });

    let stats = tree.check_quiescent().unwrap();
    assert_eq!(stats.key_count, 1000);
}
