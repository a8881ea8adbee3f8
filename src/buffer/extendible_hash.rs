use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use log::debug;
use parking_lot::Mutex;

use crate::common::{DEFAULT_BUCKET_SIZE, MAX_DIRECTORY_DEPTH};

/// A bucket holds up to `bucket_size` entries whose hashes agree on the low
/// `local_depth` bits.
#[derive(Debug)]
struct Bucket<K, V> {
    local_depth: u32,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(local_depth: u32, capacity: usize) -> Self {
        Self {
            local_depth,
            items: Vec::with_capacity(capacity),
        }
    }
}

#[derive(Debug)]
struct Inner<K, V> {
    global_depth: u32,
    bucket_size: usize,
    /// `2^global_depth` slots, each an index into `buckets`
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

/// Extendible hash table used as the buffer pool's page table.
///
/// The directory has `2^global_depth` slots and a key lands in the slot named
/// by the low `global_depth` bits of its hash. Several slots may share one
/// bucket. An overflowing bucket splits on the next hash bit; the directory
/// doubles only when that bucket's local depth already equals the global
/// depth. Buckets never merge back.
///
/// All operations are serialised by one table-wide mutex, so no caller can
/// observe a half-doubled directory.
pub struct ExtendibleHashTable<K, V> {
    inner: Mutex<Inner<K, V>>,
}

fn hash_of<K: Hash>(key: &K) -> u64 {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    hasher.finish()
}

fn slot_of(hash: u64, depth: u32) -> usize {
    (hash & ((1u64 << depth) - 1)) as usize
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with a single bucket of depth 0.
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");

        Self {
            inner: Mutex::new(Inner {
                global_depth: 0,
                bucket_size,
                directory: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
            }),
        }
    }

    /// Hash used to address the directory.
    pub fn hash_key(&self, key: &K) -> u64 {
        hash_of(key)
    }

    /// Returns the value mapped to `key`.
    pub fn find(&self, key: &K) -> Option<V> {
        let inner = self.inner.lock();
        let bucket = &inner.buckets[inner.directory[slot_of(hash_of(key), inner.global_depth)]];

        bucket
            .items
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    /// Inserts or overwrites the mapping for `key`, splitting buckets as needed.
    pub fn insert(&self, key: K, value: V) {
        let hash = hash_of(&key);
        let mut inner = self.inner.lock();

        loop {
            let bucket_idx = inner.directory[slot_of(hash, inner.global_depth)];
            let bucket_size = inner.bucket_size;
            let bucket = &mut inner.buckets[bucket_idx];

            if let Some(entry) = bucket.items.iter_mut().find(|(k, _)| *k == key) {
                entry.1 = value;
                return;
            }

            if bucket.items.len() < bucket_size || bucket.local_depth >= MAX_DIRECTORY_DEPTH {
                bucket.items.push((key, value));
                return;
            }

            inner.split_bucket(bucket_idx);
        }
    }

    /// Removes `key`. Returns whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let mut inner = self.inner.lock();
        let bucket_idx = inner.directory[slot_of(hash_of(key), inner.global_depth)];
        let bucket = &mut inner.buckets[bucket_idx];

        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.swap_remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn global_depth(&self) -> u32 {
        self.inner.lock().global_depth
    }

    /// Local depth of the bucket behind directory slot `slot`.
    pub fn local_depth(&self, slot: usize) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .directory
            .get(slot)
            .map(|&b| inner.buckets[b].local_depth)
    }

    pub fn num_buckets(&self) -> usize {
        self.inner.lock().buckets.len()
    }

    /// Total number of mappings.
    pub fn len(&self) -> usize {
        self.inner.lock().buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<K, V> Default for ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    fn default() -> Self {
        Self::new(DEFAULT_BUCKET_SIZE)
    }
}

impl<K: Hash, V> Inner<K, V> {
    /// Splits `bucket_idx` on bit `local_depth` of the hash, doubling the
    /// directory first when the bucket is already at global depth.
    fn split_bucket(&mut self, bucket_idx: usize) {
        let local = self.buckets[bucket_idx].local_depth;

        if local == self.global_depth {
            self.directory.extend_from_within(..);
            self.global_depth += 1;
            debug!(
                "page table directory doubled to global depth {}",
                self.global_depth
            );
        }

        let split_bit = 1u64 << local;
        let items = std::mem::take(&mut self.buckets[bucket_idx].items);
        let (stay, moved): (Vec<_>, Vec<_>) = items
            .into_iter()
            .partition(|(k, _)| hash_of(k) & split_bit == 0);

        let new_idx = self.buckets.len();
        {
            let bucket = &mut self.buckets[bucket_idx];
            bucket.local_depth = local + 1;
            bucket.items = stay;
        }
        self.buckets.push(Bucket {
            local_depth: local + 1,
            items: moved,
        });

        for (slot, target) in self.directory.iter_mut().enumerate() {
            if *target == bucket_idx && (slot as u64) & split_bit != 0 {
                *target = new_idx;
            }
        }

        debug!(
            "page table bucket {} split at depth {} into bucket {}",
            bucket_idx,
            local + 1,
            new_idx
        );
    }
}
