use std::collections::hash_map::Entry;
use std::hash::{BuildHasher, BuildHasherDefault, DefaultHasher, Hash};

use log::{debug, trace};
use parking_lot::Mutex;

use super::bucket::Bucket;
use crate::storage::hash_table::HashTable;

/// Number of hash bits available to discriminate buckets. A bucket whose
/// local depth has consumed all of them can no longer split and is marked
/// overflow instead.
const HASH_BITS: u32 = u64::BITS;

fn low_mask(depth: u32) -> u64 {
    if depth >= HASH_BITS {
        u64::MAX
    } else {
        (1u64 << depth) - 1
    }
}

/// In-memory hash table using extendible hashing.
///
/// The directory is indexed by the low `global_depth` bits of the key
/// hash. Each directory slot refers to a bucket holding at most
/// `bucket_size` pairs; several slots may share one bucket while its
/// local depth is below the global depth. Inserting into a full bucket
/// splits it and, when the bucket's new local depth exceeds the global
/// depth, doubles the directory.
///
/// Buckets live in an arena and the directory stores arena indices, so
/// slot aliasing is plain index sharing. A single mutex serializes every
/// operation; all methods take `&self`.
#[derive(Debug)]
pub struct ExtendibleHashTable<K, V, S = BuildHasherDefault<DefaultHasher>> {
    core: Mutex<Core<K, V, S>>,
}

#[derive(Debug)]
struct Core<K, V, S> {
    global_depth: u32,
    directory: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
    bucket_size: usize,
    pair_count: usize,
    hash_builder: S,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq,
{
    /// Creates an empty table with a directory of length one pointing at
    /// a single empty bucket.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, BuildHasherDefault::default())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Like [`ExtendibleHashTable::new`], with an explicit hash builder.
    /// The builder must hash consistently for the table's lifetime.
    pub fn with_hasher(bucket_size: usize, hash_builder: S) -> Self {
        Self {
            core: Mutex::new(Core {
                global_depth: 0,
                directory: vec![0],
                buckets: vec![Bucket::new(0, 0)],
                bucket_size,
                pair_count: 0,
                hash_builder,
            }),
        }
    }

    /// Looks up the value stored under `key`. Side-effect free.
    pub fn find(&self, key: &K) -> Option<V>
    where
        V: Clone,
    {
        self.core.lock().find(key).cloned()
    }

    /// Inserts or overwrites the pair. Overwriting never restructures the
    /// table; a first-time insert may split the target bucket and grow
    /// the directory.
    pub fn insert(&self, key: K, value: V) {
        self.core.lock().insert(key, value);
    }

    /// Deletes the pair under `key` if present and reports whether a pair
    /// was removed. Buckets are never merged and the directory never
    /// shrinks.
    pub fn remove(&self, key: &K) -> bool {
        self.core.lock().remove(key)
    }

    /// Number of hash bits the directory currently discriminates on.
    pub fn global_depth(&self) -> u32 {
        self.core.lock().global_depth
    }

    /// Local depth of the bucket behind the given directory slot, or
    /// `None` when the index is out of range.
    pub fn local_depth(&self, bucket_index: usize) -> Option<u32> {
        let core = self.core.lock();
        core.directory
            .get(bucket_index)
            .map(|&bucket_idx| core.buckets[bucket_idx].local_depth)
    }

    /// Number of distinct buckets reachable from the directory.
    pub fn num_buckets(&self) -> usize {
        self.core.lock().buckets.len()
    }

    /// Number of distinct keys stored.
    pub fn len(&self) -> usize {
        self.core.lock().pair_count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Asserts the structural invariants of the directory and every
    /// bucket. Panics on violation.
    pub fn verify_integrity(&self) {
        self.core.lock().verify_integrity();
    }
}

impl<K, V, S> Core<K, V, S>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    fn hash(&self, key: &K) -> u64 {
        self.hash_builder.hash_one(key)
    }

    fn directory_index(&self, hash: u64) -> usize {
        (hash & low_mask(self.global_depth)) as usize
    }

    fn find(&self, key: &K) -> Option<&V> {
        let slot = self.directory_index(self.hash(key));
        self.buckets[self.directory[slot]].items.get(key)
    }

    fn insert(&mut self, key: K, value: V) {
        let hash = self.hash(&key);
        let slot = self.directory_index(hash);
        let bucket_idx = self.directory[slot];

        match self.buckets[bucket_idx].items.entry(key) {
            Entry::Occupied(mut entry) => {
                entry.insert(value);
                return;
            }
            Entry::Vacant(entry) => {
                entry.insert(value);
                self.pair_count += 1;
            }
        }

        let bucket = &self.buckets[bucket_idx];
        if bucket.items.len() <= self.bucket_size || bucket.overflow {
            return;
        }

        let old_id = bucket.id;
        let old_depth = bucket.local_depth;
        if let Some(sibling) = self.split(bucket_idx) {
            let sibling_idx = self.buckets.len();
            self.buckets.push(sibling);
            self.install_split(bucket_idx, sibling_idx, old_id, old_depth);
        }
    }

    fn remove(&mut self, key: &K) -> bool {
        let slot = self.directory_index(self.hash(key));
        let bucket_idx = self.directory[slot];
        let removed = self.buckets[bucket_idx].items.remove(key).is_some();
        if removed {
            self.pair_count -= 1;
        }
        removed
    }

    /// Splits the bucket at `bucket_idx`, deepening it until its entries
    /// separate into two non-empty sides, and returns the sibling bucket.
    /// Returns `None` when every hash bit is consumed before the entries
    /// separate; the bucket is then marked overflow and restored to its
    /// pre-split depth and id, and the directory must not be touched.
    fn split(&mut self, bucket_idx: usize) -> Option<Bucket<K, V>> {
        let old_id = self.buckets[bucket_idx].id;
        let old_depth = self.buckets[bucket_idx].local_depth;
        let mut sibling = Bucket::new(0, old_depth);

        loop {
            let depth = {
                let bucket = &mut self.buckets[bucket_idx];
                bucket.local_depth += 1;
                bucket.local_depth
            };
            sibling.local_depth += 1;

            // Redistribute on the newly revealed discriminant bit: entries
            // whose hash has it set move to the sibling.
            let high_bit = 1u64 << (depth - 1);
            let entries: Vec<(K, V)> = self.buckets[bucket_idx].items.drain().collect();
            let mut kept = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                let hash = self.hash(&key);
                if hash & high_bit != 0 {
                    sibling.id = hash & low_mask(depth);
                    sibling.items.insert(key, value);
                } else {
                    kept.push((key, value));
                }
            }

            let bucket = &mut self.buckets[bucket_idx];
            bucket.items.extend(kept);

            if bucket.items.is_empty() {
                // Every entry had the bit set. Keep the entries in the
                // original bucket and let the sibling take the empty side.
                std::mem::swap(&mut bucket.items, &mut sibling.items);
                bucket.id = sibling.id;
            }

            if !sibling.items.is_empty() {
                debug!(
                    "split bucket {:#x} (depth {} -> {}) into {:#x} and {:#x}",
                    old_id, old_depth, depth, bucket.id, sibling.id
                );
                return Some(sibling);
            }

            if depth == HASH_BITS {
                bucket.overflow = true;
                bucket.local_depth = old_depth;
                bucket.id = old_id;
                debug!(
                    "bucket {:#x} exhausted all hash bits, marking overflow",
                    old_id
                );
                return None;
            }
        }
    }

    /// Rewires the directory after a successful split: grows it if the
    /// split bucket now discriminates on more bits than the directory
    /// does, then repoints every slot that used to alias the split
    /// bucket. Slot patterns matched by neither the bucket nor its
    /// sibling receive a fresh empty bucket of their own.
    fn install_split(&mut self, bucket_idx: usize, sibling_idx: usize, old_id: u64, old_depth: u32) {
        let new_depth = self.buckets[bucket_idx].local_depth;

        if new_depth > self.global_depth {
            for _ in 0..new_depth - self.global_depth {
                self.directory.extend_from_within(..);
            }
            self.global_depth = new_depth;
            trace!(
                "directory grew to {} slots (global depth {})",
                self.directory.len(),
                self.global_depth
            );
        }

        let step = 1usize << old_depth;
        let mask = low_mask(new_depth);
        let mut slot = old_id as usize;
        while slot < self.directory.len() {
            let pattern = slot as u64 & mask;
            if pattern == self.buckets[bucket_idx].id {
                self.directory[slot] = bucket_idx;
            } else if pattern == self.buckets[sibling_idx].id {
                self.directory[slot] = sibling_idx;
            } else {
                // The split jumped more than one level, leaving patterns
                // neither side covers. Give each its own empty bucket.
                self.directory[slot] = self.buckets.len();
                self.buckets.push(Bucket::new(slot as u64, self.global_depth));
            }
            slot += step;
        }
    }

    fn verify_integrity(&self) {
        assert_eq!(
            self.directory.len(),
            1usize << self.global_depth,
            "directory length must be 2^global_depth"
        );

        let mut slot_counts = vec![0usize; self.buckets.len()];
        for (slot, &bucket_idx) in self.directory.iter().enumerate() {
            let bucket = &self.buckets[bucket_idx];
            assert!(
                bucket.local_depth <= self.global_depth,
                "local depth exceeds global depth"
            );
            assert_eq!(
                slot as u64 & low_mask(bucket.local_depth),
                bucket.id,
                "slot {} does not match id of bucket {:#x}",
                slot,
                bucket.id
            );
            slot_counts[bucket_idx] += 1;
        }

        let mut pairs = 0;
        for (bucket, &count) in self.buckets.iter().zip(&slot_counts) {
            let expected = 1usize << (self.global_depth - bucket.local_depth);
            assert_eq!(
                count, expected,
                "bucket {:#x} referenced by {} slots, expected {}",
                bucket.id, count, expected
            );
            assert!(
                bucket.items.len() <= self.bucket_size || bucket.overflow,
                "bucket {:#x} over capacity without overflow flag",
                bucket.id
            );
            for key in bucket.items.keys() {
                assert_eq!(
                    self.hash(key) & low_mask(bucket.local_depth),
                    bucket.id,
                    "key hashed outside its bucket"
                );
            }
            pairs += bucket.items.len();
        }
        assert_eq!(pairs, self.pair_count, "pair count out of sync with buckets");
    }
}

impl<K, V, S> HashTable<K, V> for ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq + Send,
    V: Clone + Send,
    S: BuildHasher + Send,
{
    fn find(&self, key: &K) -> Option<V> {
        ExtendibleHashTable::find(self, key)
    }

    fn insert(&self, key: K, value: V) {
        ExtendibleHashTable::insert(self, key, value);
    }

    fn remove(&self, key: &K) -> bool {
        ExtendibleHashTable::remove(self, key)
    }

    fn len(&self) -> usize {
        ExtendibleHashTable::len(self)
    }
}
