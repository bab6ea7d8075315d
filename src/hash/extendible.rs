//! # Extendible Hash Table
//!
//! A directory of `2^G` slots (G = global depth) indexes into a bucket
//! arena. Each bucket holds up to `bucket_size` entries and carries a local
//! depth `L <= G`: the number of low hash bits that are meaningful for it.
//! A bucket with `L < G` is referenced by exactly `2^(G-L)` directory slots.
//!
//! ```text
//!   G = 2
//!   dir[00] ─────> B0 (L=2)   keys …00
//!   dir[01] ──┐
//!   dir[11] ──┼──> B1 (L=1)   keys …1
//!   dir[10] ─────> B2 (L=2)   keys …10
//! ```
//!
//! Lookup masks the key's hash to the low G bits and delegates to the
//! bucket at that slot. Insertion is upsert; when the target bucket is full
//! and the key is new, the bucket splits:
//!
//! 1. If the bucket already uses all G bits (`L == G`), the directory
//!    doubles (append a copy of itself) and G grows by one.
//! 2. The bucket's entries redistribute over two buckets of depth `L + 1`
//!    by bit `L` of their hash. The low half reuses the old arena slot, the
//!    high half is appended, so the bucket count grows by exactly one.
//! 3. Every directory slot whose low `L` bits match the old bucket re-points
//!    to one of the halves by bit `L` of the slot index.
//! 4. The insert retries. Each split adds one hash bit toward separating
//!    the colliding keys, so the loop runs at most as long as their common
//!    low-bit prefix.
//!
//! Removal erases the entry if present; buckets never merge and the
//! directory never shrinks.
//!
//! ## Hashing
//!
//! Generic over a `BuildHasher` (default `hashbrown`'s). Tests inject an
//! identity hasher to make bucket placement predictable.
//!
//! ## Thread Safety
//!
//! All public operations serialize on one internal mutex and perform no
//! I/O while holding it.

use core::hash::{BuildHasher, Hash};

use hashbrown::DefaultHashBuilder;
use parking_lot::Mutex;

#[derive(Debug)]
struct Bucket<K, V> {
    depth: u32,
    items: Vec<(K, V)>,
}

impl<K: Eq, V> Bucket<K, V> {
    fn new(depth: u32, capacity: usize) -> Self {
        Self {
            depth,
            items: Vec::with_capacity(capacity),
        }
    }

    fn find(&self, key: &K) -> Option<&V> {
        self.items.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Upsert. Returns false when the bucket is full and the key is new.
    fn insert(&mut self, key: K, value: V, capacity: usize) -> bool {
        if let Some(slot) = self.items.iter_mut().find(|(k, _)| *k == key) {
            slot.1 = value;
            return true;
        }
        if self.items.len() >= capacity {
            return false;
        }
        self.items.push((key, value));
        true
    }

    fn remove(&mut self, key: &K) -> bool {
        match self.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                self.items.remove(pos);
                true
            }
            None => false,
        }
    }
}

#[derive(Debug)]
struct TableState<K, V> {
    global_depth: u32,
    /// Directory of `2^global_depth` indices into `buckets`. Aliasing
    /// directory slots share an index.
    dir: Vec<usize>,
    buckets: Vec<Bucket<K, V>>,
}

pub struct ExtendibleHashTable<K, V, S = DefaultHashBuilder> {
    state: Mutex<TableState<K, V>>,
    hasher: S,
    bucket_size: usize,
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    /// Creates a table with one empty bucket and global depth 0.
    pub fn new(bucket_size: usize) -> Self {
        Self::with_hasher(bucket_size, DefaultHashBuilder::default())
    }
}

impl<K, V, S> ExtendibleHashTable<K, V, S>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher,
{
    pub fn with_hasher(bucket_size: usize, hasher: S) -> Self {
        assert!(bucket_size >= 1, "bucket size must be at least 1");
        Self {
            state: Mutex::new(TableState {
                global_depth: 0,
                dir: vec![0],
                buckets: vec![Bucket::new(0, bucket_size)],
            }),
            hasher,
            bucket_size,
        }
    }

    fn hash(&self, key: &K) -> u64 {
        self.hasher.hash_one(key)
    }

    fn dir_index(hash: u64, global_depth: u32) -> usize {
        (hash as usize) & ((1usize << global_depth) - 1)
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let hash = self.hash(key);
        let state = self.state.lock();
        let bucket = state.dir[Self::dir_index(hash, state.global_depth)];
        state.buckets[bucket].find(key).cloned()
    }

    /// Inserts or overwrites. Splits the target bucket (doubling the
    /// directory as needed) until the entry fits.
    pub fn insert(&self, key: K, value: V) {
        let hash = self.hash(&key);
        let mut state = self.state.lock();
        loop {
            let slot = Self::dir_index(hash, state.global_depth);
            let bucket = state.dir[slot];
            if state.buckets[bucket].insert(key.clone(), value.clone(), self.bucket_size) {
                return;
            }

            if state.buckets[bucket].depth == state.global_depth {
                state.dir.extend_from_within(..);
                state.global_depth += 1;
            }
            self.split_bucket(&mut state, slot);
        }
    }

    /// Splits the bucket referenced by directory slot `slot` into two
    /// buckets of depth `L + 1`, redistributing entries by bit `L` of their
    /// hash. The low half reuses the old arena index.
    fn split_bucket(&self, state: &mut TableState<K, V>, slot: usize) {
        let low = state.dir[slot];
        let depth = state.buckets[low].depth;
        let mask = 1usize << depth;

        let items = std::mem::take(&mut state.buckets[low].items);
        state.buckets[low].depth = depth + 1;
        let high = state.buckets.len();
        state.buckets.push(Bucket::new(depth + 1, self.bucket_size));

        for (key, value) in items {
            let target = if (self.hash(&key) as usize) & mask != 0 {
                high
            } else {
                low
            };
            state.buckets[target].items.push((key, value));
        }

        // Re-point every slot whose low `depth` bits match the split bucket.
        let mut i = slot & (mask - 1);
        while i < state.dir.len() {
            state.dir[i] = if i & mask != 0 { high } else { low };
            i += mask;
        }
    }

    /// Removes the entry for `key`, reporting whether it was present.
    pub fn remove(&self, key: &K) -> bool {
        let hash = self.hash(key);
        let mut state = self.state.lock();
        let bucket = state.dir[Self::dir_index(hash, state.global_depth)];
        state.buckets[bucket].remove(key)
    }

    /// Number of hash bits used by the directory.
    pub fn global_depth(&self) -> u32 {
        self.state.lock().global_depth
    }

    /// Number of hash bits used by the bucket behind directory slot
    /// `dir_index`.
    pub fn local_depth(&self, dir_index: usize) -> u32 {
        let state = self.state.lock();
        state.buckets[state.dir[dir_index]].depth
    }

    pub fn num_buckets(&self) -> usize {
        self.state.lock().buckets.len()
    }

    /// Total entries across all buckets.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.buckets.iter().map(|b| b.items.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
