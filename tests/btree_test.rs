//! End-to-end B+tree tests exercising the index through the public API,
//! including the structural invariants: sorted iteration, leaf-chain
//! integrity, uniform leaf depth, and pin balance across every operation.

use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use tempfile::TempDir;

use oxbase::btree::{
    BPlusTree, BytewiseComparator, GenericKey, InternalNode, LeafNode, NodeHeader, PageKind, Rid,
};
use oxbase::buffer::BufferPoolManager;
use oxbase::config::{PageId, INVALID_PAGE_ID};
use oxbase::storage::DiskManager;

const KEY_LEN: usize = 8;
type TestTree = BPlusTree<BytewiseComparator, KEY_LEN>;

fn key(v: u64) -> GenericKey<KEY_LEN> {
    GenericKey::from_u64(v)
}

fn rid(v: u64) -> Rid {
    Rid::new((v >> 16) as u32, v as u32)
}

fn setup(leaf_max: usize, internal_max: usize) -> (TempDir, Arc<BufferPoolManager>, TestTree) {
    let _ = env_logger::builder().is_test(true).try_init();
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::open(dir.path().join("btree.db")).unwrap();
    let pool = Arc::new(BufferPoolManager::new(64, 2, disk).unwrap());
    let tree = BPlusTree::new(
        "it_index",
        Arc::clone(&pool),
        BytewiseComparator,
        leaf_max,
        internal_max,
    )
    .unwrap();
    (dir, pool, tree)
}

/// Collects (depth, page id) for every leaf by descending from the root.
fn leaf_depths(
    pool: &BufferPoolManager,
    page_id: PageId,
    depth: usize,
    out: &mut Vec<(usize, PageId)>,
) {
    let guard = pool.fetch_page(page_id).unwrap();
    let header = NodeHeader::from_bytes(guard.data()).unwrap();
    match header.page_kind() {
        PageKind::Leaf => out.push((depth, page_id)),
        PageKind::Internal => {
            let node = InternalNode::<KEY_LEN>::from_page(guard.data()).unwrap();
            let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
            drop(guard);
            for child in children {
                leaf_depths(pool, child, depth + 1, out);
            }
        }
        PageKind::Invalid => panic!("corrupt page {page_id}"),
    }
}

/// Checks invariants 5-7: every leaf at the same depth, the leaf chain
/// visits every leaf exactly once left to right, and keys ascend strictly
/// across the whole chain.
fn assert_tree_well_formed(pool: &BufferPoolManager, tree: &TestTree) {
    if tree.root_page_id() == INVALID_PAGE_ID {
        assert!(tree.is_empty());
        return;
    }

    let mut leaves = Vec::new();
    leaf_depths(pool, tree.root_page_id(), 0, &mut leaves);
    let depth = leaves[0].0;
    assert!(
        leaves.iter().all(|&(d, _)| d == depth),
        "leaves at unequal depths: {leaves:?}"
    );

    // Walk the chain from the leftmost leaf.
    let mut chain = Vec::new();
    let mut previous_key: Option<u64> = None;
    let mut next = leaves[0].1;
    let mut total = 0usize;
    while next != INVALID_PAGE_ID {
        chain.push(next);
        let guard = pool.fetch_page(next).unwrap();
        let leaf = LeafNode::<KEY_LEN>::from_page(guard.data()).unwrap();
        for i in 0..leaf.size() {
            let k = leaf.key_at(i).to_u64();
            if let Some(prev) = previous_key {
                assert!(prev < k, "keys not strictly ascending: {prev} !< {k}");
            }
            previous_key = Some(k);
            total += 1;
        }
        next = leaf.next_page_id();
    }

    let tree_leaves: Vec<PageId> = leaves.iter().map(|&(_, id)| id).collect();
    assert_eq!(chain, tree_leaves, "chain order differs from tree order");
    assert_eq!(total, tree.len(), "chain entry count differs from len()");
}

#[test]
fn sequential_insert_builds_height_two_tree() {
    let (_dir, pool, mut tree) = setup(4, 4);
    for v in 1..=10u64 {
        assert!(tree.insert(&key(v), rid(v)).unwrap());
    }

    let collected: Vec<u64> = tree.iter().unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(collected, (1..=10).collect::<Vec<_>>());

    let mut leaves = Vec::new();
    leaf_depths(&pool, tree.root_page_id(), 0, &mut leaves);
    assert!(leaves.iter().all(|&(d, _)| d == 1), "expected height 2");

    let first = pool.fetch_page(leaves[0].1).unwrap();
    let first_leaf = LeafNode::<KEY_LEN>::from_page(first.data()).unwrap();
    assert_eq!(first_leaf.size(), 2);
    assert_eq!(first_leaf.key_at(0).to_u64(), 1);
    assert_eq!(first_leaf.key_at(1).to_u64(), 2);

    assert_tree_well_formed(&pool, &tree);
    assert_eq!(pool.total_pins(), 0);
}

#[test]
fn random_insert_of_1000_keys() {
    let (_dir, pool, mut tree) = setup(8, 8);
    let mut rng = rand::rngs::StdRng::seed_from_u64(0x0BA5E);

    // Distinct keys with gaps, inserted in random order.
    let mut keys: Vec<u64> = (0..1000u64).map(|i| i * 7 + 13).collect();
    keys.shuffle(&mut rng);

    for &v in &keys {
        assert!(tree.insert(&key(v), rid(v)).unwrap(), "insert {v}");
    }
    assert_eq!(tree.len(), 1000);

    for &v in &keys {
        let found = tree.get_value(&key(v)).unwrap();
        assert_eq!(found, Some(rid(v)), "lookup {v}");
    }
    // Keys between the inserted ones are absent.
    for v in (0..1000u64).map(|i| i * 7 + 14) {
        assert_eq!(tree.get_value(&key(v)).unwrap(), None, "phantom {v}");
    }

    let collected: Vec<u64> = tree.iter().unwrap().map(|(k, _)| k.to_u64()).collect();
    let mut sorted = keys.clone();
    sorted.sort_unstable();
    assert_eq!(collected, sorted);

    assert_tree_well_formed(&pool, &tree);
    assert_eq!(pool.total_pins(), 0);
}

#[test]
fn range_scan_from_midpoint() {
    let (_dir, _pool, mut tree) = setup(4, 4);
    for v in [1u64, 3, 5, 7, 9] {
        tree.insert(&key(v), rid(v)).unwrap();
    }

    let from_four: Vec<u64> = tree
        .iter_from(&key(4))
        .unwrap()
        .map(|(k, _)| k.to_u64())
        .collect();
    assert_eq!(from_four, vec![5, 7, 9]);
}

#[test]
fn duplicate_insert_preserves_original() {
    let (_dir, _pool, mut tree) = setup(4, 4);
    assert!(tree.insert(&key(5), Rid::new(1, 1)).unwrap());
    assert!(!tree.insert(&key(5), Rid::new(2, 2)).unwrap());
    assert_eq!(tree.get_value(&key(5)).unwrap(), Some(Rid::new(1, 1)));
}

#[test]
fn insert_find_remove_round_trip() {
    let (_dir, _pool, mut tree) = setup(4, 4);
    assert!(tree.insert(&key(11), rid(11)).unwrap());
    assert_eq!(tree.get_value(&key(11)).unwrap(), Some(rid(11)));
    assert!(tree.remove(&key(11)).unwrap());
    assert_eq!(tree.get_value(&key(11)).unwrap(), None);
    assert!(!tree.remove(&key(11)).unwrap());
}

#[test]
fn random_churn_keeps_tree_well_formed() {
    let (_dir, pool, mut tree) = setup(5, 5);
    let mut rng = rand::rngs::StdRng::seed_from_u64(7);

    let mut keys: Vec<u64> = (1..=400u64).collect();
    keys.shuffle(&mut rng);
    for &v in &keys {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    assert_tree_well_formed(&pool, &tree);

    // Delete a random two thirds.
    keys.shuffle(&mut rng);
    let (gone, kept) = keys.split_at(keys.len() * 2 / 3);
    for &v in gone {
        assert!(tree.remove(&key(v)).unwrap(), "remove {v}");
    }
    assert_tree_well_formed(&pool, &tree);
    assert_eq!(pool.total_pins(), 0);

    for &v in gone {
        assert_eq!(tree.get_value(&key(v)).unwrap(), None);
    }
    for &v in kept {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "kept {v}");
    }

    // Drain the rest; the tree must come back to empty and regrow.
    for &v in kept {
        assert!(tree.remove(&key(v)).unwrap());
    }
    assert!(tree.is_empty());
    assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);

    for v in 1..=50u64 {
        tree.insert(&key(v), rid(v)).unwrap();
    }
    assert_tree_well_formed(&pool, &tree);
}

#[test]
fn pin_balance_across_mixed_workload() {
    let (_dir, pool, mut tree) = setup(4, 4);
    for v in 1..=200u64 {
        tree.insert(&key(v), rid(v)).unwrap();
        assert_eq!(pool.total_pins(), 0, "pins leaked after insert {v}");
    }
    for v in (1..=200u64).step_by(3) {
        tree.remove(&key(v)).unwrap();
        assert_eq!(pool.total_pins(), 0, "pins leaked after remove {v}");
    }
    for v in 1..=200u64 {
        tree.get_value(&key(v)).unwrap();
    }
    let _ = tree.iter().unwrap().count();
    let _ = tree.iter_from(&key(100)).unwrap().count();
    let _ = tree.to_dot().unwrap();
    assert_eq!(pool.total_pins(), 0);
}

#[test]
fn wide_keys_work_end_to_end() {
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::open(dir.path().join("wide.db")).unwrap();
    let pool = Arc::new(BufferPoolManager::new(64, 2, disk).unwrap());
    let mut tree = BPlusTree::<BytewiseComparator, 32>::new(
        "wide_index",
        Arc::clone(&pool),
        BytewiseComparator,
        6,
        6,
    )
    .unwrap();

    for v in (0..100u64).rev() {
        let k = GenericKey::<32>::from_u64(v);
        assert!(tree.insert(&k, Rid::new(v as u32, 0)).unwrap());
    }
    let collected: Vec<u64> = tree.iter().unwrap().map(|(k, _)| k.to_u64()).collect();
    assert_eq!(collected, (0..100).collect::<Vec<_>>());
    assert_eq!(pool.total_pins(), 0);
}

#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("persist.db");

    {
        let disk = DiskManager::open(&path).unwrap();
        let pool = Arc::new(BufferPoolManager::new(64, 2, disk).unwrap());
        let mut tree: TestTree =
            BPlusTree::new("persist_idx", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();
        for v in 1..=100u64 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        pool.flush_all_pages().unwrap();
    }

    let disk = DiskManager::open(&path).unwrap();
    let pool = Arc::new(BufferPoolManager::new(64, 2, disk).unwrap());
    let tree: TestTree =
        BPlusTree::new("persist_idx", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();
    assert_eq!(tree.len(), 100);
    for v in 1..=100u64 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "key {v}");
    }
    assert_tree_well_formed(&pool, &tree);
}

#[test]
fn survives_tiny_buffer_pool() {
    // Eight frames force constant eviction during structural changes.
    let dir = tempfile::tempdir().unwrap();
    let disk = DiskManager::open(dir.path().join("tiny.db")).unwrap();
    let pool = Arc::new(BufferPoolManager::new(8, 2, disk).unwrap());
    let mut tree: TestTree =
        BPlusTree::new("tiny_idx", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();

    for v in 1..=300u64 {
        assert!(tree.insert(&key(v), rid(v)).unwrap(), "insert {v}");
    }
    for v in 1..=300u64 {
        assert_eq!(tree.get_value(&key(v)).unwrap(), Some(rid(v)), "find {v}");
    }
    for v in (1..=300u64).step_by(2) {
        assert!(tree.remove(&key(v)).unwrap(), "remove {v}");
    }
    assert_tree_well_formed(&pool, &tree);
    assert_eq!(pool.total_pins(), 0);
}
