//! # B+Tree
//!
//! The tree proper: point lookup, unique-key insert with split propagation,
//! delete with redistribution and merge, and the entry points for range
//! iteration. All page access goes through the buffer pool; every fetched
//! page is released by its guard with the dirty flag of the work done on it.
//!
//! ## Descent
//!
//! Lookups walk from the root, at each internal page picking the largest
//! separator `<=` the probe key. Mutating operations record the descent
//! path (page id + child slot) on a small stack; splits and merges climb
//! that stack instead of chasing parent pointers, though parent ids are
//! still kept correct in every page header.
//!
//! ## Insert
//!
//! ```text
//! 1. Descend to the leaf, recording the path
//! 2. Duplicate key: return false
//! 3. Room in the leaf: insert in sorted position, done
//! 4. Full leaf: merge entries + newcomer into a scratch array,
//!    keep the low half, move the high half to a fresh leaf,
//!    relink the chain, push (right's first key, right id) up
//! 5. A full parent splits the same way; the separator slot-0 key of the
//!    right half is what gets promoted. A root split grows the tree by
//!    one level and rewrites the header-page record.
//! ```
//!
//! ## Delete
//!
//! After removal a non-root page must hold at least `ceil(max/2)` entries.
//! A deficient page first tries to borrow from its left, then right,
//! sibling (rotating the parent separator for internal pages). When
//! neither can spare an entry the page merges with a sibling, the parent
//! separator folds down (internal) or disappears (leaf), the leaf chain
//! is repaired, the emptied page is returned to the pool, and the parent
//! is rebalanced in turn. An internal root left with a single child is
//! replaced by that child; an emptied leaf root leaves the tree empty.
//!
//! ## Not Thread-Safe
//!
//! Structural operations assume external exclusion; see the crate docs.

use std::sync::Arc;

use eyre::{bail, ensure, Result};
use log::debug;
use smallvec::SmallVec;

use crate::btree::internal::{internal_capacity, InternalNode, InternalNodeMut};
use crate::btree::iterator::TreeIterator;
use crate::btree::key::{GenericKey, KeyComparator, Rid};
use crate::btree::leaf::{leaf_capacity, LeafNode, LeafNodeMut, SearchResult};
use crate::btree::page::{NodeHeader, PageKind};
use crate::buffer::{BufferPoolManager, PageGuard};
use crate::config::{PageId, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::storage::{HeaderPage, HeaderPageMut};

/// Descent path: (internal page id, child slot taken). Tree depth stays
/// tiny, so the stack almost never spills.
type Path = SmallVec<[(PageId, usize); 8]>;

pub struct BPlusTree<C, const N: usize> {
    name: String,
    pool: Arc<BufferPoolManager>,
    comparator: C,
    leaf_max: usize,
    internal_max: usize,
    root_page_id: PageId,
    len: usize,
}

impl<C, const N: usize> BPlusTree<C, N>
where
    C: KeyComparator<N>,
{
    /// Opens the index named `name` over `pool`. If the header page
    /// already records a root for this name the existing tree is adopted;
    /// otherwise the tree starts empty and materializes on first insert.
    pub fn new(
        name: impl Into<String>,
        pool: Arc<BufferPoolManager>,
        comparator: C,
        leaf_max: usize,
        internal_max: usize,
    ) -> Result<Self> {
        let name = name.into();
        ensure!(
            (3..=leaf_capacity(N)).contains(&leaf_max),
            "leaf fanout {} out of range 3..={} for {}-byte keys",
            leaf_max,
            leaf_capacity(N),
            N
        );
        ensure!(
            (3..=internal_capacity(N)).contains(&internal_max),
            "internal fanout {} out of range 3..={} for {}-byte keys",
            internal_max,
            internal_capacity(N),
            N
        );

        let root_page_id = {
            let guard = pool.fetch_page(HEADER_PAGE_ID)?;
            let header = HeaderPage::from_page(guard.data())?;
            header.find_record(&name)?.unwrap_or(INVALID_PAGE_ID)
        };

        let mut tree = Self {
            name,
            pool,
            comparator,
            leaf_max,
            internal_max,
            root_page_id,
            len: 0,
        };
        if root_page_id != INVALID_PAGE_ID {
            tree.len = tree.count_entries()?;
        }
        Ok(tree)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn root_page_id(&self) -> PageId {
        self.root_page_id
    }

    /// Live (key, rid) pairs in the tree.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Point lookup.
    pub fn get_value(&self, key: &GenericKey<N>) -> Result<Option<Rid>> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(None);
        }
        let guard = self.find_leaf(key, None)?;
        let leaf = LeafNode::<N>::from_page(guard.data())?;
        Ok(match leaf.search(key, &self.comparator) {
            SearchResult::Found(pos) => Some(leaf.rid_at(pos)),
            SearchResult::NotFound(_) => None,
        })
    }

    /// Inserts a unique key. Returns false (and changes nothing) when the
    /// key is already present.
    pub fn insert(&mut self, key: &GenericKey<N>, rid: Rid) -> Result<bool> {
        if self.root_page_id == INVALID_PAGE_ID {
            self.start_new_tree()?;
        }

        let mut path = Path::new();
        let mut guard = self.find_leaf(key, Some(&mut path))?;
        let leaf = LeafNode::<N>::from_page(guard.data())?;
        let pos = match leaf.search(key, &self.comparator) {
            SearchResult::Found(_) => return Ok(false),
            SearchResult::NotFound(pos) => pos,
        };

        if leaf.size() < self.leaf_max {
            {
                let mut leaf = LeafNodeMut::<N>::from_page(guard.data_mut())?;
                leaf.insert_at(pos, key, &rid);
            }
            drop(guard);
            self.len += 1;
            return Ok(true);
        }

        let left_id = guard.page_id();
        let (separator, right_id) = self.split_leaf(&mut guard, pos, key, rid)?;
        drop(guard);
        self.insert_into_parent(path, left_id, separator, right_id)?;
        self.len += 1;
        Ok(true)
    }

    /// Removes `key`, rebalancing so every non-root page keeps its minimum
    /// occupancy. Returns false when the key is absent.
    pub fn remove(&mut self, key: &GenericKey<N>) -> Result<bool> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut path = Path::new();
        let mut guard = self.find_leaf(key, Some(&mut path))?;
        let leaf = LeafNode::<N>::from_page(guard.data())?;
        let pos = match leaf.search(key, &self.comparator) {
            SearchResult::Found(pos) => pos,
            SearchResult::NotFound(_) => return Ok(false),
        };
        let leaf_id = guard.page_id();
        {
            let mut leaf = LeafNodeMut::<N>::from_page(guard.data_mut())?;
            leaf.remove_at(pos);
        }
        drop(guard);
        self.len -= 1;
        self.rebalance(leaf_id, path)?;
        Ok(true)
    }

    /// Forward iterator over the whole tree in key order.
    pub fn iter(&self) -> Result<TreeIterator<'_, N>> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(TreeIterator::exhausted(&self.pool));
        }
        let mut guard = self.pool.fetch_page(self.root_page_id)?;
        loop {
            let header = NodeHeader::from_bytes(guard.data())?;
            match header.page_kind() {
                PageKind::Leaf => return Ok(TreeIterator::positioned(&self.pool, guard, 0)),
                PageKind::Internal => {
                    let node = InternalNode::<N>::from_page(guard.data())?;
                    guard = self.pool.fetch_page(node.child_at(0))?;
                }
                PageKind::Invalid => bail!("corrupt page {} in tree descent", guard.page_id()),
            }
        }
    }

    /// Forward iterator starting at the first key `>= key`.
    pub fn iter_from(&self, key: &GenericKey<N>) -> Result<TreeIterator<'_, N>> {
        if self.root_page_id == INVALID_PAGE_ID {
            return Ok(TreeIterator::exhausted(&self.pool));
        }
        let guard = self.find_leaf(key, None)?;
        let leaf = LeafNode::<N>::from_page(guard.data())?;
        let pos = match leaf.search(key, &self.comparator) {
            SearchResult::Found(pos) | SearchResult::NotFound(pos) => pos,
        };
        Ok(TreeIterator::positioned(&self.pool, guard, pos))
    }

    // ------------------------------------------------------------------
    // Descent
    // ------------------------------------------------------------------

    /// Walks from the root to the leaf that would hold `key`, optionally
    /// recording (page id, child slot) for each internal page crossed.
    /// Every internal page is unpinned as soon as its child is fetched.
    fn find_leaf(&self, key: &GenericKey<N>, mut path: Option<&mut Path>) -> Result<PageGuard<'_>> {
        let mut guard = self.pool.fetch_page(self.root_page_id)?;
        loop {
            let header = NodeHeader::from_bytes(guard.data())?;
            match header.page_kind() {
                PageKind::Leaf => return Ok(guard),
                PageKind::Internal => {
                    let node = InternalNode::<N>::from_page(guard.data())?;
                    let slot = node.child_lookup(key, &self.comparator);
                    if let Some(path) = path.as_mut() {
                        path.push((guard.page_id(), slot));
                    }
                    let child = node.child_at(slot);
                    guard = self.pool.fetch_page(child)?;
                }
                PageKind::Invalid => bail!("corrupt page {} in tree descent", guard.page_id()),
            }
        }
    }

    // ------------------------------------------------------------------
    // Insert path
    // ------------------------------------------------------------------

    fn start_new_tree(&mut self) -> Result<()> {
        let mut guard = self.pool.new_page()?;
        let root_id = guard.page_id();
        LeafNodeMut::<N>::init(guard.data_mut(), root_id, self.leaf_max)?;
        drop(guard);
        self.root_page_id = root_id;
        self.sync_root_record()?;
        debug!("index {}: new root leaf {}", self.name, root_id);
        Ok(())
    }

    fn leaf_min(&self) -> usize {
        self.leaf_max.div_ceil(2)
    }

    fn internal_min(&self) -> usize {
        self.internal_max.div_ceil(2)
    }

    /// Splits a full leaf around the incoming entry. The original page
    /// keeps the low `min` entries; the rest move to a fresh right
    /// sibling spliced into the chain. Returns the promote pair.
    fn split_leaf(
        &self,
        guard: &mut PageGuard<'_>,
        pos: usize,
        key: &GenericKey<N>,
        rid: Rid,
    ) -> Result<(GenericKey<N>, PageId)> {
        let view = LeafNode::<N>::from_page(guard.data())?;
        let mut entries: Vec<(GenericKey<N>, Rid)> = (0..view.size())
            .map(|i| (view.key_at(i), view.rid_at(i)))
            .collect();
        entries.insert(pos, (*key, rid));
        let old_next = view.next_page_id();
        let min = self.leaf_min();
        let total = entries.len();

        let mut right_guard = self.pool.new_page()?;
        let right_id = right_guard.page_id();
        {
            let mut right = LeafNodeMut::<N>::init(right_guard.data_mut(), right_id, self.leaf_max)?;
            for (i, (k, r)) in entries[min..].iter().enumerate() {
                right.write_entry(i, k, r);
            }
            right.set_size(total - min);
            right.set_next_page_id(old_next);
        }
        drop(right_guard);

        {
            let mut left = LeafNodeMut::<N>::from_page(guard.data_mut())?;
            for (i, (k, r)) in entries[..min].iter().enumerate() {
                left.write_entry(i, k, r);
            }
            left.set_size(min);
            left.set_next_page_id(right_id);
        }
        debug!(
            "index {}: split leaf {} -> {}",
            self.name,
            guard.page_id(),
            right_id
        );
        Ok((entries[min].0, right_id))
    }

    /// Splits a full internal page around an incoming (separator, child)
    /// entry. The right half's slot-0 key is the separator promoted to the
    /// next level; its child array is re-parented to the new page.
    fn split_internal(
        &self,
        guard: &mut PageGuard<'_>,
        slot: usize,
        separator: &GenericKey<N>,
        right_child: PageId,
    ) -> Result<(GenericKey<N>, PageId)> {
        let view = InternalNode::<N>::from_page(guard.data())?;
        let mut entries: Vec<(GenericKey<N>, PageId)> = (0..view.size())
            .map(|i| (view.key_at(i), view.child_at(i)))
            .collect();
        entries.insert(slot, (*separator, right_child));
        let min = self.internal_min();
        let total = entries.len();

        let mut right_guard = self.pool.new_page()?;
        let right_id = right_guard.page_id();
        {
            let mut right =
                InternalNodeMut::<N>::init(right_guard.data_mut(), right_id, self.internal_max)?;
            for (i, (k, c)) in entries[min..].iter().enumerate() {
                right.write_entry(i, k, *c);
            }
            right.set_size(total - min);
        }
        drop(right_guard);

        {
            let mut left = InternalNodeMut::<N>::from_page(guard.data_mut())?;
            for (i, (k, c)) in entries[..min].iter().enumerate() {
                left.write_entry(i, k, *c);
            }
            left.set_size(min);
        }

        for (_, child) in &entries[min..] {
            self.set_parent(*child, right_id)?;
        }
        debug!(
            "index {}: split internal {} -> {}",
            self.name,
            guard.page_id(),
            right_id
        );
        Ok((entries[min].0, right_id))
    }

    /// Climbs the recorded path inserting promote pairs, splitting parents
    /// as needed. An empty path means the split page was the root and the
    /// tree grows a level.
    fn insert_into_parent(
        &mut self,
        mut path: Path,
        mut left_id: PageId,
        mut separator: GenericKey<N>,
        mut right_id: PageId,
    ) -> Result<()> {
        loop {
            let Some((parent_id, _)) = path.pop() else {
                let mut root_guard = self.pool.new_page()?;
                let root_id = root_guard.page_id();
                {
                    let mut root =
                        InternalNodeMut::<N>::init(root_guard.data_mut(), root_id, self.internal_max)?;
                    root.set_size(2);
                    root.write_entry(0, &GenericKey::zeroed(), left_id);
                    root.write_entry(1, &separator, right_id);
                }
                drop(root_guard);
                self.set_parent(left_id, root_id)?;
                self.set_parent(right_id, root_id)?;
                self.root_page_id = root_id;
                self.sync_root_record()?;
                debug!("index {}: root split, new root {}", self.name, root_id);
                return Ok(());
            };

            self.set_parent(right_id, parent_id)?;
            let mut parent_guard = self.pool.fetch_page(parent_id)?;
            let view = InternalNode::<N>::from_page(parent_guard.data())?;
            let slot = view.separator_slot(&separator, &self.comparator);

            if view.size() < self.internal_max {
                let mut parent = InternalNodeMut::<N>::from_page(parent_guard.data_mut())?;
                parent.insert_at(slot, &separator, right_id);
                return Ok(());
            }

            let (new_separator, new_right) =
                self.split_internal(&mut parent_guard, slot, &separator, right_id)?;
            drop(parent_guard);
            left_id = parent_id;
            separator = new_separator;
            right_id = new_right;
        }
    }

    // ------------------------------------------------------------------
    // Delete path
    // ------------------------------------------------------------------

    /// Restores minimum occupancy at `page_id` and its ancestors after a
    /// removal, climbing the recorded descent path.
    fn rebalance(&mut self, mut page_id: PageId, mut path: Path) -> Result<()> {
        loop {
            let guard = self.pool.fetch_page(page_id)?;
            let header = NodeHeader::from_bytes(guard.data())?;
            let kind = header.page_kind();
            let size = header.size() as usize;
            let min = header.min_size() as usize;
            drop(guard);

            if page_id == self.root_page_id {
                return self.adjust_root(page_id, kind, size);
            }
            if size >= min {
                return Ok(());
            }

            let Some((parent_id, child_idx)) = path.pop() else {
                bail!(
                    "rebalance of non-root page {} without a recorded parent",
                    page_id
                );
            };

            if self.try_redistribute(page_id, parent_id, child_idx, kind)? {
                return Ok(());
            }
            self.merge_with_sibling(page_id, parent_id, child_idx, kind)?;
            page_id = parent_id;
        }
    }

    /// Root pages are exempt from minimum occupancy, but an internal root
    /// reduced to a single child hands the tree to that child, and an
    /// emptied leaf root leaves the tree empty.
    fn adjust_root(&mut self, root_id: PageId, kind: PageKind, size: usize) -> Result<()> {
        match kind {
            PageKind::Internal if size == 1 => {
                let guard = self.pool.fetch_page(root_id)?;
                let child = InternalNode::<N>::from_page(guard.data())?.child_at(0);
                drop(guard);
                self.set_parent(child, INVALID_PAGE_ID)?;
                self.pool.delete_page(root_id)?;
                self.root_page_id = child;
                self.sync_root_record()?;
                debug!("index {}: root collapsed into {}", self.name, child);
            }
            PageKind::Leaf if size == 0 => {
                self.pool.delete_page(root_id)?;
                self.root_page_id = INVALID_PAGE_ID;
                self.sync_root_record()?;
                debug!("index {}: tree emptied", self.name);
            }
            _ => {}
        }
        Ok(())
    }

    /// Borrows one entry from a sibling with spare occupancy, left first.
    /// Returns false when neither sibling can give one up.
    fn try_redistribute(
        &self,
        page_id: PageId,
        parent_id: PageId,
        child_idx: usize,
        kind: PageKind,
    ) -> Result<bool> {
        let mut parent_guard = self.pool.fetch_page(parent_id)?;
        let parent = InternalNode::<N>::from_page(parent_guard.data())?;
        let parent_size = parent.size();
        let left_id = (child_idx > 0).then(|| parent.child_at(child_idx - 1));
        let right_id = (child_idx + 1 < parent_size).then(|| parent.child_at(child_idx + 1));

        if let Some(left_id) = left_id {
            let mut left_guard = self.pool.fetch_page(left_id)?;
            let lheader = NodeHeader::from_bytes(left_guard.data())?;
            if (lheader.size() as usize) > (lheader.min_size() as usize) {
                match kind {
                    PageKind::Leaf => self.borrow_from_left_leaf(
                        page_id,
                        &mut left_guard,
                        &mut parent_guard,
                        child_idx,
                    )?,
                    _ => self.borrow_from_left_internal(
                        page_id,
                        &mut left_guard,
                        &mut parent_guard,
                        child_idx,
                    )?,
                }
                return Ok(true);
            }
        }

        if let Some(right_id) = right_id {
            let mut right_guard = self.pool.fetch_page(right_id)?;
            let rheader = NodeHeader::from_bytes(right_guard.data())?;
            if (rheader.size() as usize) > (rheader.min_size() as usize) {
                match kind {
                    PageKind::Leaf => self.borrow_from_right_leaf(
                        page_id,
                        &mut right_guard,
                        &mut parent_guard,
                        child_idx,
                    )?,
                    _ => self.borrow_from_right_internal(
                        page_id,
                        &mut right_guard,
                        &mut parent_guard,
                        child_idx,
                    )?,
                }
                return Ok(true);
            }
        }

        Ok(false)
    }

    /// Moves the left sibling's last entry to the front of the deficient
    /// leaf; the parent separator becomes the moved key.
    fn borrow_from_left_leaf(
        &self,
        page_id: PageId,
        left_guard: &mut PageGuard<'_>,
        parent_guard: &mut PageGuard<'_>,
        child_idx: usize,
    ) -> Result<()> {
        let (key, rid, left_size) = {
            let left = LeafNode::<N>::from_page(left_guard.data())?;
            let last = left.size() - 1;
            (left.key_at(last), left.rid_at(last), left.size())
        };
        LeafNodeMut::<N>::from_page(left_guard.data_mut())?.set_size(left_size - 1);

        let mut node_guard = self.pool.fetch_page(page_id)?;
        LeafNodeMut::<N>::from_page(node_guard.data_mut())?.insert_at(0, &key, &rid);
        drop(node_guard);

        InternalNodeMut::<N>::from_page(parent_guard.data_mut())?.set_key_at(child_idx, &key);
        Ok(())
    }

    /// Moves the right sibling's first entry to the end of the deficient
    /// leaf; the parent separator becomes the right sibling's new first key.
    fn borrow_from_right_leaf(
        &self,
        page_id: PageId,
        right_guard: &mut PageGuard<'_>,
        parent_guard: &mut PageGuard<'_>,
        child_idx: usize,
    ) -> Result<()> {
        let (key, rid) = {
            let right = LeafNode::<N>::from_page(right_guard.data())?;
            (right.key_at(0), right.rid_at(0))
        };
        let new_first = {
            let mut right = LeafNodeMut::<N>::from_page(right_guard.data_mut())?;
            right.remove_at(0);
            right.as_view().key_at(0)
        };

        let mut node_guard = self.pool.fetch_page(page_id)?;
        {
            let mut node = LeafNodeMut::<N>::from_page(node_guard.data_mut())?;
            let size = node.size();
            node.insert_at(size, &key, &rid);
        }
        drop(node_guard);

        InternalNodeMut::<N>::from_page(parent_guard.data_mut())?
            .set_key_at(child_idx + 1, &new_first);
        Ok(())
    }

    /// Rotates through the parent: the separator drops into the deficient
    /// internal page, the left sibling's last child moves over, and the
    /// left sibling's last key replaces the separator.
    fn borrow_from_left_internal(
        &self,
        page_id: PageId,
        left_guard: &mut PageGuard<'_>,
        parent_guard: &mut PageGuard<'_>,
        child_idx: usize,
    ) -> Result<()> {
        let separator = InternalNode::<N>::from_page(parent_guard.data())?.key_at(child_idx);
        let (moved_key, moved_child, left_size) = {
            let left = InternalNode::<N>::from_page(left_guard.data())?;
            let last = left.size() - 1;
            (left.key_at(last), left.child_at(last), left.size())
        };
        InternalNodeMut::<N>::from_page(left_guard.data_mut())?.set_size(left_size - 1);

        let mut node_guard = self.pool.fetch_page(page_id)?;
        {
            let mut node = InternalNodeMut::<N>::from_page(node_guard.data_mut())?;
            node.insert_at(0, &GenericKey::zeroed(), moved_child);
            // The old sentinel child now sits at slot 1 under the folded-down
            // separator.
            node.set_key_at(1, &separator);
        }
        drop(node_guard);
        self.set_parent(moved_child, page_id)?;

        InternalNodeMut::<N>::from_page(parent_guard.data_mut())?.set_key_at(child_idx, &moved_key);
        Ok(())
    }

    /// Mirror image of `borrow_from_left_internal` taking the right
    /// sibling's first child.
    fn borrow_from_right_internal(
        &self,
        page_id: PageId,
        right_guard: &mut PageGuard<'_>,
        parent_guard: &mut PageGuard<'_>,
        child_idx: usize,
    ) -> Result<()> {
        let separator = InternalNode::<N>::from_page(parent_guard.data())?.key_at(child_idx + 1);
        let moved_child = InternalNode::<N>::from_page(right_guard.data())?.child_at(0);
        let new_separator = {
            let mut right = InternalNodeMut::<N>::from_page(right_guard.data_mut())?;
            let key = right.as_view().key_at(1);
            right.remove_at(0);
            key
        };

        let mut node_guard = self.pool.fetch_page(page_id)?;
        {
            let mut node = InternalNodeMut::<N>::from_page(node_guard.data_mut())?;
            let size = node.size();
            node.insert_at(size, &separator, moved_child);
        }
        drop(node_guard);
        self.set_parent(moved_child, page_id)?;

        InternalNodeMut::<N>::from_page(parent_guard.data_mut())?
            .set_key_at(child_idx + 1, &new_separator);
        Ok(())
    }

    /// Folds the deficient page into its left sibling (or its right
    /// sibling into it when it is the leftmost child) and removes the
    /// separator entry from the parent. The emptied page is deleted.
    fn merge_with_sibling(
        &self,
        page_id: PageId,
        parent_id: PageId,
        child_idx: usize,
        kind: PageKind,
    ) -> Result<()> {
        let mut parent_guard = self.pool.fetch_page(parent_id)?;
        let parent = InternalNode::<N>::from_page(parent_guard.data())?;
        let (left_id, right_id, separator_slot) = if child_idx > 0 {
            (parent.child_at(child_idx - 1), page_id, child_idx)
        } else {
            (page_id, parent.child_at(child_idx + 1), child_idx + 1)
        };

        match kind {
            PageKind::Leaf => self.merge_leaves(left_id, right_id)?,
            _ => {
                let separator = parent.key_at(separator_slot);
                self.merge_internals(left_id, right_id, &separator)?;
            }
        }

        InternalNodeMut::<N>::from_page(parent_guard.data_mut())?.remove_at(separator_slot);
        drop(parent_guard);
        self.pool.delete_page(right_id)?;
        debug!(
            "index {}: merged page {} into {}",
            self.name, right_id, left_id
        );
        Ok(())
    }

    fn merge_leaves(&self, left_id: PageId, right_id: PageId) -> Result<()> {
        let mut right_guard = self.pool.fetch_page(right_id)?;
        let (entries, right_next) = {
            let right = LeafNode::<N>::from_page(right_guard.data())?;
            let entries: Vec<(GenericKey<N>, Rid)> = (0..right.size())
                .map(|i| (right.key_at(i), right.rid_at(i)))
                .collect();
            (entries, right.next_page_id())
        };
        {
            let mut right = LeafNodeMut::<N>::from_page(right_guard.data_mut())?;
            right.set_size(0);
        }
        drop(right_guard);

        let mut left_guard = self.pool.fetch_page(left_id)?;
        let mut left = LeafNodeMut::<N>::from_page(left_guard.data_mut())?;
        let base = left.size();
        for (i, (k, r)) in entries.iter().enumerate() {
            left.write_entry(base + i, k, r);
        }
        left.set_size(base + entries.len());
        left.set_next_page_id(right_next);
        Ok(())
    }

    fn merge_internals(
        &self,
        left_id: PageId,
        right_id: PageId,
        separator: &GenericKey<N>,
    ) -> Result<()> {
        let mut right_guard = self.pool.fetch_page(right_id)?;
        let entries: Vec<(GenericKey<N>, PageId)> = {
            let right = InternalNode::<N>::from_page(right_guard.data())?;
            (0..right.size())
                .map(|i| (right.key_at(i), right.child_at(i)))
                .collect()
        };
        {
            let mut right = InternalNodeMut::<N>::from_page(right_guard.data_mut())?;
            right.set_size(0);
        }
        drop(right_guard);

        let mut left_guard = self.pool.fetch_page(left_id)?;
        {
            let mut left = InternalNodeMut::<N>::from_page(left_guard.data_mut())?;
            let base = left.size();
            // The parent separator folds down as the key over the right
            // half's sentinel child.
            left.write_entry(base, separator, entries[0].1);
            for (i, (k, c)) in entries.iter().enumerate().skip(1) {
                left.write_entry(base + i, k, *c);
            }
            left.set_size(base + entries.len());
        }
        drop(left_guard);

        for (_, child) in &entries {
            self.set_parent(*child, left_id)?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Shared helpers
    // ------------------------------------------------------------------

    fn set_parent(&self, page_id: PageId, parent_id: PageId) -> Result<()> {
        let mut guard = self.pool.fetch_page(page_id)?;
        NodeHeader::from_bytes_mut(guard.data_mut())?.set_parent_page_id(parent_id);
        Ok(())
    }

    /// Upserts this index's root record on the header page. Called on
    /// every root change.
    fn sync_root_record(&self) -> Result<()> {
        let mut guard = self.pool.fetch_page(HEADER_PAGE_ID)?;
        let mut header = HeaderPageMut::from_page(guard.data_mut())?;
        if !header.update_record(&self.name, self.root_page_id)? {
            ensure!(
                header.insert_record(&self.name, self.root_page_id)?,
                "header page is full, cannot record root of index {}",
                self.name
            );
        }
        Ok(())
    }

    /// Walks the leaf chain counting entries. Used when adopting an
    /// existing tree from the header page.
    fn count_entries(&self) -> Result<usize> {
        let mut count = 0usize;
        let mut guard = self.pool.fetch_page(self.root_page_id)?;
        loop {
            let header = NodeHeader::from_bytes(guard.data())?;
            match header.page_kind() {
                PageKind::Leaf => break,
                PageKind::Internal => {
                    let node = InternalNode::<N>::from_page(guard.data())?;
                    guard = self.pool.fetch_page(node.child_at(0))?;
                }
                PageKind::Invalid => bail!("corrupt page {} in tree descent", guard.page_id()),
            }
        }
        loop {
            let leaf = LeafNode::<N>::from_page(guard.data())?;
            count += leaf.size();
            let next = leaf.next_page_id();
            if next == INVALID_PAGE_ID {
                break;
            }
            guard = self.pool.fetch_page(next)?;
        }
        Ok(count)
    }

    // ------------------------------------------------------------------
    // Debug surface
    // ------------------------------------------------------------------

    /// Renders the tree as a GraphViz document. Not part of the storage
    /// contract; meant for eyeballing small trees in tests.
    pub fn to_dot(&self) -> Result<String> {
        let mut out = String::from("digraph BPlusTree {\n  node [shape=record];\n");
        if self.root_page_id != INVALID_PAGE_ID {
            self.dot_page(self.root_page_id, &mut out)?;
        }
        out.push_str("}\n");
        Ok(out)
    }

    fn dot_page(&self, page_id: PageId, out: &mut String) -> Result<()> {
        let guard = self.pool.fetch_page(page_id)?;
        let header = NodeHeader::from_bytes(guard.data())?;
        match header.page_kind() {
            PageKind::Leaf => {
                let leaf = LeafNode::<N>::from_page(guard.data())?;
                let keys: Vec<String> = (0..leaf.size()).map(|i| leaf.key_at(i).to_string()).collect();
                out.push_str(&format!(
                    "  page_{} [label=\"L{}|{}\" color=green];\n",
                    page_id,
                    page_id,
                    keys.join("|")
                ));
                if leaf.next_page_id() != INVALID_PAGE_ID {
                    out.push_str(&format!(
                        "  page_{} -> page_{} [style=dashed constraint=false];\n",
                        page_id,
                        leaf.next_page_id()
                    ));
                }
                Ok(())
            }
            PageKind::Internal => {
                let node = InternalNode::<N>::from_page(guard.data())?;
                let mut labels = vec![String::from("*")];
                labels.extend((1..node.size()).map(|i| node.key_at(i).to_string()));
                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                out.push_str(&format!(
                    "  page_{} [label=\"I{}|{}\"];\n",
                    page_id,
                    page_id,
                    labels.join("|")
                ));
                drop(guard);
                for child in children {
                    out.push_str(&format!("  page_{} -> page_{};\n", page_id, child));
                    self.dot_page(child, out)?;
                }
                Ok(())
            }
            PageKind::Invalid => bail!("corrupt page {} while rendering", page_id),
        }
    }

    /// Dumps the tree to stdout, one page per line, indented by depth.
    pub fn print_tree(&self) -> Result<()> {
        if self.root_page_id == INVALID_PAGE_ID {
            println!("<empty tree>");
            return Ok(());
        }
        self.print_page(self.root_page_id, 0)
    }

    fn print_page(&self, page_id: PageId, depth: usize) -> Result<()> {
        let guard = self.pool.fetch_page(page_id)?;
        let header = NodeHeader::from_bytes(guard.data())?;
        let indent = "  ".repeat(depth);
        match header.page_kind() {
            PageKind::Leaf => {
                let leaf = LeafNode::<N>::from_page(guard.data())?;
                let keys: Vec<String> = (0..leaf.size()).map(|i| leaf.key_at(i).to_string()).collect();
                println!(
                    "{}leaf {} next={} [{}]",
                    indent,
                    page_id,
                    leaf.next_page_id(),
                    keys.join(", ")
                );
                Ok(())
            }
            PageKind::Internal => {
                let node = InternalNode::<N>::from_page(guard.data())?;
                let keys: Vec<String> = (1..node.size()).map(|i| node.key_at(i).to_string()).collect();
                let children: Vec<PageId> = (0..node.size()).map(|i| node.child_at(i)).collect();
                println!("{}internal {} [{}]", indent, page_id, keys.join(", "));
                drop(guard);
                for child in children {
                    self.print_page(child, depth + 1)?;
                }
                Ok(())
            }
            PageKind::Invalid => bail!("corrupt page {} while printing", page_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::key::BytewiseComparator;
    use crate::storage::DiskManager;
    use tempfile::tempdir;

    type TestTree = BPlusTree<BytewiseComparator, 8>;

    fn key(v: u64) -> GenericKey<8> {
        GenericKey::from_u64(v)
    }

    fn rid(v: u64) -> Rid {
        Rid::new(v as u32, 0)
    }

    fn make_tree(leaf_max: usize, internal_max: usize) -> (tempfile::TempDir, TestTree) {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("index.db")).unwrap();
        let pool = Arc::new(BufferPoolManager::new(32, 2, disk).unwrap());
        let tree =
            BPlusTree::new("test_index", pool, BytewiseComparator, leaf_max, internal_max).unwrap();
        (dir, tree)
    }

    fn collect_keys(tree: &TestTree) -> Vec<u64> {
        tree.iter().unwrap().map(|(k, _)| k.to_u64()).collect()
    }

    #[test]
    fn empty_tree_finds_nothing() {
        let (_dir, tree) = make_tree(4, 4);
        assert!(tree.is_empty());
        assert_eq!(tree.get_value(&key(1)).unwrap(), None);
        assert_eq!(collect_keys(&tree), Vec::<u64>::new());
    }

    #[test]
    fn insert_then_get() {
        let (_dir, mut tree) = make_tree(4, 4);
        assert!(tree.insert(&key(42), rid(7)).unwrap());
        let found = tree.get_value(&key(42)).unwrap().unwrap();
        assert_eq!(found.page_id(), 7);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn duplicate_insert_keeps_first_value() {
        let (_dir, mut tree) = make_tree(4, 4);
        assert!(tree.insert(&key(5), rid(1)).unwrap());
        assert!(!tree.insert(&key(5), rid(2)).unwrap());
        assert_eq!(tree.get_value(&key(5)).unwrap().unwrap().page_id(), 1);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn sequential_insert_splits_into_expected_leaves() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in 1..=10u64 {
            assert!(tree.insert(&key(v), rid(v)).unwrap());
        }
        assert_eq!(tree.len(), 10);
        assert_eq!(collect_keys(&tree), (1..=10).collect::<Vec<_>>());

        // Root is one internal page over the leaf level: height 2.
        let root = tree.pool.fetch_page(tree.root_page_id()).unwrap();
        let root_node = InternalNode::<8>::from_page(root.data()).unwrap();
        assert_eq!(root_node.size(), 4);

        // Leaves split 2/3 each time, leaving {1,2},{3,4},{5,6},{7,8,9,10}.
        let first_leaf = tree.pool.fetch_page(root_node.child_at(0)).unwrap();
        let first = LeafNode::<8>::from_page(first_leaf.data()).unwrap();
        assert_eq!(first.size(), 2);
        assert_eq!(first.key_at(0).to_u64(), 1);
        assert_eq!(first.key_at(1).to_u64(), 2);

        let last_leaf = tree.pool.fetch_page(root_node.child_at(3)).unwrap();
        let last = LeafNode::<8>::from_page(last_leaf.data()).unwrap();
        assert_eq!(last.size(), 4);
        assert_eq!(last.key_at(0).to_u64(), 7);
        assert_eq!(last.key_at(3).to_u64(), 10);
    }

    #[test]
    fn reverse_insert_stays_sorted() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in (1..=64u64).rev() {
            assert!(tree.insert(&key(v), rid(v)).unwrap());
        }
        assert_eq!(collect_keys(&tree), (1..=64).collect::<Vec<_>>());
        for v in 1..=64u64 {
            assert!(tree.get_value(&key(v)).unwrap().is_some(), "key {v}");
        }
    }

    #[test]
    fn range_scan_starts_at_lower_bound() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in [1u64, 3, 5, 7, 9] {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        let from_four: Vec<u64> = tree
            .iter_from(&key(4))
            .unwrap()
            .map(|(k, _)| k.to_u64())
            .collect();
        assert_eq!(from_four, vec![5, 7, 9]);

        let from_five: Vec<u64> = tree
            .iter_from(&key(5))
            .unwrap()
            .map(|(k, _)| k.to_u64())
            .collect();
        assert_eq!(from_five, vec![5, 7, 9]);

        let past_end: Vec<u64> = tree
            .iter_from(&key(100))
            .unwrap()
            .map(|(k, _)| k.to_u64())
            .collect();
        assert_eq!(past_end, Vec::<u64>::new());
    }

    #[test]
    fn remove_absent_key_is_noop() {
        let (_dir, mut tree) = make_tree(4, 4);
        tree.insert(&key(1), rid(1)).unwrap();
        assert!(!tree.remove(&key(2)).unwrap());
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn remove_from_root_leaf() {
        let (_dir, mut tree) = make_tree(4, 4);
        tree.insert(&key(1), rid(1)).unwrap();
        tree.insert(&key(2), rid(2)).unwrap();

        assert!(tree.remove(&key(1)).unwrap());
        assert_eq!(tree.get_value(&key(1)).unwrap(), None);
        assert_eq!(tree.get_value(&key(2)).unwrap().unwrap().page_id(), 2);

        assert!(tree.remove(&key(2)).unwrap());
        assert!(tree.is_empty());
        assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);

        // The tree regrows from empty.
        tree.insert(&key(9), rid(9)).unwrap();
        assert_eq!(collect_keys(&tree), vec![9]);
    }

    #[test]
    fn delete_drains_tree_and_collapses_root() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in 1..=32u64 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        for v in 1..=32u64 {
            assert!(tree.remove(&key(v)).unwrap(), "remove {v}");
            let expected: Vec<u64> = (v + 1..=32).collect();
            assert_eq!(collect_keys(&tree), expected, "after removing {v}");
        }
        assert!(tree.is_empty());
        assert_eq!(tree.root_page_id(), INVALID_PAGE_ID);
    }

    #[test]
    fn delete_interleaved_with_lookups() {
        let (_dir, mut tree) = make_tree(5, 5);
        for v in 1..=100u64 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        // Remove odds in a scattered order.
        for v in (1..=100u64).filter(|v| v % 2 == 1).rev() {
            assert!(tree.remove(&key(v)).unwrap());
        }
        for v in 1..=100u64 {
            let got = tree.get_value(&key(v)).unwrap();
            if v % 2 == 0 {
                assert!(got.is_some(), "key {v} should remain");
            } else {
                assert!(got.is_none(), "key {v} should be gone");
            }
        }
        assert_eq!(tree.len(), 50);
        assert_eq!(
            collect_keys(&tree),
            (1..=100u64).filter(|v| v % 2 == 0).collect::<Vec<_>>()
        );
    }

    #[test]
    fn pins_balance_after_every_operation() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in 1..=50u64 {
            tree.insert(&key(v), rid(v)).unwrap();
            assert_eq!(tree.pool.total_pins(), 0, "pin leak after insert {v}");
        }
        tree.get_value(&key(25)).unwrap();
        assert_eq!(tree.pool.total_pins(), 0);
        let _ = collect_keys(&tree);
        assert_eq!(tree.pool.total_pins(), 0);
        for v in 1..=50u64 {
            tree.remove(&key(v)).unwrap();
            assert_eq!(tree.pool.total_pins(), 0, "pin leak after remove {v}");
        }
    }

    #[test]
    fn reopen_adopts_existing_root() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("index.db");
        {
            let disk = DiskManager::open(&path).unwrap();
            let pool = Arc::new(BufferPoolManager::new(32, 2, disk).unwrap());
            let mut tree: TestTree =
                BPlusTree::new("orders_pk", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();
            for v in 1..=20u64 {
                tree.insert(&key(v), rid(v)).unwrap();
            }
            pool.flush_all_pages().unwrap();
        }

        let disk = DiskManager::open(&path).unwrap();
        let pool = Arc::new(BufferPoolManager::new(32, 2, disk).unwrap());
        let tree: TestTree =
            BPlusTree::new("orders_pk", pool, BytewiseComparator, 4, 4).unwrap();
        assert_eq!(tree.len(), 20);
        assert_eq!(collect_keys(&tree), (1..=20).collect::<Vec<_>>());
        assert_eq!(tree.get_value(&key(11)).unwrap().unwrap().page_id(), 11);
    }

    #[test]
    fn two_indexes_share_a_pool() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("shared.db")).unwrap();
        let pool = Arc::new(BufferPoolManager::new(32, 2, disk).unwrap());

        let mut a: TestTree =
            BPlusTree::new("index_a", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();
        let mut b: TestTree =
            BPlusTree::new("index_b", Arc::clone(&pool), BytewiseComparator, 4, 4).unwrap();

        for v in 1..=16u64 {
            a.insert(&key(v), rid(v)).unwrap();
            b.insert(&key(v * 100), rid(v)).unwrap();
        }
        assert_eq!(collect_keys(&a), (1..=16).collect::<Vec<_>>());
        assert_eq!(
            collect_keys(&b),
            (1..=16).map(|v| v * 100).collect::<Vec<_>>()
        );
        assert_eq!(a.get_value(&key(100)).unwrap(), None);
    }

    #[test]
    fn to_dot_mentions_every_key() {
        let (_dir, mut tree) = make_tree(4, 4);
        for v in 1..=10u64 {
            tree.insert(&key(v), rid(v)).unwrap();
        }
        let dot = tree.to_dot().unwrap();
        assert!(dot.starts_with("digraph"));
        for v in 1..=10u64 {
            assert!(dot.contains(&format!("{v}")), "missing key {v} in dot");
        }
        assert_eq!(tree.pool.total_pins(), 0);
    }

    #[test]
    fn rejects_degenerate_fanouts() {
        let dir = tempdir().unwrap();
        let disk = DiskManager::open(dir.path().join("index.db")).unwrap();
        let pool = Arc::new(BufferPoolManager::new(8, 2, disk).unwrap());
        assert!(
            BPlusTree::<BytewiseComparator, 8>::new("x", Arc::clone(&pool), BytewiseComparator, 2, 4)
                .is_err()
        );
        assert!(BPlusTree::<BytewiseComparator, 8>::new(
            "x",
            pool,
            BytewiseComparator,
            4,
            100_000
        )
        .is_err());
    }
}
