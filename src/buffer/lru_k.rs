//! # LRU-K Frame Replacer
//!
//! Chooses eviction victims for the buffer pool by tracking, per frame, the
//! timestamps of its last K accesses. Frames split into two ladders:
//!
//! - **Young**: fewer than K recorded accesses. These have not proven
//!   themselves and are evicted first, oldest first sighting first.
//! - **Mature**: K or more accesses. Ordered by the Kth-most-recent access
//!   timestamp ascending (the classic backward-K-distance rule), so the
//!   frame whose Kth sighting is furthest in the past goes first.
//!
//! ```text
//!   Eviction order (K = 2):
//!
//!   Young:   f6 [t9]          f5 [t5]       ← scan back-to-front: f5 first
//!   Mature:  f1 [t1, t7]      f2 [t2, t8]   ← scan front-to-back: f1 first
//!            (sorted by history front = Kth-most-recent timestamp)
//! ```
//!
//! A sequential scan touches each page once, so its frames stay young and
//! are recycled quickly while frequently re-referenced pages accumulate K
//! sightings and survive. This is the property plain LRU lacks.
//!
//! ## Timestamps
//!
//! The clock is a logical counter bumped on every recorded access, strictly
//! monotonic under the internal mutex. Histories are capped at the last K
//! entries, so once a frame matures the history front *is* its
//! Kth-most-recent access.
//!
//! ## Capacity
//!
//! Capacity is fixed at construction and counts tracked frames, evictable
//! or not. Recording the first access of a new frame at capacity evicts
//! internally so the newcomer always fits; if nothing is evictable at that
//! point the caller has pinned every frame and the call fails. Flipping a
//! frame's evictable flag changes only the reported size, never capacity.
//!
//! ## Thread Safety
//!
//! Every public operation locks one internal mutex for its whole duration
//! and performs no I/O, so callers may share the replacer freely. All
//! operations are `O(N)` worst case in the number of tracked frames.

use std::collections::VecDeque;

use eyre::{bail, ensure, Result};
use hashbrown::HashMap;
use parking_lot::Mutex;

use crate::config::FrameId;

#[derive(Debug)]
struct FrameEntry {
    /// Last up-to-K access timestamps, oldest at the front.
    history: VecDeque<u64>,
    /// Total accesses recorded, may exceed K.
    accesses: u64,
    evictable: bool,
}

#[derive(Debug, Default)]
struct ReplacerState {
    clock: u64,
    entries: HashMap<FrameId, FrameEntry>,
    /// Frames with fewer than K accesses, most recent first access at the
    /// front. Eviction scans from the back.
    young: VecDeque<FrameId>,
    /// Frames with at least K accesses, ascending by Kth-most-recent
    /// timestamp. Ties keep insertion order. Eviction scans from the front.
    mature: Vec<(FrameId, u64)>,
    evictable_count: usize,
}

pub struct LruKReplacer {
    state: Mutex<ReplacerState>,
    num_frames: usize,
    k: usize,
}

impl LruKReplacer {
    /// Creates a replacer for frame ids `0..num_frames` with the given K.
    pub fn new(num_frames: usize, k: usize) -> Self {
        assert!(k >= 1, "LRU-K requires k >= 1");
        Self {
            state: Mutex::new(ReplacerState::default()),
            num_frames,
            k,
        }
    }

    /// Records an access to `frame` at the next clock tick.
    ///
    /// A first access of an untracked frame at capacity evicts internally;
    /// if every tracked frame is non-evictable at that point, this fails.
    pub fn record_access(&self, frame: FrameId) -> Result<()> {
        ensure!(
            frame < self.num_frames,
            "frame id {} out of range (capacity {})",
            frame,
            self.num_frames
        );
        let mut state = self.state.lock();
        state.clock += 1;
        let now = state.clock;

        if !state.entries.contains_key(&frame) {
            if state.entries.len() == self.num_frames && Self::evict_locked(&mut state).is_none() {
                bail!(
                    "replacer at capacity ({}) with no evictable frame",
                    self.num_frames
                );
            }
            state.entries.insert(
                frame,
                FrameEntry {
                    history: VecDeque::with_capacity(self.k),
                    accesses: 0,
                    evictable: false,
                },
            );
        }

        let k = self.k;
        let entry = state.entries.get_mut(&frame).unwrap();
        entry.accesses += 1;
        entry.history.push_back(now);
        if entry.history.len() > k {
            entry.history.pop_front();
        }
        let accesses = entry.accesses;
        let kth = *entry.history.front().unwrap();

        if accesses == 1 {
            state.young.push_front(frame);
            state.entries.get_mut(&frame).unwrap().evictable = true;
            state.evictable_count += 1;
        }

        if accesses >= k as u64 {
            // Transition out of the young ladder on the Kth access; on later
            // accesses re-sort within the mature ladder.
            if let Some(pos) = state.young.iter().position(|&f| f == frame) {
                state.young.remove(pos);
            }
            if let Some(pos) = state.mature.iter().position(|&(f, _)| f == frame) {
                state.mature.remove(pos);
            }
            let insert_at = state.mature.partition_point(|&(_, ts)| ts <= kth);
            state.mature.insert(insert_at, (frame, kth));
        }
        Ok(())
    }

    /// Flips the evictable flag of a tracked frame; untracked frames are
    /// ignored. Only the reported size changes, never capacity.
    pub fn set_evictable(&self, frame: FrameId, evictable: bool) -> Result<()> {
        ensure!(
            frame < self.num_frames,
            "frame id {} out of range (capacity {})",
            frame,
            self.num_frames
        );
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get_mut(&frame) else {
            return Ok(());
        };
        if entry.evictable != evictable {
            entry.evictable = evictable;
            if evictable {
                state.evictable_count += 1;
            } else {
                state.evictable_count -= 1;
            }
        }
        Ok(())
    }

    /// Drops all state for `frame`. Untracked frames are ignored; removing
    /// a tracked non-evictable frame is an invariant violation.
    pub fn remove(&self, frame: FrameId) -> Result<()> {
        ensure!(
            frame < self.num_frames,
            "frame id {} out of range (capacity {})",
            frame,
            self.num_frames
        );
        let mut state = self.state.lock();
        let Some(entry) = state.entries.get(&frame) else {
            return Ok(());
        };
        if !entry.evictable {
            bail!("cannot remove pinned (non-evictable) frame {}", frame);
        }
        Self::erase_locked(&mut state, frame);
        Ok(())
    }

    /// Chooses and erases a victim frame, or `None` when nothing is
    /// evictable. Young frames go first (oldest first sighting first), then
    /// mature frames by ascending Kth-most-recent timestamp.
    pub fn evict(&self) -> Option<FrameId> {
        let mut state = self.state.lock();
        Self::evict_locked(&mut state)
    }

    /// Number of tracked frames currently evictable.
    pub fn size(&self) -> usize {
        self.state.lock().evictable_count
    }

    fn evict_locked(state: &mut ReplacerState) -> Option<FrameId> {
        if state.evictable_count == 0 {
            return None;
        }
        let victim = state
            .young
            .iter()
            .rev()
            .copied()
            .find(|f| state.entries[f].evictable)
            .or_else(|| {
                state
                    .mature
                    .iter()
                    .map(|&(f, _)| f)
                    .find(|f| state.entries[f].evictable)
            })?;
        Self::erase_locked(state, victim);
        Some(victim)
    }

    fn erase_locked(state: &mut ReplacerState, frame: FrameId) {
        if let Some(pos) = state.young.iter().position(|&f| f == frame) {
            state.young.remove(pos);
        }
        if let Some(pos) = state.mature.iter().position(|&(f, _)| f == frame) {
            state.mature.remove(pos);
        }
        if let Some(entry) = state.entries.remove(&frame) {
            if entry.evictable {
                state.evictable_count -= 1;
            }
        }
    }
}
