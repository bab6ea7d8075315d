//! # Buffer Pool Manager
//!
//! A fixed array of page frames fronting the disk manager. Pages are fetched
//! into frames, pinned while in use, and written back when evicted dirty.
//!
//! ## Structure
//!
//! ```text
//! BufferPoolManager
//! ├── frames[0..pool_size]      page-sized buffers + pin count + dirty flag
//! ├── page table                ExtendibleHashTable<PageId, FrameId>
//! ├── replacer                  LruKReplacer over frame ids
//! └── free list                 frames holding no page
//! ```
//!
//! The page table and replacer sit behind one mutex of pool state. Frame
//! buffers live outside it: a pinned frame cannot be evicted or reused, so
//! guard access to its bytes needs no lock.
//!
//! ## Fetch Path
//!
//! 1. Hit: pin the frame, record the access, mark it non-evictable.
//! 2. Miss: take a free frame, or evict a victim (writing it back if
//!    dirty), then read the page from disk and install it.
//! 3. Every frame is pinned: the fetch fails.
//!
//! ## Pin Protocol
//!
//! [`PageGuard`] pins on fetch and unpins exactly once on drop, passing
//! `dirty = true` iff `data_mut` was taken. A frame whose pin count
//! reaches zero becomes evictable. Write paths therefore cannot leak pins
//! or lose dirty flags on early returns.
//!
//! ## Thread Safety
//!
//! The pool itself is safe to share. Mutating one page from two threads is
//! not coordinated here; that is the caller's contract (the B+tree requires
//! external exclusion, see the crate docs).

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use eyre::{bail, ensure, Result};
use log::debug;
use parking_lot::Mutex;

use crate::buffer::LruKReplacer;
use crate::config::{FrameId, PageId, INVALID_PAGE_ID, PAGE_SIZE};
use crate::hash::ExtendibleHashTable;
use crate::storage::DiskManager;

/// Bucket capacity of the page-table hash directory.
const PAGE_TABLE_BUCKET_SIZE: usize = 8;

struct Frame {
    data: UnsafeCell<Box<[u8; PAGE_SIZE]>>,
    pin_count: AtomicU32,
    dirty: AtomicBool,
}

// SAFETY: frame bytes are only reached through PageGuard (which holds a pin,
// so the frame is never concurrently evicted or reused) or through pool
// methods that own the state lock and operate on unpinned frames. Callers
// mutating one page from several threads are outside the pool's contract.
unsafe impl Send for Frame {}
unsafe impl Sync for Frame {}

impl Frame {
    fn new() -> Self {
        Self {
            data: UnsafeCell::new(Box::new([0u8; PAGE_SIZE])),
            pin_count: AtomicU32::new(0),
            dirty: AtomicBool::new(false),
        }
    }
}

struct PoolState {
    replacer: LruKReplacer,
    free_list: Vec<FrameId>,
    /// Page currently resident in each frame, INVALID_PAGE_ID when free.
    frame_page: Vec<PageId>,
    next_page_id: PageId,
}

pub struct BufferPoolManager {
    frames: Box<[Frame]>,
    page_table: ExtendibleHashTable<PageId, FrameId>,
    state: Mutex<PoolState>,
    disk: DiskManager,
}

impl BufferPoolManager {
    /// Creates a pool of `pool_size` frames over `disk`, using LRU-K
    /// replacement with the given K. Page-id allocation resumes past the
    /// pages already present in the file; page 0 stays reserved for the
    /// header page.
    pub fn new(pool_size: usize, replacer_k: usize, disk: DiskManager) -> Result<Self> {
        ensure!(pool_size >= 1, "buffer pool needs at least one frame");
        let next_page_id = disk.num_pages()?.max(1);
        let frames: Box<[Frame]> = (0..pool_size).map(|_| Frame::new()).collect();

        Ok(Self {
            frames,
            page_table: ExtendibleHashTable::new(PAGE_TABLE_BUCKET_SIZE),
            state: Mutex::new(PoolState {
                replacer: LruKReplacer::new(pool_size, replacer_k),
                free_list: (0..pool_size).rev().collect(),
                frame_page: vec![INVALID_PAGE_ID; pool_size],
                next_page_id,
            }),
            disk,
        })
    }

    pub fn pool_size(&self) -> usize {
        self.frames.len()
    }

    /// Fetches `page_id` into a frame and returns it pinned.
    pub fn fetch_page(&self, page_id: PageId) -> Result<PageGuard<'_>> {
        ensure!(page_id != INVALID_PAGE_ID, "cannot fetch the invalid page id");
        let mut state = self.state.lock();

        if let Some(frame_id) = self.page_table.find(&page_id) {
            self.frames[frame_id].pin_count.fetch_add(1, Ordering::AcqRel);
            self.mark_in_use(&mut state, frame_id);
            return Ok(PageGuard {
                pool: self,
                page_id,
                frame_id,
                dirty: false,
            });
        }

        let frame_id = self.acquire_frame(&mut state)?;
        // SAFETY: the frame came off the free list or out of the replacer,
        // so it is unpinned and unreferenced; the state lock keeps it ours.
        let data = unsafe { &mut **self.frames[frame_id].data.get() };
        if let Err(err) = self.disk.read_page(page_id, &mut data[..]) {
            state.free_list.push(frame_id);
            return Err(err);
        }
        self.install(&mut state, frame_id, page_id);
        Ok(PageGuard {
            pool: self,
            page_id,
            frame_id,
            dirty: false,
        })
    }

    /// Allocates a fresh page id and returns its zeroed frame pinned.
    pub fn new_page(&self) -> Result<PageGuard<'_>> {
        let mut state = self.state.lock();
        let frame_id = self.acquire_frame(&mut state)?;
        let page_id = state.next_page_id;
        state.next_page_id += 1;

        // SAFETY: as in fetch_page, the frame is exclusively ours.
        let data = unsafe { &mut **self.frames[frame_id].data.get() };
        data.fill(0);
        self.install(&mut state, frame_id, page_id);
        Ok(PageGuard {
            pool: self,
            page_id,
            frame_id,
            dirty: false,
        })
    }

    /// Drops one pin on `page_id`, ORing in the dirty flag. Returns false
    /// when the page is not resident or not pinned. Usually called by
    /// `PageGuard::drop`.
    pub fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return false;
        };
        let frame = &self.frames[frame_id];
        if frame.pin_count.load(Ordering::Acquire) == 0 {
            return false;
        }
        if is_dirty {
            frame.dirty.store(true, Ordering::Release);
        }
        if frame.pin_count.fetch_sub(1, Ordering::AcqRel) == 1 {
            state
                .replacer
                .set_evictable(frame_id, true)
                .unwrap(); // INVARIANT: frame ids handed out by this pool are in range
        }
        true
    }

    /// Writes `page_id` through to disk (dirty or not) and clears its dirty
    /// flag. Returns false when the page is not resident.
    pub fn flush_page(&self, page_id: PageId) -> Result<bool> {
        let _state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(false);
        };
        // SAFETY: the state lock excludes eviction; readers of a pinned
        // frame may race only with callers violating the single-writer
        // contract.
        let data = unsafe { &**self.frames[frame_id].data.get() };
        self.disk.write_page(page_id, &data[..])?;
        self.frames[frame_id].dirty.store(false, Ordering::Release);
        Ok(true)
    }

    /// Flushes every resident page and syncs the file.
    pub fn flush_all_pages(&self) -> Result<()> {
        let state = self.state.lock();
        let mut flushed = 0usize;
        for (frame_id, &page_id) in state.frame_page.iter().enumerate() {
            if page_id == INVALID_PAGE_ID {
                continue;
            }
            // SAFETY: as in flush_page.
            let data = unsafe { &**self.frames[frame_id].data.get() };
            self.disk.write_page(page_id, &data[..])?;
            self.frames[frame_id].dirty.store(false, Ordering::Release);
            flushed += 1;
        }
        drop(state);
        self.disk.sync()?;
        debug!("flushed {} resident pages", flushed);
        Ok(())
    }

    /// Discards `page_id` from the pool and returns its frame to the free
    /// list. The page must be unpinned. Disk blocks are not reclaimed.
    pub fn delete_page(&self, page_id: PageId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(frame_id) = self.page_table.find(&page_id) else {
            return Ok(());
        };
        let frame = &self.frames[frame_id];
        if frame.pin_count.load(Ordering::Acquire) > 0 {
            bail!("cannot delete pinned page {}", page_id);
        }
        self.page_table.remove(&page_id);
        state
            .replacer
            .remove(frame_id)
            .unwrap(); // INVARIANT: an unpinned resident frame is evictable
        state.frame_page[frame_id] = INVALID_PAGE_ID;
        state.free_list.push(frame_id);
        frame.dirty.store(false, Ordering::Release);
        Ok(())
    }

    /// Current pin count of a resident page; `None` when not resident.
    /// Test observability for the pin-balance invariant.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let _state = self.state.lock();
        self.page_table
            .find(&page_id)
            .map(|frame_id| self.frames[frame_id].pin_count.load(Ordering::Acquire))
    }

    /// Sum of pin counts across all frames.
    pub fn total_pins(&self) -> u32 {
        let _state = self.state.lock();
        self.frames
            .iter()
            .map(|f| f.pin_count.load(Ordering::Acquire))
            .sum()
    }

    /// Frames currently eligible for eviction.
    pub fn evictable_frames(&self) -> usize {
        self.state.lock().replacer.size()
    }

    fn mark_in_use(&self, state: &mut PoolState, frame_id: FrameId) {
        state
            .replacer
            .record_access(frame_id)
            .unwrap(); // INVARIANT: frame ids handed out by this pool are in range
        state.replacer.set_evictable(frame_id, false).unwrap();
    }

    /// Finds a frame for a new resident page: free list first, then the
    /// replacer. The victim is written back if dirty.
    fn acquire_frame(&self, state: &mut PoolState) -> Result<FrameId> {
        if let Some(frame_id) = state.free_list.pop() {
            return Ok(frame_id);
        }
        let Some(frame_id) = state.replacer.evict() else {
            bail!(
                "buffer pool exhausted: all {} frames are pinned",
                self.frames.len()
            );
        };
        let old_page = state.frame_page[frame_id];
        debug!("evicting page {} from frame {}", old_page, frame_id);
        if self.frames[frame_id].dirty.load(Ordering::Acquire) {
            // SAFETY: pin count is zero (the replacer only surrenders
            // evictable frames) and the state lock excludes new fetches.
            let data = unsafe { &**self.frames[frame_id].data.get() };
            self.disk.write_page(old_page, &data[..])?;
            self.frames[frame_id].dirty.store(false, Ordering::Release);
        }
        self.page_table.remove(&old_page);
        state.frame_page[frame_id] = INVALID_PAGE_ID;
        Ok(frame_id)
    }

    fn install(&self, state: &mut PoolState, frame_id: FrameId, page_id: PageId) {
        state.frame_page[frame_id] = page_id;
        self.page_table.insert(page_id, frame_id);
        self.frames[frame_id].pin_count.store(1, Ordering::Release);
        self.mark_in_use(state, frame_id);
    }
}

/// A pinned page. Dropping the guard unpins exactly once, reporting the
/// page dirty iff `data_mut` was taken.
pub struct PageGuard<'a> {
    pool: &'a BufferPoolManager,
    page_id: PageId,
    frame_id: FrameId,
    dirty: bool,
}

impl<'a> PageGuard<'a> {
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    pub fn data(&self) -> &[u8] {
        // SAFETY: this guard holds a pin, so the frame cannot be evicted or
        // reused; the slice lives no longer than the guard.
        unsafe { &(**self.pool.frames[self.frame_id].data.get())[..] }
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        self.dirty = true;
        // SAFETY: as in data(), plus &mut self makes this the only access
        // through this guard. Concurrent guards on the same page are
        // excluded by the caller contract (one traversal at a time).
        unsafe { &mut (**self.pool.frames[self.frame_id].data.get())[..] }
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        self.pool.unpin_page(self.page_id, self.dirty);
    }
}
