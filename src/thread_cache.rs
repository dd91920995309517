//! Per-thread front-end: one contiguous backing allocation carved into a
//! [`crate::pool::SizeClassPool`] per size class (spec §4.3).
//!
//! Grounded on the teacher's `init.rs` narrative (`heap_init`/`heap_done`,
//! process- vs thread-local lifetime, `stats.threads` bookkeeping) for the
//! init/teardown shape, and on `other_examples`' `rstcmalloc` allocator for
//! the actual Rust idiom of doing it: a `thread_local!` `UnsafeCell`
//! accessed through a `try_with`-based helper so a cache torn down mid-exit,
//! or one that never came up because its backing allocation failed on first
//! touch, both degrade to the back-end instead of panicking (spec §7).

use core::cell::UnsafeCell;
use core::mem::size_of;

use crate::backend::{align_up, sys_alloc, sys_free};
use crate::consts::{
    self, NUM_SIZE_CLASSES, PAGE_SIZE, SIZE_CLASSES, SMALLEST_CLASS, THRESHOLD,
};
use crate::pool::{self, PoolMeta};
use crate::stats::STATS;

/// One contiguous region holding all `NUM_SIZE_CLASSES` pools back to back,
/// each in borrowed mode (spec §4.3, "Construction").
pub struct ThreadCache {
    pools: [*mut PoolMeta; NUM_SIZE_CLASSES],
    region_begin: *mut u8,
    region_end: *mut u8,
    alloc_base: *mut u8,
    alloc_size: usize,
}

/// Bytes needed for the whole thread cache: `Σ (page_count_i + 1) * PageSize`
/// plus one more page of slop for the region's own leading residue (spec
/// §4.3, "total page budget"). Each size class gets a full extra page, not
/// just `sizeof(PoolMeta)`, because the carving loop below places every
/// pool after the first at an already page-aligned cursor — the header
/// then pushes that pool's first data page to the *next* boundary, costing
/// a whole page, not a few dozen bytes.
fn region_alloc_size() -> usize {
    let mut total_pages = 1; // leading residue before the first pool header
    for &(_, page_count) in SIZE_CLASSES.iter() {
        total_pages += page_count + 1;
    }
    total_pages * PAGE_SIZE
}

impl ThreadCache {
    /// Build a fresh cache, or `None` if the back-end couldn't supply the
    /// backing region. Fallible rather than panicking: an OOM here must
    /// still surface as a null pointer from the public `allocate`, not a
    /// process abort (spec §7 — "the allocator never aborts the process on
    /// its own"). Callers treat `None` the same as a torn-down cache and
    /// fall through to the back-end directly.
    fn try_new() -> Option<Self> {
        let alloc_size = region_alloc_size();
        let raw = sys_alloc(alloc_size);
        if raw.is_null() {
            log::error!(
                "upool: {} (thread cache backing region, {} bytes)",
                crate::error::AllocError::OutOfMemory,
                alloc_size
            );
            return None;
        }

        let mut pools = [core::ptr::null_mut(); NUM_SIZE_CLASSES];
        let mut cursor = raw as usize;
        let region_begin_page = align_up(raw as usize, PAGE_SIZE);
        // Ensure the very first pool header has room before its page.
        let mut first_header_at = cursor;
        if region_begin_page - first_header_at < size_of::<PoolMeta>() {
            first_header_at = region_begin_page; // header lives in the slop page itself
        }
        cursor = first_header_at;

        for (i, &(block_size, page_count)) in SIZE_CLASSES.iter().enumerate() {
            let pool_base = cursor as *mut u8;
            let page_base = align_up(cursor + size_of::<PoolMeta>(), PAGE_SIZE) as *mut u8;
            let pool = unsafe { pool::create_borrowed(pool_base, page_base, block_size, page_count) };
            pools[i] = pool;
            cursor = page_base as usize + page_count * PAGE_SIZE;
        }

        let region_begin = (first_header_at) as *mut u8;
        let region_end = cursor as *mut u8;
        debug_assert!(region_end as usize - raw as usize <= alloc_size);

        STATS.thread_caches.increase(alloc_size as i64);
        STATS.threads.increase(1);

        Some(ThreadCache {
            pools,
            region_begin,
            region_end,
            alloc_base: raw,
            alloc_size,
        })
    }

    #[inline]
    fn owns(&self, ptr: *const u8) -> bool {
        let addr = ptr as usize;
        addr >= self.region_begin as usize && addr < self.region_end as usize
    }

    /// Allocate `size` bytes. `size` must already have been checked against
    /// [`consts::THRESHOLD`] by the caller (sizes above it never reach a
    /// thread cache, spec §6).
    #[inline]
    fn allocate(&mut self, size: usize) -> *mut u8 {
        let rounded = consts::round_up_pow2(size.max(SMALLEST_CLASS));
        let id = consts::pool_id_for_rounded_size(rounded);
        unsafe { pool::allocate(self.pools[id]) }
    }

    /// Return `ptr`, which must have come from this cache's [`allocate`].
    ///
    /// Only ever called for `ptr` within this cache's own region — a block
    /// freed from a different thread than the one that allocated it is
    /// never routed here (`owns` tests against the *calling* thread's
    /// region), so it falls through to the back-end instead and its slot
    /// in the allocating thread's page never gets reclaimed. Recycling it
    /// would need a remote-free list per cache (a lock-free stack threads
    /// drain into their own free lists); not implemented, spec leaves the
    /// cross-thread case to the implementer and the source doesn't do it
    /// either.
    #[inline]
    fn deallocate(&mut self, ptr: *mut u8) {
        let page_base = crate::page::page_base_of(ptr);
        let owning_pool = unsafe { crate::page::owning_pool(page_base) } as *mut PoolMeta;
        unsafe { pool::deallocate_unchecked(owning_pool, ptr) };
    }
}

impl Drop for ThreadCache {
    fn drop(&mut self) {
        for &pool in self.pools.iter() {
            if !pool.is_null() {
                unsafe { pool::destroy(pool) };
            }
        }
        sys_free(self.alloc_base);
        STATS.thread_caches.decrease(self.alloc_size as i64);
        STATS.threads.decrease(1);
    }
}

thread_local! {
    static THREAD_CACHE: UnsafeCell<Option<ThreadCache>> = UnsafeCell::new(ThreadCache::try_new());
}

/// Run `f` against this thread's cache. Returns `None` if the thread-local
/// has already been torn down (e.g. called from a `Drop` impl running
/// during thread exit, after TLS destructors have started) or if this
/// thread never managed to get a cache in the first place (the back-end
/// was out of memory on first touch) — callers treat both the same as "no
/// cache", falling through to the back-end.
#[inline]
fn with_thread_cache<R>(f: impl FnOnce(&mut ThreadCache) -> R) -> Option<R> {
    THREAD_CACHE
        .try_with(|cell| unsafe { (*cell.get()).as_mut().map(f) })
        .ok()
        .flatten()
}

/// Allocate `size` bytes through this thread's cache, or straight from the
/// back-end if `size` exceeds [`THRESHOLD`] or the thread-local is
/// unavailable (spec §6). `size == 0` returns a block of the smallest size
/// class rather than null (spec §7, `SizeZero`).
#[inline]
pub fn allocate(size: usize) -> *mut u8 {
    if size == 0 {
        log::trace!("upool: {}", crate::error::AllocError::SizeZero);
    }
    if size > THRESHOLD {
        return sys_alloc(size);
    }
    with_thread_cache(|tc| tc.allocate(size)).unwrap_or_else(|| sys_alloc(size.max(SMALLEST_CLASS)))
}

/// Free `ptr`. Routes back to this thread's cache if `ptr` falls in its
/// region, otherwise to the back-end (spec §6: large allocations and
/// allocations made while no thread cache was available both end up here).
///
/// # Safety
/// `ptr` must be null or have come from [`allocate`] and not already be
/// freed.
#[inline]
pub unsafe fn deallocate(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    let handled = with_thread_cache(|tc| {
        if tc.owns(ptr) {
            tc.deallocate(ptr);
            true
        } else {
            false
        }
    });
    if handled != Some(true) {
        sys_free(ptr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_allocation_round_trips_within_region() {
        with_thread_cache(|tc| {
            let p = tc.allocate(8);
            assert!(!p.is_null());
            assert!(tc.owns(p));
            tc.deallocate(p);
        })
        .unwrap();
    }

    #[test]
    fn facade_allocate_deallocate_small_and_large() {
        let small = allocate(32);
        assert!(!small.is_null());
        unsafe { deallocate(small) };

        let large = allocate(THRESHOLD * 4);
        assert!(!large.is_null());
        unsafe { deallocate(large) };
    }

    #[test]
    fn every_size_class_is_independently_reachable() {
        with_thread_cache(|tc| {
            for &(block_size, _) in SIZE_CLASSES.iter() {
                let p = tc.allocate(block_size);
                assert!(!p.is_null());
                tc.deallocate(p);
            }
        })
        .unwrap();
    }

    #[test]
    fn zero_size_returns_smallest_class_block() {
        let p = allocate(0);
        assert!(!p.is_null());
        unsafe { deallocate(p) };
    }
}
