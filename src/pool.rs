//! A group of pages all serving one block size (spec §4.2).
//!
//! Like [`crate::page`], a `SizeClassPool` is addressed by a raw pointer to
//! its `Meta` header rather than an owned Rust value — `create` can place
//! that header either in back-end-allocated memory it owns, or in memory a
//! caller (the [`crate::thread_cache::ThreadCache`]) already owns and is
//! just handing a sub-range of.

use core::mem::size_of;
use core::ptr;

use crate::backend::{align_up, sys_alloc, sys_free, warn_overflow};
use crate::consts::PAGE_SIZE;
use crate::page;

#[repr(C)]
pub struct PoolMeta {
    /// `true` if this pool owns its backing allocation and must free it on
    /// destroy; `false` if a caller (the thread cache) carved this pool's
    /// range out of a larger allocation it owns instead.
    owned: bool,
    block_size: usize,
    page_count: usize,
    first_page: *mut u8,
    end_page: *mut u8,
    /// Only meaningful when `owned`: the base and size of the allocation
    /// backing this pool, needed to free the right thing on destroy (the
    /// page-aligned `first_page` is an interior pointer into it).
    alloc_base: *mut u8,
    alloc_size: usize,
}

/// Bytes needed for a fully owned pool of `page_count` pages of
/// `block_size`: one extra page over `page_count * PAGE_SIZE` to guarantee
/// room to realign, plus the header (spec §4.2, "Owned mode").
#[inline]
pub fn owned_alloc_size(page_count: usize) -> usize {
    (page_count + 1) * PAGE_SIZE + size_of::<PoolMeta>()
}

unsafe fn init_pages(first_page: *mut u8, block_size: usize, page_count: usize, pool: *mut u8) {
    for i in 0..page_count {
        let base = unsafe { first_page.add(i * PAGE_SIZE) };
        unsafe { page::init(base, block_size, PAGE_SIZE, pool) };
    }
}

/// Owned mode: allocate a fresh backing region from the back-end and place
/// both the pool header and its pages inside it.
///
/// Returns null if the back-end allocation fails.
pub fn create_owned(block_size: usize, page_count: usize) -> *mut PoolMeta {
    let alloc_size = owned_alloc_size(page_count);
    let raw = sys_alloc(alloc_size);
    if raw.is_null() {
        return ptr::null_mut();
    }

    // Find the first PAGE_SIZE-aligned address with room for the Meta
    // header before it (spec §4.2, §9 "alignment dance").
    let base = raw as usize;
    let mut first_page_val = align_up(base, PAGE_SIZE);
    if first_page_val == base {
        first_page_val += PAGE_SIZE;
    }
    if first_page_val - base < size_of::<PoolMeta>() {
        first_page_val += PAGE_SIZE;
    }
    let first_page = first_page_val as *mut u8;

    let self_ptr = raw as *mut PoolMeta;
    unsafe {
        ptr::write(
            self_ptr,
            PoolMeta {
                owned: true,
                block_size,
                page_count,
                first_page,
                end_page: first_page.add(page_count * PAGE_SIZE),
                alloc_base: raw,
                alloc_size,
            },
        );
        init_pages(first_page, block_size, page_count, self_ptr as *mut u8);
    }
    self_ptr
}

/// Borrowed mode: place the pool header at `pool_base` and its pages at
/// `page_base`, both supplied (and owned) by the caller. Used by
/// [`crate::thread_cache::ThreadCache`] to pack every size class's pool
/// back-to-back in one contiguous allocation.
///
/// # Safety
/// `pool_base` must have room for a `PoolMeta`; `page_base` must be
/// `PAGE_SIZE`-aligned with `page_count * PAGE_SIZE` valid bytes.
pub unsafe fn create_borrowed(
    pool_base: *mut u8,
    page_base: *mut u8,
    block_size: usize,
    page_count: usize,
) -> *mut PoolMeta {
    debug_assert_eq!(page_base as usize & (PAGE_SIZE - 1), 0);
    let self_ptr = pool_base as *mut PoolMeta;
    unsafe {
        ptr::write(
            self_ptr,
            PoolMeta {
                owned: false,
                block_size,
                page_count,
                first_page: page_base,
                end_page: page_base.add(page_count * PAGE_SIZE),
                alloc_base: ptr::null_mut(),
                alloc_size: 0,
            },
        );
        init_pages(page_base, block_size, page_count, self_ptr as *mut u8);
    }
    self_ptr
}

/// Allocate a block from this pool: first-fit across pages, falling back
/// to an overflow block from the back-end if every page is full (spec
/// §4.2). Overflow blocks aren't owned by any page; [`deallocate`]
/// recognizes them by the range test and routes them back to the back-end.
///
/// # Safety
/// `pool` must be an initialized `PoolMeta`.
pub unsafe fn allocate(pool: *mut PoolMeta) -> *mut u8 {
    let meta = unsafe { &*pool };
    for i in 0..meta.page_count {
        let page_base = unsafe { meta.first_page.add(i * PAGE_SIZE) };
        let p = unsafe { page::alloc_block(page_base) };
        if !p.is_null() {
            return p;
        }
    }
    warn_overflow(meta.block_size);
    sys_alloc(meta.block_size)
}

/// Return `ptr` to this pool, range-testing it first: inside
/// `[first_page, end_page)` it's recovered via page masking, otherwise
/// it's an overflow block and goes to the back-end (spec §4.2).
///
/// # Safety
/// `pool` must be an initialized `PoolMeta` and `ptr` must have come from
/// [`allocate`] on this pool and not already be freed.
pub unsafe fn deallocate(pool: *mut PoolMeta, ptr: *mut u8) {
    let meta = unsafe { &*pool };
    if (ptr as usize) < meta.first_page as usize || (ptr as usize) >= meta.end_page as usize {
        sys_free(ptr);
        return;
    }
    unsafe { deallocate_unchecked(pool, ptr) };
}

/// Like [`deallocate`] but skips the range test — for callers (the thread
/// cache) that have already established `ptr` is within this pool's range.
///
/// # Safety
/// Same as [`deallocate`], plus the caller guarantees `ptr` is within
/// `[first_page, end_page)`.
pub unsafe fn deallocate_unchecked(pool: *mut PoolMeta, ptr: *mut u8) {
    let page_base = page::page_base_of(ptr);
    unsafe { page::dealloc_block(page_base, ptr, PAGE_SIZE) };
    let _ = pool;
}

/// Free this pool's backing allocation if it owns one. No-op for
/// borrowed-mode pools (spec §4.2, "Destructor").
///
/// # Safety
/// `pool` must not be used again after this call, and must not be a
/// pointer embedded in a larger allocation some other owner will free
/// (that would double-free).
pub unsafe fn destroy(pool: *mut PoolMeta) {
    let meta = unsafe { &*pool };
    if meta.owned {
        sys_free(meta.alloc_base);
    }
}

/// Number of blocks of this pool's size that fit in one page, used by the
/// thread cache to size-check overflow/inventory invariants in tests.
///
/// # Safety
/// `pool` must be an initialized `PoolMeta`.
pub unsafe fn blocks_per_page(pool: *mut PoolMeta) -> usize {
    let meta = unsafe { &*pool };
    page::blocks_per_page(meta.block_size, PAGE_SIZE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn owned_pool_overflows_then_recovers() {
        // page_count = 2, block_size = 64: fills both pages, 125th block overflows.
        let block_size = 64;
        let page_count = 2;
        let pool = create_owned(block_size, page_count);
        assert!(!pool.is_null());

        let per_page = unsafe { blocks_per_page(pool) };
        let capacity = per_page * page_count;

        let mut blocks = Vec::new();
        for _ in 0..capacity {
            let p = unsafe { allocate(pool) };
            assert!(!p.is_null());
            blocks.push(p);
        }
        // one more: overflow via back-end.
        let overflow = unsafe { allocate(pool) };
        assert!(!overflow.is_null());
        blocks.push(overflow);

        for b in blocks.drain(..) {
            unsafe { deallocate(pool, b) };
        }

        // pool is usable again, fully from cache this time.
        for _ in 0..capacity {
            let p = unsafe { allocate(pool) };
            assert!(!p.is_null());
            blocks.push(p);
        }
        for b in blocks.drain(..) {
            unsafe { deallocate(pool, b) };
        }

        unsafe { destroy(pool) };
    }

    #[test]
    fn borrowed_pool_does_not_own_backing_memory() {
        let block_size = 32;
        let page_count = 1;
        let region_size = page_count * PAGE_SIZE + PAGE_SIZE; // headroom for alignment
        let raw = sys_alloc(region_size + size_of::<PoolMeta>());
        assert!(!raw.is_null());
        let base = raw as usize;
        let aligned = align_up(base + size_of::<PoolMeta>(), PAGE_SIZE);
        let pool_base = raw;
        let page_base = aligned as *mut u8;

        let pool = unsafe { create_borrowed(pool_base, page_base, block_size, page_count) };
        let p = unsafe { allocate(pool) };
        assert!(!p.is_null());
        unsafe { deallocate(pool, p) };
        unsafe { destroy(pool) }; // no-op: borrowed

        let _ = region_size;
        sys_free(raw);
    }
}
