//! The system back-end: a stateless adapter over the platform allocator
//! (spec §4.5). `sys_alloc`/`sys_free` are the only two operations; every
//! other component either serves a request itself or falls through to
//! these two functions.
//!
//! The teacher's `os.rs` reaches for raw `mmap`/`VirtualAlloc` because
//! mimalloc *is* the OS-facing allocator. Here the spec's back-end
//! contract is just "the platform allocator" (§1: "invoked as an opaque
//! `sys_alloc`/`sys_free` pair"), so `libc::malloc`/`libc::free` are the
//! faithful rendition — same crate the teacher already depends on for
//! platform primitives.

use log::{error, warn};

use crate::error::AllocError;

/// Allocate at least `size` bytes from the platform allocator. Returns
/// null on failure (spec §7, `OutOfMemory`); the caller propagates null.
#[inline]
pub fn sys_alloc(size: usize) -> *mut u8 {
    if size == 0 {
        return core::ptr::null_mut();
    }
    let p = unsafe { libc::malloc(size) } as *mut u8;
    if p.is_null() {
        error!(
            "upool: {} ({} bytes, errno {})",
            AllocError::OutOfMemory,
            size,
            errno::errno()
        );
    }
    p
}

/// Allocate `size` zeroed bytes from the platform allocator. Used by the
/// radix tree (spec §4.4, §9 "Radix tree allocator plug-in") for interior
/// and leaf nodes: node children/occupancy start out null/unset, and this
/// must not be the allocator under test or `put` would recurse into it.
#[inline]
pub fn sys_alloc_zeroed(size: usize) -> *mut u8 {
    if size == 0 {
        return core::ptr::null_mut();
    }
    let p = unsafe { libc::calloc(1, size) } as *mut u8;
    if p.is_null() {
        error!(
            "upool: {} (zeroed, {} bytes, errno {})",
            AllocError::OutOfMemory,
            size,
            errno::errno()
        );
    }
    p
}

/// Return a pointer previously obtained from [`sys_alloc`] to the
/// back-end. Null is a no-op (spec §6). `libc::free` needs no size, and
/// we deliberately keep no side map from pointer to size here — that's
/// the size-map the radix tree (`crate::radix`) exists as an alternative
/// to, and the whole point of the page-pool design is not needing it on
/// this path (spec §4.3, §4.4).
#[inline]
pub fn sys_free(ptr: *mut u8) {
    if ptr.is_null() {
        return;
    }
    unsafe { libc::free(ptr as *mut libc::c_void) };
}

/// Round `size` up to the nearest multiple of `align` (`align` a power of
/// two). Used by the owned-mode `create` routines to over-allocate enough
/// room to realign (spec §9, "Contiguous packing and alignment dance").
#[inline]
pub fn align_up(size: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (size + align - 1) & !(align - 1)
}

/// Round a pointer up to the next `align`-aligned address.
#[inline]
pub fn align_up_ptr(ptr: *mut u8, align: usize) -> *mut u8 {
    align_up(ptr as usize, align) as *mut u8
}

/// Emit a warning that an allocation larger than any size class bypassed
/// the thread cache. Purely diagnostic (spec §6: "`> Threshold` bypasses
/// the cache" is expected, steady-state behavior, not an error) — kept at
/// `trace` in release paths via the `log` facade's filtering, not gated
/// here.
#[inline]
pub fn warn_overflow(block_size: usize) {
    warn!("upool: size class {} exhausted, overflowing to back-end", block_size);
}
