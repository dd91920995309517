//! A fixed-size, page-aligned region holding many blocks of one size, plus
//! an intrusive free list threaded through the unused blocks (spec §4.1).
//!
//! A `Page` isn't a Rust value you hold — it's a view over `PAGE_SIZE`
//! bytes of memory that some [`crate::pool::SizeClassPool`] owns. We only
//! ever touch it through a raw `*mut u8` pointing at its base, because the
//! whole point of the design (spec §3, §9) is that any interior pointer
//! can recover that base by masking — there is no separate handle to pass
//! around.

use core::mem::size_of;
use core::ptr;

use crate::consts::PAGE_MASK;
#[cfg(debug_assertions)]
use crate::error::AllocError;

/// Header placed at offset 0 of every page.
#[repr(C)]
pub struct PageMeta {
    /// Opaque pointer back to the owning pool's `Meta`. Non-owning: the
    /// page's lifetime is dominated by the pool's by construction (spec
    /// §3, "Ownership"; spec §9, "Cyclic pointers").
    pub owning_pool: *mut u8,
    free_list_head: *mut FreeBlock,
}

#[repr(C)]
struct FreeBlock {
    next: *mut FreeBlock,
}

/// Mask an interior pointer down to its page base (spec §3 invariant).
#[inline]
pub fn page_base_of(ptr: *const u8) -> *mut u8 {
    (ptr as usize & !PAGE_MASK) as *mut u8
}

#[inline]
fn meta_of(page_base: *mut u8) -> *mut PageMeta {
    page_base as *mut PageMeta
}

#[inline]
fn data_start(page_base: *mut u8) -> *mut u8 {
    unsafe { page_base.add(size_of::<PageMeta>()) }
}

/// Number of blocks of `block_size` that fit in the data area.
#[inline]
pub fn blocks_per_page(block_size: usize, page_size: usize) -> usize {
    (page_size - size_of::<PageMeta>()) / block_size
}

/// Initialize a page at `page_base`: write the header and thread every
/// block onto the free list, in order (spec §4.1).
///
/// # Safety
/// `page_base` must point to `page_size` bytes of writable memory, aligned
/// to `page_size`, and `block_size` must be at least a pointer wide.
pub unsafe fn init(page_base: *mut u8, block_size: usize, page_size: usize, owning_pool: *mut u8) {
    debug_assert!(block_size >= size_of::<FreeBlock>());
    debug_assert_eq!(page_base as usize & (page_size - 1), 0);

    unsafe {
        ptr::write(
            meta_of(page_base),
            PageMeta {
                owning_pool,
                free_list_head: ptr::null_mut(),
            },
        );
    }

    let n = blocks_per_page(block_size, page_size);
    let data = data_start(page_base);
    let mut prev: *mut FreeBlock = ptr::null_mut();
    // Link back-to-front so free_list_head ends up at block 0, matching
    // the source's forward walk (block i's next is block i+1).
    for i in (0..n).rev() {
        let block = unsafe { data.add(i * block_size) } as *mut FreeBlock;
        unsafe { (*block).next = prev };
        prev = block;
    }
    unsafe { (*meta_of(page_base)).free_list_head = prev };
}

/// Pop a block off this page's free list. Null if the page is full.
///
/// # Safety
/// `page_base` must be an initialized page.
#[inline]
pub unsafe fn alloc_block(page_base: *mut u8) -> *mut u8 {
    let meta = meta_of(page_base);
    let head = unsafe { (*meta).free_list_head };
    if head.is_null() {
        return ptr::null_mut();
    }
    unsafe { (*meta).free_list_head = (*head).next };
    head as *mut u8
}

/// Push `ptr` back onto this page's free list.
///
/// # Safety
/// `page_base` must be an initialized page and `ptr` must be a block that
/// was allocated from it and not currently free.
#[inline]
pub unsafe fn dealloc_block(page_base: *mut u8, ptr: *mut u8, page_size: usize) {
    #[cfg(debug_assertions)]
    {
        let start = page_base as usize;
        let addr = ptr as usize;
        if addr < start || addr >= start + page_size {
            log::error!(
                "upool: {} ({:p} outside page {:p}..{:#x})",
                AllocError::InvalidFree,
                ptr,
                page_base,
                start + page_size
            );
        }
    }
    let meta = meta_of(page_base);
    let block = ptr as *mut FreeBlock;
    unsafe {
        (*block).next = (*meta).free_list_head;
        (*meta).free_list_head = block;
    }
}

/// Owning pool pointer stashed in this page's header.
///
/// # Safety
/// `page_base` must be an initialized page.
#[inline]
pub unsafe fn owning_pool(page_base: *mut u8) -> *mut u8 {
    unsafe { (*meta_of(page_base)).owning_pool }
}
