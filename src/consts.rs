//! Compile-time tuning constants.
//!
//! Everything here is `const`, not a runtime-configurable struct: the spec
//! has no configuration surface and neither did the source this was
//! distilled from (a `static constexpr` table in `mem_pool.h`).

use core::mem::size_of;

/// Byte size of a page. Must be a power of two; every `Page` is aligned to
/// exactly this size so that masking any interior pointer with
/// `!(PAGE_SIZE - 1)` recovers the page base (spec §3, invariant).
pub const PAGE_SIZE: usize = 4096;
pub const PAGE_MASK: usize = PAGE_SIZE - 1;

/// Number of distinct size classes the thread cache serves.
pub const NUM_SIZE_CLASSES: usize = 8;

/// `(block_size, page_count)` per size class, smallest first.
pub const SIZE_CLASSES: [(usize, usize); NUM_SIZE_CLASSES] = [
    (8, 16),
    (16, 16),
    (32, 16),
    (64, 8),
    (128, 8),
    (256, 4),
    (512, 4),
    (1024, 4),
];

pub const SMALLEST_CLASS: usize = SIZE_CLASSES[0].0;

/// Largest cached size class. Requests above this bypass the cache
/// entirely and go straight to the back-end (spec §6).
pub const THRESHOLD: usize = SIZE_CLASSES[NUM_SIZE_CLASSES - 1].0;

/// A block must be at least a pointer wide so the intrusive free list can
/// thread through its first word while it's free (spec §4.1).
pub const MIN_BLOCK_SIZE: usize = size_of::<usize>();

const _: () = assert!(PAGE_SIZE.is_power_of_two());
const _: () = assert!(SMALLEST_CLASS >= MIN_BLOCK_SIZE);

/// Index of the size class whose block size is `rounded`, given `rounded`
/// is already a power of two `>= SMALLEST_CLASS` and `<= THRESHOLD`.
///
/// `trailing_zeros(rounded) - trailing_zeros(SMALLEST_CLASS)`, as spec §4.3
/// specifies, since the classes are consecutive powers of two starting at
/// `SMALLEST_CLASS`.
#[inline]
pub fn pool_id_for_rounded_size(rounded: usize) -> usize {
    debug_assert!(rounded.is_power_of_two());
    debug_assert!(rounded >= SMALLEST_CLASS && rounded <= THRESHOLD);
    rounded.trailing_zeros() as usize - SMALLEST_CLASS.trailing_zeros() as usize
}

/// Round `x` up to the next power of two; `round_up_pow2(0) == 1`.
///
/// The source's original form computed `1 << (bits - clz(x))` without
/// first checking `x` was already a power of two, which double-rounds
/// exact powers of two. We use the fixed form the later revision of
/// `mem_pool.h` settled on (spec §9, "Open questions"), which is exactly
/// `usize::next_power_of_two`'s contract.
#[inline]
pub fn round_up_pow2(x: usize) -> usize {
    x.next_power_of_two()
}
