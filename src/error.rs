//! Error taxonomy (spec §7).
//!
//! The public `allocate`/`deallocate` surface stays the classical
//! pointer-in, pointer-out interface (null on OOM, UB on invalid free) —
//! that's the contract spec.md and the original C++ both commit to. This
//! enum exists so the diagnostics we log (via `log`) carry a structured
//! reason, and so tests/embedders that install a logger can assert on
//! *why* something happened rather than grepping message text.

use core::fmt;

/// Reasons the allocator logs a diagnostic. Not returned by the public API.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The back-end (`sys_alloc`) returned null. Surfaced to the caller as
    /// a null pointer from `allocate`.
    OutOfMemory,
    /// A `deallocate` target was observed outside the range of the page it
    /// was claimed to belong to. Only detectable in debug builds (spec
    /// §4.1); the release build has no way to notice this and the
    /// behavior is undefined.
    InvalidFree,
    /// `allocate(0)` was requested. Not an error condition — it's
    /// implementation-defined but stable (spec §7): the caller gets back a
    /// valid block of the smallest size class, as if `size` had rounded up
    /// to 1 and then to `SMALLEST_CLASS`. Kept in the taxonomy so a logger
    /// can distinguish this path from an ordinary small allocation.
    SizeZero,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AllocError::OutOfMemory => write!(f, "back-end allocation failed"),
            AllocError::InvalidFree => write!(f, "deallocate target outside owning page"),
            AllocError::SizeZero => write!(f, "allocate(0) rounded to smallest size class"),
        }
    }
}
