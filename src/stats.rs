//! Lightweight allocation counters, in the same style as the teacher's
//! `stats.rs`: a handful of atomics updated with relaxed ordering on the
//! hot path, trimmed to the counters this allocator actually has a use
//! for (the teacher's full `Stats` struct tracked mimalloc-specific
//! concepts — reset pages, commit calls, segment cache — that have no
//! counterpart here).

use core::sync::atomic::{AtomicI64, Ordering};

#[derive(Default)]
pub struct StatCount {
    pub current: AtomicI64,
    pub peak: AtomicI64,
}

impl StatCount {
    pub const fn new() -> Self {
        StatCount {
            current: AtomicI64::new(0),
            peak: AtomicI64::new(0),
        }
    }

    pub fn increase(&self, amount: i64) {
        if amount == 0 {
            return;
        }
        let prev = self.current.fetch_add(amount, Ordering::Relaxed);
        let new = prev + amount;
        let mut peak = self.peak.load(Ordering::Relaxed);
        while new > peak {
            match self
                .peak
                .compare_exchange_weak(peak, new, Ordering::Relaxed, Ordering::Relaxed)
            {
                Ok(_) => break,
                Err(observed) => peak = observed,
            }
        }
    }

    pub fn decrease(&self, amount: i64) {
        self.increase(-amount);
    }

    pub fn current(&self) -> i64 {
        self.current.load(Ordering::Relaxed)
    }

    pub fn peak(&self) -> i64 {
        self.peak.load(Ordering::Relaxed)
    }
}

/// Process-wide counters. All fields are independent; there is no single
/// lock because nothing here needs cross-field consistency.
///
/// There is no "bytes live in the back-end" counter: once a pointer
/// crosses into `sys_alloc`/`sys_free` territory this allocator no longer
/// knows its size (that's the size-map the radix tree is an alternative
/// to, and the page-pool design exists specifically to not need one on
/// the hot path — spec §4.3, §4.4), so any such counter would either be
/// wrong or require the side bookkeeping the design avoids.
pub struct Stats {
    /// Bytes currently reserved by thread caches (backing regions).
    pub thread_caches: StatCount,
    /// Number of live threads that have initialized a cache.
    pub threads: StatCount,
}

impl Stats {
    pub const fn new() -> Self {
        Stats {
            thread_caches: StatCount::new(),
            threads: StatCount::new(),
        }
    }
}

pub static STATS: Stats = Stats::new();
