//! Scenario tests mirroring `test_mem_pool.cpp`, `test_radix_tree.cpp` and
//! `interchange_allocator.cpp`: batched alloc/write/check/free rounds, a
//! radix tree vs. `BTreeMap` cross-check, and a multi-thread interchange
//! test (spec §8, "Concrete scenarios").

use std::collections::BTreeMap;
use std::sync::Mutex;
use std::thread;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use upool::consts::THRESHOLD;
use upool::radix::MultiLevelRadixTree;
use upool::{allocate, deallocate};

fn checksum_byte(ptr: *const u8, offset: usize) -> u8 {
    b'a' + ((offset + ptr as usize) % 26) as u8
}

#[test]
fn single_thread_tight_loop_soak() {
    for _ in 0..2000 {
        let p = allocate(64);
        assert!(!p.is_null());
        unsafe { deallocate(p) };
    }
}

#[test]
fn batched_alloc_free_with_checksums() {
    let mut rng = StdRng::seed_from_u64(0xC0FFEE);
    let batch_count = 500;
    let batch_size = 200;

    for _ in 0..batch_count {
        let mut allocated: Vec<(*mut u8, usize)> = Vec::with_capacity(batch_size);
        for _ in 0..batch_size {
            let size = rng.random_range(1..3000);
            let ptr = allocate(size);
            assert!(!ptr.is_null());
            for b in 0..size {
                unsafe { ptr.add(b).write(checksum_byte(ptr, b)) };
            }
            allocated.push((ptr, size));
        }
        while let Some((ptr, size)) = allocated.pop() {
            for b in 0..size {
                let got = unsafe { ptr.add(b).read() };
                assert_eq!(got, checksum_byte(ptr, b));
            }
            unsafe { deallocate(ptr) };
        }
    }
}

#[test]
fn radix_tree_matches_btreemap_over_many_rounds() {
    let mut rng = StdRng::seed_from_u64(42);
    let mut target: BTreeMap<u64, u64> = BTreeMap::new();
    let mut current: MultiLevelRadixTree<u64> = MultiLevelRadixTree::new();

    let rounds = 2000;
    let batch = 25;

    for _ in 0..rounds {
        let mut keys = Vec::with_capacity(batch);
        for _ in 0..batch {
            let key: u64 = rng.random_range(1..(1u64 << 30));
            let value: u64 = rng.random_range(1..(1u64 << 30));
            target.insert(key, value);
            current.put(key, value);
            keys.push(key);
        }
        for key in keys {
            let expected = target.get(&key).copied();
            let got = current.get(key);
            assert_eq!(expected, got, "mismatch for key {}", key);
        }
    }
}

/// Raw allocator pointers aren't `Send`/`Sync` by default. Each pointer here
/// is only ever touched by the thread that owns its bucket (or after all
/// threads have joined), so sharing the bucket vector across threads is
/// sound even though the compiler can't see that on its own.
struct SendPtr(*mut u8);
unsafe impl Send for SendPtr {}

#[test]
fn multi_thread_interchange() {
    const THREADS: usize = 4;
    const OPS_PER_THREAD: usize = 5000;

    let buckets: Vec<Mutex<Vec<SendPtr>>> = (0..THREADS).map(|_| Mutex::new(Vec::new())).collect();
    let buckets = std::sync::Arc::new(buckets);

    let handles: Vec<_> = (0..THREADS)
        .map(|tid| {
            let buckets = buckets.clone();
            thread::spawn(move || {
                let mut rng = StdRng::seed_from_u64(1000 + tid as u64);
                for _ in 0..OPS_PER_THREAD {
                    let coin: u32 = rng.random_range(0..2);
                    let mut bucket = buckets[tid].lock().unwrap();
                    if coin == 0 {
                        if let Some(ptr) = bucket.pop() {
                            drop(bucket);
                            unsafe { deallocate(ptr.0) };
                        }
                    } else {
                        let size = rng.random_range(1..4096);
                        drop(bucket);
                        let ptr = allocate(size);
                        assert!(!ptr.is_null());
                        buckets[tid].lock().unwrap().push(SendPtr(ptr));
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    for bucket in buckets.iter() {
        let mut bucket = bucket.lock().unwrap();
        while let Some(ptr) = bucket.pop() {
            unsafe { deallocate(ptr.0) };
        }
    }
}

#[test]
fn back_end_bypass_for_large_allocations() {
    let size = THRESHOLD * 8;
    let ptr = allocate(size);
    assert!(!ptr.is_null());
    unsafe {
        ptr.write(0x42);
        ptr.add(size - 1).write(0x24);
    }
    unsafe { deallocate(ptr) };
}
