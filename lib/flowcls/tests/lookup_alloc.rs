// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The lookup path must not allocate.
//!
//! This binary installs its own global allocator that counts
//! allocations per thread, so the other test threads do not disturb
//! the count.

use flowcls::api::Include;
use flowcls::engine::Classifier;
use flowcls_test_utils::RuleGen;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::cell::Cell;
use std::hint::black_box;

#[global_allocator]
static COUNTING: CountingAlloc = CountingAlloc;

thread_local! {
    static THREAD_ALLOCS: Cell<u64> = const { Cell::new(0) };
}

struct CountingAlloc;

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        let _ = THREAD_ALLOCS.try_with(|c| c.set(c.get() + 1));
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

fn thread_allocs() -> u64 {
    THREAD_ALLOCS.with(Cell::get)
}

#[test]
fn lookup_does_not_allocate() {
    let mut rg = RuleGen::new(17);
    let mut cls = Classifier::new();
    for _ in 0..500 {
        cls.insert(rg.rule(64));
    }
    for _ in 0..500 {
        cls.insert_exact(rg.exact_rule(64));
    }
    let flows: Vec<_> = (0..64).map(|_| rg.flow()).collect();

    // Warm up anything lazily initialized.
    let _ = black_box(cls.lookup(&flows[0], Include::ALL));

    let before = thread_allocs();
    let mut hits = 0;
    for f in &flows {
        for include in [Include::ALL, Include::EXACT, Include::WILD] {
            if black_box(cls.lookup(black_box(f), include)).is_some() {
                hits += 1;
            }
            let _ = black_box(cls.lookup_id(black_box(f), include));
        }
    }
    assert_eq!(thread_allocs(), before);
    assert!(hits > 0);
}
