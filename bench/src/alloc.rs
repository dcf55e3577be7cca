// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Counting allocator used to track the number of allocations, and
//! bytes allocated, during benchmark cases, with `criterion`
//! integration.

use super::MeasurementInfo;
use criterion::Criterion;
use criterion::measurement::Measurement;
use criterion::measurement::ValueFormatter;
use std::alloc::GlobalAlloc;
use std::alloc::Layout;
use std::alloc::System;
use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;

#[global_allocator]
static BENCH_ALLOC: CountingAlloc = CountingAlloc::new();

struct CountingAlloc {
    allocs: AtomicU64,
    bytes: AtomicU64,
}

impl CountingAlloc {
    const fn new() -> Self {
        Self { allocs: AtomicU64::new(0), bytes: AtomicU64::new(0) }
    }
}

unsafe impl GlobalAlloc for CountingAlloc {
    unsafe fn alloc(&self, layout: Layout) -> *mut u8 {
        self.allocs.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(layout.size() as u64, Ordering::Relaxed);
        unsafe { System.alloc(layout) }
    }

    unsafe fn dealloc(&self, ptr: *mut u8, layout: Layout) {
        unsafe { System.dealloc(ptr, layout) }
    }
}

pub trait MemMeasure {
    fn read() -> u64;
    fn formatter() -> &'static dyn ValueFormatter;
    fn label() -> &'static str;
}

pub struct Allocs;
pub struct BytesAlloced;

impl MemMeasure for Allocs {
    fn read() -> u64 {
        BENCH_ALLOC.allocs.load(Ordering::Relaxed)
    }

    fn formatter() -> &'static dyn ValueFormatter {
        &COUNT_FMT
    }

    fn label() -> &'static str {
        "alloc_ct"
    }
}

impl MemMeasure for BytesAlloced {
    fn read() -> u64 {
        BENCH_ALLOC.bytes.load(Ordering::Relaxed)
    }

    fn formatter() -> &'static dyn ValueFormatter {
        &BYTES_FMT
    }

    fn label() -> &'static str {
        "alloc_sz"
    }
}

/// Counts are small per iteration, so values are never rescaled.
struct UnitFormatter(&'static str);

static COUNT_FMT: UnitFormatter = UnitFormatter("");
static BYTES_FMT: UnitFormatter = UnitFormatter("B");

impl ValueFormatter for UnitFormatter {
    fn scale_values(&self, _typical: f64, _values: &mut [f64]) -> &'static str {
        self.0
    }

    fn scale_throughputs(
        &self,
        _typical: f64,
        _throughput: &criterion::Throughput,
        _values: &mut [f64],
    ) -> &'static str {
        self.0
    }

    fn scale_for_machines(&self, _values: &mut [f64]) -> &'static str {
        self.0
    }
}

/// Adapts a [`MemMeasure`] into a criterion [`Measurement`].
pub struct Local<T>(T);

impl<T: MemMeasure> Measurement for Local<T> {
    type Intermediate = u64;
    type Value = u64;

    fn start(&self) -> Self::Intermediate {
        T::read()
    }

    fn end(&self, i: Self::Intermediate) -> Self::Value {
        T::read() - i
    }

    fn add(&self, v1: &Self::Value, v2: &Self::Value) -> Self::Value {
        v1 + v2
    }

    fn zero(&self) -> Self::Value {
        0
    }

    fn to_f64(&self, value: &Self::Value) -> f64 {
        *value as f64
    }

    fn formatter(&self) -> &dyn ValueFormatter {
        T::formatter()
    }
}

impl<T: MemMeasure> MeasurementInfo for Local<T> {
    fn label() -> &'static str {
        T::label()
    }
}

/// Create a new [`Criterion`] instance tuned for counting allocations.
pub fn new_crit<T: MemMeasure>(val: T) -> Criterion<Local<T>> {
    Criterion::default()
        .with_measurement(Local(val))
        .sample_size(10)
        .warm_up_time(Duration::from_nanos(1))
        .measurement_time(Duration::from_micros(10))
        .nresamples(1)
        .without_plots()
}
