// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use criterion::BatchSize;
use criterion::Criterion;
use criterion::criterion_group;
use criterion::criterion_main;
use flowcls::api::Include;
use flowcls::engine::Classifier;
use flowcls_bench::MeasurementInfo;
use flowcls_bench::alloc::*;
use flowcls_bench::populated;
use flowcls_test_utils::RuleGen;
use std::hint::black_box;

pub fn lookup<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(M::label());

    for n_rules in [16, 256, 4096] {
        let (cls, flows) = populated(1, n_rules, n_rules, 256);
        let mut i = 0;

        c.bench_function(format!("lookup all/{n_rules}"), |b| {
            b.iter(|| {
                i = (i + 1) % flows.len();
                cls.lookup(black_box(&flows[i]), Include::ALL).is_some()
            })
        });

        c.bench_function(format!("lookup exact/{n_rules}"), |b| {
            b.iter(|| {
                i = (i + 1) % flows.len();
                cls.lookup(black_box(&flows[i]), Include::EXACT).is_some()
            })
        });
    }
}

pub fn insert_remove<M: MeasurementInfo + 'static>(c: &mut Criterion<M>) {
    let mut c = c.benchmark_group(M::label());
    let mut rg = RuleGen::new(2);
    let rules: Vec<_> = (0..1024).map(|_| rg.rule(64)).collect();

    c.bench_function("insert 1024", |b| {
        b.iter_batched(
            Classifier::new,
            |mut cls| {
                for r in &rules {
                    cls.insert(*r);
                }
                cls
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("for_each remove 1024", |b| {
        b.iter_batched(
            || {
                let mut cls = Classifier::new();
                for r in &rules {
                    cls.insert(*r);
                }
                cls
            },
            |mut cls| {
                cls.for_each(Include::ALL, |cls, id| {
                    cls.remove(id);
                });
                cls
            },
            BatchSize::SmallInput,
        )
    });
}

criterion_group!(cls_wall, lookup, insert_remove);
criterion_group!(
    name = cls_alloc;
    config = new_crit(Allocs);
    targets = lookup
);
criterion_group!(
    name = cls_byte_alloc;
    config = new_crit(BytesAlloced);
    targets = insert_remove
);
criterion_main!(cls_wall, cls_alloc, cls_byte_alloc);
