// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Shared pieces of the classifier benchmarks.

use criterion::measurement::Measurement;
use criterion::measurement::WallTime;
use flowcls::engine::Classifier;
use flowcls::engine::Flow;
use flowcls_test_utils::RuleGen;

#[cfg(feature = "alloc")]
pub mod alloc;

/// Additional labelling information for [`Measurement`]s for
/// pretty-printing and grouping.
pub trait MeasurementInfo: Measurement {
    fn label() -> &'static str;
}

impl MeasurementInfo for WallTime {
    fn label() -> &'static str {
        "wallclock"
    }
}

/// A classifier of `n_rules` random wildcarded rules, plus `n_exact`
/// random exact ones, and `n_flows` flows to look up in it.
pub fn populated(
    seed: u64,
    n_rules: usize,
    n_exact: usize,
    n_flows: usize,
) -> (Classifier, Vec<Flow>) {
    let mut rg = RuleGen::new(seed);
    let mut cls = Classifier::new();

    for _ in 0..n_rules {
        cls.insert(rg.rule(64));
    }
    for _ in 0..n_exact {
        cls.insert_exact(rg.exact_rule(64));
    }

    let flows = (0..n_flows).map(|_| rg.flow()).collect();
    (cls, flows)
}
