// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Classifier counters.

use crate::api::ClsStatsSnap;
use core::sync::atomic::AtomicU64;
use core::sync::atomic::Ordering;

/// Event counters for a single classifier.
///
/// Lookups only hold a shared reference to the classifier, so every
/// counter is atomic. The counts are statistics; relaxed ordering is
/// all they need.
#[derive(Debug, Default)]
pub struct ClsStats {
    pub(crate) lookups: AtomicU64,
    pub(crate) lookup_hits: AtomicU64,
    pub(crate) lookup_misses: AtomicU64,
    pub(crate) inserts: AtomicU64,
    pub(crate) replacements: AtomicU64,
    pub(crate) removals: AtomicU64,
    pub(crate) tables_created: AtomicU64,
    pub(crate) tables_destroyed: AtomicU64,
}

#[inline]
pub(crate) fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

impl ClsStats {
    pub fn snapshot(&self) -> ClsStatsSnap {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);

        ClsStatsSnap {
            lookups: get(&self.lookups),
            lookup_hits: get(&self.lookup_hits),
            lookup_misses: get(&self.lookup_misses),
            inserts: get(&self.inserts),
            replacements: get(&self.replacements),
            removals: get(&self.removals),
            tables_created: get(&self.tables_created),
            tables_destroyed: get(&self.tables_destroyed),
        }
    }

    /// Zero every counter.
    pub fn reset(&self) {
        for c in [
            &self.lookups,
            &self.lookup_hits,
            &self.lookup_misses,
            &self.inserts,
            &self.replacements,
            &self.removals,
            &self.tables_created,
            &self.tables_destroyed,
        ] {
            c.store(0, Ordering::Relaxed);
        }
    }
}
