// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Serializable views of classifier state, used for printing and for
//! handing a snapshot to administration tools.

use alloc::string::String;
use alloc::vec::Vec;
use serde::Deserialize;
use serde::Serialize;

/// A dump of an entire classifier.
#[derive(Debug, Deserialize, Serialize)]
pub struct DumpClassifierResp {
    /// Total number of rules, including lower-priority duplicates.
    pub n_rules: usize,
    /// Number of rules in the exact-match table.
    pub n_exact: usize,
    /// The registered tables.
    pub tables: Vec<TableDump>,
}

/// A dump of one table: every rule sharing a single mask.
#[derive(Debug, Deserialize, Serialize)]
pub struct TableDump {
    pub id: u32,
    /// The wildcarded fields, in text form.
    pub wildcards: String,
    pub exact: bool,
    pub n_rules: usize,
    /// Outstanding iteration leases.
    pub n_refs: u32,
    pub rules: Vec<RuleDump>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RuleDump {
    /// The rule handle, as `index.generation`.
    pub id: String,
    pub priority: u32,
    /// The rule in its text form.
    pub rule: String,
}

/// A point-in-time copy of the classifier counters.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct ClsStatsSnap {
    pub lookups: u64,
    pub lookup_hits: u64,
    pub lookup_misses: u64,
    pub inserts: u64,
    pub replacements: u64,
    pub removals: u64,
    pub tables_created: u64,
    pub tables_destroyed: u64,
}
