// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Classifier rules.
//!
//! A [`Rule`] is a flow value, a wildcard mask, and a priority. The
//! value is always stored masked: any bit the mask wildcards is zero.
//! That normal form is what makes two rules with the same mask and the
//! same meaning compare equal, and it is what the table index is keyed
//! on.

use super::flow::Flow;
use super::flow::FlowWildcards;
use super::flow::parse_fields;
use super::flow::write_fields;
use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// A match pattern plus a priority.
///
/// Higher priority values win. The fields are private so that the
/// value can never hold a bit its mask wildcards. Deserialization goes
/// through [`Rule::from_flow`] as well.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "RuleRepr")]
pub struct Rule {
    flow: Flow,
    wc: FlowWildcards,
    priority: u32,
}

/// The unchecked wire form of a [`Rule`].
#[derive(Deserialize)]
struct RuleRepr {
    flow: Flow,
    wc: FlowWildcards,
    priority: u32,
}

impl From<RuleRepr> for Rule {
    fn from(raw: RuleRepr) -> Self {
        Self::from_flow(raw.flow, raw.wc, raw.priority)
    }
}

impl Rule {
    /// Create a rule, zeroing every wildcarded bit of `flow`.
    ///
    /// Wildcard flags with no defined meaning are dropped from `wc`.
    pub fn from_flow(flow: Flow, wc: FlowWildcards, priority: u32) -> Self {
        let wc = wc.normalized();
        Self { flow: flow.masked(&wc), wc, priority }
    }

    /// A rule matching every flow.
    pub fn match_all(priority: u32) -> Self {
        Self::from_flow(Flow::default(), FlowWildcards::ALL, priority)
    }

    #[inline]
    pub fn flow(&self) -> &Flow {
        &self.flow
    }

    #[inline]
    pub fn wc(&self) -> &FlowWildcards {
        &self.wc
    }

    #[inline]
    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn set_priority(&mut self, priority: u32) {
        self.priority = priority;
    }

    /// Does this rule wildcard nothing?
    #[inline]
    pub fn is_exact(&self) -> bool {
        self.wc.is_exact()
    }

    /// Re-apply the mask to the value. Idempotent.
    pub fn zero_wildcards(&mut self) {
        self.flow = self.flow.masked(&self.wc);
    }

    /// Replace the mask and renormalize the value.
    ///
    /// Narrowing the mask cannot bring back bits that an earlier, wider
    /// mask already cleared.
    pub fn set_wildcards(&mut self, wc: FlowWildcards) {
        self.wc = wc.normalized();
        self.zero_wildcards();
    }

    /// Does `flow` match this rule's pattern?
    #[inline]
    pub fn matches(&self, flow: &Flow) -> bool {
        flow.masked(&self.wc) == self.flow
    }

    /// Could a single flow match both `self` and `other`?
    ///
    /// The two patterns overlap when they agree on every bit that
    /// neither of them wildcards. Priority plays no part.
    pub fn overlaps(&self, other: &Rule) -> bool {
        let wc = self.wc.union(&other.wc);
        self.flow.equal_except(&other.flow, &wc)
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "priority={}", self.priority)?;

        if self.wc != FlowWildcards::ALL {
            write!(f, ",")?;
            write_fields(f, &self.flow, &self.wc)?;
        }

        Ok(())
    }
}

impl FromStr for Rule {
    type Err = String;

    /// Parse a rule of the form
    /// `priority=<n>,<key>=<value>,...`.
    ///
    /// Fields that are not mentioned are wildcarded.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = parse_fields(s)?;

        let Some(priority) = parsed.priority else {
            return Err("missing priority".to_string());
        };

        Ok(Self::from_flow(parsed.flow, parsed.wc, priority))
    }
}
