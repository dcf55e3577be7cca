// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A table: every rule sharing one wildcard mask.
//!
//! The table indexes rules by their (already masked) flow value. Rules
//! with the same value form a chain ordered by descending priority;
//! the table only stores the head of each chain. The chain links
//! themselves live in the classifier's rule entries.
//!
//! Heads are kept in a dense vector and the hash index maps a value to
//! its slot, so stepping from one chain to the next is a single
//! lookup. Removing a chain moves the last head into the freed slot.

use super::classifier::RuleId;
use super::flow::Flow;
use super::flow::FlowHashBuilder;
use super::flow::FlowWildcards;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use hashbrown::HashMap;

/// A table handle.
///
/// IDs are handed out in creation order and never reused for the life
/// of a classifier; a lower ID means an older table.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct TableId(pub(crate) u32);

impl TableId {
    pub fn val(&self) -> u32 {
        self.0
    }
}

impl Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug)]
pub struct Table {
    wc: FlowWildcards,
    exact_bits: u32,
    index: HashMap<Flow, usize, FlowHashBuilder>,
    heads: Vec<(Flow, RuleId)>,
    n_rules: usize,
    n_refs: u32,
    registered: bool,
}

impl Table {
    pub(crate) fn new(wc: FlowWildcards) -> Self {
        Self {
            wc,
            exact_bits: wc.exact_bits(),
            index: HashMap::with_hasher(FlowHashBuilder::default()),
            heads: Vec::new(),
            n_rules: 0,
            n_refs: 0,
            registered: true,
        }
    }

    /// The mask shared by every rule in this table.
    #[inline]
    pub fn wc(&self) -> &FlowWildcards {
        &self.wc
    }

    #[inline]
    pub fn is_exact(&self) -> bool {
        self.wc.is_exact()
    }

    /// The number of bits this table's mask requires to match.
    #[inline]
    pub fn exact_bits(&self) -> u32 {
        self.exact_bits
    }

    /// The number of rules, counting every chain member.
    #[inline]
    pub fn n_rules(&self) -> usize {
        self.n_rules
    }

    /// The number of distinct flow values, i.e. chains.
    pub fn n_chains(&self) -> usize {
        self.heads.len()
    }

    /// The number of outstanding leases.
    #[inline]
    pub fn n_refs(&self) -> u32 {
        self.n_refs
    }

    /// Is this table still reachable by its mask?
    ///
    /// A table is deregistered as soon as its last rule is removed,
    /// even while a lease keeps it allocated.
    #[inline]
    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// The head of the chain for `masked`, which must already be
    /// masked with this table's mask.
    #[inline]
    pub(crate) fn head(&self, masked: &Flow) -> Option<RuleId> {
        let slot = *self.index.get(masked)?;
        self.heads.get(slot).map(|(_, id)| *id)
    }

    /// Every chain head, in index order.
    pub(crate) fn heads(&self) -> impl Iterator<Item = RuleId> + '_ {
        self.heads.iter().map(|(_, id)| *id)
    }

    /// The chain head that follows the chain keyed by `flow`, in index
    /// order.
    pub(crate) fn head_after(&self, flow: &Flow) -> Option<RuleId> {
        let slot = *self.index.get(flow)?;
        self.heads.get(slot + 1).map(|(_, id)| *id)
    }

    pub(crate) fn set_head(&mut self, flow: Flow, id: RuleId) {
        if let Some(slot) = self.index.get(&flow).copied() {
            if let Some(head) = self.heads.get_mut(slot) {
                head.1 = id;
            }
            return;
        }

        self.index.insert(flow, self.heads.len());
        self.heads.push((flow, id));
    }

    pub(crate) fn clear_head(&mut self, flow: &Flow) {
        let Some(slot) = self.index.remove(flow) else {
            return;
        };

        self.heads.swap_remove(slot);
        if let Some((moved, _)) = self.heads.get(slot) {
            self.index.insert(*moved, slot);
        }
    }

    pub(crate) fn rule_added(&mut self) {
        self.n_rules += 1;
    }

    pub(crate) fn rule_removed(&mut self) {
        self.n_rules -= 1;
    }

    pub(crate) fn acquire(&mut self) {
        self.n_refs += 1;
    }

    pub(crate) fn drop_ref(&mut self) {
        self.n_refs -= 1;
    }

    pub(crate) fn deregister(&mut self) {
        self.registered = false;
    }

    /// Can this table be freed?
    #[inline]
    pub(crate) fn is_reclaimable(&self) -> bool {
        !self.registered && self.n_rules == 0 && self.n_refs == 0
    }
}
