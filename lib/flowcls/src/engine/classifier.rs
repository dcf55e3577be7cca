// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The classifier.
//!
//! Rules are partitioned into [`Table`]s, one per distinct wildcard
//! mask. A lookup masks the flow once per table, probes that table's
//! index, and keeps the best chain head it finds.
//!
//! Rules themselves live in an arena of entries addressed by
//! [`RuleId`]. An entry records the table it belongs to and its
//! neighbors in its equal-value chain, so removing a rule is O(1) once
//! its ID is known. IDs are generational: once a rule is removed or
//! replaced, its old ID is stale and is never confused with a rule
//! that later reuses the same slot.
//!
//! # Table lifetime
//!
//! A table that loses its last rule is deregistered at once, so the
//! next insert with that mask starts a fresh table. Its storage is
//! only reclaimed once no [`TableLease`] is outstanding. Iteration
//! holds a lease on the table it is walking, which is what lets an
//! iteration callback remove any rule, including the last one of the
//! table being walked.

use super::flow::Flow;
use super::flow::FlowHashBuilder;
use super::flow::FlowWildcards;
use super::rule::Rule;
use super::stat::ClsStats;
use super::stat::bump;
use super::table::Table;
use super::table::TableId;
use crate::api::ClsStatsSnap;
use crate::api::DumpClassifierResp;
use crate::api::Include;
use crate::api::RuleDump;
use crate::api::TableDump;
use alloc::collections::BTreeMap;
use alloc::string::ToString;
use alloc::vec::Vec;
use core::fmt;
use core::fmt::Display;
use hashbrown::HashMap;

/// A handle to a rule held by a [`Classifier`].
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct RuleId {
    idx: u32,
    generation: u32,
}

impl Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}", self.idx, self.generation)
    }
}

#[derive(Debug)]
struct RuleEntry {
    rule: Rule,
    table: TableId,
    prev: Option<RuleId>,
    next: Option<RuleId>,
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<RuleEntry>,
}

/// A hold on a table that keeps it allocated, even after it has lost
/// all of its rules.
///
/// Must be handed back with [`Classifier::release`].
#[must_use = "a table lease must be released"]
#[derive(Debug)]
pub struct TableLease {
    table: TableId,
}

impl TableLease {
    pub fn table(&self) -> TableId {
        self.table
    }
}

/// A set of rules, queryable by flow.
///
/// Mutation takes `&mut self` and lookup takes `&self`, so a lookup
/// can never observe a half-finished update. Callers sharing a
/// classifier between threads should use
/// [`super::shared::SharedClassifier`].
#[derive(Debug, Default)]
pub struct Classifier {
    slots: Vec<Slot>,
    free: Vec<u32>,
    tables: BTreeMap<TableId, Table>,
    by_mask: HashMap<FlowWildcards, TableId, FlowHashBuilder>,
    exact: Option<TableId>,
    next_table: u32,
    n_rules: usize,
    stats: ClsStats,
}

struct Chain<'a> {
    cls: &'a Classifier,
    next: Option<RuleId>,
}

impl<'a> Iterator for Chain<'a> {
    type Item = (RuleId, &'a Rule);

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next?;
        let entry = self.cls.live_entry(id);
        self.next = entry.next;
        Some((id, &entry.rule))
    }
}

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    // ================================================================
    // Rule arena
    // ================================================================

    fn alloc(&mut self, entry: RuleEntry) -> RuleId {
        if let Some(idx) = self.free.pop() {
            let slot = &mut self.slots[idx as usize];
            slot.entry = Some(entry);
            return RuleId { idx, generation: slot.generation };
        }

        let Ok(idx) = u32::try_from(self.slots.len()) else {
            panic!("rule arena exhausted");
        };
        self.slots.push(Slot { generation: 0, entry: Some(entry) });
        RuleId { idx, generation: 0 }
    }

    /// Vacate a live slot, making `id` stale.
    fn vacate(&mut self, id: RuleId) -> RuleEntry {
        let slot = &mut self.slots[id.idx as usize];
        let Some(entry) = slot.entry.take() else {
            panic!("bug: vacating empty slot for rule {id}");
        };
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.idx);
        entry
    }

    fn entry(&self, id: RuleId) -> Option<&RuleEntry> {
        self.slots
            .get(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    /// Fetch an entry that is reachable from a table and must be live.
    fn live_entry(&self, id: RuleId) -> &RuleEntry {
        match self.entry(id) {
            Some(entry) => entry,
            None => panic!("bug: table references stale rule {id}"),
        }
    }

    fn live_entry_mut(&mut self, id: RuleId) -> &mut RuleEntry {
        match self
            .slots
            .get_mut(id.idx as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.entry.as_mut())
        {
            Some(entry) => entry,
            None => panic!("bug: table references stale rule {id}"),
        }
    }

    fn chain(&self, head: RuleId) -> Chain<'_> {
        Chain { cls: self, next: Some(head) }
    }

    // ================================================================
    // Tables
    // ================================================================

    fn table_mut(&mut self, tid: TableId) -> &mut Table {
        match self.tables.get_mut(&tid) {
            Some(table) => table,
            None => panic!("bug: missing table {tid}"),
        }
    }

    /// Return the registered table for `wc`, creating it if needed.
    fn table_for(&mut self, wc: &FlowWildcards) -> TableId {
        if let Some(tid) = self.by_mask.get(wc) {
            return *tid;
        }

        let tid = TableId(self.next_table);
        self.next_table += 1;
        self.tables.insert(tid, Table::new(*wc));
        self.by_mask.insert(*wc, tid);
        if wc.is_exact() {
            self.exact = Some(tid);
        }

        bump(&self.stats.tables_created);
        table_create_probe(tid, wc);
        tid
    }

    /// Make an empty table unreachable by its mask.
    fn deregister(&mut self, tid: TableId) {
        let table = self.table_mut(tid);
        if !table.is_registered() {
            return;
        }
        table.deregister();
        let wc = *table.wc();

        self.by_mask.remove(&wc);
        if self.exact == Some(tid) {
            self.exact = None;
        }
    }

    /// Free `tid` if it is deregistered, empty, and unleased.
    fn reclaim(&mut self, tid: TableId) {
        if !self.tables.get(&tid).is_some_and(Table::is_reclaimable) {
            return;
        }

        if let Some(table) = self.tables.remove(&tid) {
            bump(&self.stats.tables_destroyed);
            table_destroy_probe(tid, table.wc());
        }
    }

    /// Look up a table by ID. Deregistered tables that are still held
    /// by a lease are returned too.
    pub fn table(&self, tid: TableId) -> Option<&Table> {
        self.tables.get(&tid)
    }

    /// The registered table holding rules with mask `wc`, if any.
    pub fn find_table(&self, wc: &FlowWildcards) -> Option<TableId> {
        self.by_mask.get(&wc.normalized()).copied()
    }

    /// The number of registered tables.
    pub fn num_tables(&self) -> usize {
        self.by_mask.len()
    }

    /// Take a lease on `tid`, keeping it allocated until the lease is
    /// released.
    ///
    /// Returns `None` if the table no longer exists.
    pub fn lease(&mut self, tid: TableId) -> Option<TableLease> {
        self.tables.get_mut(&tid)?.acquire();
        Some(TableLease { table: tid })
    }

    /// Return a lease, freeing the table if it emptied while leased.
    pub fn release(&mut self, lease: TableLease) {
        self.table_mut(lease.table).drop_ref();
        self.reclaim(lease.table);
    }

    // ================================================================
    // Mutation
    // ================================================================

    /// Insert `rule`.
    ///
    /// If a rule with the same mask, the same value, and the same
    /// priority is already present, `rule` takes its place and the old
    /// rule is returned; the old rule's ID becomes stale. No check is
    /// made for overlap with other rules.
    pub fn insert(&mut self, rule: Rule) -> (RuleId, Option<Rule>) {
        let tid = self.table_for(rule.wc());
        self.insert_into(tid, rule)
    }

    /// Insert a rule that has no wildcards, going straight to the
    /// exact-match table.
    ///
    /// # Panics
    ///
    /// If `rule` wildcards anything.
    pub fn insert_exact(&mut self, rule: Rule) -> (RuleId, Option<Rule>) {
        if !rule.is_exact() {
            panic!("bug: insert_exact() of wildcarded rule: {rule}");
        }

        let tid = match self.exact {
            Some(tid) => tid,
            None => self.table_for(&FlowWildcards::EXACT),
        };
        self.insert_into(tid, rule)
    }

    fn insert_into(
        &mut self,
        tid: TableId,
        rule: Rule,
    ) -> (RuleId, Option<Rule>) {
        let flow = *rule.flow();
        let priority = rule.priority();

        // Find the neighbors the new rule goes between, or the rule it
        // replaces.
        let mut prev = None;
        let mut cur = self.table_mut(tid).head(&flow);
        while let Some(id) = cur {
            let entry = self.live_entry(id);
            if entry.rule.priority() == priority {
                let new = self.replace(tid, id, rule);
                return (new, Some(self.vacate(id).rule));
            }
            if entry.rule.priority() < priority {
                break;
            }
            prev = cur;
            cur = entry.next;
        }

        let id = self.alloc(RuleEntry { rule, table: tid, prev, next: cur });
        match prev {
            Some(p) => self.live_entry_mut(p).next = Some(id),
            None => self.table_mut(tid).set_head(flow, id),
        }
        if let Some(c) = cur {
            self.live_entry_mut(c).prev = Some(id);
        }

        self.table_mut(tid).rule_added();
        self.n_rules += 1;
        bump(&self.stats.inserts);
        rule_insert_probe(tid, &rule);
        (id, None)
    }

    /// Splice `rule` into the chain position held by `old`.
    fn replace(&mut self, tid: TableId, old: RuleId, rule: Rule) -> RuleId {
        let (prev, next) = {
            let entry = self.live_entry(old);
            (entry.prev, entry.next)
        };

        let id = self.alloc(RuleEntry { rule, table: tid, prev, next });
        match prev {
            Some(p) => self.live_entry_mut(p).next = Some(id),
            None => self.table_mut(tid).set_head(*rule.flow(), id),
        }
        if let Some(n) = next {
            self.live_entry_mut(n).prev = Some(id);
        }

        bump(&self.stats.replacements);
        rule_replace_probe(tid, &rule);
        id
    }

    /// Remove the rule `id`, returning it.
    ///
    /// A table left empty is deregistered at once and freed as soon as
    /// no lease holds it.
    ///
    /// # Panics
    ///
    /// If `id` is stale: removing a rule that is not in the classifier
    /// is a caller bug.
    pub fn remove(&mut self, id: RuleId) -> Rule {
        let Some(entry) = self.entry(id) else {
            panic!("bug: remove() of stale rule id {id}");
        };
        let (tid, prev, next) = (entry.table, entry.prev, entry.next);
        let flow = *entry.rule.flow();

        match prev {
            Some(p) => self.live_entry_mut(p).next = next,
            None => match next {
                Some(n) => self.table_mut(tid).set_head(flow, n),
                None => self.table_mut(tid).clear_head(&flow),
            },
        }
        if let Some(n) = next {
            self.live_entry_mut(n).prev = prev;
        }

        let entry = self.vacate(id);
        self.n_rules -= 1;
        let table = self.table_mut(tid);
        table.rule_removed();
        let empty = table.n_rules() == 0;

        bump(&self.stats.removals);
        rule_remove_probe(tid, &entry.rule);

        if empty {
            self.deregister(tid);
            self.reclaim(tid);
        }

        entry.rule
    }

    // ================================================================
    // Queries
    // ================================================================

    /// Is `id` a live rule?
    pub fn contains(&self, id: RuleId) -> bool {
        self.entry(id).is_some()
    }

    pub fn get(&self, id: RuleId) -> Option<&Rule> {
        self.entry(id).map(|entry| &entry.rule)
    }

    /// The table holding `id`, if it is live.
    pub fn table_of(&self, id: RuleId) -> Option<TableId> {
        self.entry(id).map(|entry| entry.table)
    }

    /// Find the highest priority rule matching `flow` among the tables
    /// selected by `include`.
    ///
    /// When rules of equal priority in different tables both match,
    /// the rule whose mask fixes more bits wins; if that is also a tie
    /// the older table wins.
    pub fn lookup(&self, flow: &Flow, include: Include) -> Option<&Rule> {
        self.lookup_id(flow, include).map(|id| &self.live_entry(id).rule)
    }

    /// Like [`Self::lookup`], but return the matching rule's ID.
    pub fn lookup_id(&self, flow: &Flow, include: Include) -> Option<RuleId> {
        bump(&self.stats.lookups);

        let found = if include == Include::EXACT {
            self.exact.and_then(|tid| {
                let head = self.tables.get(&tid)?.head(flow)?;
                Some((tid, head))
            })
        } else {
            self.search(flow, include)
        };

        match found {
            Some((tid, id)) => {
                bump(&self.stats.lookup_hits);
                lookup_hit_probe(flow, tid, &self.live_entry(id).rule);
                Some(id)
            }

            None => {
                bump(&self.stats.lookup_misses);
                lookup_miss_probe(flow, include);
                None
            }
        }
    }

    fn search(
        &self,
        flow: &Flow,
        include: Include,
    ) -> Option<(TableId, RuleId)> {
        // (priority, exact bits, table, rule)
        let mut best: Option<(u32, u32, TableId, RuleId)> = None;

        // Tables are visited oldest first, so only a strictly better
        // candidate displaces the current best.
        for (tid, table) in &self.tables {
            if !table.is_registered() || !include.covers(table.is_exact()) {
                continue;
            }

            let Some(head) = table.head(&flow.masked(table.wc())) else {
                continue;
            };

            let priority = self.live_entry(head).rule.priority();
            let bits = table.exact_bits();
            let better = match best {
                None => true,
                Some((bp, bbits, _, _)) => {
                    priority > bp || (priority == bp && bits > bbits)
                }
            };

            if better {
                best = Some((priority, bits, *tid, head));
            }
        }

        best.map(|(_, _, tid, id)| (tid, id))
    }

    /// Could any flow match both `target` and a rule in the
    /// classifier?
    ///
    /// Priorities are not considered.
    pub fn rule_overlaps(&self, target: &Rule) -> bool {
        // Every member of a chain has the same value and mask, so the
        // head speaks for the whole chain.
        self.tables
            .values()
            .filter(|table| table.is_registered())
            .flat_map(|table| table.heads())
            .any(|head| self.live_entry(head).rule.overlaps(target))
    }

    /// Find the rule with exactly `target`'s mask, value, and priority.
    pub fn find_rule_exactly(&self, target: &Rule) -> Option<RuleId> {
        let tid = self.by_mask.get(target.wc())?;
        let head = self.tables.get(tid)?.head(target.flow())?;

        self.chain(head)
            .take_while(|(_, rule)| rule.priority() >= target.priority())
            .find(|(_, rule)| rule.priority() == target.priority())
            .map(|(id, _)| id)
    }

    /// The total number of rules, counting rules hidden behind a
    /// higher priority rule with the same pattern.
    pub fn count(&self) -> usize {
        self.n_rules
    }

    /// The number of rules in the exact-match table.
    pub fn count_exact(&self) -> usize {
        self.exact
            .and_then(|tid| self.tables.get(&tid))
            .map_or(0, Table::n_rules)
    }

    pub fn is_empty(&self) -> bool {
        self.n_rules == 0
    }

    // ================================================================
    // Traversal
    // ================================================================

    fn table_rules(
        &self,
        tid: TableId,
    ) -> impl Iterator<Item = (RuleId, &Rule)> + '_ {
        self.tables
            .get(&tid)
            .into_iter()
            .flat_map(|table| table.heads())
            .flat_map(move |head| self.chain(head))
    }

    /// Every rule, table by table; each chain in priority order.
    pub fn rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> + '_ {
        self.tables
            .values()
            .filter(|table| table.is_registered())
            .flat_map(|table| table.heads())
            .flat_map(move |head| self.chain(head))
    }

    /// Every rule in the exact-match table.
    pub fn exact_rules(&self) -> impl Iterator<Item = (RuleId, &Rule)> + '_ {
        self.exact.into_iter().flat_map(move |tid| self.table_rules(tid))
    }

    /// The ID of the exact-match table, if one is registered.
    pub fn exact_table(&self) -> Option<TableId> {
        self.exact
    }

    /// The first rule of `tid`, in index order.
    pub fn table_first_rule(&self, tid: TableId) -> Option<RuleId> {
        self.tables.get(&tid)?.heads().next()
    }

    /// The rule of `tid` that follows `id`: the next member of `id`'s
    /// chain, else the head of the next chain in index order.
    ///
    /// Returns `None` at the end of the table, or if `id` is not a
    /// live rule of `tid`.
    pub fn table_next_rule(&self, tid: TableId, id: RuleId) -> Option<RuleId> {
        let entry = self.entry(id).filter(|entry| entry.table == tid)?;
        if entry.next.is_some() {
            return entry.next;
        }

        self.tables.get(&tid)?.head_after(entry.rule.flow())
    }

    /// Call `f` for every rule in the tables selected by `include`.
    ///
    /// The callback may mutate the classifier, including removing any
    /// rule. Each table's rules are collected before its first
    /// callback: rules removed before their turn are skipped and rules
    /// inserted by the callback are not visited.
    pub fn for_each<F>(&mut self, include: Include, f: F)
    where
        F: FnMut(&mut Classifier, RuleId),
    {
        self.visit(None, include, f);
    }

    /// Like [`Self::for_each`], but only visit rules that overlap
    /// `filter`.
    pub fn for_each_match<F>(&mut self, filter: &Rule, include: Include, f: F)
    where
        F: FnMut(&mut Classifier, RuleId),
    {
        self.visit(Some(filter), include, f);
    }

    fn visit<F>(&mut self, filter: Option<&Rule>, include: Include, mut f: F)
    where
        F: FnMut(&mut Classifier, RuleId),
    {
        let tids: Vec<TableId> = self
            .tables
            .iter()
            .filter(|(_, t)| t.is_registered() && include.covers(t.is_exact()))
            .map(|(tid, _)| *tid)
            .collect();

        for tid in tids {
            // An earlier callback may have emptied and freed it.
            let Some(lease) = self.lease(tid) else {
                continue;
            };

            let ids: Vec<RuleId> = self
                .table_rules(tid)
                .filter(|(_, rule)| filter.is_none_or(|flt| flt.overlaps(rule)))
                .map(|(id, _)| id)
                .collect();

            for id in ids {
                if self.contains(id) {
                    f(self, id);
                }
            }

            self.release(lease);
        }
    }

    // ================================================================
    // Observability
    // ================================================================

    pub fn stats(&self) -> ClsStatsSnap {
        self.stats.snapshot()
    }

    pub fn reset_stats(&self) {
        self.stats.reset();
    }

    /// Dump every table, including tables kept alive only by a lease.
    /// Rules are listed by descending priority.
    pub fn dump(&self) -> DumpClassifierResp {
        let tables = self
            .tables
            .iter()
            .map(|(tid, table)| {
                let mut rules: Vec<RuleDump> = self
                    .table_rules(*tid)
                    .map(|(id, rule)| RuleDump {
                        id: id.to_string(),
                        priority: rule.priority(),
                        rule: rule.to_string(),
                    })
                    .collect();
                rules.sort_by(|a, b| {
                    b.priority
                        .cmp(&a.priority)
                        .then_with(|| a.rule.cmp(&b.rule))
                });

                TableDump {
                    id: tid.val(),
                    wildcards: table.wc().to_string(),
                    exact: table.is_exact(),
                    n_rules: table.n_rules(),
                    n_refs: table.n_refs(),
                    rules,
                }
            })
            .collect();

        DumpClassifierResp {
            n_rules: self.n_rules,
            n_exact: self.count_exact(),
            tables,
        }
    }
}

// ================================================================
// Probes
// ================================================================

fn rule_insert_probe(tid: TableId, rule: &Rule) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::rule__insert!(
                || (tid.val(), rule.priority(), rule.to_string())
            );
        } else {
            let (..) = (tid, rule);
        }
    }
}

fn rule_replace_probe(tid: TableId, rule: &Rule) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::rule__replace!(
                || (tid.val(), rule.priority(), rule.to_string())
            );
        } else {
            let (..) = (tid, rule);
        }
    }
}

fn rule_remove_probe(tid: TableId, rule: &Rule) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::rule__remove!(
                || (tid.val(), rule.priority(), rule.to_string())
            );
        } else {
            let (..) = (tid, rule);
        }
    }
}

fn table_create_probe(tid: TableId, wc: &FlowWildcards) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::table__create!(
                || (tid.val(), wc.to_string())
            );
        } else {
            let (..) = (tid, wc);
        }
    }
}

fn table_destroy_probe(tid: TableId, wc: &FlowWildcards) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::table__destroy!(
                || (tid.val(), wc.to_string())
            );
        } else {
            let (..) = (tid, wc);
        }
    }
}

fn lookup_hit_probe(flow: &Flow, tid: TableId, rule: &Rule) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::lookup__hit!(
                || (flow.to_string(), tid.val(), rule.priority())
            );
        } else {
            let (..) = (flow, tid, rule);
        }
    }
}

fn lookup_miss_probe(flow: &Flow, include: Include) {
    cfg_if! {
        if #[cfg(feature = "usdt")] {
            crate::flowcls_provider::lookup__miss!(
                || (flow.to_string(), include.to_string())
            );
        } else {
            let (..) = (flow, include);
        }
    }
}
