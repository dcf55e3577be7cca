// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A classifier shared between threads.
//!
//! Lookups take the read lock and may run concurrently with each
//! other; anything that modifies the rule set, iteration included,
//! takes the write lock.

use super::classifier::Classifier;
use super::classifier::RuleId;
use super::flow::Flow;
use super::rule::Rule;
use crate::api::ClsStatsSnap;
use crate::api::Include;
use crate::ddi::sync::KRwLock;
use crate::ddi::sync::KRwLockReadGuard;
use crate::ddi::sync::KRwLockWriteGuard;

#[derive(Debug, Default)]
pub struct SharedClassifier {
    inner: KRwLock<Classifier>,
}

impl From<Classifier> for SharedClassifier {
    fn from(cls: Classifier) -> Self {
        Self { inner: KRwLock::new(cls) }
    }
}

impl SharedClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn into_inner(self) -> Classifier {
        self.inner.into_inner()
    }

    /// Find the best rule for `flow`, returning a copy of it.
    pub fn lookup(&self, flow: &Flow, include: Include) -> Option<Rule> {
        self.inner.read().lookup(flow, include).copied()
    }

    pub fn lookup_id(&self, flow: &Flow, include: Include) -> Option<RuleId> {
        self.inner.read().lookup_id(flow, include)
    }

    pub fn insert(&self, rule: Rule) -> (RuleId, Option<Rule>) {
        self.inner.write().insert(rule)
    }

    pub fn insert_exact(&self, rule: Rule) -> (RuleId, Option<Rule>) {
        self.inner.write().insert_exact(rule)
    }

    /// Remove `id` if it is still live.
    ///
    /// Another thread may have removed the rule since the caller
    /// obtained its ID, so a stale ID is not an error here.
    pub fn remove(&self, id: RuleId) -> Option<Rule> {
        let mut cls = self.inner.write();
        if cls.contains(id) { Some(cls.remove(id)) } else { None }
    }

    pub fn for_each<F>(&self, include: Include, f: F)
    where
        F: FnMut(&mut Classifier, RuleId),
    {
        self.inner.write().for_each(include, f);
    }

    pub fn for_each_match<F>(&self, filter: &Rule, include: Include, f: F)
    where
        F: FnMut(&mut Classifier, RuleId),
    {
        self.inner.write().for_each_match(filter, include, f);
    }

    pub fn count(&self) -> usize {
        self.inner.read().count()
    }

    pub fn stats(&self) -> ClsStatsSnap {
        self.inner.read().stats()
    }

    /// Hold the read lock for a batch of queries.
    pub fn read(&self) -> KRwLockReadGuard<'_, Classifier> {
        self.inner.read()
    }

    /// Hold the write lock for a batch of updates.
    pub fn write(&self) -> KRwLockWriteGuard<'_, Classifier> {
        self.inner.write()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn concurrent_lookups_with_writer() {
        let cls = Arc::new(SharedClassifier::new());
        cls.insert("priority=1,dl_type=0x0800".parse().unwrap());
        let pkt: Flow = "dl_type=0x0800,in_port=5".parse().unwrap();

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let cls = Arc::clone(&cls);
                thread::spawn(move || {
                    for _ in 0..200 {
                        // The dl_type rule is never removed.
                        let hit = cls.lookup(&pkt, Include::ALL).unwrap();
                        assert!(hit.priority() >= 1);
                    }
                })
            })
            .collect();

        let writer = {
            let cls = Arc::clone(&cls);
            thread::spawn(move || {
                for port in 0..50u16 {
                    let r: Rule =
                        format!("priority=10,in_port={port}").parse().unwrap();
                    let (id, _) = cls.insert(r);
                    if port % 2 == 0 {
                        assert!(cls.remove(id).is_some());
                        assert!(cls.remove(id).is_none());
                    }
                }
            })
        };

        for h in readers {
            h.join().unwrap();
        }
        writer.join().unwrap();

        assert_eq!(cls.count(), 26);
        let hit = cls.lookup(&pkt, Include::ALL).unwrap();
        assert_eq!(hit.priority(), 10);
        assert_eq!(cls.stats().lookups, 801);
    }
}
