// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Common routines for classifier integration tests and benchmarks.

use flowcls::api::Include;
use flowcls::api::Ipv4Addr;
use flowcls::api::Ipv4PrefixLen;
use flowcls::api::MacAddr;
use flowcls::engine::flow::OFP_VLAN_NONE;
use flowcls::engine::Flow;
use flowcls::engine::FlowWildcards;
use flowcls::engine::Rule;
use flowcls::engine::Wildcards;
use rand::Rng;
use rand::SeedableRng;
use rand::rngs::StdRng;

/// Parse a rule, panicking on bad input.
pub fn rule(s: &str) -> Rule {
    s.parse().unwrap_or_else(|e| panic!("bad rule '{s}': {e}"))
}

/// Parse a flow, panicking on bad input.
pub fn flow(s: &str) -> Flow {
    s.parse().unwrap_or_else(|e| panic!("bad flow '{s}': {e}"))
}

/// A naive classifier: a flat list, searched front to back.
///
/// Slow and obviously correct; the real classifier is checked against
/// it.
#[derive(Debug, Default)]
pub struct LinearClassifier {
    rules: Vec<Rule>,
}

impl LinearClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `rule`, replacing and returning a rule with the same
    /// pattern and priority.
    pub fn insert(&mut self, rule: Rule) -> Option<Rule> {
        match self.rules.iter_mut().find(|r| **r == rule) {
            Some(slot) => Some(core::mem::replace(slot, rule)),
            None => {
                self.rules.push(rule);
                None
            }
        }
    }

    pub fn remove(&mut self, rule: &Rule) -> Option<Rule> {
        let pos = self.rules.iter().position(|r| r == rule)?;
        Some(self.rules.swap_remove(pos))
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    /// Every rule that a correct lookup may return for `flow`: those
    /// of the highest matching priority, narrowed to the masks that
    /// fix the most bits.
    pub fn best_matches(&self, flow: &Flow, include: Include) -> Vec<Rule> {
        let matching: Vec<&Rule> = self
            .rules
            .iter()
            .filter(|r| include.covers(r.is_exact()) && r.matches(flow))
            .collect();

        let Some(top) = matching.iter().map(|r| r.priority()).max() else {
            return vec![];
        };
        let top: Vec<&Rule> =
            matching.into_iter().filter(|r| r.priority() == top).collect();

        let Some(bits) = top.iter().map(|r| r.wc().exact_bits()).max() else {
            return vec![];
        };
        top.into_iter()
            .filter(|r| r.wc().exact_bits() == bits)
            .copied()
            .collect()
    }

    pub fn overlaps(&self, target: &Rule) -> bool {
        self.rules.iter().any(|r| r.overlaps(target))
    }
}

/// Masks used by [`RuleGen`]: (fixed fields, `nw_src` prefix,
/// `nw_dst` prefix).
const MASKS: [(Wildcards, u8, u8); 8] = [
    (Wildcards::empty(), 0, 0),
    (Wildcards::IN_PORT, 0, 0),
    (Wildcards::DL_TYPE.union(Wildcards::NW_PROTO), 0, 24),
    (
        Wildcards::DL_TYPE.union(Wildcards::NW_PROTO).union(Wildcards::TP_DST),
        0,
        32,
    ),
    (Wildcards::IN_PORT.union(Wildcards::DL_VLAN), 16, 0),
    (Wildcards::TP_SRC, 8, 8),
    (Wildcards::DL_SRC.union(Wildcards::DL_DST), 0, 0),
    (Wildcards::TP_DST, 32, 0),
];

/// Seeded generator of rules and flows.
///
/// Field values are drawn from small domains so that randomly drawn
/// flows and rules actually match and overlap one another.
pub struct RuleGen {
    rng: StdRng,
}

impl RuleGen {
    pub fn new(seed: u64) -> Self {
        Self { rng: StdRng::seed_from_u64(seed) }
    }

    pub fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    /// A flow with every field set.
    pub fn flow(&mut self) -> Flow {
        let rng = &mut self.rng;
        let mac = |rng: &mut StdRng| {
            MacAddr::from([0xa8u8, 0x40, 0x25, 0, 0, rng.random_range(0..4)])
        };
        let ip = |rng: &mut StdRng| {
            let (net, host) = (rng.random_range(0..2), rng.random_range(0..4));
            Ipv4Addr::from([10u8, net, 0, host])
        };

        Flow {
            tun_id: rng.random_range(0..2),
            nw_src: ip(rng),
            nw_dst: ip(rng),
            in_port: rng.random_range(0..4),
            dl_vlan: if rng.random_bool(0.5) {
                OFP_VLAN_NONE
            } else {
                rng.random_range(1..3)
            },
            dl_type: if rng.random_bool(0.8) { 0x0800 } else { 0x0806 },
            tp_src: rng.random_range(1000..1004),
            tp_dst: [22, 53, 80, 443][rng.random_range(0..4)],
            dl_src: mac(rng),
            dl_dst: mac(rng),
            nw_proto: if rng.random_bool(0.5) { 6 } else { 17 },
            dl_vlan_pcp: 0,
            nw_tos: 0,
        }
    }

    /// One of a fixed set of masks.
    pub fn wildcards(&mut self) -> FlowWildcards {
        let (fixed, src, dst) = MASKS[self.rng.random_range(0..MASKS.len())];
        FlowWildcards::new(
            Wildcards::all() - fixed,
            Ipv4PrefixLen::new(src).unwrap(),
            Ipv4PrefixLen::new(dst).unwrap(),
        )
    }

    /// A rule with priority in `0..max_priority`.
    pub fn rule(&mut self, max_priority: u32) -> Rule {
        let flow = self.flow();
        let wc = self.wildcards();
        let priority = self.rng.random_range(0..max_priority);
        Rule::from_flow(flow, wc, priority)
    }

    /// An exact rule with priority in `0..max_priority`.
    pub fn exact_rule(&mut self, max_priority: u32) -> Rule {
        let flow = self.flow();
        let priority = self.rng.random_range(0..max_priority);
        Rule::from_flow(flow, FlowWildcards::EXACT, priority)
    }
}
