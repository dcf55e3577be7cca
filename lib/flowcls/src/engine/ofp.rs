// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The OpenFlow 1.0 `ofp_match` descriptor.
//!
//! This is how a controller describes a rule's pattern on the wire:
//! every field of the flow, plus a wildcard word. The all-or-nothing
//! wildcard bits line up with [`Wildcards`]; each IPv4 address gets a
//! 6-bit count of wildcarded low-order bits instead.

use super::flow::Flow;
use super::flow::FlowWildcards;
use super::flow::Wildcards;
use super::rule::Rule;
use crate::api::Ipv4Addr;
use crate::api::Ipv4PrefixLen;
use crate::api::MacAddr;
use core::fmt;
use core::fmt::Display;
use zerocopy::FromBytes;
use zerocopy::Immutable;
use zerocopy::IntoBytes;
use zerocopy::KnownLayout;
use zerocopy::Unaligned;
use zerocopy::network_endian::U16;
use zerocopy::network_endian::U32;

pub const OFP_MATCH_LEN: usize = 40;

pub const OFPFW_NW_SRC_SHIFT: u32 = 8;
pub const OFPFW_NW_SRC_MASK: u32 = 0x3f << OFPFW_NW_SRC_SHIFT;
pub const OFPFW_NW_DST_SHIFT: u32 = 14;
pub const OFPFW_NW_DST_MASK: u32 = 0x3f << OFPFW_NW_DST_SHIFT;

/// Every OpenFlow 1.0 wildcard bit.
pub const OFPFW_ALL: u32 = (1 << 22) - 1;

/// The priority given to a rule that fixes every field OpenFlow 1.0
/// can express. Such rules always take precedence over wildcarded
/// ones.
pub const EXACT_MATCH_PRIORITY: u32 = u16::MAX as u32;

/// How to interpret a wire match.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FlowFormat {
    /// Plain OpenFlow 1.0: the tunnel ID cannot be matched.
    #[default]
    OpenFlow10,

    /// The Nicira extension: the tunnel ID is carried in the upper 32
    /// bits of the flow cookie, and is matched unless the `TUN_ID`
    /// wildcard bit is set.
    TunIdFromCookie,
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MatchError {
    BadLength { expected: usize, actual: usize },
}

impl Display for MatchError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::BadLength { expected, actual } => write!(
                f,
                "bad ofp_match length: {actual} (expected {expected})"
            ),
        }
    }
}

/// An `ofp_match`, exactly as laid out on the wire.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Eq,
    FromBytes,
    Immutable,
    IntoBytes,
    KnownLayout,
    PartialEq,
    Unaligned,
)]
#[repr(C)]
pub struct OfpMatch {
    pub wildcards: U32,
    pub in_port: U16,
    pub dl_src: [u8; 6],
    pub dl_dst: [u8; 6],
    pub dl_vlan: U16,
    pub dl_vlan_pcp: u8,
    pub pad1: [u8; 1],
    pub dl_type: U16,
    pub nw_tos: u8,
    pub nw_proto: u8,
    pub pad2: [u8; 2],
    pub nw_src: U32,
    pub nw_dst: U32,
    pub tp_src: U16,
    pub tp_dst: U16,
}

impl OfpMatch {
    /// Read a match from exactly [`OFP_MATCH_LEN`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Self, MatchError> {
        Self::read_from_bytes(bytes).map_err(|_| MatchError::BadLength {
            expected: OFP_MATCH_LEN,
            actual: bytes.len(),
        })
    }

    /// The flags and address prefixes encoded in the wildcard word.
    ///
    /// Bits that OpenFlow 1.0 does not define, and the tunnel ID bit,
    /// are left to the caller.
    fn split_wildcards(&self) -> FlowWildcards {
        let raw = self.wildcards.get();
        let nw_src = (raw & OFPFW_NW_SRC_MASK) >> OFPFW_NW_SRC_SHIFT;
        let nw_dst = (raw & OFPFW_NW_DST_MASK) >> OFPFW_NW_DST_SHIFT;

        FlowWildcards::new(
            Wildcards::from_bits_truncate(raw),
            Ipv4PrefixLen::from_wildcard_bits(nw_src),
            Ipv4PrefixLen::from_wildcard_bits(nw_dst),
        )
    }
}

impl From<&Rule> for OfpMatch {
    /// Encode a rule's pattern. The tunnel ID has no place in a plain
    /// `ofp_match` and is dropped.
    fn from(rule: &Rule) -> Self {
        let flow = rule.flow();
        let wc = rule.wc();
        let flags = wc.flags - Wildcards::TUN_ID;
        let wildcards = flags.bits()
            | (wc.nw_src.wildcard_bits() << OFPFW_NW_SRC_SHIFT)
            | (wc.nw_dst.wildcard_bits() << OFPFW_NW_DST_SHIFT);

        Self {
            wildcards: U32::new(wildcards),
            in_port: U16::new(flow.in_port),
            dl_src: flow.dl_src.bytes(),
            dl_dst: flow.dl_dst.bytes(),
            dl_vlan: U16::new(flow.dl_vlan),
            dl_vlan_pcp: flow.dl_vlan_pcp,
            pad1: [0; 1],
            dl_type: U16::new(flow.dl_type),
            nw_tos: flow.nw_tos,
            nw_proto: flow.nw_proto,
            pad2: [0; 2],
            nw_src: U32::new(u32::from(flow.nw_src)),
            nw_dst: U32::new(u32::from(flow.nw_dst)),
            tp_src: U16::new(flow.tp_src),
            tp_dst: U16::new(flow.tp_dst),
        }
    }
}

impl Rule {
    /// Build a rule from a wire match.
    ///
    /// Wildcard bits this crate does not know are ignored. A match
    /// that wildcards nothing OpenFlow 1.0 can express is given
    /// [`EXACT_MATCH_PRIORITY`] in place of `priority`.
    pub fn from_match(
        m: &OfpMatch,
        priority: u32,
        format: FlowFormat,
        cookie: u64,
    ) -> Rule {
        let mut wc = m.split_wildcards();
        let promote = (wc.flags - Wildcards::TUN_ID).is_empty()
            && wc.nw_src == Ipv4PrefixLen::NETMASK_ALL
            && wc.nw_dst == Ipv4PrefixLen::NETMASK_ALL;

        let tun_id = match format {
            FlowFormat::TunIdFromCookie
                if !wc.flags.contains(Wildcards::TUN_ID) =>
            {
                (cookie >> 32) as u32
            }

            _ => {
                wc.flags |= Wildcards::TUN_ID;
                0
            }
        };

        let flow = Flow {
            tun_id,
            nw_src: Ipv4Addr::from(m.nw_src.get()),
            nw_dst: Ipv4Addr::from(m.nw_dst.get()),
            in_port: m.in_port.get(),
            dl_vlan: m.dl_vlan.get(),
            dl_type: m.dl_type.get(),
            tp_src: m.tp_src.get(),
            tp_dst: m.tp_dst.get(),
            dl_src: MacAddr::from(m.dl_src),
            dl_dst: MacAddr::from(m.dl_dst),
            nw_proto: m.nw_proto,
            dl_vlan_pcp: m.dl_vlan_pcp,
            nw_tos: m.nw_tos,
        };

        let priority = if promote { EXACT_MATCH_PRIORITY } else { priority };
        Rule::from_flow(flow, wc, priority)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::flow::OFP_VLAN_NONE;
    use alloc::string::ToString;

    fn exact_match() -> OfpMatch {
        let rule: Rule = "priority=1,in_port=3,dl_vlan=none,dl_vlan_pcp=0,\
                          dl_src=a8:40:25:00:00:01,dl_dst=a8:40:25:00:00:02,\
                          dl_type=0x0800,nw_src=10.0.0.1,nw_dst=10.0.0.2,\
                          nw_proto=6,nw_tos=0,tp_src=1024,tp_dst=22"
            .parse()
            .unwrap();
        OfpMatch::from(&rule)
    }

    #[test]
    fn layout() {
        assert_eq!(core::mem::size_of::<OfpMatch>(), OFP_MATCH_LEN);

        let m = exact_match();
        let bytes = m.as_bytes();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 0]);
        assert_eq!(&bytes[4..6], &[0, 3]);
        assert_eq!(&bytes[18..20], &[0xff, 0xff]);
        assert_eq!(&bytes[22..24], &[0x08, 0x00]);
        assert_eq!(&bytes[28..32], &[10, 0, 0, 1]);
        assert_eq!(&bytes[38..40], &[0, 22]);

        assert_eq!(OfpMatch::parse(bytes).unwrap(), m);
        assert_eq!(
            OfpMatch::parse(&bytes[..39]),
            Err(MatchError::BadLength { expected: 40, actual: 39 })
        );
    }

    #[test]
    fn exact_match_promoted() {
        let m = exact_match();
        let rule = Rule::from_match(&m, 100, FlowFormat::OpenFlow10, 0);
        assert_eq!(rule.priority(), EXACT_MATCH_PRIORITY);
        assert_eq!(rule.flow().dl_vlan, OFP_VLAN_NONE);
        assert!(rule.wc().flags.contains(Wildcards::TUN_ID));
        assert_eq!(rule.flow().tp_dst, 22);

        let rule = Rule::from_match(&m, 100, FlowFormat::TunIdFromCookie, 0);
        assert!(rule.is_exact());
        assert_eq!(rule.priority(), EXACT_MATCH_PRIORITY);
    }

    #[test]
    fn address_wildcard_bits() {
        let mut m = exact_match();
        let raw = Wildcards::TP_SRC.bits()
            | (8 << OFPFW_NW_SRC_SHIFT)
            | (40 << OFPFW_NW_DST_SHIFT)
            | (1 << 30);
        m.wildcards = U32::new(raw);

        let rule = Rule::from_match(&m, 100, FlowFormat::OpenFlow10, 0);
        assert_eq!(rule.priority(), 100);
        assert_eq!(rule.wc().nw_src.val(), 24);
        assert_eq!(rule.wc().nw_dst.val(), 0);
        assert_eq!(rule.wc().flags, Wildcards::TP_SRC | Wildcards::TUN_ID);
        assert_eq!(rule.flow().nw_src.to_string(), "10.0.0.0");
        assert_eq!(rule.flow().nw_dst, Ipv4Addr::ANY_ADDR);
        assert_eq!(rule.flow().tp_src, 0);

        // Encoding back gives canonical wildcard counts.
        let back = OfpMatch::from(&rule);
        let raw = back.wildcards.get();
        assert_eq!((raw & OFPFW_NW_SRC_MASK) >> OFPFW_NW_SRC_SHIFT, 8);
        assert_eq!((raw & OFPFW_NW_DST_MASK) >> OFPFW_NW_DST_SHIFT, 32);
        assert_eq!(raw & !OFPFW_ALL, 0);
    }

    #[test]
    fn tun_id_from_cookie() {
        let mut m = exact_match();
        m.wildcards = U32::new(Wildcards::IN_PORT.bits());
        let cookie = 0x0000_beef_0000_0001;

        let rule = Rule::from_match(&m, 5, FlowFormat::TunIdFromCookie, cookie);
        assert_eq!(rule.flow().tun_id, 0xbeef);
        assert!(!rule.wc().flags.contains(Wildcards::TUN_ID));
        assert_eq!(rule.priority(), 5);

        let rule = Rule::from_match(&m, 5, FlowFormat::OpenFlow10, cookie);
        assert_eq!(rule.flow().tun_id, 0);
        assert!(rule.wc().flags.contains(Wildcards::TUN_ID));

        m.wildcards = U32::new((Wildcards::IN_PORT | Wildcards::TUN_ID).bits());
        let rule = Rule::from_match(&m, 5, FlowFormat::TunIdFromCookie, cookie);
        assert_eq!(rule.flow().tun_id, 0);
    }

    #[test]
    fn bad_length_display() {
        let err = MatchError::BadLength { expected: 40, actual: 12 };
        assert_eq!(err.to_string(), "bad ofp_match length: 12 (expected 40)");
    }
}
