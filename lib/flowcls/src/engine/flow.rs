// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Flow records and the wildcard masks applied to them.

use crate::api::Ipv4Addr;
use crate::api::Ipv4Cidr;
use crate::api::Ipv4PrefixLen;
use crate::api::MacAddr;
use crate::api::parse_nw_proto;
use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Display;
use core::hash::BuildHasherDefault;
use core::hash::Hasher;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

/// The `dl_vlan` value of a frame carrying no 802.1Q header.
pub const OFP_VLAN_NONE: u16 = 0xffff;

bitflags::bitflags! {
    /// The all-or-nothing wildcard flags of a [`FlowWildcards`].
    ///
    /// A set bit means the field is "don't care". The bit positions
    /// are those of the OpenFlow 1.0 `ofp_match.wildcards` word (plus
    /// the Nicira tunnel ID extension), which lets the wire conversion
    /// use them as is. The `nw_src`/`nw_dst` prefixes are not flags;
    /// they are carried as prefix lengths.
    #[derive(
        Clone, Copy, Debug, Default, Deserialize, Eq, Hash, PartialEq,
        Serialize,
    )]
    pub struct Wildcards: u32 {
        const IN_PORT = 1 << 0;
        const DL_VLAN = 1 << 1;
        const DL_SRC = 1 << 2;
        const DL_DST = 1 << 3;
        const DL_TYPE = 1 << 4;
        const NW_PROTO = 1 << 5;
        const TP_SRC = 1 << 6;
        const TP_DST = 1 << 7;
        const DL_VLAN_PCP = 1 << 20;
        const NW_TOS = 1 << 21;
        const TUN_ID = 1 << 22;
    }
}

/// The header fields a rule can match on.
///
/// Every field is a fixed-width integer (or an address made of one).
/// Once a flow is placed into a [`super::rule::Rule`] it is masked and
/// can no longer be modified.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
pub struct Flow {
    pub tun_id: u32,
    pub nw_src: Ipv4Addr,
    pub nw_dst: Ipv4Addr,
    pub in_port: u16,
    pub dl_vlan: u16,
    pub dl_type: u16,
    pub tp_src: u16,
    pub tp_dst: u16,
    pub dl_src: MacAddr,
    pub dl_dst: MacAddr,
    pub nw_proto: u8,
    pub dl_vlan_pcp: u8,
    pub nw_tos: u8,
}

impl Flow {
    /// Return a copy of this flow with every wildcarded field, and
    /// every wildcarded address bit, set to zero.
    ///
    /// This is both how a rule's value is normalized and how a packet
    /// flow is projected onto a table before probing it.
    #[inline]
    pub fn masked(&self, wc: &FlowWildcards) -> Flow {
        let w = wc.flags;
        let pick = |flag: Wildcards| !w.contains(flag);

        Flow {
            tun_id: if pick(Wildcards::TUN_ID) { self.tun_id } else { 0 },
            nw_src: self.nw_src.mask(wc.nw_src),
            nw_dst: self.nw_dst.mask(wc.nw_dst),
            in_port: if pick(Wildcards::IN_PORT) { self.in_port } else { 0 },
            dl_vlan: if pick(Wildcards::DL_VLAN) { self.dl_vlan } else { 0 },
            dl_type: if pick(Wildcards::DL_TYPE) { self.dl_type } else { 0 },
            tp_src: if pick(Wildcards::TP_SRC) { self.tp_src } else { 0 },
            tp_dst: if pick(Wildcards::TP_DST) { self.tp_dst } else { 0 },
            dl_src: if pick(Wildcards::DL_SRC) {
                self.dl_src
            } else {
                MacAddr::ZERO
            },
            dl_dst: if pick(Wildcards::DL_DST) {
                self.dl_dst
            } else {
                MacAddr::ZERO
            },
            nw_proto: if pick(Wildcards::NW_PROTO) { self.nw_proto } else { 0 },
            dl_vlan_pcp: if pick(Wildcards::DL_VLAN_PCP) {
                self.dl_vlan_pcp
            } else {
                0
            },
            nw_tos: if pick(Wildcards::NW_TOS) { self.nw_tos } else { 0 },
        }
    }

    /// Do `self` and `other` agree on every bit that `wc` does not
    /// wildcard?
    #[inline]
    pub fn equal_except(&self, other: &Flow, wc: &FlowWildcards) -> bool {
        self.masked(wc) == other.masked(wc)
    }
}

impl Display for Flow {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_fields(f, self, &FlowWildcards::EXACT)
    }
}

impl FromStr for Flow {
    type Err = String;

    /// Parse a flow written as `key=value` pairs; fields that are not
    /// mentioned are zero.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parsed = parse_fields(s)?;

        if parsed.priority.is_some() {
            return Err("a flow has no priority".to_string());
        }

        let partial = |len: Ipv4PrefixLen| {
            len != Ipv4PrefixLen::NETMASK_NONE
                && len != Ipv4PrefixLen::NETMASK_ALL
        };
        if partial(parsed.wc.nw_src) || partial(parsed.wc.nw_dst) {
            return Err("a flow address cannot carry a prefix".to_string());
        }

        Ok(parsed.flow)
    }
}

/// Which bits of a [`Flow`] a rule ignores.
///
/// Same shape as the flow: one flag per all-or-nothing field plus a
/// prefix length for each IPv4 address. Only prefix-style (contiguous)
/// address masks are representable.
#[derive(
    Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
)]
pub struct FlowWildcards {
    pub flags: Wildcards,
    pub nw_src: Ipv4PrefixLen,
    pub nw_dst: Ipv4PrefixLen,
}

impl Default for FlowWildcards {
    fn default() -> Self {
        Self::EXACT
    }
}

impl FlowWildcards {
    /// Wildcard nothing.
    pub const EXACT: Self = Self {
        flags: Wildcards::empty(),
        nw_src: Ipv4PrefixLen::NETMASK_ALL,
        nw_dst: Ipv4PrefixLen::NETMASK_ALL,
    };

    /// Wildcard everything.
    pub const ALL: Self = Self {
        flags: Wildcards::all(),
        nw_src: Ipv4PrefixLen::NETMASK_NONE,
        nw_dst: Ipv4PrefixLen::NETMASK_NONE,
    };

    pub fn new(
        flags: Wildcards,
        nw_src: Ipv4PrefixLen,
        nw_dst: Ipv4PrefixLen,
    ) -> Self {
        Self { flags, nw_src, nw_dst }.normalized()
    }

    /// The same mask with every undefined flag bit cleared.
    ///
    /// Two masks that wildcard the same fields compare equal only in
    /// this form.
    #[inline]
    pub fn normalized(self) -> Self {
        Self {
            flags: Wildcards::from_bits_truncate(self.flags.bits()),
            ..self
        }
    }

    /// Does this mask wildcard nothing at all?
    #[inline]
    pub fn is_exact(&self) -> bool {
        *self == Self::EXACT
    }

    /// The mask that wildcards every bit wildcarded by either `self`
    /// or `other`.
    pub fn union(&self, other: &FlowWildcards) -> FlowWildcards {
        FlowWildcards {
            flags: self.flags | other.flags,
            nw_src: self.nw_src.min(other.nw_src),
            nw_dst: self.nw_dst.min(other.nw_dst),
        }
    }

    /// The number of flow bits that must match exactly.
    ///
    /// Used to rank tables by specificity.
    pub fn exact_bits(&self) -> u32 {
        const WIDTHS: [(Wildcards, u32); 11] = [
            (Wildcards::IN_PORT, 16),
            (Wildcards::DL_VLAN, 16),
            (Wildcards::DL_SRC, 48),
            (Wildcards::DL_DST, 48),
            (Wildcards::DL_TYPE, 16),
            (Wildcards::NW_PROTO, 8),
            (Wildcards::TP_SRC, 16),
            (Wildcards::TP_DST, 16),
            (Wildcards::DL_VLAN_PCP, 8),
            (Wildcards::NW_TOS, 8),
            (Wildcards::TUN_ID, 32),
        ];

        let fields: u32 = WIDTHS
            .iter()
            .filter(|(flag, _)| !self.flags.contains(*flag))
            .map(|(_, width)| width)
            .sum();

        fields + u32::from(self.nw_src.val()) + u32::from(self.nw_dst.val())
    }
}

impl Display for FlowWildcards {
    /// List the wildcarded fields; partially wildcarded addresses are
    /// shown with the prefix that still matches.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.is_exact() {
            return write!(f, "exact");
        }

        let mut sep = "";
        for (name, _) in self.flags.iter_names() {
            write!(f, "{sep}{}", name.to_ascii_lowercase())?;
            sep = ",";
        }

        for (name, prefix) in [("nw_src", self.nw_src), ("nw_dst", self.nw_dst)]
        {
            match prefix.val() {
                32 => {}
                0 => {
                    write!(f, "{sep}{name}")?;
                    sep = ",";
                }
                len => {
                    write!(f, "{sep}{name}/{len}")?;
                    sep = ",";
                }
            }
        }

        Ok(())
    }
}

/// The hasher backing every flow-keyed index.
///
/// The CRC32 of the flow bytes is spread over 64 bits so that the
/// index's top-bit tags stay useful.
#[derive(Clone, Default)]
pub struct FlowHasher(crc32fast::Hasher);

impl Hasher for FlowHasher {
    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        self.0.update(bytes);
    }

    #[inline]
    fn finish(&self) -> u64 {
        u64::from(self.0.clone().finalize()).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }
}

pub type FlowHashBuilder = BuildHasherDefault<FlowHasher>;

/// Write the non-wildcarded fields of `flow` as comma-separated
/// `key=value` pairs.
pub(crate) fn write_fields(
    f: &mut fmt::Formatter,
    flow: &Flow,
    wc: &FlowWildcards,
) -> fmt::Result {
    let w = wc.flags;
    let mut first = true;
    let mut sep = |f: &mut fmt::Formatter| -> fmt::Result {
        if !first {
            write!(f, ",")?;
        }
        first = false;
        Ok(())
    };

    if !w.contains(Wildcards::TUN_ID) {
        sep(f)?;
        write!(f, "tun_id={:#x}", flow.tun_id)?;
    }
    if !w.contains(Wildcards::IN_PORT) {
        sep(f)?;
        write!(f, "in_port={}", flow.in_port)?;
    }
    if !w.contains(Wildcards::DL_VLAN) {
        sep(f)?;
        if flow.dl_vlan == OFP_VLAN_NONE {
            write!(f, "dl_vlan=none")?;
        } else {
            write!(f, "dl_vlan={}", flow.dl_vlan)?;
        }
    }
    if !w.contains(Wildcards::DL_VLAN_PCP) {
        sep(f)?;
        write!(f, "dl_vlan_pcp={}", flow.dl_vlan_pcp)?;
    }
    if !w.contains(Wildcards::DL_SRC) {
        sep(f)?;
        write!(f, "dl_src={}", flow.dl_src)?;
    }
    if !w.contains(Wildcards::DL_DST) {
        sep(f)?;
        write!(f, "dl_dst={}", flow.dl_dst)?;
    }
    if !w.contains(Wildcards::DL_TYPE) {
        sep(f)?;
        write!(f, "dl_type={:#06x}", flow.dl_type)?;
    }
    if wc.nw_src.val() != 0 {
        sep(f)?;
        let cidr = Ipv4Cidr::new(flow.nw_src, wc.nw_src);
        write!(f, "nw_src={}", cidr.to_short_string())?;
    }
    if wc.nw_dst.val() != 0 {
        sep(f)?;
        let cidr = Ipv4Cidr::new(flow.nw_dst, wc.nw_dst);
        write!(f, "nw_dst={}", cidr.to_short_string())?;
    }
    if !w.contains(Wildcards::NW_PROTO) {
        sep(f)?;
        write!(f, "nw_proto={}", flow.nw_proto)?;
    }
    if !w.contains(Wildcards::NW_TOS) {
        sep(f)?;
        write!(f, "nw_tos={}", flow.nw_tos)?;
    }
    if !w.contains(Wildcards::TP_SRC) {
        sep(f)?;
        write!(f, "tp_src={}", flow.tp_src)?;
    }
    if !w.contains(Wildcards::TP_DST) {
        sep(f)?;
        write!(f, "tp_dst={}", flow.tp_dst)?;
    }

    Ok(())
}

/// The result of parsing a `key=value` field list.
pub(crate) struct ParsedFields {
    pub flow: Flow,
    pub wc: FlowWildcards,
    pub priority: Option<u32>,
}

/// Parse a decimal or `0x`-prefixed hexadecimal number.
fn parse_num<T: TryFrom<u64>>(key: &str, val: &str) -> Result<T, String> {
    let raw = match val.strip_prefix("0x") {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => val.parse::<u64>(),
    }
    .map_err(|e| format!("bad {key}: '{val}' {e}"))?;

    T::try_from(raw).map_err(|_| format!("bad {key}: '{val}' out of range"))
}

/// Parse the text form shared by flows and rules.
///
/// Tokens are separated by commas or whitespace. Every field starts out
/// wildcarded and each `key=value` pair fixes one.
pub(crate) fn parse_fields(s: &str) -> Result<ParsedFields, String> {
    let mut flow = Flow::default();
    let mut wc = FlowWildcards::ALL;
    let mut priority = None;

    let tokens = s
        .split(|c: char| c == ',' || c.is_ascii_whitespace())
        .filter(|t| !t.is_empty());

    for token in tokens {
        let Some((key, val)) = token.split_once('=') else {
            return Err(format!("bad token: {token}"));
        };

        let key = key.to_ascii_lowercase();
        let val = val.to_ascii_lowercase();
        let val = val.as_str();

        match key.as_str() {
            "priority" => {
                priority = Some(parse_num(&key, val)?);
                continue;
            }

            "nw_src" | "nw_dst" => {
                let cidr = val.parse::<Ipv4Cidr>()?;
                let (ip, prefix) = cidr.parts();
                if key == "nw_src" {
                    flow.nw_src = ip;
                    wc.nw_src = prefix;
                } else {
                    flow.nw_dst = ip;
                    wc.nw_dst = prefix;
                }
                continue;
            }

            _ => {}
        }

        let flag = match key.as_str() {
            "tun_id" => {
                flow.tun_id = parse_num(&key, val)?;
                Wildcards::TUN_ID
            }
            "in_port" => {
                flow.in_port = parse_num(&key, val)?;
                Wildcards::IN_PORT
            }
            "dl_vlan" => {
                flow.dl_vlan = if val == "none" {
                    OFP_VLAN_NONE
                } else {
                    parse_num(&key, val)?
                };
                Wildcards::DL_VLAN
            }
            "dl_vlan_pcp" => {
                flow.dl_vlan_pcp = parse_num(&key, val)?;
                Wildcards::DL_VLAN_PCP
            }
            "dl_src" => {
                flow.dl_src = val.parse()?;
                Wildcards::DL_SRC
            }
            "dl_dst" => {
                flow.dl_dst = val.parse()?;
                Wildcards::DL_DST
            }
            "dl_type" => {
                flow.dl_type = parse_num(&key, val)?;
                Wildcards::DL_TYPE
            }
            "nw_proto" => {
                flow.nw_proto = parse_nw_proto(val)?;
                Wildcards::NW_PROTO
            }
            "nw_tos" => {
                flow.nw_tos = parse_num(&key, val)?;
                Wildcards::NW_TOS
            }
            "tp_src" => {
                flow.tp_src = parse_num(&key, val)?;
                Wildcards::TP_SRC
            }
            "tp_dst" => {
                flow.tp_dst = parse_num(&key, val)?;
                Wildcards::TP_DST
            }
            _ => return Err(format!("invalid key: {token}")),
        };

        wc.flags.remove(flag);
    }

    Ok(ParsedFields { flow, wc, priority })
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample() -> Flow {
        Flow {
            tun_id: 0x1234,
            nw_src: "10.0.0.77".parse().unwrap(),
            nw_dst: "52.10.128.69".parse().unwrap(),
            in_port: 3,
            dl_vlan: OFP_VLAN_NONE,
            dl_type: 0x0800,
            tp_src: 5555,
            tp_dst: 443,
            dl_src: "a8:40:25:00:00:63".parse().unwrap(),
            dl_dst: "78:23:ae:5d:4f:0d".parse().unwrap(),
            nw_proto: 6,
            dl_vlan_pcp: 0,
            nw_tos: 0,
        }
    }

    #[test]
    fn masked_clears_wildcarded_bits() {
        let flow = sample();
        assert_eq!(flow.masked(&FlowWildcards::EXACT), flow);
        assert_eq!(flow.masked(&FlowWildcards::ALL), Flow::default());

        let wc = FlowWildcards::new(
            Wildcards::all() - Wildcards::TP_DST,
            Ipv4PrefixLen::new(8).unwrap(),
            Ipv4PrefixLen::NETMASK_NONE,
        );
        let m = flow.masked(&wc);
        assert_eq!(m.tp_dst, 443);
        assert_eq!(m.nw_src, "10.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(m.nw_dst, Ipv4Addr::ANY_ADDR);
        assert_eq!(m.tp_src, 0);
        assert_eq!(m.dl_src, MacAddr::ZERO);
        assert_eq!(m.tun_id, 0);
    }

    #[test]
    fn union_masks() {
        let a = FlowWildcards::new(
            Wildcards::TP_SRC,
            Ipv4PrefixLen::new(24).unwrap(),
            Ipv4PrefixLen::NETMASK_ALL,
        );
        let b = FlowWildcards::new(
            Wildcards::TP_DST,
            Ipv4PrefixLen::NETMASK_ALL,
            Ipv4PrefixLen::new(16).unwrap(),
        );

        let u = a.union(&b);
        assert_eq!(u.flags, Wildcards::TP_SRC | Wildcards::TP_DST);
        assert_eq!(u.nw_src.val(), 24);
        assert_eq!(u.nw_dst.val(), 16);
    }

    #[test]
    fn normalized_drops_undefined_flags() {
        let odd = FlowWildcards {
            flags: Wildcards::from_bits_retain(
                Wildcards::TP_SRC.bits() | 1 << 31,
            ),
            ..FlowWildcards::EXACT
        };
        assert_ne!(odd, odd.normalized());
        assert_eq!(odd.normalized().flags, Wildcards::TP_SRC);
        assert_eq!(
            FlowWildcards::new(
                odd.flags,
                Ipv4PrefixLen::NETMASK_ALL,
                Ipv4PrefixLen::NETMASK_ALL,
            ),
            odd.normalized()
        );
    }

    #[test]
    fn exact_bits_ranks_specificity() {
        assert_eq!(FlowWildcards::ALL.exact_bits(), 0);
        assert_eq!(FlowWildcards::EXACT.exact_bits(), 296);

        let port_only = FlowWildcards::new(
            Wildcards::all() - Wildcards::TP_DST,
            Ipv4PrefixLen::NETMASK_NONE,
            Ipv4PrefixLen::NETMASK_NONE,
        );
        assert_eq!(port_only.exact_bits(), 16);
    }

    #[test]
    fn display_round_trips() {
        let flow = sample();
        let text = flow.to_string();
        assert!(text.starts_with("tun_id=0x1234,in_port=3,dl_vlan=none"));
        assert!(text.contains("dl_type=0x0800"));
        assert_eq!(text.parse::<Flow>().unwrap(), flow);
    }

    #[test]
    fn parse_partial() {
        let flow: Flow = "in_port=1 nw_proto=tcp tp_dst=0x50".parse().unwrap();
        assert_eq!(flow.in_port, 1);
        assert_eq!(flow.nw_proto, 6);
        assert_eq!(flow.tp_dst, 80);
        assert_eq!(flow.nw_src, Ipv4Addr::ANY_ADDR);

        assert!("in_port=1,priority=3".parse::<Flow>().is_err());
        assert!("nw_src=10.0.0.0/8".parse::<Flow>().is_err());
        assert!("in_port=70000".parse::<Flow>().is_err());
        assert!("bogus=1".parse::<Flow>().is_err());
        assert!("in_port".parse::<Flow>().is_err());
    }

    #[test]
    fn wildcards_display() {
        assert_eq!(FlowWildcards::EXACT.to_string(), "exact");
        let wc = FlowWildcards::new(
            Wildcards::IN_PORT | Wildcards::TP_SRC,
            Ipv4PrefixLen::new(8).unwrap(),
            Ipv4PrefixLen::NETMASK_NONE,
        );
        assert_eq!(wc.to_string(), "in_port,tp_src,nw_src/8,nw_dst");
    }
}
