// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use alloc::string::String;
use alloc::string::ToString;
use core::fmt;
use core::fmt::Debug;
use core::fmt::Display;
use core::str::FromStr;
use serde::Deserialize;
use serde::Serialize;

pub const PROTO_ICMP: u8 = 0x1;
pub const PROTO_TCP: u8 = 0x6;
pub const PROTO_UDP: u8 = 0x11;

/// Parse an `nw_proto` value: `icmp`, `tcp`, `udp`, or a number.
pub fn parse_nw_proto(s: &str) -> Result<u8, String> {
    match s.to_ascii_lowercase().as_str() {
        "icmp" => Ok(PROTO_ICMP),
        "tcp" => Ok(PROTO_TCP),
        "udp" => Ok(PROTO_UDP),
        _ => parse_u8(s).ok_or_else(|| format!("bad protocol: {s}")),
    }
}

fn parse_u8(s: &str) -> Option<u8> {
    match s.strip_prefix("0x") {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

/// An IPv4 address, stored in network order.
#[derive(
    Clone,
    Copy,
    Default,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[repr(C)]
pub struct Ipv4Addr {
    inner: [u8; 4],
}

impl Ipv4Addr {
    pub const ANY_ADDR: Self = Self { inner: [0; 4] };

    /// Return the address with every bit past `prefix_len` cleared.
    #[inline]
    pub fn mask(self, prefix_len: Ipv4PrefixLen) -> Self {
        Self::from(u32::from(self) & prefix_len.to_bits())
    }
}

impl From<core::net::Ipv4Addr> for Ipv4Addr {
    fn from(ip4: core::net::Ipv4Addr) -> Self {
        Self { inner: ip4.octets() }
    }
}

impl From<Ipv4Addr> for u32 {
    fn from(ip: Ipv4Addr) -> u32 {
        u32::from_be_bytes(ip.inner)
    }
}

impl From<u32> for Ipv4Addr {
    fn from(val: u32) -> Self {
        Self { inner: val.to_be_bytes() }
    }
}

impl From<[u8; 4]> for Ipv4Addr {
    fn from(bytes: [u8; 4]) -> Self {
        Self { inner: bytes }
    }
}

impl FromStr for Ipv4Addr {
    type Err = String;

    fn from_str(val: &str) -> Result<Self, Self::Err> {
        val.parse::<core::net::Ipv4Addr>()
            .map(Self::from)
            .map_err(|_| format!("malformed ip: {val}"))
    }
}

impl Display for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        Display::fmt(&core::net::Ipv4Addr::from(self.inner), f)
    }
}

impl Debug for Ipv4Addr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Ipv4Addr({self})")
    }
}

/// A valid IPv4 prefix length.
///
/// In a flow mask this is the number of leading address bits that
/// must match; the remaining `32 - len` bits are wildcarded.
/// Deserialization applies the same bound as [`Ipv4PrefixLen::new`].
#[derive(
    Clone,
    Copy,
    Debug,
    Deserialize,
    Eq,
    Hash,
    Ord,
    PartialEq,
    PartialOrd,
    Serialize,
)]
#[serde(try_from = "u8")]
pub struct Ipv4PrefixLen(u8);

impl Ipv4PrefixLen {
    pub const NETMASK_NONE: Self = Self(0);
    pub const NETMASK_ALL: Self = Self(32);

    pub fn new(prefix_len: u8) -> Result<Self, String> {
        if prefix_len > 32 {
            return Err(format!("bad IPv4 prefix length: {prefix_len}"));
        }

        Ok(Self(prefix_len))
    }

    /// Build a prefix length from a count of wildcarded low-order
    /// bits. Any count of 32 or more wildcards the whole address.
    pub const fn from_wildcard_bits(bits: u32) -> Self {
        if bits >= 32 { Self(0) } else { Self(32 - bits as u8) }
    }

    /// The number of wildcarded low-order bits.
    pub const fn wildcard_bits(&self) -> u32 {
        32 - self.0 as u32
    }

    /// The netmask as a host-order integer, `1` for every bit that
    /// must match.
    #[inline]
    pub const fn to_bits(self) -> u32 {
        if self.0 == 0 { 0 } else { u32::MAX << (32 - self.0 as u32) }
    }

    pub fn val(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Ipv4PrefixLen {
    type Error = String;

    fn try_from(prefix_len: u8) -> Result<Self, Self::Error> {
        Self::new(prefix_len)
    }
}

/// An address and prefix length, as written in `nw_src`/`nw_dst`.
///
/// The address is always stored masked.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(from = "CidrRepr")]
pub struct Ipv4Cidr {
    ip: Ipv4Addr,
    prefix_len: Ipv4PrefixLen,
}

#[derive(Deserialize)]
struct CidrRepr {
    ip: Ipv4Addr,
    prefix_len: Ipv4PrefixLen,
}

impl From<CidrRepr> for Ipv4Cidr {
    fn from(raw: CidrRepr) -> Self {
        Self::new(raw.ip, raw.prefix_len)
    }
}

impl Ipv4Cidr {
    pub fn new(ip: Ipv4Addr, prefix_len: Ipv4PrefixLen) -> Self {
        Ipv4Cidr { ip: ip.mask(prefix_len), prefix_len }
    }

    pub fn parts(&self) -> (Ipv4Addr, Ipv4PrefixLen) {
        (self.ip, self.prefix_len)
    }

    /// Render as a bare address when the prefix covers every bit.
    pub fn to_short_string(&self) -> String {
        if self.prefix_len == Ipv4PrefixLen::NETMASK_ALL {
            self.ip.to_string()
        } else {
            self.to_string()
        }
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    /// Parse `a.b.c.d/len`. A bare address is taken as a /32.
    fn from_str(val: &str) -> Result<Self, Self::Err> {
        let (ip_s, prefix_len) = match val.split_once('/') {
            Some((ip_s, prefix_s)) => {
                let raw = prefix_s
                    .parse::<u8>()
                    .map_err(|e| format!("bad prefix length: {e}"))?;
                (ip_s, Ipv4PrefixLen::new(raw)?)
            }

            None => (val, Ipv4PrefixLen::NETMASK_ALL),
        };

        Ok(Ipv4Cidr::new(ip_s.parse()?, prefix_len))
    }
}

impl Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}", self.ip, self.prefix_len.val())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn prefix_bits() {
        assert_eq!(Ipv4PrefixLen::NETMASK_NONE.to_bits(), 0);
        assert_eq!(Ipv4PrefixLen::NETMASK_ALL.to_bits(), u32::MAX);
        assert_eq!(Ipv4PrefixLen::new(24).unwrap().to_bits(), 0xFFFF_FF00);
        assert_eq!(Ipv4PrefixLen::new(1).unwrap().to_bits(), 0x8000_0000);
        assert!(Ipv4PrefixLen::new(33).is_err());
    }

    #[test]
    fn wildcard_bits() {
        assert_eq!(Ipv4PrefixLen::from_wildcard_bits(0).val(), 32);
        assert_eq!(Ipv4PrefixLen::from_wildcard_bits(8).val(), 24);
        assert_eq!(Ipv4PrefixLen::from_wildcard_bits(32).val(), 0);
        // The 6-bit wire field can exceed 32.
        assert_eq!(Ipv4PrefixLen::from_wildcard_bits(63).val(), 0);
        assert_eq!(Ipv4PrefixLen::new(20).unwrap().wildcard_bits(), 12);
    }

    #[test]
    fn cidr_masks_address() {
        let cidr: Ipv4Cidr = "10.0.7.9/16".parse().unwrap();
        let (ip, len) = cidr.parts();
        assert_eq!(ip, "10.0.0.0".parse::<Ipv4Addr>().unwrap());
        assert_eq!(len.val(), 16);
        assert_eq!(cidr.to_short_string(), "10.0.0.0/16");

        let host: Ipv4Cidr = "192.168.2.10".parse().unwrap();
        assert_eq!(host.to_short_string(), "192.168.2.10");

        assert!("10.0.0.0/33".parse::<Ipv4Cidr>().is_err());
        assert!("10.0.0/8".parse::<Ipv4Cidr>().is_err());
    }

    #[test]
    fn deserialize_checks_bounds() {
        let len: Ipv4PrefixLen = serde_json::from_str("24").unwrap();
        assert_eq!(len.val(), 24);
        assert!(serde_json::from_str::<Ipv4PrefixLen>("40").is_err());

        let cidr: Ipv4Cidr = "10.0.0.0/16".parse().unwrap();
        let mut json = serde_json::to_value(cidr).unwrap();
        json["ip"] = serde_json::to_value(
            "10.0.7.9".parse::<Ipv4Addr>().unwrap(),
        )
        .unwrap();
        let back: Ipv4Cidr = serde_json::from_value(json).unwrap();
        assert_eq!(back, cidr);
    }

    #[test]
    fn nw_proto_names() {
        assert_eq!(parse_nw_proto("TCP"), Ok(PROTO_TCP));
        assert_eq!(parse_nw_proto("17"), Ok(PROTO_UDP));
        assert_eq!(parse_nw_proto("0x3a"), Ok(0x3a));
        assert!(parse_nw_proto("bogus").is_err());
        assert!(parse_nw_proto("256").is_err());
    }
}
