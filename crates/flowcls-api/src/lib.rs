// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

#![no_std]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]

#[cfg(any(feature = "std", test))]
#[macro_use]
extern crate std;

#[macro_use]
extern crate alloc;

use alloc::string::String;
use core::fmt;
use core::fmt::Display;
use serde::Deserialize;
use serde::Serialize;

pub mod dump;
pub mod ip;
pub mod mac;

pub use dump::*;
pub use ip::*;
pub use mac::*;

/// The overall version of the API. Anytime the dump types or the text
/// format of rules change, this number should increment.
pub const API_VERSION: u64 = 3;

/// Major version of the flowcls package.
pub const MAJOR_VERSION: u64 = 0;

bitflags::bitflags! {
    /// Which tables a lookup or traversal should consider.
    ///
    /// A table is "exact" when its mask wildcards nothing; every other
    /// table is "wild".
    #[derive(
        Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize,
    )]
    pub struct Include: u8 {
        /// Include exact-match rules.
        const EXACT = 1 << 0;
        /// Include rules with wildcards.
        const WILD = 1 << 1;
        const ALL = Self::EXACT.bits() | Self::WILD.bits();
    }
}

impl Include {
    /// Does this selection cover a table of the given kind?
    #[inline]
    pub fn covers(&self, exact: bool) -> bool {
        if exact {
            self.contains(Include::EXACT)
        } else {
            self.contains(Include::WILD)
        }
    }
}

impl core::str::FromStr for Include {
    type Err = String;

    fn from_str(s: &str) -> core::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(Include::EXACT),
            "wild" => Ok(Include::WILD),
            "all" => Ok(Include::ALL),
            _ => Err(format!("invalid include: {s} ('exact', 'wild', 'all')")),
        }
    }
}

impl Display for Include {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match (
            self.contains(Include::EXACT),
            self.contains(Include::WILD),
        ) {
            (true, true) => "ALL",
            (true, false) => "EXACT",
            (false, true) => "WILD",
            (false, false) => "NONE",
        };

        write!(f, "{s}")
    }
}
