// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Pluggable services for code built on the classifier.
//!
//! The engine itself reports through USDT probes and counters. Code
//! that loads or manages rule sets on its behalf logs through a
//! [`LogProvider`], so the same loader can print in a CLI and record
//! messages in a test.

use core::fmt;
use core::fmt::Display;

/// A destination for log messages.
pub trait LogProvider: Send + Sync {
    /// Log a message at the specified level.
    fn log(&self, level: LogLevel, msg: &str);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum LogLevel {
    Note,
    Warn,
    Error,
}

impl Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let level_s = match self {
            Self::Note => "[NOTE]",
            Self::Warn => "[WARN]",
            Self::Error => "[ERROR]",
        };
        write!(f, "{level_s}")
    }
}

#[cfg(feature = "std")]
#[derive(Clone, Copy, Debug)]
pub struct PrintlnLog;

#[cfg(feature = "std")]
impl LogProvider for PrintlnLog {
    fn log(&self, level: LogLevel, msg: &str) {
        println!("{level} {msg}");
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug)]
pub struct NullLog;

impl LogProvider for NullLog {
    fn log(&self, _level: LogLevel, _msg: &str) {}
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn level_display() {
        assert_eq!(LogLevel::Note.to_string(), "[NOTE]");
        assert_eq!(LogLevel::Warn.to_string(), "[WARN]");
        assert_eq!(LogLevel::Error.to_string(), "[ERROR]");
    }
}
