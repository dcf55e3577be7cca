// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! A flow classifier.
//!
//! A [`engine::classifier::Classifier`] holds a set of rules, each a
//! flow value plus a wildcard mask plus a priority, and answers "which
//! is the highest priority rule matching this flow?". Rules are
//! partitioned into tables by mask, and each table is a hash index
//! from masked flow value to a priority-ordered chain of rules.

#![cfg_attr(not(feature = "std"), no_std)]
#![allow(clippy::len_without_is_empty)]
#![allow(non_camel_case_types)]
#![deny(unreachable_patterns)]
#![deny(unused_must_use)]
// Enable features needed for USDT, if needed.
#![cfg_attr(all(feature = "usdt", not(usdt_stable_asm)), feature(asm))]
#![cfg_attr(
    all(feature = "usdt", target_os = "macos", not(usdt_stable_asm_sym)),
    feature(asm_sym)
)]

#[cfg_attr(feature = "engine", macro_use)]
extern crate alloc;

#[cfg(feature = "engine")]
#[macro_use]
extern crate cfg_if;

pub mod api;
#[cfg(feature = "std")]
pub mod ddi;
#[cfg(feature = "engine")]
pub mod engine;
#[cfg(all(feature = "engine", feature = "std"))]
pub mod print;
pub mod provider;

// ================================================================
// DTrace USDT Provider
//
// Fire the classifier probes from userland consumers when built with
// the `usdt` feature. Without it every probe site compiles to nothing.
// ================================================================
#[cfg(feature = "usdt")]
#[usdt::provider]
mod flowcls_provider {
    fn rule__insert(table: u32, priority: u32, rule: &str) {}
    fn rule__replace(table: u32, priority: u32, rule: &str) {}
    fn rule__remove(table: u32, priority: u32, rule: &str) {}
    fn table__create(table: u32, wildcards: &str) {}
    fn table__destroy(table: u32, wildcards: &str) {}
    fn lookup__hit(flow: &str, table: u32, priority: u32) {}
    fn lookup__miss(flow: &str, include: &str) {}
}
