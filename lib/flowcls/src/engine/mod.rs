// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! The classification engine.

pub mod classifier;
pub mod flow;
pub mod ofp;
pub mod rule;
#[cfg(feature = "std")]
pub mod shared;
pub mod stat;
pub mod table;

pub use classifier::Classifier;
pub use classifier::RuleId;
pub use classifier::TableLease;
pub use flow::Flow;
pub use flow::FlowWildcards;
pub use flow::Wildcards;
pub use rule::Rule;
pub use table::TableId;
