// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

use std::path::PathBuf;

use clap::Args;
use clap::Parser;

use clsadm::load_rules;
use clsadm::open_input;
use clsadm::parse_flows;
use clsadm::run_lookups;
use flowcls::api::API_VERSION;
use flowcls::api::Include;
use flowcls::api::MAJOR_VERSION;
use flowcls::engine::Classifier;
use flowcls::engine::Flow;
use flowcls::engine::Rule;
use flowcls::print::print_classifier;
use flowcls::print::print_stats;
use flowcls::provider::LogProvider;
use flowcls::provider::NullLog;
use flowcls::provider::PrintlnLog;

/// Inspect flow classifier rule sets
#[derive(Debug, Parser)]
#[command(version = clsadm_version())]
enum Command {
    /// Dump the tables and rules built from a rule set.
    Dump {
        #[command(flatten)]
        src: RuleSource,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Find the rule a flow matches.
    Lookup {
        #[command(flatten)]
        src: RuleSource,

        /// Which tables to search: exact, wild, or all.
        #[arg(long, default_value = "all")]
        include: Include,

        /// The flow, as `key=value` pairs.
        flow: Flow,
    },

    /// Report whether a rule overlaps any rule in the set.
    Overlaps {
        #[command(flatten)]
        src: RuleSource,

        /// The rule, as `priority=<n>,key=value,...`.
        rule: Rule,
    },

    /// Look up every flow in a file and print the classifier counters,
    /// load-time insertions included.
    Stats {
        #[command(flatten)]
        src: RuleSource,

        /// A file of flows, one per line.
        flows: PathBuf,

        /// Emit JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct RuleSource {
    /// The rule file; `-` reads stdin.
    #[arg(short = 'f', long = "rules")]
    rules: PathBuf,

    /// Refuse rules that overlap a loaded rule of the same priority.
    #[arg(long)]
    strict: bool,
}

impl RuleSource {
    fn load(&self, log: &dyn LogProvider) -> anyhow::Result<Classifier> {
        Ok(load_rules(open_input(&self.rules)?, self.strict, log)?)
    }
}

// Loader messages would corrupt JSON output.
fn logger(json: bool) -> &'static dyn LogProvider {
    if json { &NullLog } else { &PrintlnLog }
}

fn clsadm_version() -> String {
    format!("{MAJOR_VERSION}.{API_VERSION}")
}

fn main() -> anyhow::Result<()> {
    let cmd = Command::parse();
    match cmd {
        Command::Dump { src, json } => {
            let dump = src.load(logger(json))?.dump();
            if json {
                println!("{}", serde_json::to_string_pretty(&dump)?);
            } else {
                print_classifier(&dump)?;
            }
        }

        Command::Lookup { src, include, flow } => {
            let cls = src.load(&PrintlnLog)?;
            match cls.lookup_id(&flow, include) {
                Some(id) => {
                    let rule = cls
                        .get(id)
                        .ok_or_else(|| anyhow::anyhow!("rule {id} vanished"))?;
                    println!("{id}\t{rule}");
                }
                None => println!("no match"),
            }
        }

        Command::Overlaps { src, rule } => {
            let cls = src.load(&PrintlnLog)?;
            if cls.rule_overlaps(&rule) {
                println!("{rule} overlaps the rule set");
            } else {
                println!("{rule} overlaps nothing");
            }
        }

        Command::Stats { src, flows, json } => {
            let cls = src.load(logger(json))?;
            let flows = parse_flows(open_input(&flows)?)?;
            let stats = run_lookups(&cls, &flows);
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                print_stats(&stats)?;
            }
        }
    }

    Ok(())
}
