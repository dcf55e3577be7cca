// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Print classifier dumps in a human-friendly manner.
//!
//! This is mostly just a place to hang printing routines so that they
//! can be used by both clsadm and integration tests.

use crate::api::ClsStatsSnap;
use crate::api::DumpClassifierResp;
use crate::api::TableDump;
use std::io::Write;
use tabwriter::TabWriter;

/// Print a [`DumpClassifierResp`].
pub fn print_classifier(resp: &DumpClassifierResp) -> std::io::Result<()> {
    print_classifier_into(&mut std::io::stdout(), resp)
}

/// Print a [`DumpClassifierResp`] into a given writer.
pub fn print_classifier_into(
    writer: &mut impl Write,
    resp: &DumpClassifierResp,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);

    writeln!(
        t,
        "Classifier: {} rules ({} exact) in {} tables",
        resp.n_rules,
        resp.n_exact,
        resp.tables.len(),
    )?;
    write_hrb(&mut t)?;

    for table in &resp.tables {
        print_table(&mut t, table)?;
        t.flush()?;
    }

    t.flush()
}

fn print_table(t: &mut impl Write, table: &TableDump) -> std::io::Result<()> {
    let kind = if table.exact { " (exact)" } else { "" };
    writeln!(
        t,
        "\nTable {}{kind}: wildcards {}, {} rules, {} leases",
        table.id, table.wildcards, table.n_rules, table.n_refs,
    )?;
    write_hr(t)?;
    print_rule_header(t)?;
    for rule in &table.rules {
        writeln!(t, "{}\t{}\t{}", rule.id, rule.priority, rule.rule)?;
    }
    Ok(())
}

/// Print the header for the per-table rule listing.
pub fn print_rule_header(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "ID\tPRI\tRULE")
}

/// Print a [`ClsStatsSnap`].
pub fn print_stats(stats: &ClsStatsSnap) -> std::io::Result<()> {
    print_stats_into(&mut std::io::stdout(), stats)
}

/// Print a [`ClsStatsSnap`] into a given writer.
pub fn print_stats_into(
    writer: &mut impl Write,
    stats: &ClsStatsSnap,
) -> std::io::Result<()> {
    let mut t = TabWriter::new(writer);
    writeln!(t, "COUNTER\tVALUE")?;
    for (name, val) in [
        ("lookups", stats.lookups),
        ("lookup_hits", stats.lookup_hits),
        ("lookup_misses", stats.lookup_misses),
        ("inserts", stats.inserts),
        ("replacements", stats.replacements),
        ("removals", stats.removals),
        ("tables_created", stats.tables_created),
        ("tables_destroyed", stats.tables_destroyed),
    ] {
        writeln!(t, "{name}\t{val}")?;
    }
    t.flush()
}

/// Print a horizontal rule in bold.
pub fn write_hrb(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:=<70}", "=")
}

/// Print a horizontal rule.
pub fn write_hr(t: &mut impl Write) -> std::io::Result<()> {
    writeln!(t, "{:-<70}", "-")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::engine::Classifier;
    use crate::engine::Rule;

    #[test]
    fn classifier_listing() {
        let mut cls = Classifier::new();
        cls.insert("priority=9,in_port=1".parse::<Rule>().unwrap());
        cls.insert("priority=4,in_port=2".parse::<Rule>().unwrap());

        let mut out = vec![];
        print_classifier_into(&mut out, &cls.dump()).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("Classifier: 2 rules (0 exact) in 1 tables"));
        assert!(text.contains("Table 0: wildcards"));
        let first = text.find("priority=9,in_port=1").unwrap();
        let second = text.find("priority=4,in_port=2").unwrap();
        assert!(first < second);
    }

    #[test]
    fn stats_listing() {
        let stats = ClsStatsSnap { lookups: 12, ..Default::default() };
        let mut out = vec![];
        print_stats_into(&mut out, &stats).unwrap();
        let text = String::from_utf8(out).unwrap();
        let line = text.lines().find(|l| l.starts_with("lookups")).unwrap();
        assert!(line.ends_with("12"));
    }
}
