// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

// Copyright 2026 Oxide Computer Company

//! Classifier administration library
//!
//! Rule sets are plain text: one rule per line, in the same form the
//! rules print in. Blank lines and everything after a `#` are ignored.

use flowcls::api::ClsStatsSnap;
use flowcls::api::Include;
use flowcls::engine::Classifier;
use flowcls::engine::Flow;
use flowcls::engine::Rule;
use flowcls::provider::LogLevel;
use flowcls::provider::LogProvider;
use std::fs::File;
use std::io;
use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to read {path}: {err}")]
    Open { path: String, err: io::Error },

    #[error("error reading input: {0}")]
    Io(#[from] io::Error),

    #[error("line {line}: invalid rule: {msg}")]
    BadRule { line: usize, msg: String },

    #[error("line {line}: invalid flow: {msg}")]
    BadFlow { line: usize, msg: String },

    #[error("line {line}: {rule} overlaps {existing} at the same priority")]
    Overlap { line: usize, rule: String, existing: String },
}

/// Open `path` for reading; `-` means stdin.
pub fn open_input(path: &Path) -> Result<Box<dyn BufRead>, Error> {
    if path.as_os_str() == "-" {
        return Ok(Box::new(BufReader::new(io::stdin())));
    }

    let file = File::open(path).map_err(|err| Error::Open {
        path: path.display().to_string(),
        err,
    })?;
    Ok(Box::new(BufReader::new(file)))
}

/// Yield each non-empty line with its 1-based line number, comments
/// stripped.
fn content_lines(
    reader: impl BufRead,
) -> impl Iterator<Item = Result<(usize, String), Error>> {
    reader.lines().enumerate().filter_map(|(idx, line)| {
        let line = match line {
            Ok(line) => line,
            Err(e) => return Some(Err(Error::Io(e))),
        };

        let text = line.split('#').next().unwrap_or("").trim();
        if text.is_empty() {
            None
        } else {
            Some(Ok((idx + 1, text.to_string())))
        }
    })
}

/// Parse a rule set.
pub fn parse_rules(reader: impl BufRead) -> Result<Vec<(usize, Rule)>, Error> {
    content_lines(reader)
        .map(|res| {
            let (line, text) = res?;
            let rule = text
                .parse::<Rule>()
                .map_err(|msg| Error::BadRule { line, msg })?;
            Ok((line, rule))
        })
        .collect()
}

/// Parse a list of flows, one per line.
pub fn parse_flows(reader: impl BufRead) -> Result<Vec<Flow>, Error> {
    content_lines(reader)
        .map(|res| {
            let (line, text) = res?;
            text.parse::<Flow>().map_err(|msg| Error::BadFlow { line, msg })
        })
        .collect()
}

/// Build a classifier from a rule set.
///
/// A rule that overlaps an already loaded rule of the same priority
/// makes lookups depend on table order. In `strict` mode such a rule
/// is refused; otherwise it is loaded and a warning is logged. A rule
/// repeating an earlier one replaces it.
pub fn load_rules(
    reader: impl BufRead,
    strict: bool,
    log: &dyn LogProvider,
) -> Result<Classifier, Error> {
    let mut cls = Classifier::new();

    for (line, rule) in parse_rules(reader)? {
        let clash = cls
            .rules()
            .find(|(_, r)| {
                **r != rule
                    && r.priority() == rule.priority()
                    && r.overlaps(&rule)
            })
            .map(|(_, r)| r.to_string());

        if let Some(existing) = clash {
            if strict {
                return Err(Error::Overlap {
                    line,
                    rule: rule.to_string(),
                    existing,
                });
            }

            log.log(
                LogLevel::Warn,
                &format!("line {line}: {rule} overlaps {existing}"),
            );
        }

        if cls.insert(rule).1.is_some() {
            log.log(
                LogLevel::Note,
                &format!("line {line}: {rule} replaces an earlier copy"),
            );
        }
    }

    Ok(cls)
}

/// Look up each of `flows` against every table and return the
/// counters, which include those recorded while loading.
pub fn run_lookups(cls: &Classifier, flows: &[Flow]) -> ClsStatsSnap {
    for flow in flows {
        let _ = cls.lookup(flow, Include::ALL);
    }

    cls.stats()
}

#[cfg(test)]
mod test {
    use super::*;
    use flowcls::provider::NullLog;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordLog(Mutex<Vec<(LogLevel, String)>>);

    impl LogProvider for RecordLog {
        fn log(&self, level: LogLevel, msg: &str) {
            self.0.lock().unwrap().push((level, msg.to_string()));
        }
    }

    const RULES: &str = "\
# web traffic
priority=10,dl_type=0x0800,nw_proto=6,tp_dst=80

priority=5,in_port=1   # everything from port 1
priority=1
";

    #[test]
    fn load_and_lookup() {
        let cls = load_rules(RULES.as_bytes(), true, &NullLog).unwrap();
        assert_eq!(cls.count(), 3);

        let f: Flow = "in_port=1,dl_type=0x0800,nw_proto=6,tp_dst=80"
            .parse()
            .unwrap();
        assert_eq!(cls.lookup(&f, Include::ALL).unwrap().priority(), 10);
    }

    #[test]
    fn bad_rule_reports_line() {
        let input = "priority=1,in_port=1\n\npriority=2,in_prot=2\n";
        match load_rules(input.as_bytes(), false, &NullLog) {
            Err(Error::BadRule { line, .. }) => assert_eq!(line, 3),
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn strict_refuses_same_priority_overlap() {
        let input = "priority=3,in_port=1\npriority=3,tp_dst=22\n";
        let log = RecordLog::default();
        assert!(load_rules(input.as_bytes(), false, &log).is_ok());
        let msgs = log.0.into_inner().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].0, LogLevel::Warn);
        assert!(msgs[0].1.starts_with("line 2: "));

        match load_rules(input.as_bytes(), true, &NullLog) {
            Err(Error::Overlap { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }

        let input = "priority=3,in_port=1\npriority=4,tp_dst=22\n";
        assert!(load_rules(input.as_bytes(), true, &NullLog).is_ok());
    }

    #[test]
    fn repeated_rule_replaces() {
        let input = "priority=3,in_port=1\npriority=3,in_port=1\n";
        let log = RecordLog::default();
        let cls = load_rules(input.as_bytes(), true, &log).unwrap();
        assert_eq!(cls.count(), 1);

        let msgs = log.0.into_inner().unwrap();
        assert_eq!(msgs.len(), 1);
        assert_eq!(msgs[0].0, LogLevel::Note);
    }

    #[test]
    fn stats_keep_load_counters() {
        let cls = load_rules(RULES.as_bytes(), true, &NullLog).unwrap();
        let input = "in_port=1\nin_port=2\n";
        let flows = parse_flows(input.as_bytes()).unwrap();

        let stats = run_lookups(&cls, &flows);
        assert_eq!(stats.inserts, 3);
        assert_eq!(stats.tables_created, cls.num_tables() as u64);
        assert_eq!(stats.lookups, 2);
        assert_eq!(stats.lookup_hits, 2);
        assert_eq!(stats.lookup_misses, 0);
    }

    #[test]
    fn flows_parse() {
        let input = "in_port=1\n# skip\nin_port=2,tp_dst=80\n";
        let flows = parse_flows(input.as_bytes()).unwrap();
        assert_eq!(flows.len(), 2);
        assert_eq!(flows[1].tp_dst, 80);

        match parse_flows("in_port=1\nnw_src=1.2.3.0/24\n".as_bytes()) {
            Err(Error::BadFlow { line, .. }) => assert_eq!(line, 2),
            other => panic!("unexpected result: {other:?}"),
        }
    }
}
