//! Turns raw log lines into typed events.
//!
//! Every non-blank line yields exactly one [`Event`]. Lines no matcher claims
//! become [`Event::Unstructured`] and are counted, never dropped.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use tracing::trace;

use super::matchers::{default_matchers, LineMatcher};
use super::timestamp;
use crate::model::{Event, WorldEventKind};

/// Continuation lines attached to one diagnostic header, at most.
pub const MAX_DIAGNOSTIC_LINES: u16 = 32;

static DIAGNOSTIC_HEADER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:Log[A-Za-z0-9_]*:\s*Error:|(?:Log[A-Za-z0-9_]*:\s*(?:Error:\s*)?)?(?:Fatal error|Assertion failed|=== Critical error))",
    )
    .expect("diagnostic header regex")
});

static DIAGNOSTIC_CONTINUATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:\s+\S|at\s|0x[0-9A-Fa-f]+|(?:Log[A-Za-z0-9_]*:\s*)?Error:\s*\[Callstack\])")
        .expect("diagnostic continuation regex")
});

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParseStats {
    pub lines: u64,
    pub unstructured: u64,
    pub diagnostic_blocks: u64,
}

struct OpenBlock {
    id: u64,
    lines: u16,
}

pub struct EventParser {
    matchers: Vec<Box<dyn LineMatcher>>,
    diagnostic: Option<OpenBlock>,
    stats: ParseStats,
}

impl Default for EventParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EventParser {
    pub fn new() -> Self {
        Self::with_matchers(default_matchers())
    }

    pub fn with_matchers(matchers: Vec<Box<dyn LineMatcher>>) -> Self {
        Self {
            matchers,
            diagnostic: None,
            stats: ParseStats::default(),
        }
    }

    pub fn stats(&self) -> &ParseStats {
        &self.stats
    }

    /// Parse `line`, using `received_at` when it carries no usable timestamp.
    pub fn parse_at(&mut self, line: &str, received_at: DateTime<Utc>) -> Option<Event> {
        let line = line.trim_end();
        if line.trim_start().is_empty() {
            return None;
        }
        self.stats.lines += 1;

        let stamped = timestamp::extract(line, received_at);

        if let Some(event) = self.diagnostic(&stamped) {
            return Some(event);
        }

        for matcher in &self.matchers {
            if let Some(event) = matcher.try_parse(&stamped) {
                trace!(matcher = matcher.name(), "Matched line");
                return Some(event);
            }
        }

        self.stats.unstructured += 1;
        trace!(line = %line, "Unstructured line");
        Some(Event::Unstructured {
            text: stamped.body.to_string(),
            time: stamped.time,
        })
    }

    /// Forget any open diagnostic block (the underlying file was replaced).
    pub fn reset(&mut self) {
        self.diagnostic = None;
    }

    fn diagnostic(&mut self, stamped: &timestamp::Stamped<'_>) -> Option<Event> {
        let body = stamped.body;

        if let Some(block) = self.diagnostic.as_mut() {
            if block.lines < MAX_DIAGNOSTIC_LINES && DIAGNOSTIC_CONTINUATION.is_match(body) {
                block.lines += 1;
                return Some(Event::WorldEvent {
                    kind: WorldEventKind::Diagnostic {
                        block: block.id,
                        line: block.lines,
                    },
                    detail: body.trim().to_string(),
                    time: stamped.time,
                });
            }
            self.diagnostic = None;
        }

        if !DIAGNOSTIC_HEADER.is_match(body) {
            return None;
        }
        self.stats.diagnostic_blocks += 1;
        let id = self.stats.diagnostic_blocks;
        self.diagnostic = Some(OpenBlock { id, lines: 0 });
        Some(Event::WorldEvent {
            kind: WorldEventKind::Diagnostic { block: id, line: 0 },
            detail: body.to_string(),
            time: stamped.time,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn received() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 15, 13, 0, 0).unwrap()
    }

    #[test]
    fn blank_lines_yield_nothing() {
        let mut parser = EventParser::new();
        assert!(parser.parse_at("", received()).is_none());
        assert!(parser.parse_at("   \r", received()).is_none());
        assert_eq!(parser.stats().lines, 0);
    }

    #[test]
    fn login_line_with_clock_stamp() {
        let mut parser = EventParser::new();
        let event = parser
            .parse_at("[12:00:01] Player 'Alice' (P1) logged in from 1.2.3.4", received())
            .unwrap();
        assert_eq!(
            event,
            Event::Connected {
                player_id: "P1".into(),
                display_name: "Alice".into(),
                ip: Some("1.2.3.4".parse().unwrap()),
                time: Utc.with_ymd_and_hms(2024, 1, 15, 12, 0, 1).unwrap(),
            }
        );
    }

    #[test]
    fn unknown_lines_are_unstructured_and_counted() {
        let mut parser = EventParser::new();
        let event = parser.parse_at("something odd happened", received()).unwrap();
        assert_eq!(
            event,
            Event::Unstructured {
                text: "something odd happened".into(),
                time: received(),
            }
        );
        assert_eq!(parser.stats().unstructured, 1);
    }

    #[test]
    fn malformed_input_never_panics() {
        let mut parser = EventParser::new();
        for line in [
            "Player '",
            "Player 'x' (",
            "'''''",
            "[99:99:99] x",
            "2024.02.30-25.61.61:",
            "Died:",
            "\u{0}\u{1}\u{fffd}",
            "Log: ",
        ] {
            assert!(parser.parse_at(line, received()).is_some(), "{line:?}");
        }
    }

    #[test]
    fn first_matching_matcher_wins() {
        struct Catchall;
        impl LineMatcher for Catchall {
            fn name(&self) -> &'static str {
                "catchall"
            }
            fn try_parse(&self, line: &timestamp::Stamped<'_>) -> Option<Event> {
                Some(Event::Unstructured {
                    text: format!("caught {}", line.body),
                    time: line.time,
                })
            }
        }

        let mut matchers = default_matchers();
        matchers.push(Box::new(Catchall));
        let mut parser = EventParser::with_matchers(matchers);

        let login = parser
            .parse_at("Player 'Alice' (P1) logged out", received())
            .unwrap();
        assert!(matches!(login, Event::Disconnected { .. }));

        let other = parser.parse_at("whatever", received()).unwrap();
        assert!(matches!(other, Event::Unstructured { ref text, .. } if text == "caught whatever"));
        assert_eq!(parser.stats().unstructured, 0);
    }

    #[test]
    fn diagnostic_block_groups_continuation_lines() {
        let mut parser = EventParser::new();
        let lines = [
            "[2024.01.15-12.00.00:000][  1]LogWindows: Error: Fatal error!",
            "[2024.01.15-12.00.00:001][  1]LogWindows: Error: [Callstack] 0x00007ff6 SCUMServer.exe!Foo()",
            "    at Bar() in Baz.cpp",
            "LogSCUM: back to normal",
        ];
        let events: Vec<_> = lines
            .iter()
            .filter_map(|l| parser.parse_at(l, received()))
            .collect();

        let kinds: Vec<_> = events
            .iter()
            .map(|e| match e {
                Event::WorldEvent { kind, .. } => kind.clone(),
                other => panic!("unexpected {other:?}"),
            })
            .collect();
        assert_eq!(
            kinds,
            vec![
                WorldEventKind::Diagnostic { block: 1, line: 0 },
                WorldEventKind::Diagnostic { block: 1, line: 1 },
                WorldEventKind::Diagnostic { block: 1, line: 2 },
                WorldEventKind::Engine {
                    category: "SCUM".into()
                },
            ]
        );
        assert_eq!(parser.stats().diagnostic_blocks, 1);
    }

    #[test]
    fn diagnostic_window_is_bounded() {
        let mut parser = EventParser::new();
        parser.parse_at("Assertion failed: x != null", received());
        for _ in 0..MAX_DIAGNOSTIC_LINES {
            let event = parser.parse_at("  frame", received()).unwrap();
            assert!(matches!(
                event,
                Event::WorldEvent { kind: WorldEventKind::Diagnostic { .. }, .. }
            ));
        }
        let overflow = parser.parse_at("  frame", received()).unwrap();
        assert!(matches!(overflow, Event::Unstructured { .. }));
    }

    #[test]
    fn reset_closes_open_block() {
        let mut parser = EventParser::new();
        parser.parse_at("=== Critical error: ===", received());
        parser.reset();
        let event = parser.parse_at("  frame", received()).unwrap();
        assert!(matches!(event, Event::Unstructured { .. }));
    }
}
