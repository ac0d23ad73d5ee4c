// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! Narrow-filter builder algebra (spec §4.3 "Narrow builder"). A narrow is
//! an ordered list of `{operator, operand, negated?}` triples sent to
//! Zulip's `narrow` query parameter.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NarrowTerm {
    pub operator: String,
    pub operand: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

impl NarrowTerm {
    pub fn new(operator: impl Into<String>, operand: impl Into<String>) -> Self {
        Self { operator: operator.into(), operand: operand.into(), negated: false }
    }
}

/// A relative or absolute bound for a time-window narrow. Relative bounds
/// are resolved against the wall clock at build time, not at validation
/// time (spec §4.3), so a `search` call made an hour after the parameters
/// were validated still narrows from "now".
#[derive(Debug, Clone, Copy)]
pub enum TimeBound {
    Absolute(DateTime<Utc>),
    RelativeSecondsAgo(i64),
}

impl TimeBound {
    fn resolve(self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            TimeBound::Absolute(dt) => dt,
            TimeBound::RelativeSecondsAgo(secs) => now - Duration::seconds(secs),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct NarrowBuilder {
    terms: Vec<NarrowTerm>,
}

impl NarrowBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stream(mut self, name: impl Into<String>) -> Self {
        self.terms.push(NarrowTerm::new("stream", name));
        self
    }

    pub fn topic(mut self, name: impl Into<String>) -> Self {
        self.terms.push(NarrowTerm::new("topic", name));
        self
    }

    pub fn sender(mut self, email: impl Into<String>) -> Self {
        self.terms.push(NarrowTerm::new("sender", email));
        self
    }

    /// Emits `after:`/`before:` operands. `now` is the wall clock at call
    /// time, used to resolve [`TimeBound::RelativeSecondsAgo`].
    pub fn time_window(mut self, after: Option<TimeBound>, before: Option<TimeBound>, now: DateTime<Utc>) -> Self {
        if let Some(bound) = after {
            self.terms.push(NarrowTerm::new("after", bound.resolve(now).to_rfc3339()));
        }
        if let Some(bound) = before {
            self.terms.push(NarrowTerm::new("before", bound.resolve(now).to_rfc3339()));
        }
        self
    }

    /// Merge caller-supplied narrow terms on top of the ones already built
    /// from simple parameters. User-supplied entries come first, in order,
    /// followed by non-conflicting derived entries (spec §4.3 "user entries
    /// win on conflict"; testable property §8.4).
    pub fn merge_user_narrow(self, user_terms: Vec<NarrowTerm>) -> Self {
        let user_operators: std::collections::HashSet<&str> = user_terms.iter().map(|t| t.operator.as_str()).collect();
        let derived: Vec<NarrowTerm> = self.terms.into_iter().filter(|t| !user_operators.contains(t.operator.as_str())).collect();
        let mut terms = user_terms;
        terms.extend(derived);
        Self { terms }
    }

    pub fn build(self) -> Vec<NarrowTerm> {
        self.terms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_params_compose_additively() {
        let narrow = NarrowBuilder::new().stream("general").topic("rust").sender("a@b.com").build();
        assert_eq!(narrow.len(), 3);
        assert_eq!(narrow[0].operator, "stream");
        assert_eq!(narrow[1].operator, "topic");
        assert_eq!(narrow[2].operator, "sender");
    }

    #[test]
    fn relative_time_window_resolves_against_supplied_now() {
        let now = DateTime::parse_from_rfc3339("2026-07-28T12:00:00Z").unwrap().with_timezone(&Utc);
        let narrow = NarrowBuilder::new()
            .time_window(Some(TimeBound::RelativeSecondsAgo(3600)), None, now)
            .build();
        assert_eq!(narrow[0].operator, "after");
        assert_eq!(narrow[0].operand, "2026-07-28T11:00:00+00:00");
    }

    #[test]
    fn user_narrow_overrides_conflicting_simple_param() {
        let narrow = NarrowBuilder::new()
            .stream("general")
            .merge_user_narrow(vec![NarrowTerm::new("stream", "random")])
            .build();
        assert_eq!(narrow.len(), 1);
        assert_eq!(narrow[0].operand, "random");
    }

    #[test]
    fn user_narrow_is_additive_when_no_conflict() {
        let narrow = NarrowBuilder::new()
            .stream("general")
            .merge_user_narrow(vec![NarrowTerm::new("has", "link")])
            .build();
        assert_eq!(narrow.len(), 2);
    }

    #[test]
    fn user_narrow_entries_precede_non_conflicting_derived_entries() {
        // spec §8 testable property 4: user-supplied entries first in order,
        // then non-conflicting derived entries.
        let narrow = NarrowBuilder::new()
            .stream("general")
            .topic("rust")
            .merge_user_narrow(vec![NarrowTerm::new("has", "link"), NarrowTerm::new("search", "foo")])
            .build();
        assert_eq!(narrow[0].operator, "has");
        assert_eq!(narrow[1].operator, "search");
        assert_eq!(narrow[2].operator, "stream");
        assert_eq!(narrow[3].operator, "topic");
    }
}
