// Copyright (c) 2026 zulip-mcp contributors
//
// SPDX-License-Identifier: Apache-2.0
//! User Resolver (spec §4.10): fuzzy identifier → canonical user record.
//! Pure over a user list sourced by the caller from the REST client's
//! cached users view.

use crate::error::{RestError, Result, UserCandidate};

/// Minimum sequence-similarity score to be considered a candidate at all
/// (spec §4.10 tier 3).
const SIMILARITY_THRESHOLD: f64 = 0.6;
/// Candidates within this distance of the top score are treated as tied,
/// forcing an ambiguity error rather than an arbitrary pick (spec §4.10).
const AMBIGUITY_MARGIN: f64 = 0.2;
const MAX_CANDIDATES: usize = 5;

#[derive(Debug, Clone)]
pub struct ZulipUser {
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone)]
pub struct ResolvedUser {
    pub email: String,
    pub full_name: String,
}

/// Resolve `identifier` against `users`. Email-shaped identifiers (contain
/// `@`) require an exact match; everything else is matched case-insensitively
/// against full names across three tiers: exact, substring, then
/// similarity ≥ [`SIMILARITY_THRESHOLD`].
pub fn resolve(identifier: &str, users: &[ZulipUser]) -> Result<ResolvedUser> {
    if identifier.contains('@') {
        return users
            .iter()
            .find(|u| u.email.eq_ignore_ascii_case(identifier))
            .map(|u| ResolvedUser { email: u.email.clone(), full_name: u.full_name.clone() })
            .ok_or_else(|| RestError::UserNotFound {
                query: identifier.to_string(),
                suggestion: "search by full name instead, or check the user list".to_string(),
            });
    }

    let needle = identifier.to_lowercase();

    let exact: Vec<&ZulipUser> = users.iter().filter(|u| u.full_name.to_lowercase() == needle).collect();
    if let Some(single) = pick_unambiguous(&exact, identifier, |_| 1.0)? {
        return Ok(single);
    }

    let substring: Vec<&ZulipUser> = users.iter().filter(|u| u.full_name.to_lowercase().contains(&needle)).collect();
    if let Some(single) = pick_unambiguous(&substring, identifier, |_| 1.0)? {
        return Ok(single);
    }

    let scored: Vec<(f64, &ZulipUser)> = users
        .iter()
        .map(|u| (strsim::jaro_winkler(&needle, &u.full_name.to_lowercase()), u))
        .filter(|(score, _)| *score >= SIMILARITY_THRESHOLD)
        .collect();
    let candidates: Vec<&ZulipUser> = scored.iter().map(|(_, u)| *u).collect();
    let scores: std::collections::HashMap<String, f64> =
        scored.iter().map(|(score, u)| (u.email.clone(), *score)).collect();
    if let Some(single) = pick_unambiguous(&candidates, identifier, |u| scores[&u.email])? {
        return Ok(single);
    }

    Err(RestError::UserNotFound {
        query: identifier.to_string(),
        suggestion: "use the users.list tool to browse available names/emails".to_string(),
    })
}

/// Among `matches`, resolve a single winner or raise [`RestError::AmbiguousUser`]
/// when multiple are within [`AMBIGUITY_MARGIN`] of the top score. Returns
/// `Ok(None)` when `matches` is empty so the caller can fall through to the
/// next tier.
fn pick_unambiguous(
    matches: &[&ZulipUser],
    query: &str,
    score_of: impl Fn(&ZulipUser) -> f64,
) -> Result<Option<ResolvedUser>> {
    if matches.is_empty() {
        return Ok(None);
    }
    let mut scored: Vec<(f64, &ZulipUser)> = matches.iter().map(|u| (score_of(u), *u)).collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
    let top_score = scored[0].0;
    let tied: Vec<&&ZulipUser> = scored.iter().filter(|(s, _)| top_score - s <= AMBIGUITY_MARGIN).map(|(_, u)| u).collect();
    if tied.len() > 1 {
        let candidates = scored
            .iter()
            .take(MAX_CANDIDATES)
            .map(|(score, u)| UserCandidate { email: u.email.clone(), full_name: u.full_name.clone(), score: *score })
            .collect();
        return Err(RestError::AmbiguousUser { query: query.to_string(), candidates });
    }
    let winner = scored[0].1;
    Ok(Some(ResolvedUser { email: winner.email.clone(), full_name: winner.full_name.clone() }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> Vec<ZulipUser> {
        vec![
            ZulipUser { email: "alice@example.com".into(), full_name: "Alice Anderson".into() },
            ZulipUser { email: "al@example.com".into(), full_name: "Al Smith".into() },
            ZulipUser { email: "bob@example.com".into(), full_name: "Bob Jones".into() },
        ]
    }

    #[test]
    fn email_identifier_requires_exact_match() {
        let resolved = resolve("alice@example.com", &users()).unwrap();
        assert_eq!(resolved.full_name, "Alice Anderson");
    }

    #[test]
    fn unknown_email_is_not_found() {
        let err = resolve("nope@example.com", &users()).unwrap_err();
        assert!(matches!(err, RestError::UserNotFound { .. }));
    }

    #[test]
    fn exact_full_name_match_wins() {
        let resolved = resolve("Bob Jones", &users()).unwrap();
        assert_eq!(resolved.email, "bob@example.com");
    }

    #[test]
    fn substring_match_is_case_insensitive() {
        let resolved = resolve("anderson", &users()).unwrap();
        assert_eq!(resolved.email, "alice@example.com");
    }

    #[test]
    fn ambiguous_substring_raises_with_candidates() {
        let err = resolve("al", &users()).unwrap_err();
        match err {
            RestError::AmbiguousUser { candidates, .. } => assert_eq!(candidates.len(), 2),
            other => panic!("expected AmbiguousUser, got {other:?}"),
        }
    }

    #[test]
    fn no_match_at_all_is_not_found() {
        let err = resolve("zzz_nomatch_zzz", &users()).unwrap_err();
        assert!(matches!(err, RestError::UserNotFound { .. }));
    }
}
