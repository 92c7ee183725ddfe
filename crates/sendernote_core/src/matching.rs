//! Pattern matching and priority resolution.
//!
//! # Responsibility
//! - Decide whether a sender address triggers a note pattern.
//! - Order matching notes by match-type priority.
//!
//! # Invariants
//! - Matching is lexical and case-insensitive (lowercase only, no trimming,
//!   no Unicode normalization, no wildcards).
//! - Within one priority bucket the input iteration order is preserved.

use crate::model::note::{MatchType, Note};
use once_cell::sync::Lazy;
use regex::Regex;

static ANGLE_ADDRESS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<([^>]+)>").expect("valid angle address regex"));

/// Canonical stored form of a pattern.
pub fn normalize_pattern(pattern: &str) -> String {
    pattern.to_lowercase()
}

/// Returns whether `email` triggers `pattern` under `match_type`.
pub fn validate_pattern(email: &str, pattern: &str, match_type: MatchType) -> bool {
    match_type.matches(&email.to_lowercase(), &pattern.to_lowercase())
}

/// Keeps the notes triggered by `email`, strongest match type first.
pub fn rank_matches(email: &str, notes: impl IntoIterator<Item = Note>) -> Vec<Note> {
    let email_lower = email.to_lowercase();
    let mut matching: Vec<Note> = notes
        .into_iter()
        .filter(|note| {
            note.match_type
                .matches(&email_lower, &note.pattern.to_lowercase())
        })
        .collect();
    // Stable sort keeps storage order inside each bucket.
    matching.sort_by_key(|note| note.match_type.priority());
    matching
}

/// Extracts the address from an author header such as `Jane <jane@x.com>`.
///
/// Falls back to the whole trimmed header when no `<...>` part exists.
pub fn extract_email(author: &str) -> String {
    match ANGLE_ADDRESS_RE
        .captures(author)
        .and_then(|caps| caps.get(1))
    {
        Some(address) => address.as_str().to_lowercase(),
        None => author.trim().to_lowercase(),
    }
}

#[cfg(test)]
mod tests {
    use super::{extract_email, rank_matches, validate_pattern};
    use crate::model::note::{MatchType, Note};

    fn note(id: i64, pattern: &str, match_type: MatchType) -> Note {
        Note {
            id,
            pattern: pattern.to_string(),
            match_type,
            note: format!("note {id}"),
            original_email: String::new(),
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn exact_is_reflexive_on_lowercased_email() {
        assert!(validate_pattern("Boss@Corp.com", "boss@corp.com", MatchType::Exact));
        assert!(!validate_pattern("boss@corp.com.evil", "boss@corp.com", MatchType::Exact));
    }

    #[test]
    fn positional_match_types_test_substrings() {
        let email = "alerts@billing.example.com";
        assert!(validate_pattern(email, "ALERTS@", MatchType::StartsWith));
        assert!(!validate_pattern(email, "billing", MatchType::StartsWith));
        assert!(validate_pattern(email, "@billing.example.com", MatchType::EndsWith));
        assert!(!validate_pattern(email, "alerts", MatchType::EndsWith));
        assert!(validate_pattern(email, "billing", MatchType::Contains));
        assert!(!validate_pattern(email, "shipping", MatchType::Contains));
    }

    #[test]
    fn matching_is_purely_lexical() {
        assert!(!validate_pattern("a@x.com", "*@x.com", MatchType::EndsWith));
        assert!(!validate_pattern("a@x.com", " a@x.com", MatchType::Exact));
    }

    #[test]
    fn rank_orders_by_bucket_and_keeps_storage_order() {
        let ranked = rank_matches(
            "a@x.com",
            vec![
                note(1, "x.com", MatchType::Contains),
                note(2, "a@", MatchType::StartsWith),
                note(3, "@x", MatchType::Contains),
                note(4, "a@x.com", MatchType::Exact),
                note(5, "b@", MatchType::StartsWith),
            ],
        );
        let ids: Vec<i64> = ranked.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![4, 2, 1, 3]);
    }

    #[test]
    fn extract_email_reads_angle_brackets_or_falls_back() {
        assert_eq!(extract_email("Jane Doe <Jane@Example.COM>"), "jane@example.com");
        assert_eq!(extract_email("  Bob@Example.com "), "bob@example.com");
    }
}
