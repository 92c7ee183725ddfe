//! Note domain model.
//!
//! # Invariants
//! - `id` is generated by storage on insert and never reused after deletion.
//! - `(pattern, match_type)` is unique across stored notes; the repository
//!   enforces it before every write.
//! - `created_at` never changes after the first save.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

/// Storage-generated note key.
pub type NoteId = i64;

/// Comparison strategy between a sender address and a note pattern.
///
/// Declaration order is match priority: earlier variants shadow later ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    Exact,
    StartsWith,
    EndsWith,
    Contains,
}

impl MatchType {
    /// All match types, highest priority first.
    pub const BY_PRIORITY: [MatchType; 4] = [
        MatchType::Exact,
        MatchType::StartsWith,
        MatchType::EndsWith,
        MatchType::Contains,
    ];

    /// Priority bucket, `0` being the strongest.
    pub fn priority(self) -> u8 {
        match self {
            Self::Exact => 0,
            Self::StartsWith => 1,
            Self::EndsWith => 2,
            Self::Contains => 3,
        }
    }

    /// Stable storage/wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::StartsWith => "startsWith",
            Self::EndsWith => "endsWith",
            Self::Contains => "contains",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "exact" => Some(Self::Exact),
            "startsWith" => Some(Self::StartsWith),
            "endsWith" => Some(Self::EndsWith),
            "contains" => Some(Self::Contains),
            _ => None,
        }
    }

    /// Lexical test on already-lowercased inputs.
    pub fn matches(self, email_lower: &str, pattern_lower: &str) -> bool {
        match self {
            Self::Exact => email_lower == pattern_lower,
            Self::StartsWith => email_lower.starts_with(pattern_lower),
            Self::EndsWith => email_lower.ends_with(pattern_lower),
            Self::Contains => email_lower.contains(pattern_lower),
        }
    }
}

impl Display for MatchType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted annotation bound to one `(pattern, match_type)` trigger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: NoteId,
    /// Always lowercase.
    pub pattern: String,
    pub match_type: MatchType,
    pub note: String,
    /// Sender address the note was first written for. Display hint only.
    #[serde(default)]
    pub original_email: String,
    /// ISO-8601, UTC.
    pub created_at: String,
    /// ISO-8601, UTC.
    pub updated_at: String,
}

/// Fully-resolved note row handed to the adapter.
///
/// `id == None` inserts with a fresh key; `Some(id)` overwrites that row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteDraft {
    pub id: Option<NoteId>,
    pub pattern: String,
    pub match_type: MatchType,
    pub note: String,
    pub original_email: String,
    pub created_at: String,
    pub updated_at: String,
}

impl NoteDraft {
    /// Binds the draft to its storage key.
    pub fn into_note(self, id: NoteId) -> Note {
        Note {
            id,
            pattern: self.pattern,
            match_type: self.match_type,
            note: self.note,
            original_email: self.original_email,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

impl From<Note> for NoteDraft {
    fn from(value: Note) -> Self {
        Self {
            id: Some(value.id),
            pattern: value.pattern,
            match_type: value.match_type,
            note: value.note,
            original_email: value.original_email,
            created_at: value.created_at,
            updated_at: value.updated_at,
        }
    }
}

/// Caller input for a note save. Timestamps are never caller-controlled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveNoteInput {
    #[serde(default)]
    pub id: Option<NoteId>,
    pub pattern: String,
    pub match_type: MatchType,
    pub note: String,
    #[serde(default)]
    pub original_email: Option<String>,
}

impl SaveNoteInput {
    /// Input for a brand-new note.
    pub fn new(pattern: impl Into<String>, match_type: MatchType, note: impl Into<String>) -> Self {
        Self {
            id: None,
            pattern: pattern.into(),
            match_type,
            note: note.into(),
            original_email: None,
        }
    }

    pub fn with_id(mut self, id: NoteId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn with_original_email(mut self, email: impl Into<String>) -> Self {
        self.original_email = Some(email.into());
        self
    }
}
