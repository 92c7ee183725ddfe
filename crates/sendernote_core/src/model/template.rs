//! Template domain model.
//!
//! # Invariants
//! - Reading templates back yields ascending `order`, ties in insertion order.
//! - Synthesized defaults carry `id: None`, `is_default: true` and no timestamps.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Adapter-generated template key.
pub type TemplateId = Uuid;

/// Reusable canned note text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Template {
    pub id: Option<TemplateId>,
    pub text: String,
    pub order: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_default: bool,
}

impl Template {
    /// Read-only placeholder for a provider default not yet persisted.
    pub fn default_entry(text: impl Into<String>, order: i64) -> Self {
        Self {
            id: None,
            text: text.into(),
            order,
            created_at: None,
            updated_at: None,
            is_default: true,
        }
    }
}

/// Addresses the target of a template mutation.
///
/// Serialized as `{"id": "<uuid>"}` or `{"defaultIndex": n}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TemplateKey {
    Id(TemplateId),
    /// Position within the synthesized default list.
    DefaultIndex(usize),
}

impl TemplateKey {
    pub fn is_default(&self) -> bool {
        matches!(self, Self::DefaultIndex(_))
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
