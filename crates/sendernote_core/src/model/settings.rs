//! Settings and migration bookkeeping records.

use serde::{Deserialize, Serialize};

/// Flat key/value settings map persisted as one record.
pub type Settings = serde_json::Map<String, serde_json::Value>;

/// Key of the single settings record.
pub const SETTINGS_RECORD_ID: &str = "default";

/// One completed data migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub id: String,
    pub applied_at: String,
}
