use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::Euid;

/// Kind of mutation documented by an audit row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Insert,
    Update,
    SoftDelete,
}

/// One row per mutated column per mutation. Audit rows are immutable
/// and append-only; the recorder exposes no update or delete surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRow {
    /// Store-assigned sequence number, monotonic across all entities;
    /// breaks ties between rows sharing a timestamp.
    pub sequence: u64,
    /// EUID of the mutated instance or lineage edge.
    pub entity: Euid,
    pub column: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_value: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_value: Option<serde_json::Value>,
    pub actor: String,
    pub operation: AuditOperation,
    pub recorded_at: DateTime<Utc>,
}
