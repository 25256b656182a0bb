use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{Euid, InternalRef, RelationshipType};

/// Directed, typed relationship between two instances (parent -> child).
/// The set of all non-deleted edges forms a DAG; acyclicity is enforced
/// at insertion time by the lineage engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineageEdge {
    pub internal: InternalRef,
    /// Edges carry their own EUID (dedicated prefix).
    pub euid: Euid,
    pub parent: InternalRef,
    pub parent_euid: Euid,
    pub child: InternalRef,
    pub child_euid: Euid,
    pub relationship_type: RelationshipType,
    pub is_deleted: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Input model for edge creation; endpoints are named by EUID.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewEdge {
    pub parent: String,
    pub child: String,
    pub relationship_type: RelationshipType,
}
