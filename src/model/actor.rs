use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Actor identity threaded through every write-path call for the audit
/// trail. There is no ambient "current user"; writes without an actor
/// are rejected with `MissingActor`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorContext {
    pub actor_id: String,
    pub email: Option<String>,
    pub name: Option<String>,
}

impl ActorContext {
    pub fn new(actor_id: impl Into<String>) -> Self {
        Self {
            actor_id: actor_id.into(),
            email: None,
            name: None,
        }
    }

    pub fn with_details(actor_id: String, email: Option<String>, name: Option<String>) -> Self {
        Self {
            actor_id,
            email,
            name,
        }
    }

    /// Actor for internal operations such as seed loading.
    pub fn system() -> Self {
        Self {
            actor_id: "system".to_string(),
            email: None,
            name: Some("System".to_string()),
        }
    }

    /// Attribution is mandatory on the write path.
    pub fn require(&self) -> Result<(), CoreError> {
        if self.actor_id.trim().is_empty() {
            Err(CoreError::MissingActor)
        } else {
            Ok(())
        }
    }
}
