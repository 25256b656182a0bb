use thiserror::Error;

use crate::model::Euid;

/// Typed failure taxonomy surfaced to callers of the core.
///
/// None of these are retried internally; a caller that wants to retry
/// (e.g. try a different cycle-free edge) does so itself.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum CoreError {
    #[error("template not found: {code}")]
    TemplateNotFound { code: String },

    #[error("singleton template already registered: {code}")]
    SingletonViolation { code: String },

    #[error("template already registered with different content: {code}")]
    TemplateExists { code: String },

    #[error("instance not found: {euid}")]
    InstanceNotFound { euid: Euid },

    #[error("instance is soft-deleted and immutable: {euid}")]
    InstanceAlreadyDeleted { euid: Euid },

    #[error("lineage edge not found: {euid}")]
    EdgeNotFound { euid: Euid },

    #[error("edge {parent} -> {child} would create a cycle")]
    CycleDetected { parent: Euid, child: Euid },

    #[error("layout stopped after {} committed children: {cause}", .created.len())]
    LayoutInterrupted {
        /// Children committed by completed chunks before the failure.
        created: Vec<Euid>,
        #[source]
        cause: Box<CoreError>,
    },

    #[error("write operation requires actor attribution")]
    MissingActor,

    #[error("EUIDs are assigned by the store and cannot be supplied by the caller")]
    InvalidEuidAssignment,

    #[error("malformed EUID: {value}")]
    InvalidEuid { value: String },

    #[error("invalid template definition: {reason}")]
    InvalidTemplateDefinition { reason: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },
}

pub type CoreResult<T> = Result<T, CoreError>;
