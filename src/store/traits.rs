use serde::{Deserialize, Serialize};

use crate::error::CoreResult;
use crate::logic::FilterExpr;
use crate::model::{
    ActorContext, AuditRow, Euid, Instance, LineageEdge, NewEdge, NewInstance, PropertyDiff,
    RelationshipType, Template, TemplateDefinition, TemplateDocument, TemplateKey,
};

/// Policy for re-registering a template under an existing identity key
/// with *different* content. Identical content is always a no-op.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryPolicy {
    /// Reject the conflicting registration (default).
    #[default]
    Reject,
    /// Replace the stored definition in place.
    Replace,
    /// Register the new content under an auto-bumped MINOR version.
    NewVersion,
}

/// Structured selector for instance listing, matched against row
/// metadata rather than the property bag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InstanceSelector {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub template_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discriminator: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[async_trait::async_trait]
pub trait TemplateRegistry: Send + Sync {
    /// Register one named, versioned definition. Idempotent for
    /// identical content; conflicts follow the configured policy.
    async fn register_template(
        &self,
        name: &str,
        version: &str,
        definition: TemplateDefinition,
        actor: &ActorContext,
    ) -> CoreResult<Template>;

    /// Load a whole template document (configuration load path).
    async fn register_document(
        &self,
        document: TemplateDocument,
        actor: &ActorContext,
    ) -> CoreResult<Vec<Template>>;

    async fn resolve_template(&self, key: &TemplateKey) -> CoreResult<Template>;
    async fn list_templates(&self) -> CoreResult<Vec<Template>>;
    async fn is_singleton_violation(&self, key: &TemplateKey) -> CoreResult<bool>;
}

#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    /// Materialize an instance from its template: assigns the EUID,
    /// applies template default properties under the supplied initial
    /// properties, and emits insert audit rows, all atomically.
    async fn create_instance(
        &self,
        new: NewInstance,
        actor: &ActorContext,
    ) -> CoreResult<Instance>;

    async fn get_instance(&self, euid: &Euid, include_deleted: bool) -> CoreResult<Instance>;

    /// Partial property-bag update; the merged map replaces the bag
    /// wholesale and one update audit row is emitted per changed key.
    async fn update_properties(
        &self,
        euid: &Euid,
        diff: PropertyDiff,
        actor: &ActorContext,
    ) -> CoreResult<Instance>;

    async fn soft_delete_instance(&self, euid: &Euid, actor: &ActorContext)
        -> CoreResult<Instance>;
    async fn undelete_instance(&self, euid: &Euid, actor: &ActorContext) -> CoreResult<Instance>;

    /// Run one named instantiation layout of the parent's template,
    /// creating children and linking edges in chunks of 100.
    async fn instantiate_layout(
        &self,
        parent: &Euid,
        layout_name: &str,
        actor: &ActorContext,
    ) -> CoreResult<Vec<Instance>>;

    async fn list_instances(&self, selector: InstanceSelector) -> CoreResult<Vec<Instance>>;

    /// Structured read-only query over property bags.
    async fn query_instances(
        &self,
        filter: &FilterExpr,
        include_deleted: bool,
    ) -> CoreResult<Vec<Instance>>;
}

#[async_trait::async_trait]
pub trait LineageStore: Send + Sync {
    /// Advisory check against the committed graph. The authoritative
    /// check runs inside `add_edge`'s own transaction.
    async fn would_create_cycle(&self, parent: &Euid, child: &Euid) -> CoreResult<bool>;

    async fn add_edge(&self, new: NewEdge, actor: &ActorContext) -> CoreResult<LineageEdge>;
    async fn remove_edge(&self, euid: &Euid, actor: &ActorContext) -> CoreResult<LineageEdge>;
    async fn get_edge(&self, euid: &Euid, include_deleted: bool) -> CoreResult<LineageEdge>;

    async fn ancestors(
        &self,
        euid: &Euid,
        relationship_type: Option<RelationshipType>,
        max_depth: Option<usize>,
    ) -> CoreResult<Vec<Instance>>;
    async fn descendants(
        &self,
        euid: &Euid,
        relationship_type: Option<RelationshipType>,
        max_depth: Option<usize>,
    ) -> CoreResult<Vec<Instance>>;
}

#[async_trait::async_trait]
pub trait AuditLog: Send + Sync {
    /// Full mutation history of one entity, ordered by timestamp then
    /// sequence ascending. Read-only; there is no way to alter rows.
    async fn history(&self, entity: &Euid) -> CoreResult<Vec<AuditRow>>;
}

pub trait Store: TemplateRegistry + InstanceStore + LineageStore + AuditLog + Send + Sync {}
