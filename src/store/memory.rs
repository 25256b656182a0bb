use chrono::Utc;
use itertools::Itertools;
use parking_lot::RwLock;
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::logic::{
    self, expand_layout, EuidAllocator, FilterExpr, LAYOUT_CHUNK_SIZE,
};
use crate::model::{
    new_internal_ref, ActorContext, AuditOperation, AuditRow, Euid, Instance, InternalRef,
    LineageEdge, NewEdge, NewInstance, PropertyDiff, RelationshipType, Template,
    TemplateDefinition, TemplateDocument, TemplateKey,
};
use crate::store::traits::{
    AuditLog, InstanceSelector, InstanceStore, LineageStore, RegistryPolicy, Store,
    TemplateRegistry,
};

/// Registered prefix for lineage-edge EUIDs.
const EDGE_EUID_PREFIX: &str = "LN";

/// The three logical tables plus the append-only audit log. A write
/// transaction is one exclusive critical section over this struct, so
/// a mutation and its audit rows commit together or not at all, and
/// the cycle check is serialized against every other lineage writer.
#[derive(Debug, Default)]
struct Tables {
    /// Keyed by template code; rows are never removed.
    templates: HashMap<String, Template>,
    instances: HashMap<InternalRef, Instance>,
    instances_by_euid: HashMap<Euid, InternalRef>,
    edges: Vec<LineageEdge>,
    audit: Vec<AuditRow>,
    audit_sequence: u64,
}

impl Tables {
    fn record(
        &mut self,
        entity: &Euid,
        column: &str,
        old_value: Option<serde_json::Value>,
        new_value: Option<serde_json::Value>,
        actor: &ActorContext,
        operation: AuditOperation,
    ) {
        self.audit_sequence += 1;
        self.audit.push(AuditRow {
            sequence: self.audit_sequence,
            entity: entity.clone(),
            column: column.to_string(),
            old_value,
            new_value,
            actor: actor.actor_id.clone(),
            operation,
            recorded_at: Utc::now(),
        });
    }

    fn instance_ref(&self, euid: &Euid) -> CoreResult<InternalRef> {
        self.instances_by_euid
            .get(euid)
            .copied()
            .ok_or_else(|| CoreError::InstanceNotFound { euid: euid.clone() })
    }

    /// Point lookup by EUID; soft-deleted rows are excluded unless
    /// explicitly requested.
    fn instance(&self, euid: &Euid, include_deleted: bool) -> CoreResult<&Instance> {
        let internal = self.instance_ref(euid)?;
        let instance = &self.instances[&internal];
        if instance.is_deleted && !include_deleted {
            return Err(CoreError::InstanceNotFound { euid: euid.clone() });
        }
        Ok(instance)
    }

    fn template_by_internal(&self, internal: InternalRef) -> Option<&Template> {
        self.templates.values().find(|t| t.internal == internal)
    }
}

/// In-memory store holding the polymorphic object tables and lineage
/// graph. All trait operations are backed by one `RwLock`; nothing in
/// here blocks on external I/O.
pub struct MemoryStore {
    tables: RwLock<Tables>,
    allocator: EuidAllocator,
    policy: RegistryPolicy,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_policy(RegistryPolicy::default())
    }

    pub fn with_policy(policy: RegistryPolicy) -> Self {
        let allocator = EuidAllocator::new();
        // the edge prefix is owned by the store itself
        allocator
            .register_prefix(EDGE_EUID_PREFIX, 1)
            .unwrap_or_else(|e| unreachable!("static edge prefix is valid: {e}"));
        Self {
            tables: RwLock::new(Tables::default()),
            allocator,
            policy,
        }
    }

    /// Register an extra EUID prefix outside template registration,
    /// e.g. from configuration.
    pub fn register_prefix(&self, prefix: &str, start: u64) -> CoreResult<()> {
        self.allocator.register_prefix(prefix, start)
    }

    fn register_template_locked(
        &self,
        tables: &mut Tables,
        name: &str,
        version: &str,
        definition: TemplateDefinition,
        actor: &ActorContext,
    ) -> CoreResult<Template> {
        actor.require()?;
        let key = definition.key(version);
        let code = key.code();

        if let Some(existing) = tables.templates.get(&code) {
            // idempotent configuration load
            if existing.same_definition(&definition) {
                return Ok(existing.clone());
            }
            if existing.is_singleton {
                return Err(CoreError::SingletonViolation { code });
            }
            match self.policy {
                RegistryPolicy::Reject => return Err(CoreError::TemplateExists { code }),
                RegistryPolicy::Replace => {}
                RegistryPolicy::NewVersion => {
                    let bumped = bump_minor_version(tables, &key)?;
                    return self.register_template_locked(
                        tables,
                        name,
                        &bumped,
                        definition,
                        actor,
                    );
                }
            }
        }

        self.allocator.register_prefix(&definition.id_prefix, 1)?;
        let internal = tables
            .templates
            .get(&code)
            .map(|t| t.internal)
            .unwrap_or_else(new_internal_ref);
        let template = Template {
            internal,
            name: name.to_string(),
            key,
            is_singleton: definition.is_singleton,
            id_prefix: definition.id_prefix,
            properties: definition.properties,
            instantiation_layouts: definition.instantiation_layouts,
            action_groups: definition.action_groups,
            actions: definition.actions,
            created_by: actor.actor_id.clone(),
            created_at: Utc::now(),
        };
        log::info!("registered template {}", template.code());
        tables.templates.insert(code, template.clone());
        Ok(template)
    }

    fn create_instance_locked(
        &self,
        tables: &mut Tables,
        new: NewInstance,
        actor: &ActorContext,
    ) -> CoreResult<Instance> {
        actor.require()?;
        if new.euid.is_some() {
            return Err(CoreError::InvalidEuidAssignment);
        }
        let key = TemplateKey::parse_code(&new.template)?;
        let template = tables
            .templates
            .get(&key.code())
            .ok_or_else(|| CoreError::TemplateNotFound { code: key.code() })?
            .clone();

        // template defaults, overridden by the supplied initial values
        let mut properties = template.properties.clone();
        properties.extend(new.properties);

        let euid = self.allocator.next(&template.id_prefix)?;
        let now = Utc::now();
        let instance = Instance {
            internal: new_internal_ref(),
            euid: euid.clone(),
            discriminator: template.key.discriminator(),
            template: template.internal,
            template_code: template.code(),
            status: new.status.unwrap_or_else(|| "active".to_string()),
            properties,
            is_deleted: false,
            created_by: actor.actor_id.clone(),
            created_at: now,
            updated_by: actor.actor_id.clone(),
            updated_at: now,
        };

        tables.record(
            &euid,
            "euid",
            None,
            Some(serde_json::Value::String(euid.to_string())),
            actor,
            AuditOperation::Insert,
        );
        for (column, value) in instance.properties.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            tables.record(
                &euid,
                column,
                None,
                Some(value.clone()),
                actor,
                AuditOperation::Insert,
            );
        }

        tables
            .instances_by_euid
            .insert(euid, instance.internal);
        tables.instances.insert(instance.internal, instance.clone());
        Ok(instance)
    }

    fn add_edge_locked(
        &self,
        tables: &mut Tables,
        parent: &Euid,
        child: &Euid,
        relationship_type: RelationshipType,
        actor: &ActorContext,
    ) -> CoreResult<LineageEdge> {
        actor.require()?;
        let parent_instance = tables.instance(parent, false)?.clone();
        let child_instance = tables.instance(child, false)?.clone();

        // authoritative check, serialized with the insert by the
        // exclusive guard over the tables
        if logic::would_create_cycle(&tables.edges, parent_instance.internal, child_instance.internal)
        {
            return Err(CoreError::CycleDetected {
                parent: parent.clone(),
                child: child.clone(),
            });
        }

        let euid = self.allocator.next(EDGE_EUID_PREFIX)?;
        let edge = LineageEdge {
            internal: new_internal_ref(),
            euid: euid.clone(),
            parent: parent_instance.internal,
            parent_euid: parent_instance.euid.clone(),
            child: child_instance.internal,
            child_euid: child_instance.euid.clone(),
            relationship_type,
            is_deleted: false,
            created_by: actor.actor_id.clone(),
            created_at: Utc::now(),
        };
        tables.record(
            &euid,
            "edge",
            None,
            Some(serde_json::json!({
                "parent": edge.parent_euid,
                "child": edge.child_euid,
                "relationship_type": edge.relationship_type,
            })),
            actor,
            AuditOperation::Insert,
        );
        tables.edges.push(edge.clone());
        Ok(edge)
    }

    fn traversal(
        &self,
        euid: &Euid,
        relationship_type: Option<RelationshipType>,
        max_depth: Option<usize>,
        upward: bool,
    ) -> CoreResult<Vec<Instance>> {
        let tables = self.tables.read();
        // traversal works from any existing row, deleted or not; the
        // edge set decides what is reachable
        let start = tables.instance(euid, true)?.internal;
        let reached = if upward {
            logic::ancestors(&tables.edges, start, relationship_type, max_depth)
        } else {
            logic::descendants(&tables.edges, start, relationship_type, max_depth)
        };
        Ok(reached
            .into_iter()
            .filter_map(|internal| tables.instances.get(&internal).cloned())
            .sorted_by(|a, b| a.euid.as_str().cmp(b.euid.as_str()))
            .collect())
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Find the next unused MAJOR.MINOR under the `new-version` policy.
fn bump_minor_version(tables: &Tables, key: &TemplateKey) -> CoreResult<String> {
    let (major, minor) = key
        .version
        .split_once('.')
        .and_then(|(maj, min)| Some((maj.parse::<u32>().ok()?, min.parse::<u32>().ok()?)))
        .ok_or_else(|| CoreError::InvalidTemplateDefinition {
            reason: format!("version {:?} is not MAJOR.MINOR", key.version),
        })?;
    let mut minor = minor + 1;
    loop {
        let candidate = TemplateKey::new(
            key.category.clone(),
            key.template_type.clone(),
            key.subtype.clone(),
            format!("{major}.{minor}"),
        );
        if !tables.templates.contains_key(&candidate.code()) {
            return Ok(candidate.version);
        }
        minor += 1;
    }
}

#[async_trait::async_trait]
impl TemplateRegistry for MemoryStore {
    async fn register_template(
        &self,
        name: &str,
        version: &str,
        definition: TemplateDefinition,
        actor: &ActorContext,
    ) -> CoreResult<Template> {
        let mut tables = self.tables.write();
        self.register_template_locked(&mut tables, name, version, definition, actor)
    }

    async fn register_document(
        &self,
        document: TemplateDocument,
        actor: &ActorContext,
    ) -> CoreResult<Vec<Template>> {
        let mut tables = self.tables.write();
        let mut registered = Vec::new();
        for (name, version, definition) in document.entries() {
            registered.push(self.register_template_locked(
                &mut tables,
                &name,
                &version,
                definition,
                actor,
            )?);
        }
        Ok(registered)
    }

    async fn resolve_template(&self, key: &TemplateKey) -> CoreResult<Template> {
        self.tables
            .read()
            .templates
            .get(&key.code())
            .cloned()
            .ok_or_else(|| CoreError::TemplateNotFound { code: key.code() })
    }

    async fn list_templates(&self) -> CoreResult<Vec<Template>> {
        Ok(self
            .tables
            .read()
            .templates
            .values()
            .cloned()
            .sorted_by(|a, b| a.code().cmp(&b.code()))
            .collect())
    }

    async fn is_singleton_violation(&self, key: &TemplateKey) -> CoreResult<bool> {
        Ok(self
            .tables
            .read()
            .templates
            .get(&key.code())
            .is_some_and(|t| t.is_singleton))
    }
}

#[async_trait::async_trait]
impl InstanceStore for MemoryStore {
    async fn create_instance(
        &self,
        new: NewInstance,
        actor: &ActorContext,
    ) -> CoreResult<Instance> {
        let mut tables = self.tables.write();
        self.create_instance_locked(&mut tables, new, actor)
    }

    async fn get_instance(&self, euid: &Euid, include_deleted: bool) -> CoreResult<Instance> {
        Ok(self.tables.read().instance(euid, include_deleted)?.clone())
    }

    async fn update_properties(
        &self,
        euid: &Euid,
        diff: PropertyDiff,
        actor: &ActorContext,
    ) -> CoreResult<Instance> {
        actor.require()?;
        let mut tables = self.tables.write();
        let internal = tables.instance_ref(euid)?;
        let current = &tables.instances[&internal];
        if current.is_deleted {
            // soft-deleted rows are immutable except for undelete
            return Err(CoreError::InstanceAlreadyDeleted { euid: euid.clone() });
        }
        let (merged, changes) = diff.merge_over(&current.properties);
        for change in &changes {
            tables.record(
                euid,
                &change.key,
                change.old.clone(),
                change.new.clone(),
                actor,
                AuditOperation::Update,
            );
        }
        let instance = tables
            .instances
            .get_mut(&internal)
            .unwrap_or_else(|| unreachable!("resolved above"));
        instance.replace_properties(merged, &actor.actor_id);
        Ok(instance.clone())
    }

    async fn soft_delete_instance(
        &self,
        euid: &Euid,
        actor: &ActorContext,
    ) -> CoreResult<Instance> {
        actor.require()?;
        let mut tables = self.tables.write();
        let internal = tables.instance_ref(euid)?;
        if tables.instances[&internal].is_deleted {
            return Err(CoreError::InstanceAlreadyDeleted { euid: euid.clone() });
        }
        tables.record(
            euid,
            "is_deleted",
            Some(serde_json::Value::Bool(false)),
            Some(serde_json::Value::Bool(true)),
            actor,
            AuditOperation::SoftDelete,
        );
        let instance = tables
            .instances
            .get_mut(&internal)
            .unwrap_or_else(|| unreachable!("resolved above"));
        instance.is_deleted = true;
        instance.updated_by = actor.actor_id.clone();
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }

    async fn undelete_instance(&self, euid: &Euid, actor: &ActorContext) -> CoreResult<Instance> {
        actor.require()?;
        let mut tables = self.tables.write();
        let internal = tables.instance_ref(euid)?;
        if !tables.instances[&internal].is_deleted {
            // undeleting a live row is a no-op
            return Ok(tables.instances[&internal].clone());
        }
        tables.record(
            euid,
            "is_deleted",
            Some(serde_json::Value::Bool(true)),
            Some(serde_json::Value::Bool(false)),
            actor,
            AuditOperation::Update,
        );
        let instance = tables
            .instances
            .get_mut(&internal)
            .unwrap_or_else(|| unreachable!("resolved above"));
        instance.is_deleted = false;
        instance.updated_by = actor.actor_id.clone();
        instance.updated_at = Utc::now();
        Ok(instance.clone())
    }

    async fn instantiate_layout(
        &self,
        parent: &Euid,
        layout_name: &str,
        actor: &ActorContext,
    ) -> CoreResult<Vec<Instance>> {
        actor.require()?;
        let (parent_euid, layout) = {
            let tables = self.tables.read();
            let parent_instance = tables.instance(parent, false)?;
            let template = tables
                .template_by_internal(parent_instance.template)
                .ok_or_else(|| CoreError::TemplateNotFound {
                    code: parent_instance.template_code.clone(),
                })?;
            let layout = template.layout(layout_name).cloned().ok_or_else(|| {
                CoreError::Configuration {
                    message: format!(
                        "template {} has no instantiation layout {:?}",
                        template.code(),
                        layout_name
                    ),
                }
            })?;
            // fail before creating anything if the child template is missing
            let target_key = TemplateKey::parse_code(&layout.target)?;
            if !tables.templates.contains_key(&target_key.code()) {
                return Err(CoreError::TemplateNotFound {
                    code: target_key.code(),
                });
            }
            (parent_instance.euid.clone(), layout)
        };

        let inputs = expand_layout(&layout, &parent_euid);
        let mut created: Vec<Instance> = Vec::with_capacity(inputs.len());
        for chunk in inputs.chunks(LAYOUT_CHUNK_SIZE) {
            // one transaction per chunk: earlier chunks stay committed,
            // a failed chunk unwinds entirely (no child without its edge)
            let mut tables = self.tables.write();
            let audit_mark = tables.audit.len();
            let sequence_mark = tables.audit_sequence;
            let edges_mark = tables.edges.len();
            let chunk_start = created.len();
            let mut chunk_children = Vec::with_capacity(chunk.len());
            let mut failure = None;

            for new in chunk {
                let child = match self.create_instance_locked(&mut tables, new.clone(), actor) {
                    Ok(child) => child,
                    Err(cause) => {
                        failure = Some(cause);
                        break;
                    }
                };
                chunk_children.push((child.internal, child.euid.clone()));
                if let Err(cause) = self.add_edge_locked(
                    &mut tables,
                    &parent_euid,
                    &child.euid,
                    layout.relationship_type,
                    actor,
                ) {
                    failure = Some(cause);
                    break;
                }
                created.push(child);
            }

            if let Some(cause) = failure {
                for (internal, euid) in chunk_children {
                    tables.instances.remove(&internal);
                    tables.instances_by_euid.remove(&euid);
                }
                tables.edges.truncate(edges_mark);
                tables.audit.truncate(audit_mark);
                tables.audit_sequence = sequence_mark;
                created.truncate(chunk_start);
                // surface what the completed chunks committed
                return Err(CoreError::LayoutInterrupted {
                    created: created.into_iter().map(|c| c.euid).collect(),
                    cause: Box::new(cause),
                });
            }
            log::debug!(
                "layout {}: {}/{} children created",
                layout.name,
                created.len(),
                inputs.len()
            );
        }
        Ok(created)
    }

    async fn list_instances(&self, selector: InstanceSelector) -> CoreResult<Vec<Instance>> {
        let tables = self.tables.read();
        let matches = |instance: &Instance| -> bool {
            if instance.is_deleted && !selector.include_deleted {
                return false;
            }
            if let Some(disc) = &selector.discriminator {
                if &instance.discriminator != disc {
                    return false;
                }
            }
            if selector.category.is_some()
                || selector.template_type.is_some()
                || selector.subtype.is_some()
            {
                let Ok(key) = TemplateKey::parse_code(&instance.template_code) else {
                    return false;
                };
                if selector.category.as_ref().is_some_and(|c| c != &key.category) {
                    return false;
                }
                if selector
                    .template_type
                    .as_ref()
                    .is_some_and(|t| t != &key.template_type)
                {
                    return false;
                }
                if selector.subtype.as_ref().is_some_and(|s| s != &key.subtype) {
                    return false;
                }
            }
            true
        };
        Ok(tables
            .instances
            .values()
            .filter(|i| matches(i))
            .cloned()
            .sorted_by(|a, b| a.euid.as_str().cmp(b.euid.as_str()))
            .collect())
    }

    async fn query_instances(
        &self,
        filter: &FilterExpr,
        include_deleted: bool,
    ) -> CoreResult<Vec<Instance>> {
        let candidates = self
            .list_instances(InstanceSelector {
                include_deleted,
                ..InstanceSelector::default()
            })
            .await?;
        Ok(logic::filter_instances(candidates, filter))
    }
}

#[async_trait::async_trait]
impl LineageStore for MemoryStore {
    async fn would_create_cycle(&self, parent: &Euid, child: &Euid) -> CoreResult<bool> {
        let tables = self.tables.read();
        let parent_internal = tables.instance(parent, false)?.internal;
        let child_internal = tables.instance(child, false)?.internal;
        Ok(logic::would_create_cycle(
            &tables.edges,
            parent_internal,
            child_internal,
        ))
    }

    async fn add_edge(&self, new: NewEdge, actor: &ActorContext) -> CoreResult<LineageEdge> {
        let parent = Euid::parse(&new.parent)?;
        let child = Euid::parse(&new.child)?;
        let mut tables = self.tables.write();
        self.add_edge_locked(&mut tables, &parent, &child, new.relationship_type, actor)
    }

    async fn remove_edge(&self, euid: &Euid, actor: &ActorContext) -> CoreResult<LineageEdge> {
        actor.require()?;
        let mut tables = self.tables.write();
        let index = tables
            .edges
            .iter()
            .position(|e| &e.euid == euid && !e.is_deleted)
            .ok_or_else(|| CoreError::EdgeNotFound { euid: euid.clone() })?;
        tables.record(
            euid,
            "is_deleted",
            Some(serde_json::Value::Bool(false)),
            Some(serde_json::Value::Bool(true)),
            actor,
            AuditOperation::SoftDelete,
        );
        // removal cannot reintroduce a cycle, so no check is needed
        tables.edges[index].is_deleted = true;
        Ok(tables.edges[index].clone())
    }

    async fn get_edge(&self, euid: &Euid, include_deleted: bool) -> CoreResult<LineageEdge> {
        self.tables
            .read()
            .edges
            .iter()
            .find(|e| &e.euid == euid && (include_deleted || !e.is_deleted))
            .cloned()
            .ok_or_else(|| CoreError::EdgeNotFound { euid: euid.clone() })
    }

    async fn ancestors(
        &self,
        euid: &Euid,
        relationship_type: Option<RelationshipType>,
        max_depth: Option<usize>,
    ) -> CoreResult<Vec<Instance>> {
        self.traversal(euid, relationship_type, max_depth, true)
    }

    async fn descendants(
        &self,
        euid: &Euid,
        relationship_type: Option<RelationshipType>,
        max_depth: Option<usize>,
    ) -> CoreResult<Vec<Instance>> {
        self.traversal(euid, relationship_type, max_depth, false)
    }
}

#[async_trait::async_trait]
impl AuditLog for MemoryStore {
    async fn history(&self, entity: &Euid) -> CoreResult<Vec<AuditRow>> {
        Ok(self
            .tables
            .read()
            .audit
            .iter()
            .filter(|row| &row.entity == entity)
            .cloned()
            .sorted_by_key(|row| (row.recorded_at, row.sequence))
            .collect())
    }
}

impl Store for MemoryStore {}
