use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;

use lims_db_rust::{
    ActorContext, AuditLog, AuditOperation, CoreError, Euid, FilterExpr, InstanceSelector,
    InstanceStore, LineageStore, MemoryStore, NewEdge, NewInstance, PropertyDiff,
    RelationshipType, TemplateDefinition, TemplateKey, TemplateRegistry,
};

fn actor() -> ActorContext {
    ActorContext::new("tech-17")
}

fn plate_definition(singleton: bool) -> TemplateDefinition {
    TemplateDefinition {
        category: "container".to_string(),
        template_type: "plate".to_string(),
        subtype: "fixed-plate-96".to_string(),
        is_singleton: singleton,
        id_prefix: "PL".to_string(),
        properties: HashMap::from([("wells".to_string(), json!(96))]),
        instantiation_layouts: Vec::new(),
        action_groups: None,
        actions: None,
    }
}

async fn create_plate(store: &MemoryStore) -> lims_db_rust::Instance {
    store
        .create_instance(
            NewInstance::from_template_code("container/plate/fixed-plate-96/1.0/"),
            &actor(),
        )
        .await
        .unwrap()
}

fn contains(parent: &Euid, child: &Euid) -> NewEdge {
    NewEdge {
        parent: parent.to_string(),
        child: child.to_string(),
        relationship_type: RelationshipType::Contains,
    }
}

/// Singleton constrains the template identity key, not its instances.
#[tokio::test]
async fn singleton_template_allows_many_instances_but_one_registration() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(true), &actor())
        .await
        .unwrap();

    let first = create_plate(&store).await;
    let second = create_plate(&store).await;
    assert_ne!(first.euid, second.euid);

    let mut changed = plate_definition(true);
    changed.properties.insert("wells".to_string(), json!(384));
    let err = store
        .register_template("plate", "1.0", changed, &actor())
        .await
        .unwrap_err();
    assert_eq!(
        err,
        CoreError::SingletonViolation {
            code: "container/plate/fixed-plate-96/1.0/".to_string()
        }
    );
}

#[tokio::test]
async fn closing_a_chain_into_a_cycle_is_rejected_atomically() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();
    let a = create_plate(&store).await;
    let b = create_plate(&store).await;
    let c = create_plate(&store).await;

    store.add_edge(contains(&a.euid, &b.euid), &actor()).await.unwrap();
    store.add_edge(contains(&b.euid, &c.euid), &actor()).await.unwrap();

    assert!(store.would_create_cycle(&c.euid, &a.euid).await.unwrap());
    let err = store
        .add_edge(contains(&c.euid, &a.euid), &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::CycleDetected { .. }));

    // A->B and B->C survive, C->A left no trace
    let down: Vec<String> = store
        .descendants(&a.euid, None, None)
        .await
        .unwrap()
        .into_iter()
        .map(|i| i.euid.to_string())
        .collect();
    assert_eq!(down, vec![b.euid.to_string(), c.euid.to_string()]);
    assert!(store.ancestors(&a.euid, None, None).await.unwrap().is_empty());
}

#[tokio::test]
async fn euid_is_immutable_across_soft_delete_and_undelete() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();
    let instance = create_plate(&store).await;
    let euid = instance.euid.clone();

    store.soft_delete_instance(&euid, &actor()).await.unwrap();
    let deleted = store.get_instance(&euid, true).await.unwrap();
    assert_eq!(deleted.euid, euid);
    assert!(deleted.is_deleted);

    let restored = store.undelete_instance(&euid, &actor()).await.unwrap();
    assert_eq!(restored.euid, euid);
    assert!(!restored.is_deleted);
}

#[tokio::test]
async fn soft_deleted_instances_are_immutable_until_undeleted() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();
    let instance = create_plate(&store).await;
    let diff = PropertyDiff(HashMap::from([("label".to_string(), json!("rack A"))]));

    store
        .soft_delete_instance(&instance.euid, &actor())
        .await
        .unwrap();
    let err = store
        .update_properties(&instance.euid, diff.clone(), &actor())
        .await
        .unwrap_err();
    assert!(matches!(err, CoreError::InstanceAlreadyDeleted { .. }));

    // a second soft delete is also a conflict
    assert!(matches!(
        store.soft_delete_instance(&instance.euid, &actor()).await,
        Err(CoreError::InstanceAlreadyDeleted { .. })
    ));

    store
        .undelete_instance(&instance.euid, &actor())
        .await
        .unwrap();
    let updated = store
        .update_properties(&instance.euid, diff, &actor())
        .await
        .unwrap();
    assert_eq!(updated.properties.get("label"), Some(&json!("rack A")));
}

#[tokio::test]
async fn default_queries_exclude_deleted_but_history_is_retained() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();
    let instance = create_plate(&store).await;

    store
        .soft_delete_instance(&instance.euid, &actor())
        .await
        .unwrap();

    assert!(matches!(
        store.get_instance(&instance.euid, false).await,
        Err(CoreError::InstanceNotFound { .. })
    ));
    assert!(store
        .list_instances(InstanceSelector::default())
        .await
        .unwrap()
        .is_empty());

    let history = store.history(&instance.euid).await.unwrap();
    // insert rows (euid + "wells" default) followed by the soft delete
    assert!(history.len() >= 3);
    assert!(history
        .windows(2)
        .all(|pair| (pair[0].recorded_at, pair[0].sequence)
            <= (pair[1].recorded_at, pair[1].sequence)));
    assert_eq!(
        history.last().unwrap().operation,
        AuditOperation::SoftDelete
    );
}

#[tokio::test]
async fn property_round_trip_reflects_exactly_the_applied_diff() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();

    let created = store
        .create_instance(
            NewInstance::from_template_code("container/plate/fixed-plate-96/1.0/")
                .with_property("label", json!("rack A"))
                .with_property("barcode", json!("BC-0001")),
            &actor(),
        )
        .await
        .unwrap();
    let fetched = store.get_instance(&created.euid, false).await.unwrap();
    assert_eq!(fetched.properties, created.properties);

    let diff = PropertyDiff(HashMap::from([
        ("label".to_string(), json!("rack B")),
        ("barcode".to_string(), serde_json::Value::Null),
    ]));
    store
        .update_properties(&created.euid, diff, &actor())
        .await
        .unwrap();

    let after = store.get_instance(&created.euid, false).await.unwrap();
    assert_eq!(after.properties.get("label"), Some(&json!("rack B")));
    assert!(!after.properties.contains_key("barcode"));
    // untouched keys survive the wholesale replace
    assert_eq!(after.properties.get("wells"), Some(&json!(96)));
}

#[tokio::test]
async fn containment_query_finds_instances_by_partial_property_document() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();

    let hit = store
        .create_instance(
            NewInstance::from_template_code("container/plate/fixed-plate-96/1.0/")
                .with_property("type", json!("x")),
            &actor(),
        )
        .await
        .unwrap();
    store
        .create_instance(
            NewInstance::from_template_code("container/plate/fixed-plate-96/1.0/")
                .with_property("type", json!("y")),
            &actor(),
        )
        .await
        .unwrap();

    let filter: FilterExpr =
        serde_json::from_value(json!({"matches": {"properties": {"type": "x"}}})).unwrap();
    let found = store.query_instances(&filter, false).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].euid, hit.euid);
}

#[tokio::test]
async fn resolve_unknown_template_version_is_not_found() {
    let store = MemoryStore::new();
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();

    let missing = TemplateKey::new("container", "plate", "fixed-plate-96", "2.0");
    assert!(matches!(
        store.resolve_template(&missing).await,
        Err(CoreError::TemplateNotFound { .. })
    ));
    assert!(!store.is_singleton_violation(&missing).await.unwrap());
}

/// Concurrent creators on one template must observe unique, strictly
/// increasing EUIDs.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_creates_never_repeat_an_euid() {
    let store = Arc::new(MemoryStore::new());
    store
        .register_template("plate", "1.0", plate_definition(false), &actor())
        .await
        .unwrap();

    let mut handles = Vec::new();
    for worker in 0..8 {
        let store = Arc::clone(&store);
        handles.push(tokio::spawn(async move {
            let actor = ActorContext::new(format!("worker-{worker}"));
            let mut euids = Vec::new();
            for _ in 0..50 {
                let instance = store
                    .create_instance(
                        NewInstance::from_template_code("container/plate/fixed-plate-96/1.0/"),
                        &actor,
                    )
                    .await
                    .unwrap();
                euids.push(instance.euid.to_string());
            }
            euids
        }));
    }

    let mut all = Vec::new();
    for handle in handles {
        all.extend(handle.await.unwrap());
    }
    let unique: std::collections::HashSet<_> = all.iter().collect();
    assert_eq!(unique.len(), 400);
    assert_eq!(
        store
            .list_instances(InstanceSelector::default())
            .await
            .unwrap()
            .len(),
        400
    );
}

/// Deleting the parent while a large layout runs must never leave a
/// child without its edge: completed chunks survive and are reported
/// through the error, the failed chunk unwinds entirely.
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn layout_interrupted_by_parent_deletion_keeps_whole_chunks_only() {
    use lims_db_rust::{InstantiationLayout, LAYOUT_CHUNK_SIZE};

    let store = Arc::new(MemoryStore::new());
    let mut plate = plate_definition(false);
    plate.instantiation_layouts.push(InstantiationLayout {
        name: "wells".to_string(),
        target: "container/well/standard/1.0/".to_string(),
        count: 1000,
        naming_pattern: "{parent}-W{n}".to_string(),
        relationship_type: RelationshipType::Contains,
    });
    store
        .register_template("plate", "1.0", plate, &actor())
        .await
        .unwrap();
    store
        .register_template(
            "well",
            "1.0",
            TemplateDefinition {
                category: "container".to_string(),
                template_type: "well".to_string(),
                subtype: "standard".to_string(),
                is_singleton: false,
                id_prefix: "WL".to_string(),
                properties: HashMap::new(),
                instantiation_layouts: Vec::new(),
                action_groups: None,
                actions: None,
            },
            &actor(),
        )
        .await
        .unwrap();
    let parent = create_plate(&store).await;

    let worker = {
        let store = Arc::clone(&store);
        let parent = parent.euid.clone();
        tokio::spawn(async move { store.instantiate_layout(&parent, "wells", &actor()).await })
    };
    let deleter = {
        let store = Arc::clone(&store);
        let parent = parent.euid.clone();
        tokio::spawn(async move { store.soft_delete_instance(&parent, &actor()).await })
    };

    let outcome = worker.await.unwrap();
    deleter.await.unwrap().unwrap();

    let committed = match outcome {
        // delete landed after the last chunk
        Ok(children) => {
            assert_eq!(children.len(), 1000);
            children.into_iter().map(|c| c.euid).collect::<Vec<_>>()
        }
        // delete landed between chunks
        Err(CoreError::LayoutInterrupted { created, cause }) => {
            assert_eq!(*cause, CoreError::InstanceNotFound { euid: parent.euid.clone() });
            assert_eq!(created.len() % LAYOUT_CHUNK_SIZE, 0);
            assert!(created.len() < 1000);
            created
        }
        // delete landed before the layout even resolved its parent
        Err(CoreError::InstanceNotFound { euid }) => {
            assert_eq!(euid, parent.euid);
            Vec::new()
        }
        Err(other) => panic!("unexpected layout outcome: {other}"),
    };

    // the live well rows are exactly the reported children
    let wells = store
        .list_instances(InstanceSelector {
            template_type: Some("well".to_string()),
            ..InstanceSelector::default()
        })
        .await
        .unwrap();
    assert_eq!(wells.len(), committed.len());
    let well_euids: std::collections::HashSet<_> =
        wells.iter().map(|w| w.euid.clone()).collect();
    assert!(committed.iter().all(|euid| well_euids.contains(euid)));

    // every committed child is linked: nothing edge-less survives
    let linked = store
        .descendants(&parent.euid, Some(RelationshipType::Contains), None)
        .await
        .unwrap();
    assert_eq!(linked.len(), committed.len());
}
