use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::error::CoreError;
use crate::logic::FilterExpr;
use crate::model::{
    ActorContext, AuditRow, Euid, Instance, LineageEdge, NewEdge, NewInstance, PropertyDiff,
    RelationshipType, Template, TemplateDocument, TemplateKey,
};
use crate::store::traits::{InstanceSelector, Store};

pub type AppState<S> = Arc<S>;

type ApiError = (StatusCode, Json<ErrorResponse>);
type ApiResult<T> = Result<Json<T>, ApiError>;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(items: Vec<T>) -> Self {
        let total = items.len();
        Self { items, total }
    }
}

fn error_status(err: &CoreError) -> StatusCode {
    match err {
        CoreError::TemplateNotFound { .. }
        | CoreError::InstanceNotFound { .. }
        | CoreError::EdgeNotFound { .. } => StatusCode::NOT_FOUND,
        CoreError::SingletonViolation { .. }
        | CoreError::TemplateExists { .. }
        | CoreError::InstanceAlreadyDeleted { .. }
        | CoreError::CycleDetected { .. } => StatusCode::CONFLICT,
        CoreError::MissingActor => StatusCode::UNAUTHORIZED,
        CoreError::InvalidEuidAssignment
        | CoreError::InvalidEuid { .. }
        | CoreError::InvalidTemplateDefinition { .. } => StatusCode::BAD_REQUEST,
        CoreError::Configuration { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        // an interrupted layout reports the status of what stopped it
        CoreError::LayoutInterrupted { cause, .. } => error_status(cause),
    }
}

/// Map core failures onto HTTP statuses for the web layer.
fn error_response(err: CoreError) -> ApiError {
    let status = error_status(&err);
    (
        status,
        Json(ErrorResponse {
            error: err.to_string(),
        }),
    )
}

fn parse_euid(value: &str) -> Result<Euid, ApiError> {
    Euid::parse(value).map_err(error_response)
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

// ---- templates ----

pub async fn register_templates<S: Store>(
    State(store): State<AppState<S>>,
    actor: ActorContext,
    Json(document): Json<TemplateDocument>,
) -> ApiResult<ListResponse<Template>> {
    let registered = store
        .register_document(document, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(registered.into()))
}

pub async fn list_templates<S: Store>(
    State(store): State<AppState<S>>,
) -> ApiResult<ListResponse<Template>> {
    let templates = store.list_templates().await.map_err(error_response)?;
    Ok(Json(templates.into()))
}

pub async fn get_template<S: Store>(
    State(store): State<AppState<S>>,
    Path((category, template_type, subtype, version)): Path<(String, String, String, String)>,
) -> ApiResult<Template> {
    let key = TemplateKey::new(category, template_type, subtype, version);
    let template = store
        .resolve_template(&key)
        .await
        .map_err(error_response)?;
    Ok(Json(template))
}

// ---- instances ----

#[derive(Debug, Deserialize)]
pub struct InstanceListQuery {
    pub category: Option<String>,
    #[serde(rename = "type")]
    pub template_type: Option<String>,
    pub subtype: Option<String>,
    pub discriminator: Option<String>,
    #[serde(default)]
    pub include_deleted: bool,
}

#[derive(Debug, Deserialize)]
pub struct IncludeDeletedQuery {
    #[serde(default)]
    pub include_deleted: bool,
}

pub async fn create_instance<S: Store>(
    State(store): State<AppState<S>>,
    actor: ActorContext,
    Json(new): Json<NewInstance>,
) -> Result<(StatusCode, Json<Instance>), ApiError> {
    let instance = store
        .create_instance(new, &actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(instance)))
}

pub async fn list_instances<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<InstanceListQuery>,
) -> ApiResult<ListResponse<Instance>> {
    let selector = InstanceSelector {
        category: query.category,
        template_type: query.template_type,
        subtype: query.subtype,
        discriminator: query.discriminator,
        include_deleted: query.include_deleted,
    };
    let instances = store
        .list_instances(selector)
        .await
        .map_err(error_response)?;
    Ok(Json(instances.into()))
}

/// Body is a bare filter expression; `include_deleted` rides the query
/// string like on the other instance routes.
pub async fn query_instances<S: Store>(
    State(store): State<AppState<S>>,
    Query(query): Query<IncludeDeletedQuery>,
    Json(filter): Json<FilterExpr>,
) -> ApiResult<ListResponse<Instance>> {
    let instances = store
        .query_instances(&filter, query.include_deleted)
        .await
        .map_err(error_response)?;
    Ok(Json(instances.into()))
}

pub async fn get_instance<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    Query(query): Query<IncludeDeletedQuery>,
) -> ApiResult<Instance> {
    let euid = parse_euid(&euid)?;
    let instance = store
        .get_instance(&euid, query.include_deleted)
        .await
        .map_err(error_response)?;
    Ok(Json(instance))
}

pub async fn update_instance_properties<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    actor: ActorContext,
    Json(diff): Json<PropertyDiff>,
) -> ApiResult<Instance> {
    let euid = parse_euid(&euid)?;
    let instance = store
        .update_properties(&euid, diff, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(instance))
}

pub async fn soft_delete_instance<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    actor: ActorContext,
) -> ApiResult<Instance> {
    let euid = parse_euid(&euid)?;
    let instance = store
        .soft_delete_instance(&euid, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(instance))
}

pub async fn undelete_instance<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    actor: ActorContext,
) -> ApiResult<Instance> {
    let euid = parse_euid(&euid)?;
    let instance = store
        .undelete_instance(&euid, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(instance))
}

pub async fn instantiate_layout<S: Store>(
    State(store): State<AppState<S>>,
    Path((euid, layout_name)): Path<(String, String)>,
    actor: ActorContext,
) -> Result<(StatusCode, Json<ListResponse<Instance>>), ApiError> {
    let euid = parse_euid(&euid)?;
    let children = store
        .instantiate_layout(&euid, &layout_name, &actor)
        .await
        .map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(children.into())))
}

// ---- lineage ----

#[derive(Debug, Deserialize)]
pub struct TraversalQuery {
    pub relationship_type: Option<String>,
    pub depth: Option<usize>,
}

impl TraversalQuery {
    fn relationship(&self) -> Result<Option<RelationshipType>, ApiError> {
        self.relationship_type
            .as_deref()
            .map(|tag| {
                tag.parse::<RelationshipType>().map_err(|_| {
                    (
                        StatusCode::BAD_REQUEST,
                        Json(ErrorResponse {
                            error: format!("unknown relationship type {:?}", tag),
                        }),
                    )
                })
            })
            .transpose()
    }
}

pub async fn add_edge<S: Store>(
    State(store): State<AppState<S>>,
    actor: ActorContext,
    Json(new): Json<NewEdge>,
) -> Result<(StatusCode, Json<LineageEdge>), ApiError> {
    let edge = store.add_edge(new, &actor).await.map_err(error_response)?;
    Ok((StatusCode::CREATED, Json(edge)))
}

pub async fn remove_edge<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    actor: ActorContext,
) -> ApiResult<LineageEdge> {
    let euid = parse_euid(&euid)?;
    let edge = store
        .remove_edge(&euid, &actor)
        .await
        .map_err(error_response)?;
    Ok(Json(edge))
}

pub async fn get_ancestors<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    Query(query): Query<TraversalQuery>,
) -> ApiResult<ListResponse<Instance>> {
    let euid = parse_euid(&euid)?;
    let instances = store
        .ancestors(&euid, query.relationship()?, query.depth)
        .await
        .map_err(error_response)?;
    Ok(Json(instances.into()))
}

pub async fn get_descendants<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
    Query(query): Query<TraversalQuery>,
) -> ApiResult<ListResponse<Instance>> {
    let euid = parse_euid(&euid)?;
    let instances = store
        .descendants(&euid, query.relationship()?, query.depth)
        .await
        .map_err(error_response)?;
    Ok(Json(instances.into()))
}

// ---- audit ----

pub async fn get_history<S: Store>(
    State(store): State<AppState<S>>,
    Path(euid): Path<String>,
) -> ApiResult<ListResponse<AuditRow>> {
    let euid = parse_euid(&euid)?;
    let rows = store.history(&euid).await.map_err(error_response)?;
    Ok(Json(rows.into()))
}
