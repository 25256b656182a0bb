use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::api::handlers;
use crate::store::traits::Store;

pub fn create_router<S: Store + 'static>() -> Router<Arc<S>> {
    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Template registry
        .route("/templates", post(handlers::register_templates::<S>))
        .route("/templates", get(handlers::list_templates::<S>))
        .route(
            "/templates/:category/:type/:subtype/:version",
            get(handlers::get_template::<S>),
        )
        // Instance store
        .route("/instances", post(handlers::create_instance::<S>))
        .route("/instances", get(handlers::list_instances::<S>))
        .route("/instances/query", post(handlers::query_instances::<S>))
        .route("/instances/:euid", get(handlers::get_instance::<S>))
        .route(
            "/instances/:euid",
            delete(handlers::soft_delete_instance::<S>),
        )
        .route(
            "/instances/:euid/undelete",
            post(handlers::undelete_instance::<S>),
        )
        .route(
            "/instances/:euid/properties",
            patch(handlers::update_instance_properties::<S>),
        )
        .route(
            "/instances/:euid/layouts/:layout_name",
            post(handlers::instantiate_layout::<S>),
        )
        // Lineage engine
        .route("/lineage", post(handlers::add_edge::<S>))
        .route("/lineage/:euid", delete(handlers::remove_edge::<S>))
        .route(
            "/instances/:euid/ancestors",
            get(handlers::get_ancestors::<S>),
        )
        .route(
            "/instances/:euid/descendants",
            get(handlers::get_descendants::<S>),
        )
        // Audit history (instances and lineage edges)
        .route("/instances/:euid/history", get(handlers::get_history::<S>))
        .route("/lineage/:euid/history", get(handlers::get_history::<S>))
}
