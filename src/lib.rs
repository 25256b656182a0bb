pub mod api;
pub mod config;
pub mod error;
pub mod logic;
pub mod model;
pub mod seed;
pub mod store;

// Export API types
pub use api::handlers;
pub use api::routes;

// Export the error taxonomy
pub use error::{CoreError, CoreResult};

// Export logic types
pub use logic::{
    ancestors, descendants, filter_instances, is_reachable, parse_filter_expr, would_create_cycle,
    EuidAllocator, FilterExpr, PropertyPath, LAYOUT_CHUNK_SIZE,
};

// Export all model types
pub use model::*;

// Export seed module
pub use seed::*;

// Export store types
pub use store::{
    AuditLog, InstanceSelector, InstanceStore, LineageStore, MemoryStore, RegistryPolicy, Store,
    TemplateRegistry,
};

/// Run the HTTP service in-process; used by the binary and by
/// integration setups.
pub async fn run_server() -> anyhow::Result<()> {
    use axum::serve;
    use std::sync::Arc;
    use tokio::net::TcpListener;

    // Load environment variables from .env file if it exists
    dotenvy::dotenv().ok();

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .try_init();

    log::info!("LIMS-DB: polymorphic object store with lineage graph");

    let config = crate::config::AppConfig::load()?;
    log::info!(
        "configuration loaded: server={} policy={:?}",
        config.server_address(),
        config.registry.policy
    );

    let store = MemoryStore::with_policy(config.registry.policy);
    if config.registry.seed {
        seed::load_seed_data(&store).await?;
    }
    let store = Arc::new(store);

    let app = crate::api::routes::create_router().with_state(store);

    let bind_address = config.server_address();
    let listener = TcpListener::bind(&bind_address).await?;
    log::info!("LIMS-DB server running on http://{}", bind_address);
    serve(listener, app).await?;

    Ok(())
}
