pub mod actor_extractor;
pub mod handlers;
pub mod routes;
