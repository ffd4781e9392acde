//! HTTP server assembly

pub mod routes;
pub mod state;
pub mod worker;

use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use state::AppState;

/// Build the application router
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/documents", post(routes::upload_document).get(routes::list_documents))
        .route("/documents/:filename", get(routes::get_document))
        .route("/query", post(routes::query));

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api)
        .layer(DefaultBodyLimit::max(state.config.server.max_upload_size))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
