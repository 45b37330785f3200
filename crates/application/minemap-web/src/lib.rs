//! minemap HTTP surface
//!
//! ```text
//! GET  /listings?lat=&lng=&radius=&powerSource=&coolingType=&maxRate=
//! POST /listings        {title, description, electricityRate, latitude, longitude, ...}
//! GET  /api/health
//! ```
//!
//! The listing routes are also mounted under `/api`.

pub mod error;
pub mod handlers;
pub mod state;

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::AppState;

/// Create the main router with all routes
pub fn create_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let listings = get(handlers::list_listings).post(handlers::create_listing);

    Router::new()
        .route("/listings", listings.clone())
        .route("/api/listings", listings)
        .route("/api/health", get(handlers::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Start the web server
pub async fn serve(state: Arc<AppState>, addr: &str) -> std::io::Result<()> {
    let app = create_router(state.clone());

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(
        "minemap listening on http://{} ({} store)",
        addr,
        state.repository.backend()
    );

    axum::serve(listener, app).await
}
