mod handlers;
mod state;

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use state::AppState;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::info;

use crate::location::Session;

pub fn build_router(session: Session) -> Router {
    let state = Arc::new(AppState { session });

    Router::new()
        .route("/api/location", get(handlers::location))
        .route("/api/location/override", post(handlers::override_location))
        .route("/api/location/redetect", post(handlers::redetect))
        .route("/api/candidates", post(handlers::candidates))
        .route("/api/places", get(handlers::places))
        // Location answers are per-session state.
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn start(host: &str, port: u16, session: Session) -> std::io::Result<()> {
    let app = build_router(session);
    let addr = format!("{}:{}", host, port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;

    info!("listening on http://{}", addr);
    eprintln!("  Wayfinder server listening on http://{}", addr);
    eprintln!("  Press Ctrl+C to stop.");

    axum::serve(listener, app).await
}
