//! Route definitions and router setup
//!
//! Configures all API routes and middleware.

mod impact;
mod lineage;

use crate::config::Settings;
use crate::state::SharedState;
use axum::{
    extract::State,
    http::{header, Method},
    routing::{get, post},
    Router,
};
use std::time::Duration;
use tower::ServiceBuilder;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    request_id::MakeRequestUuid,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
    ServiceBuilderExt,
};
use tracing::{warn, Level};

/// Create the application router with all routes and middleware
pub fn create_router(state: SharedState, settings: &Settings) -> Router {
    // Build CORS layer
    let cors = build_cors_layer(settings);

    // Build tracing/logging layer
    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    // Build middleware stack
    let middleware = ServiceBuilder::new()
        .set_x_request_id(MakeRequestUuid)
        .layer(trace_layer)
        .layer(CompressionLayer::new())
        .layer(cors)
        .propagate_x_request_id();

    Router::new()
        // Health check
        .route("/health", get(health_check))

        // Lineage graph routes
        .route("/api/lineage/graph", get(lineage::complete_graph))
        .route("/api/lineage/resource", get(lineage::resource_graph))
        .route("/api/lineage/workflows", get(lineage::workflow_graph))
        .route("/api/lineage/filter", post(lineage::filter))
        .route("/api/lineage/path", get(lineage::path))

        // Impact analysis routes
        .route("/api/impact/downstream", post(impact::downstream))
        .route("/api/impact/upstream", post(impact::upstream))
        .route("/api/impact/full", post(impact::full))
        .route("/api/impact/schema-change", post(impact::schema_change))
        .route("/api/impact/report", post(impact::report))
        .route("/api/impact/history", get(impact::history).delete(impact::cleanup))
        .route("/api/impact/history/{id}", get(impact::get_analysis))

        // Apply middleware and state
        .layer(middleware)
        .with_state(state)
}

/// Build CORS layer from settings
fn build_cors_layer(settings: &Settings) -> CorsLayer {
    let origins: Vec<_> = settings
        .cors
        .allowed_origins
        .iter()
        .filter_map(|s| s.parse().ok())
        .collect();

    let cors = if origins.is_empty() {
        CorsLayer::new().allow_origin(Any)
    } else {
        CorsLayer::new().allow_origin(origins)
    };

    cors.allow_methods([Method::GET, Method::POST, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(3600))
}

/// Health check endpoint, including lineage store reachability
async fn health_check(State(state): State<SharedState>) -> axum::Json<serde_json::Value> {
    let database = match state.db_pool.get().await {
        Ok(client) => match client.query_one("SELECT 1", &[]).await {
            Ok(_) => "connected",
            Err(e) => {
                warn!("Health check query failed: {}", e);
                "error"
            }
        },
        Err(e) => {
            warn!("Health check could not get a connection: {}", e);
            "unavailable"
        }
    };

    axum::Json(serde_json::json!({
        "success": true,
        "message": "Server is running fine.",
        "database": database,
        "engines": state.lineage.engines,
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}
