//! # lovejournal-api
//!
//! HTTP surface for the Love Journal backend: memory listing and creation,
//! image deletion, stats, self-service account removal and job history.
//! The binary in `main.rs` also runs the job scheduler.

pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod state;

use std::time::Duration;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};

pub use auth::RequireAuth;
pub use config::{AppConfig, JobSchedules, StoreBackend};
pub use error::ApiError;
pub use state::AppState;

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/v1/images/delete", post(handlers::images::delete_image))
        .route(
            "/api/v1/stats/recompute",
            post(handlers::stats::recompute_stats),
        )
        .route(
            "/api/v1/memories",
            get(handlers::memories::list_memories).post(handlers::memories::create_memory),
        )
        .route(
            "/api/v1/account/remove",
            post(handlers::account::remove_account),
        )
        .route(
            "/api/v1/account/restore",
            post(handlers::account::restore_account),
        )
        .route("/api/v1/jobs/:name/history", get(handlers::jobs::job_history))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::x_request_id()),
        )
        .with_state(state)
}

/// CORS policy for the configured origins.
pub fn cors_layer(origins: Vec<axum::http::HeaderValue>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE, header::ACCEPT])
        .allow_credentials(true)
        .max_age(Duration::from_secs(3600))
}
