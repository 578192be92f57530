mod evidence;
mod media;
mod records;

use axum::{
    Json, Router,
    extract::{DefaultBodyLimit, State},
    http::{StatusCode, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;

use crate::{middleware as app_middleware, observability, state::AppState};

pub fn router(state: AppState) -> Router {
    // Per-file ceilings are enforced by the media service; this only bounds
    // the request as a whole.
    let body_limit = state.media.policy().request_body_limit();

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(evidence::routes())
        .merge(media::routes())
        .merge(records::routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(app_middleware::metrics_layer))
        .layer(app_middleware::timeout_layer(
            state.config.request_timeout_secs,
        ))
        .layer(app_middleware::trace_layer())
        .layer(app_middleware::set_request_id_layer())
        .layer(app_middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(
            app_middleware::correlation_id_middleware,
        ))
        .with_state(state)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
    environment: String,
    database: &'static str,
}

async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status_code, status, database) = match &state.db_health {
        None => (StatusCode::OK, "ok", "memory"),
        Some(adapter) => match adapter.health_check().await {
            Ok(()) => (StatusCode::OK, "ok", adapter.name()),
            Err(err) => {
                tracing::warn!(error = %err, adapter = adapter.name(), "database health check failed");
                (StatusCode::SERVICE_UNAVAILABLE, "degraded", adapter.name())
            }
        },
    };
    (
        status_code,
        Json(HealthResponse {
            status,
            version: env!("CARGO_PKG_VERSION"),
            environment: state.config.app_env.clone(),
            database,
        }),
    )
}

async fn metrics() -> Response {
    match observability::render_metrics() {
        Some(body) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            body,
        )
            .into_response(),
        None => StatusCode::SERVICE_UNAVAILABLE.into_response(),
    }
}
