//! HTTP status server using axum.
//!
//! - `GET /api/status`: [`StatusSnapshot`] as JSON
//! - `GET /metrics`: Prometheus text exposition
//! - `POST /api/hard-stop/reset`: operator acknowledgment of a hard stop;
//!   reopens positions parked by a failed close

use std::net::SocketAddr;

use axum::extract::State;
use axum::http::{header, Method, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use xarb_telemetry::Metrics;

use crate::app::now_ms;
use crate::error::AppResult;
use crate::status::{HardStopReset, StatusReporter, StatusSnapshot};

/// Create the axum router.
pub fn create_router(reporter: StatusReporter) -> Router {
    let cors = CorsLayer::new()
        .allow_methods([Method::GET])
        .allow_origin(Any);

    Router::new()
        .route("/api/status", get(get_status))
        .route("/metrics", get(get_metrics))
        .route("/api/hard-stop/reset", post(reset_hard_stop))
        .layer(cors)
        .with_state(reporter)
}

/// Bind and serve until the task is aborted.
pub async fn serve(addr: SocketAddr, reporter: StatusReporter) -> AppResult<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Status server listening");
    axum::serve(listener, create_router(reporter)).await?;
    Ok(())
}

async fn get_status(State(reporter): State<StatusReporter>) -> Json<StatusSnapshot> {
    Json(reporter.snapshot(now_ms()))
}

async fn get_metrics() -> Response {
    match Metrics::gather_text() {
        Ok(text) => (
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
            text,
        )
            .into_response(),
        Err(e) => {
            warn!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

async fn reset_hard_stop(State(reporter): State<StatusReporter>) -> Json<HardStopReset> {
    Json(reporter.reset_hard_stop())
}
