use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, Response},
    routing::get,
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::Span;

use crate::state::AppState;
use crate::users;

async fn health() -> &'static str {
    "ok"
}

fn request_span(req: &Request<Body>) -> Span {
    tracing::info_span!(
        "http_request",
        method = %req.method(),
        path = %req.uri().path(),
        status = tracing::field::Empty,
    )
}

fn log_response(res: &Response<Body>, latency: Duration, span: &Span) {
    let status = res.status();
    span.record("status", status.as_u16());
    let millis = latency.as_millis() as u64;
    if status.is_server_error() {
        tracing::error!(%status, millis, "request failed");
    } else if status.is_client_error() {
        tracing::warn!(%status, millis, "request rejected");
    } else {
        tracing::info!(%status, millis, "request served");
    }
}

/// All routes live under `/api/v1`. User administration routes additionally
/// require the admin bearer key.
pub fn build_app(state: AppState) -> Router {
    let api = Router::new()
        .merge(users::router())
        .route("/health", get(health));

    Router::new()
        .nest("/api/v1", api)
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(request_span)
                .on_response(log_response),
        )
}

pub async fn serve(app: Router, bind_addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(bind_addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await?;
    Ok(())
}
