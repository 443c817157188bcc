use axum::{
    extract::{MatchedPath, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::api::AppState;

/// `GET /metrics`
///
/// Queue depth is sampled here rather than on every enqueue.
pub async fn get_metrics(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let Some(handle) = state.prometheus_handle.as_ref() else {
        return "Metrics not enabled or failed to initialize".to_string();
    };

    match state.shared.queue.counts().await {
        Ok(counts) => {
            #[allow(clippy::cast_precision_loss)]
            for (status, value) in [
                ("pending", counts.pending),
                ("running", counts.running),
                ("failed", counts.failed),
            ] {
                metrics::gauge!("scrape_queue_jobs", "status" => status).set(value as f64);
            }
        }
        Err(e) => warn!(error = %e, "Failed to sample queue depth"),
    }

    handle.render()
}

const fn status_class(status: u16) -> &'static str {
    match status {
        500.. => "error",
        400..=499 => "client_error",
        _ => "success",
    }
}

pub async fn logging_middleware(req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().to_string();
    let path = req.uri().path().to_string();
    // Raw source ids would blow up label cardinality; label by route template.
    let route = req
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

    let span = info_span!(
        "request",
        request_id = %Uuid::new_v4(),
        method = %method,
        path = %path,
        route = %route,
    );

    async move {
        let response = next.run(req).await;
        let status = response.status().as_u16();
        let elapsed = start.elapsed();

        let labels = [
            ("method", method),
            ("path", route),
            ("status", status.to_string()),
        ];
        metrics::counter!("http_requests_total", &labels).increment(1);
        metrics::histogram!("http_request_duration_seconds", &labels).record(elapsed.as_secs_f64());

        info!(
            event = "http_request_finished",
            duration_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
            status_code = status,
            outcome = status_class(status),
            "Request finished"
        );
        response
    }
    .instrument(span)
    .await
}
