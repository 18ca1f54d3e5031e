//! HTTP surface: webhook intake, liveness and metrics scrape.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::Router;
use protopack_core::Metrics;
use protopack_pipeline::Dispatcher;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::webhook::Parser;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Shared by every request handler.
#[derive(Clone)]
pub struct AppState {
    pub parser: Arc<Parser>,
    pub dispatcher: Dispatcher,
    pub metrics: Arc<Metrics>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/webhook", post(webhook))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Serve until `shutdown` is cancelled, then stop accepting connections.
pub async fn serve(
    listener: TcpListener,
    state: AppState,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await
}

/// `200` once the delivery is validated (the run continues in the
/// background), `400` otherwise.
async fn webhook(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> StatusCode {
    match state.parser.parse_push(&headers, &body) {
        Ok(event) => {
            info!(
                repo = %event.slug(),
                git_ref = %event.git_ref,
                head_commit = %event.head_commit,
                "push accepted"
            );
            let run = state.dispatcher.dispatch(event);
            debug!(finished = run.is_finished(), "run dispatched");
            StatusCode::OK
        }
        Err(e) => {
            warn!(error = %e, "webhook delivery rejected");
            StatusCode::BAD_REQUEST
        }
    }
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)],
        state.metrics.render_prometheus(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::webhook::tests::{headers, push_body, sign, SECRET};
    use async_trait::async_trait;
    use protopack_core::{Language, PackagingOutcome, PushEvent};
    use protopack_pipeline::Processor;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        events: Mutex<Vec<PushEvent>>,
    }

    #[async_trait]
    impl Processor for Recording {
        async fn process(&self, event: PushEvent, _cancel: CancellationToken) -> PackagingOutcome {
            self.events.lock().unwrap().push(event);
            PackagingOutcome::Succeeded
        }
    }

    fn state(processor: Arc<Recording>) -> AppState {
        AppState {
            parser: Arc::new(Parser::secure(SECRET).unwrap()),
            dispatcher: Dispatcher::new(processor, CancellationToken::new()),
            metrics: Arc::new(Metrics::new(Language::Ruby, "protopack")),
        }
    }

    #[tokio::test]
    async fn valid_push_is_dispatched() {
        let processor = Arc::new(Recording::default());
        let state = state(processor.clone());
        let body = push_body();

        let status = webhook(
            State(state.clone()),
            headers("push", Some(&sign(SECRET, &body))),
            Bytes::from(body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        state.dispatcher.shutdown().await;
        let events = processor.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].git_ref, "refs/heads/feature/x");
    }

    #[tokio::test]
    async fn invalid_delivery_is_bad_request() {
        let processor = Arc::new(Recording::default());
        let state = state(processor.clone());

        let status = webhook(
            State(state.clone()),
            headers("push", Some("sha256=00")),
            Bytes::from(push_body()),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let body = br#"{"action":"opened"}"#.to_vec();
        let status = webhook(
            State(state.clone()),
            headers("pull_request", Some(&sign(SECRET, &body))),
            Bytes::from(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state.dispatcher.shutdown().await;
        assert!(processor.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn ping_is_rejected_without_dispatch() {
        let processor = Arc::new(Recording::default());
        let state = state(processor.clone());
        let body = br#"{"zen":"Design for failure."}"#.to_vec();

        let status = webhook(
            State(state.clone()),
            headers("ping", Some(&sign(SECRET, &body))),
            Bytes::from(body),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        state.dispatcher.shutdown().await;
        assert!(processor.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn healthz_is_ok() {
        assert_eq!(healthz().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_render_prometheus_text() {
        let state = state(Arc::new(Recording::default()));
        state.metrics.record_failure(protopack_core::Stage::Build);

        let response = metrics(State(state)).await.into_response();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            PROMETHEUS_CONTENT_TYPE
        );
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains(
            "error_total{language=\"ruby\",app=\"protopack\",type=\"build\"} 1"
        ));
    }
}
