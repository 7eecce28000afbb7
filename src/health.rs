//! Liveness and status endpoints for hosted deployments.

use std::future::Future;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use crate::app::{RelayError, Result};
use crate::pipeline::Pipeline;

pub fn router(pipeline: Arc<Pipeline>) -> Router {
    Router::new()
        .route("/", get(ok))
        .route("/health", get(ok))
        .route("/status", get(status))
        .route("/run", post(trigger_run))
        .with_state(pipeline)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve<F>(pipeline: Arc<Pipeline>, addr: &str, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(addr = %listener.local_addr()?, "health server listening");
    axum::serve(listener, router(pipeline))
        .with_graceful_shutdown(shutdown)
        .await?;
    Ok(())
}

async fn ok() -> &'static str {
    "ok"
}

async fn status(State(pipeline): State<Arc<Pipeline>>) -> Json<serde_json::Value> {
    Json(json!({
        "running": pipeline.is_running(),
        "last_run": pipeline.last_run(),
    }))
}

async fn trigger_run(State(pipeline): State<Arc<Pipeline>>) -> Response {
    // The run outlives this handler if the client disconnects.
    let outcome = match pipeline.spawn_run().await {
        Ok(outcome) => outcome,
        Err(e) => Err(RelayError::Other(format!("run task failed: {}", e))),
    };

    match outcome {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(RelayError::RunInProgress) => {
            tracing::info!("run requested while another is active");
            (
                StatusCode::CONFLICT,
                Json(json!({ "error": "a run is already in progress" })),
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(error = %e, "requested run failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use tower::ServiceExt;

    use super::*;
    use crate::collector::tests::{item, StaticAdapter};
    use crate::dispatch::testing::FakeSink;
    use crate::pipeline::tests::pipeline_with;

    fn pipeline() -> Arc<Pipeline> {
        Arc::new(pipeline_with(
            vec![StaticAdapter::ok(
                "X",
                vec![item("x", "X", "A", "https://x/1")],
            )],
            Arc::new(FakeSink::new()),
        ))
    }

    async fn call(app: Router, method: &str, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(
                Request::builder()
                    .method(method)
                    .uri(uri)
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_liveness_routes() {
        let app = router(pipeline());
        for uri in ["/", "/health"] {
            let (status, body) = call(app.clone(), "GET", uri).await;
            assert_eq!(status, StatusCode::OK);
            assert_eq!(body, b"ok");
        }
    }

    #[tokio::test]
    async fn test_status_before_and_after_run() {
        let pipeline = pipeline();
        let app = router(pipeline.clone());

        let (status, body) = call(app.clone(), "GET", "/status").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["last_run"], Value::Null);
        assert_eq!(json["running"], false);

        let (status, body) = call(app.clone(), "POST", "/run").await;
        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["dispatch"]["delivered"], 1);

        let (_, body) = call(app, "GET", "/status").await;
        let json: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["last_run"]["sources"][0]["selected"], 1);
    }

    #[tokio::test]
    async fn test_run_conflict_while_busy() {
        let slow = Box::new(StaticAdapter {
            name: "Slow".into(),
            items: Some(vec![item("x", "X", "A", "https://x/1")]),
            delay: Some(Duration::from_millis(300)),
        });
        let pipeline = Arc::new(pipeline_with(vec![slow], Arc::new(FakeSink::new())));

        let background = {
            let pipeline = pipeline.clone();
            tokio::spawn(async move { pipeline.run_once().await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let (status, _) = call(router(pipeline), "POST", "/run").await;
        assert_eq!(status, StatusCode::CONFLICT);
        background.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_dropped_request_still_marks_delivered_item() {
        let sink = Arc::new(FakeSink::new().with_delay(Duration::from_millis(300)));
        let pipeline = Arc::new(pipeline_with(
            vec![StaticAdapter::ok(
                "X",
                vec![item("x", "X", "A", "https://x/1")],
            )],
            sink.clone(),
        ));

        // Client gives up while the message is in flight
        let request = call(router(pipeline.clone()), "POST", "/run");
        assert!(tokio::time::timeout(Duration::from_millis(100), request)
            .await
            .is_err());

        for _ in 0..100 {
            if !pipeline.is_running() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(pipeline.store().is_sent("x:https://x/1").unwrap());
        assert!(pipeline.last_run().is_some());

        let next = pipeline.run_once().await.unwrap();
        assert!(next.dispatch.fallback);
        let delivered_a = sink
            .attempts()
            .iter()
            .filter(|p| p.text.contains(">A</a>"))
            .count();
        assert_eq!(delivered_a, 1);
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let (status, _) = call(router(pipeline()), "GET", "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
