//! Webhook delivery intake
//!
//! `verify_signature` runs as middleware in front of the delivery route:
//! 1. Buffer the raw body (bounded by `max_body_bytes`)
//! 2. Verify `Tremendous-Webhook-Signature` against the buffered bytes
//! 3. Reinsert the exact bytes into the request for the next handler
//!
//! Verification failures answer directly with a JSON error body; the
//! delivery handler only ever sees authenticated requests.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::body::{Body, Bytes};
use axum::extract::{DefaultBodyLimit, Request, State};
use axum::http::StatusCode;
use axum::middleware::{Next, from_fn_with_state};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use common::Secret;
use serde::Deserialize;
use tracing::{debug, info, warn};
use tremendous_auth::{SIGNATURE_HEADER, verify};

use crate::metrics::record_delivery;

/// State shared by the verification middleware and the delivery handler.
#[derive(Clone)]
pub struct WebhookState {
    pub secret: Arc<Secret<String>>,
    pub max_body_bytes: usize,
    /// Accepted deliveries, reported on /health
    pub deliveries: Arc<AtomicU64>,
}

/// Delivery event envelope.
#[derive(Debug, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    pub uuid: String,
    pub created_utc: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// The delivery route with signature verification in front of it.
///
/// The body limit seen by the handler's extractor is raised to
/// `max_body_bytes` so the middleware's bound is the only one.
pub fn routes<S>(path: &str, state: WebhookState) -> Router<S> {
    let max_body_bytes = state.max_body_bytes;
    Router::new()
        .route(path, post(receive))
        .route_layer(from_fn_with_state(state.clone(), verify_signature))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(state)
}

fn reject(status: StatusCode, outcome: &'static str, message: &str) -> Response {
    record_delivery(outcome);
    (
        status,
        Json(serde_json::json!({
            "error": { "type": outcome, "message": message }
        })),
    )
        .into_response()
}

/// Verify the delivery signature over the raw body and pass the request on
/// with its body intact.
pub async fn verify_signature(
    State(state): State<WebhookState>,
    request: Request,
    next: Next,
) -> Response {
    let (parts, body) = request.into_parts();

    let bytes = match axum::body::to_bytes(body, state.max_body_bytes).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(error = %e, limit = state.max_body_bytes, "webhook body rejected");
            return reject(
                StatusCode::PAYLOAD_TOO_LARGE,
                "too_large",
                "request body exceeds limit",
            );
        }
    };

    let header = parts
        .headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();

    match verify(header, &bytes, state.secret.expose().as_bytes()) {
        Ok(true) => {}
        Ok(false) => {
            warn!(body_len = bytes.len(), "webhook signature mismatch");
            return reject(
                StatusCode::UNAUTHORIZED,
                "invalid_signature",
                "signature does not match",
            );
        }
        Err(e) => {
            warn!(error = %e, "webhook signature header unusable");
            return reject(
                StatusCode::BAD_REQUEST,
                "bad_algorithm",
                "missing or unsupported signature algorithm",
            );
        }
    }

    debug!(body_len = bytes.len(), "webhook signature verified");
    next.run(Request::from_parts(parts, Body::from(bytes))).await
}

/// Decode and log an authenticated delivery.
pub async fn receive(State(state): State<WebhookState>, body: Bytes) -> Response {
    let event: WebhookEvent = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            warn!(error = %e, "verified webhook body is not a delivery event");
            return reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                "malformed",
                "body is not a webhook event",
            );
        }
    };

    let delivery_id = format!("whd_{}", uuid::Uuid::new_v4().as_simple());
    state.deliveries.fetch_add(1, Ordering::Relaxed);
    record_delivery("accepted");
    info!(
        delivery_id,
        event = %event.event,
        uuid = %event.uuid,
        created_utc = %event.created_utc,
        "webhook delivery accepted"
    );

    (
        StatusCode::OK,
        Json(serde_json::json!({ "received": event.uuid })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;
    use tower::ServiceExt;
    use tremendous_auth::compute_signature;

    const SECRET: &str = "whsec_test";

    fn state(max_body_bytes: usize) -> WebhookState {
        WebhookState {
            secret: Arc::new(Secret::from(SECRET)),
            max_body_bytes,
            deliveries: Arc::new(AtomicU64::new(0)),
        }
    }

    fn signed(body: &[u8]) -> String {
        format!("sha256={}", compute_signature(SECRET.as_bytes(), body))
    }

    /// Router whose handler echoes the body it was handed.
    fn echo_router(state: WebhookState) -> Router {
        Router::new()
            .route("/hook", post(|body: Bytes| async move { body }))
            .layer(from_fn_with_state(state.clone(), verify_signature))
            .with_state(state)
    }

    fn delivery(body: &'static [u8], signature: Option<String>) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method("POST").uri("/hook");
        if let Some(signature) = signature {
            builder = builder.header(SIGNATURE_HEADER, signature);
        }
        builder.body(Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn verified_body_reaches_handler_unchanged() {
        let body: &[u8] = br#"{"event":"ORDERS.CREATED","uuid":"u1","created_utc":"2024-01-01T00:00:00Z","payload":{}}"#;
        let response = echo_router(state(1024))
            .oneshot(delivery(body, Some(signed(body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let echoed = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&echoed[..], body);
    }

    #[tokio::test]
    async fn mismatched_signature_is_unauthorized() {
        let body: &[u8] = b"{\"event\":\"x\"}";
        let forged = signed(b"{\"event\":\"y\"}");
        let response = echo_router(state(1024))
            .oneshot(delivery(body, Some(forged)))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn unusable_header_is_bad_request() {
        let body: &[u8] = b"{}";
        let digest = compute_signature(SECRET.as_bytes(), body);

        for header in [
            None,
            Some(format!("sha1={digest}")),
            Some(digest.clone()),
        ] {
            let response = echo_router(state(1024))
                .oneshot(delivery(body, header.clone()))
                .await
                .unwrap();
            assert_eq!(
                response.status(),
                StatusCode::BAD_REQUEST,
                "header {header:?}"
            );
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_verification() {
        let body: &[u8] = &[b'a'; 64];
        let response = echo_router(state(16))
            .oneshot(delivery(body, Some(signed(body))))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    fn receive_router(state: WebhookState) -> Router {
        routes("/hook", state)
    }

    #[tokio::test]
    async fn configured_limit_above_extractor_default_is_honored() {
        let state = state(4 * 1024 * 1024);
        let filler = "x".repeat(3 * 1024 * 1024);
        let body = format!(
            r#"{{"event":"ORDERS.CREATED","uuid":"evt_big","created_utc":"2024-01-01T00:00:00Z","payload":{{"note":"{filler}"}}}}"#
        );
        let request = HttpRequest::builder()
            .method("POST")
            .uri("/hook")
            .header(SIGNATURE_HEADER, signed(body.as_bytes()))
            .body(Body::from(body))
            .unwrap();

        let response = receive_router(state.clone()).oneshot(request).await.unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(state.deliveries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn receive_decodes_event_and_counts_delivery() {
        let state = state(1024);
        let body: &[u8] = br#"{"event":"REWARDS.DELIVERY.SUCCEEDED","uuid":"evt_1","created_utc":"2024-05-01T12:00:00Z","payload":{"resource":{"id":"r1"}}}"#;

        let response = receive_router(state.clone())
            .oneshot(delivery(body, Some(signed(body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(
            &axum::body::to_bytes(response.into_body(), 1024).await.unwrap(),
        )
        .unwrap();
        assert_eq!(json["received"], "evt_1");
        assert_eq!(state.deliveries.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn receive_rejects_signed_garbage_as_unprocessable() {
        let state = state(1024);
        let body: &[u8] = b"not json at all";

        let response = receive_router(state.clone())
            .oneshot(delivery(body, Some(signed(body))))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(state.deliveries.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn rejected_delivery_never_reaches_handler() {
        let state = state(1024);
        let body: &[u8] = br#"{"event":"e","uuid":"u","created_utc":"t"}"#;

        let response = receive_router(state.clone())
            .oneshot(delivery(body, Some("sha256=00".into())))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(state.deliveries.load(Ordering::Relaxed), 0);
    }
}
