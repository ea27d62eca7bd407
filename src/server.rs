//! HTTP surface: an axum router in front of the gateway.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::gateway::{Envelope, ErrorEnvelope, Gateway};

/// Operation served by `/api/generate` when the body has no `type`.
const DEFAULT_GENERATE_TYPE: &str = "video";

/// A request body, or the reason it could not be read.
type RequestBody = Result<Bytes, BytesRejection>;

/// Build the application router, buffering request bodies up to
/// `max_body_bytes`.
pub fn router(gateway: Arc<Gateway>, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/generate", post(generate))
        .route("/api/character", post(character))
        .route("/api/upscale", post(upscale))
        .route("/api/v1/generations/{operation}", post(generation))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .with_state(gateway)
}

async fn health() -> &'static str {
    "ok"
}

async fn generate(State(gateway): State<Arc<Gateway>>, body: RequestBody) -> Response {
    let params = match body.map_err(rejected).and_then(|body| json_object(&body)) {
        Ok(params) => params,
        Err(err) => return failure(&err),
    };
    let tag = match params.get("type") {
        None | Some(Value::Null) => DEFAULT_GENERATE_TYPE.to_string(),
        Some(Value::String(tag)) => tag.clone(),
        Some(_) => return failure(&GatewayError::Validation("type must be a string".into())),
    };
    respond(gateway.handle(&tag, &params).await)
}

async fn character(State(gateway): State<Arc<Gateway>>, body: RequestBody) -> Response {
    dispatch(&gateway, "character", body).await
}

async fn upscale(State(gateway): State<Arc<Gateway>>, body: RequestBody) -> Response {
    dispatch(&gateway, "upscale", body).await
}

async fn generation(
    State(gateway): State<Arc<Gateway>>,
    Path(operation): Path<String>,
    body: RequestBody,
) -> Response {
    dispatch(&gateway, &operation, body).await
}

async fn dispatch(gateway: &Gateway, tag: &str, body: RequestBody) -> Response {
    match body.map_err(rejected).and_then(|body| json_object(&body)) {
        Ok(params) => respond(gateway.handle(tag, &params).await),
        Err(err) => failure(&err),
    }
}

/// A body axum refused to buffer, e.g. one over the size limit.
fn rejected(rejection: BytesRejection) -> GatewayError {
    tracing::warn!(status = %rejection.status(), "request body rejected: {}", rejection.body_text());
    GatewayError::Validation(format!("request body rejected: {}", rejection.body_text()))
}

/// Parse a request body that must be a JSON object.
fn json_object(body: &[u8]) -> Result<Map<String, Value>, GatewayError> {
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(GatewayError::Validation("request body must be a JSON object".into())),
        Err(e) => Err(GatewayError::Validation(format!("request body is not valid JSON: {e}"))),
    }
}

fn respond(envelope: Envelope) -> Response {
    let status =
        StatusCode::from_u16(envelope.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(envelope)).into_response()
}

fn failure(err: &GatewayError) -> Response {
    respond(Envelope::Failure(ErrorEnvelope::from(err)))
}
