//! The gateway endpoint: validation, routing, invocation, normalization.
//!
//! Every request walks `Validating -> Routing -> Invoking -> Normalizing ->
//! Responding`. A failure in any stage ends in an error envelope; nothing is
//! retried.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::normalize::{normalize, BackendResult, Normalized};
use crate::operation::{MediaKind, Operation};
use crate::ports::ModelBackend;
use crate::routing;
use crate::validate::validate;

/// Stage of a request, used in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Checking the caller's parameters.
    Validating,
    /// Choosing the model and building its input.
    Routing,
    /// Waiting on the backend.
    Invoking,
    /// Turning the backend result into locators.
    Normalizing,
    /// Building the success envelope.
    Responding,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validating => "validating",
            Self::Routing => "routing",
            Self::Invoking => "invoking",
            Self::Normalizing => "normalizing",
            Self::Responding => "responding",
        };
        f.write_str(name)
    }
}

/// Gateway behaviour switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct GatewayOptions {
    /// Return degraded results instead of failing them.
    pub allow_degraded: bool,
}

enum BackendSlot {
    Ready(Arc<dyn ModelBackend>),
    /// No backend could be built; the reason is reported on every request.
    Unconfigured(String),
}

/// Serves generation requests against a single backend.
pub struct Gateway {
    backend: BackendSlot,
    options: GatewayOptions,
}

/// Successful response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SuccessEnvelope {
    /// The operation that was served.
    pub operation: Operation,
    /// Kind of media behind the locator(s).
    pub media_kind: MediaKind,
    /// The locator, for single-output operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_locator: Option<String>,
    /// The locators, for multi-output operations.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_locators: Option<Vec<String>>,
    /// Set when the locator is an inlined, unrecognized backend object.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub degraded: bool,
}

/// Error response body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorEnvelope {
    /// Human-readable reason.
    pub error_message: String,
    /// Stable error classification, e.g. `"validation_error"`.
    pub error_kind: &'static str,
    #[serde(skip)]
    status: u16,
}

/// Response to one request: exactly one of success or error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    /// The request succeeded.
    Success(SuccessEnvelope),
    /// The request failed.
    Failure(ErrorEnvelope),
}

impl Envelope {
    /// HTTP status for this envelope.
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::Success(_) => 200,
            Self::Failure(err) => err.status,
        }
    }

    /// Whether this is a success envelope.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

impl From<&GatewayError> for ErrorEnvelope {
    fn from(err: &GatewayError) -> Self {
        let kind = err.kind();
        Self { error_message: err.to_string(), error_kind: kind.as_str(), status: kind.status() }
    }
}

impl Gateway {
    /// Create a gateway that invokes `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn ModelBackend>, options: GatewayOptions) -> Self {
        Self { backend: BackendSlot::Ready(backend), options }
    }

    /// Create a gateway without a backend; every request reports `reason`
    /// as a configuration error.
    #[must_use]
    pub fn unconfigured(reason: impl Into<String>, options: GatewayOptions) -> Self {
        Self { backend: BackendSlot::Unconfigured(reason.into()), options }
    }

    /// Serve one request for the operation named by `tag`.
    pub async fn handle(&self, tag: &str, params: &Map<String, Value>) -> Envelope {
        let started = Instant::now();
        match self.serve(tag, params).await {
            Ok(success) => {
                tracing::info!(
                    operation = %success.operation,
                    elapsed_ms = started.elapsed().as_millis(),
                    degraded = success.degraded,
                    "request served"
                );
                Envelope::Success(success)
            }
            Err((stage, err)) => {
                let envelope = ErrorEnvelope::from(&err);
                if envelope.status >= 500 {
                    tracing::error!(
                        operation = tag,
                        %stage,
                        kind = envelope.error_kind,
                        elapsed_ms = started.elapsed().as_millis(),
                        "request failed: {err}"
                    );
                } else {
                    tracing::warn!(operation = tag, %stage, kind = envelope.error_kind, "request rejected: {err}");
                }
                Envelope::Failure(envelope)
            }
        }
    }

    async fn serve(
        &self,
        tag: &str,
        params: &Map<String, Value>,
    ) -> Result<SuccessEnvelope, (Stage, GatewayError)> {
        let backend = match &self.backend {
            BackendSlot::Ready(backend) => backend,
            BackendSlot::Unconfigured(reason) => {
                return Err((Stage::Validating, GatewayError::Config(reason.clone())));
            }
        };

        let at = |stage: Stage| move |err: GatewayError| (stage, err);

        let operation: Operation = tag.parse().map_err(at(Stage::Validating))?;
        let request = validate(operation, params).map_err(at(Stage::Validating))?;

        let invocation = routing::route(&request).map_err(at(Stage::Routing))?;
        tracing::debug!(%operation, model = %invocation.model, "invoking backend");

        let raw = backend.run(&invocation).await.map_err(at(Stage::Invoking))?;

        let result = BackendResult::materialize(raw).await.map_err(at(Stage::Normalizing))?;
        let normalized = normalize(&result, operation).map_err(at(Stage::Normalizing))?;
        if normalized.degraded {
            if !self.options.allow_degraded {
                return Err((
                    Stage::Normalizing,
                    GatewayError::Normalization(
                        "backend returned an object without a locator field".into(),
                    ),
                ));
            }
            tracing::warn!(%operation, "returning degraded result: object without a locator field");
        }

        Ok(respond(operation, normalized))
    }
}

/// Shape the normalized output for the operation's cardinality.
fn respond(operation: Operation, normalized: Normalized) -> SuccessEnvelope {
    let Normalized { locators, media_kind, degraded } = normalized;
    let mut locators: Vec<String> = locators.into_iter().map(String::from).collect();

    let (content_locator, content_locators) = if operation.is_multi_output() {
        (None, Some(locators))
    } else {
        if locators.len() > 1 {
            tracing::debug!(
                %operation,
                dropped = locators.len() - 1,
                stage = %Stage::Responding,
                "single-output operation returned several locators, keeping the first"
            );
        }
        locators.truncate(1);
        (locators.pop(), None)
    };

    SuccessEnvelope { operation, media_kind, content_locator, content_locators, degraded }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use bytes::Bytes;
    use serde_json::json;

    use crate::ports::{Invocation, RawOutput, RunFuture};

    /// Backend that answers with a fixed output and counts its calls.
    struct FakeBackend {
        output: fn() -> Result<RawOutput, GatewayError>,
        calls: AtomicUsize,
        last: Mutex<Option<Invocation>>,
    }

    impl FakeBackend {
        fn new(output: fn() -> Result<RawOutput, GatewayError>) -> Arc<Self> {
            Arc::new(Self { output, calls: AtomicUsize::new(0), last: Mutex::new(None) })
        }
    }

    impl ModelBackend for FakeBackend {
        fn run(&self, invocation: &Invocation) -> RunFuture<'_> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            *self.last.lock().unwrap() = Some(invocation.clone());
            let output = (self.output)();
            Box::pin(async move { output })
        }
    }

    fn gateway(backend: &Arc<FakeBackend>) -> Gateway {
        Gateway::new(Arc::clone(backend) as Arc<dyn ModelBackend>, GatewayOptions::default())
    }

    fn params(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn url_output() -> Result<RawOutput, GatewayError> {
        Ok(RawOutput::Value(json!("https://cdn.example.com/out.webp")))
    }

    #[tokio::test]
    async fn missing_fields_never_reach_backend() {
        let backend = FakeBackend::new(url_output);
        let gw = gateway(&backend);
        for (tag, body) in [
            ("image", json!({})),
            ("video", json!({"prompt": ""})),
            ("character", json!({"prompt": "p"})),
            ("upscale", json!({"prompt": "p"})),
        ] {
            let envelope = gw.handle(tag, &params(body)).await;
            assert_eq!(envelope.status(), 400, "{tag}");
            let Envelope::Failure(err) = envelope else { panic!("{tag} should fail") };
            assert_eq!(err.error_kind, "validation_error");
        }
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_operation_is_bad_request() {
        let backend = FakeBackend::new(url_output);
        let envelope = gateway(&backend).handle("sculpture", &params(json!({"prompt": "p"}))).await;
        assert_eq!(envelope.status(), 400);
        assert!(matches!(envelope, Envelope::Failure(ref e) if e.error_kind == "unsupported_operation"));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unconfigured_gateway_reports_configuration_error() {
        let gw = Gateway::unconfigured("No API key for Replicate", GatewayOptions::default());
        let envelope = gw.handle("image", &params(json!({}))).await;
        assert_eq!(envelope.status(), 500);
        let Envelope::Failure(err) = envelope else { panic!("should fail") };
        assert_eq!(err.error_kind, "configuration_error");
        assert!(err.error_message.contains("No API key"));
    }

    #[tokio::test]
    async fn image_success() {
        let backend = FakeBackend::new(url_output);
        let envelope = gateway(&backend).handle("image", &params(json!({"prompt": "a cat"}))).await;
        assert_eq!(
            envelope,
            Envelope::Success(SuccessEnvelope {
                operation: Operation::Image,
                media_kind: MediaKind::Image,
                content_locator: Some("https://cdn.example.com/out.webp".into()),
                content_locators: None,
                degraded: false,
            })
        );
        let last = backend.last.lock().unwrap().clone().unwrap();
        assert_eq!(last.model, "black-forest-labs/flux-1.1-pro");
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn video_stream_becomes_data_uri() {
        let backend = FakeBackend::new(|| {
            let chunks: [&[u8]; 3] = [b"\x00\x01", b"\x02", b"\x03\x04"];
            let chunks = chunks.map(|c| Ok::<_, GatewayError>(Bytes::copy_from_slice(c)));
            Ok(RawOutput::Stream(Box::pin(futures_util::stream::iter(chunks))))
        });
        let envelope = gateway(&backend).handle("video", &params(json!({"prompt": "waves"}))).await;
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(
            json,
            json!({
                "operation": "video",
                "mediaKind": "video",
                "contentLocator": "data:video/mp4;base64,AAECAwQ=",
            })
        );
    }

    #[tokio::test]
    async fn character_returns_all_locators() {
        let backend = FakeBackend::new(|| Ok(RawOutput::Value(json!(["urlA", "urlB", "urlC"]))));
        let envelope = gateway(&backend)
            .handle(
                "character",
                &params(json!({"subject": "https://example.com/face.png", "prompt": "p"})),
            )
            .await;
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["contentLocators"], json!(["urlA", "urlB", "urlC"]));
        assert!(json.get("contentLocator").is_none());
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn single_output_keeps_first_locator() {
        let backend = FakeBackend::new(|| Ok(RawOutput::Value(json!(["first", "second"]))));
        let envelope = gateway(&backend)
            .handle("upscale", &params(json!({"image": "https://example.com/a.png"})))
            .await;
        let Envelope::Success(ok) = envelope else { panic!("should succeed") };
        assert_eq!(ok.content_locator.as_deref(), Some("first"));
    }

    #[tokio::test]
    async fn backend_failure_is_internal_error() {
        let backend = FakeBackend::new(|| {
            Err(GatewayError::Backend { status: 422, message: "invalid version".into() })
        });
        let envelope = gateway(&backend).handle("image", &params(json!({"prompt": "p"}))).await;
        assert_eq!(envelope.status(), 500);
        let Envelope::Failure(err) = envelope else { panic!("should fail") };
        assert_eq!(err.error_kind, "backend_error");
        assert!(err.error_message.contains("invalid version"));
    }

    #[tokio::test]
    async fn null_output_is_empty_output() {
        let backend = FakeBackend::new(|| Ok(RawOutput::Value(Value::Null)));
        let envelope = gateway(&backend).handle("image", &params(json!({"prompt": "p"}))).await;
        assert_eq!(envelope.status(), 500);
        assert!(matches!(envelope, Envelope::Failure(ref e) if e.error_kind == "empty_output"));
    }

    #[tokio::test]
    async fn degraded_result_fails_unless_allowed() {
        let weird = || -> Result<RawOutput, GatewayError> {
            Ok(RawOutput::Value(json!({"status": "succeeded"})))
        };

        let strict = gateway(&FakeBackend::new(weird));
        let envelope = strict.handle("image", &params(json!({"prompt": "p"}))).await;
        assert!(matches!(envelope, Envelope::Failure(ref e) if e.error_kind == "normalization_error"));

        let lenient = Gateway::new(FakeBackend::new(weird), GatewayOptions { allow_degraded: true });
        let envelope = lenient.handle("image", &params(json!({"prompt": "p"}))).await;
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["degraded"], true);
        assert!(json["contentLocator"].as_str().unwrap().starts_with("data:application/json;base64,"));
    }

    #[test]
    fn error_envelope_serializes_message_and_kind() {
        let err = GatewayError::Validation("prompt is required".into());
        let json = serde_json::to_value(Envelope::Failure(ErrorEnvelope::from(&err))).unwrap();
        assert_eq!(
            json,
            json!({"errorMessage": "prompt is required", "errorKind": "validation_error"})
        );
    }
}
