//! Output normalization.
//!
//! A backend answers with bytes, a URL string, a list of URLs, or some JSON
//! object. [`BackendResult`] fixes the shape the moment the raw output is
//! received; [`normalize`] turns that shape into content locators.

use futures_util::StreamExt;
use serde_json::Value;

use crate::data_uri;
use crate::error::GatewayError;
use crate::operation::{MediaKind, Operation};
use crate::ports::RawOutput;
use crate::routing;

/// Media type of the degraded locator built from an unrecognized object.
const DEGRADED_MEDIA_TYPE: &str = "application/json";

/// Conventional locator fields, checked in order.
const LOCATOR_FIELDS: [&str; 2] = ["url", "output"];

/// A backend result with its shape made explicit.
#[derive(Debug, Clone, PartialEq)]
pub enum BackendResult {
    /// Encoded media, read to completion from a stream.
    Bytes(Vec<u8>),
    /// A single locator string.
    Text(String),
    /// Several locator strings, in backend order.
    List(Vec<String>),
    /// Any other JSON value.
    Structured(Value),
    /// Nothing at all.
    Empty,
}

/// A locator the UI can resolve without calling the backend again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentLocator(String);

impl ContentLocator {
    /// The locator text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the content is inlined as a data URI.
    #[must_use]
    pub fn is_data_uri(&self) -> bool {
        self.0.starts_with("data:")
    }
}

impl From<ContentLocator> for String {
    fn from(locator: ContentLocator) -> Self {
        locator.0
    }
}

/// Canonical output of normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
    /// One or more locators, in backend order.
    pub locators: Vec<ContentLocator>,
    /// Kind of media the locators resolve to.
    pub media_kind: MediaKind,
    /// Set when no locator could be found and the raw object was inlined.
    pub degraded: bool,
}

impl BackendResult {
    /// Materialize a raw output, reading a byte stream to completion.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Normalization`] if the stream yields an error.
    pub async fn materialize(raw: RawOutput) -> Result<Self, GatewayError> {
        match raw {
            RawOutput::Value(value) => Ok(Self::from_value(value)),
            RawOutput::Stream(mut stream) => {
                let mut chunks = Vec::new();
                while let Some(chunk) = stream.next().await {
                    let chunk = chunk.map_err(|e| {
                        GatewayError::Normalization(format!("output stream failed: {e}"))
                    })?;
                    chunks.push(chunk);
                }
                Ok(Self::Bytes(chunks.concat()))
            }
        }
    }

    /// Classify a JSON value.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => Self::Empty,
            Value::String(s) => Self::Text(s),
            Value::Array(items) if items.iter().all(Value::is_string) && !items.is_empty() => {
                Self::List(
                    items
                        .into_iter()
                        .filter_map(|v| match v {
                            Value::String(s) => Some(s),
                            _ => None,
                        })
                        .collect(),
                )
            }
            other => Self::Structured(other),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "byte stream",
            Self::Text(_) => "string",
            Self::List(_) => "list",
            Self::Structured(_) => "object",
            Self::Empty => "null",
        }
    }
}

/// Convert a materialized backend result into content locators.
///
/// Pure: the same result always yields the same locators.
///
/// # Errors
///
/// Returns [`GatewayError::EmptyOutput`] if no locator can be extracted and
/// [`GatewayError::UnsupportedOperation`] if `operation` has no route.
pub fn normalize(result: &BackendResult, operation: Operation) -> Result<Normalized, GatewayError> {
    let media_kind = operation.media_kind();
    let empty = || GatewayError::EmptyOutput(format!("{} result for {operation}", result.describe()));

    let (locators, degraded) = match result {
        BackendResult::Bytes(data) if data.is_empty() => return Err(empty()),
        BackendResult::Bytes(data) => {
            let media_type = routing::lookup(operation)?.stream_media_type;
            (vec![data_uri::encode(media_type, data)], false)
        }
        BackendResult::Text(text) => (vec![non_blank(text).ok_or_else(empty)?], false),
        BackendResult::List(items) => {
            let locators = items
                .iter()
                .map(|item| non_blank(item))
                .collect::<Option<Vec<_>>>()
                .ok_or_else(empty)?;
            (locators, false)
        }
        BackendResult::Structured(value) => match locator_field(value) {
            Some(locator) => (vec![locator], false),
            None if is_blank(value) => return Err(empty()),
            None => {
                let serialized = value.to_string();
                (vec![data_uri::encode(DEGRADED_MEDIA_TYPE, serialized.as_bytes())], true)
            }
        },
        BackendResult::Empty => return Err(empty()),
    };

    Ok(Normalized {
        locators: locators.into_iter().map(ContentLocator).collect(),
        media_kind,
        degraded,
    })
}

/// The text unchanged, unless it is blank.
fn non_blank(text: &str) -> Option<String> {
    (!text.trim().is_empty()).then(|| text.to_string())
}

fn locator_field(value: &Value) -> Option<String> {
    let object = value.as_object()?;
    LOCATOR_FIELDS
        .iter()
        .find_map(|field| object.get(*field).and_then(Value::as_str).and_then(non_blank))
}

/// Values with nothing worth inlining.
fn is_blank(value: &Value) -> bool {
    match value {
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Null | Value::Bool(_) | Value::Number(_) => true,
        Value::String(s) => s.trim().is_empty(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use serde_json::json;

    fn stream_of(chunks: &[&'static [u8]]) -> RawOutput {
        let items: Vec<Result<Bytes, GatewayError>> =
            chunks.iter().map(|c| Ok(Bytes::from_static(c))).collect();
        RawOutput::Stream(Box::pin(futures_util::stream::iter(items)))
    }

    fn locators(n: &Normalized) -> Vec<&str> {
        n.locators.iter().map(ContentLocator::as_str).collect()
    }

    #[tokio::test]
    async fn stream_chunks_concatenate_in_order() {
        let result =
            BackendResult::materialize(stream_of(&[b"\x00\x01", b"\x02", b"\x03\x04"])).await.unwrap();
        assert_eq!(result, BackendResult::Bytes(vec![0, 1, 2, 3, 4]));

        let n = normalize(&result, Operation::Video).unwrap();
        assert_eq!(locators(&n), vec!["data:video/mp4;base64,AAECAwQ="]);
        assert_eq!(n.media_kind, MediaKind::Video);
        assert!(!n.degraded);

        let decoded = data_uri::parse(n.locators[0].as_str()).unwrap();
        assert_eq!(decoded.media_type, "video/mp4");
        assert_eq!(decoded.data, vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn failing_stream_is_normalization_error() {
        let items: Vec<Result<Bytes, GatewayError>> = vec![
            Ok(Bytes::from_static(b"abc")),
            Err(GatewayError::Backend { status: 0, message: "connection reset".into() }),
        ];
        let raw = RawOutput::Stream(Box::pin(futures_util::stream::iter(items)));
        let err = BackendResult::materialize(raw).await.unwrap_err();
        assert!(matches!(err, GatewayError::Normalization(ref m) if m.contains("connection reset")));
    }

    #[tokio::test]
    async fn empty_stream_is_empty_output() {
        let result = BackendResult::materialize(stream_of(&[])).await.unwrap();
        assert!(matches!(normalize(&result, Operation::Video), Err(GatewayError::EmptyOutput(_))));
    }

    #[test]
    fn bytes_use_operation_media_type() {
        let n = normalize(&BackendResult::Bytes(vec![1]), Operation::Upscale).unwrap();
        assert!(n.locators[0].as_str().starts_with("data:image/png;base64,"));
        assert!(n.locators[0].is_data_uri());
        assert_eq!(n.media_kind, MediaKind::Image);
    }

    #[test]
    fn plain_string_is_the_locator() {
        let result = BackendResult::from_value(json!("https://cdn.example.com/out.webp"));
        let n = normalize(&result, Operation::Image).unwrap();
        assert_eq!(locators(&n), vec!["https://cdn.example.com/out.webp"]);
        assert!(!n.locators[0].is_data_uri());
    }

    #[test]
    fn locator_text_is_not_rewritten() {
        let n = normalize(&BackendResult::Text(" https://x/y.webp\n".into()), Operation::Image)
            .unwrap();
        assert_eq!(locators(&n), vec![" https://x/y.webp\n"]);

        let result = BackendResult::from_value(json!(["urlA ", " urlB"]));
        let n = normalize(&result, Operation::Character).unwrap();
        assert_eq!(locators(&n), vec!["urlA ", " urlB"]);
    }

    #[test]
    fn string_list_preserves_order() {
        let result = BackendResult::from_value(json!(["urlA", "urlB", "urlC"]));
        assert!(matches!(result, BackendResult::List(_)));
        let n = normalize(&result, Operation::Character).unwrap();
        assert_eq!(locators(&n), vec!["urlA", "urlB", "urlC"]);
    }

    #[test]
    fn object_url_field() {
        let result = BackendResult::from_value(json!({"url": "https://x/y.png", "output": "z"}));
        let n = normalize(&result, Operation::Image).unwrap();
        assert_eq!(locators(&n), vec!["https://x/y.png"]);
        assert!(!n.degraded);
    }

    #[test]
    fn object_output_field() {
        let result = BackendResult::from_value(json!({"output": "https://x/z.png"}));
        let n = normalize(&result, Operation::Upscale).unwrap();
        assert_eq!(locators(&n), vec!["https://x/z.png"]);
    }

    #[test]
    fn unrecognized_object_is_degraded() {
        let result = BackendResult::from_value(json!({"status": "done", "files": 1}));
        let n = normalize(&result, Operation::Image).unwrap();
        assert!(n.degraded);
        let decoded = data_uri::parse(n.locators[0].as_str()).unwrap();
        assert_eq!(decoded.media_type, "application/json");
        let round: Value = serde_json::from_slice(&decoded.data).unwrap();
        assert_eq!(round, json!({"status": "done", "files": 1}));
    }

    #[test]
    fn empty_results_never_succeed() {
        for value in [json!(null), json!(""), json!("  "), json!([]), json!({}), json!(42), json!(false)] {
            let result = BackendResult::from_value(value.clone());
            assert!(
                matches!(normalize(&result, Operation::Image), Err(GatewayError::EmptyOutput(_))),
                "{value} should be empty output"
            );
        }
    }

    #[test]
    fn blank_list_entry_is_empty_output() {
        let result = BackendResult::from_value(json!(["urlA", ""]));
        assert!(matches!(normalize(&result, Operation::Character), Err(GatewayError::EmptyOutput(_))));
    }

    #[test]
    fn normalization_is_idempotent() {
        let results = [
            BackendResult::Bytes(vec![9, 8, 7]),
            BackendResult::from_value(json!("https://x/a.png")),
            BackendResult::from_value(json!(["a", "b"])),
            BackendResult::from_value(json!({"weird": true})),
        ];
        for result in &results {
            let first = normalize(result, Operation::Video).unwrap();
            let second = normalize(result, Operation::Video).unwrap();
            assert_eq!(first, second);
        }
    }
}
