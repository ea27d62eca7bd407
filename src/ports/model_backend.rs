//! Model backend port: runs a named model with a parameter bag.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::GatewayError;

/// How the backend should hand back file outputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Delivery {
    /// Return hosted locators (URLs) as-is.
    Locator,
    /// Stream the bytes of a single file output.
    Stream,
}

/// A single call to the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invocation {
    /// Model identifier, `owner/name` or `owner/name:version`.
    pub model: String,
    /// Model input parameters.
    pub input: Map<String, Value>,
    /// Requested delivery of file outputs.
    pub delivery: Delivery,
}

/// Stream of byte chunks delivered by the backend.
pub type ByteStream = BoxStream<'static, Result<Bytes, GatewayError>>;

/// Raw result of a backend call, before any shape detection.
pub enum RawOutput {
    /// Encoded media delivered incrementally.
    Stream(ByteStream),
    /// A JSON value: string, array, object or null.
    Value(Value),
}

impl std::fmt::Debug for RawOutput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stream(_) => f.write_str("RawOutput::Stream(..)"),
            Self::Value(v) => f.debug_tuple("RawOutput::Value").field(v).finish(),
        }
    }
}

/// Boxed future type returned by [`ModelBackend::run`].
pub type RunFuture<'a> = Pin<Box<dyn Future<Output = Result<RawOutput, GatewayError>> + Send + 'a>>;

/// Runs generative models on an external service.
pub trait ModelBackend: Send + Sync {
    /// Run the model named by `invocation` and return its output.
    fn run(&self, invocation: &Invocation) -> RunFuture<'_>;
}

/// Serializable form of a [`RawOutput`], used by cassettes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordedOutput {
    /// Stream chunks, in delivery order.
    Stream {
        /// Chunk payloads.
        #[serde(with = "base64_chunks")]
        chunks: Vec<Vec<u8>>,
    },
    /// A JSON value returned as-is.
    Value(Value),
}

impl From<RecordedOutput> for RawOutput {
    fn from(recorded: RecordedOutput) -> Self {
        match recorded {
            RecordedOutput::Stream { chunks } => {
                let chunks = chunks.into_iter().map(|c| Ok(Bytes::from(c)));
                Self::Stream(Box::pin(futures_util::stream::iter(chunks)))
            }
            RecordedOutput::Value(value) => Self::Value(value),
        }
    }
}

/// Serde helper for serializing byte chunks as base64 strings.
mod base64_chunks {
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    /// Serialize each chunk as a base64 string.
    pub fn serialize<S: Serializer>(chunks: &[Vec<u8>], serializer: S) -> Result<S::Ok, S::Error> {
        let engine = &base64::engine::general_purpose::STANDARD;
        serializer.collect_seq(chunks.iter().map(|c| engine.encode(c)))
    }

    /// Deserialize base64 strings to chunks.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Vec<u8>>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .iter()
            .map(|s| base64::engine::general_purpose::STANDARD.decode(s))
            .collect::<Result<_, _>>()
            .map_err(serde::de::Error::custom)
    }
}
