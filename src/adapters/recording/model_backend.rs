//! Recording adapter for the `ModelBackend` port.

use std::sync::{Arc, Mutex};

use futures_util::TryStreamExt;

use super::record_result;
use crate::cassette::recorder::CassetteRecorder;
use crate::error::GatewayError;
use crate::ports::model_backend::{
    Invocation, ModelBackend, RawOutput, RecordedOutput, RunFuture,
};

/// Records backend interactions while delegating to an inner implementation.
pub struct RecordingModelBackend {
    inner: Arc<dyn ModelBackend>,
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingModelBackend {
    /// Creates a new recording backend wrapping the given implementation.
    pub fn new(inner: Arc<dyn ModelBackend>, recorder: Arc<Mutex<CassetteRecorder>>) -> Self {
        Self { inner, recorder }
    }
}

impl ModelBackend for RecordingModelBackend {
    fn run(&self, invocation: &Invocation) -> RunFuture<'_> {
        let invocation = invocation.clone();
        let recorder = Arc::clone(&self.recorder);

        Box::pin(async move {
            // Streams are drained here so their chunks can be recorded, then
            // replayed to the caller unchanged.
            let result = match self.inner.run(&invocation).await {
                Ok(RawOutput::Stream(stream)) => stream
                    .map_ok(|chunk| chunk.to_vec())
                    .try_collect::<Vec<_>>()
                    .await
                    .map(|chunks| RecordedOutput::Stream { chunks }),
                Ok(RawOutput::Value(value)) => Ok(RecordedOutput::Value(value)),
                Err(e) => Err(e),
            };
            record_result(&recorder, "model_backend", "run", &invocation, &result);
            result.map(RawOutput::from)
        })
    }
}
