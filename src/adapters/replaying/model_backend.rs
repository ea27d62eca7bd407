//! Replaying adapter for the `ModelBackend` port.

use std::sync::{Arc, Mutex};

use super::{next_output, replay_result};
use crate::cassette::replayer::CassetteReplayer;
use crate::error::GatewayError;
use crate::ports::model_backend::{
    Invocation, ModelBackend, RawOutput, RecordedOutput, RunFuture,
};

/// Serves recorded backend outputs from a cassette.
pub struct ReplayingModelBackend {
    replayer: Arc<Mutex<CassetteReplayer>>,
}

impl ReplayingModelBackend {
    /// Create a replaying backend served by the given replayer.
    #[must_use]
    pub fn new(replayer: Arc<Mutex<CassetteReplayer>>) -> Self {
        Self { replayer }
    }
}

impl ModelBackend for ReplayingModelBackend {
    fn run(&self, _invocation: &Invocation) -> RunFuture<'_> {
        let output = next_output(&self.replayer, "model_backend", "run");
        Box::pin(async move {
            let output = output.map_err(|message| GatewayError::Backend { status: 0, message })?;
            replay_result::<RecordedOutput>(output)
                .map(RawOutput::from)
                .map_err(|e| replayed_error(&e.to_string()))
        })
    }
}

/// Rebuild a backend error from its recorded message.
///
/// Recorded backend errors read `Backend error (<status>): <message>`; the
/// status and bare message are restored so the replayed error displays the
/// same as the live one.
fn replayed_error(recorded: &str) -> GatewayError {
    let parsed = recorded
        .strip_prefix("Backend error (")
        .and_then(|rest| rest.split_once("): "))
        .and_then(|(status, message)| Some((status.parse::<u16>().ok()?, message)));
    match parsed {
        Some((status, message)) => GatewayError::Backend { status, message: message.to_string() },
        None => GatewayError::Backend { status: 0, message: recorded.to_string() },
    }
}
