//! Service context that bundles all port trait objects.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::adapters::live::replicate::ReplicateBackend;
use crate::adapters::recording::model_backend::RecordingModelBackend;
use crate::adapters::replaying::model_backend::ReplayingModelBackend;
use crate::cassette::config::load_cassette;
use crate::cassette::recorder::CassetteRecorder;
use crate::config::{Config, TOKEN_ENV};
use crate::error::GatewayError;
use crate::ports::ModelBackend;

/// Directory recording sessions are written under.
const CASSETTE_ROOT: &str = ".mediagate/cassettes";

/// Bundles all port trait objects into a single context.
pub struct ServiceContext {
    /// Model backend port.
    pub backend: Arc<dyn ModelBackend>,
}

/// Handle to a recording session that must be finished after use.
pub struct RecordingSession {
    recorder: Arc<Mutex<CassetteRecorder>>,
}

impl RecordingSession {
    /// Finish the recording and write the cassette to disk. Returns the
    /// cassette path, or `None` when nothing was recorded.
    ///
    /// Every clone of the recording backend must be dropped first.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be written.
    pub fn finish(self) -> Result<Option<PathBuf>, String> {
        let recorder = Arc::try_unwrap(self.recorder)
            .map_err(|_| "Recording adapter still has references".to_string())?
            .into_inner()
            .map_err(|e| format!("Recorder lock poisoned: {e}"))?;
        recorder.finish().map_err(|e| format!("Failed to write cassette: {e}"))
    }
}

impl ServiceContext {
    /// Create a live context against the Replicate API.
    ///
    /// # Errors
    ///
    /// Returns an error if the API token is not configured.
    pub fn live(config: &Config) -> Result<Self, GatewayError> {
        let key = config.replicate_key().ok_or(GatewayError::MissingApiKey {
            provider: "Replicate".into(),
            env_var: TOKEN_ENV.into(),
        })?;
        let backend = ReplicateBackend::new(key, config.api_base()).with_polling(
            Duration::from_millis(config.backend.poll_interval_ms),
            Duration::from_secs(config.backend.poll_timeout_secs),
        );
        Ok(Self { backend: Arc::new(backend) })
    }

    /// Create a recording context that wraps a live adapter with a recorder.
    ///
    /// # Errors
    ///
    /// Returns an error if the live backend cannot be built.
    pub fn recording(config: &Config) -> Result<(Self, RecordingSession), GatewayError> {
        let live_ctx = Self::live(config)?;

        let recorder =
            CassetteRecorder::session(Path::new(CASSETTE_ROOT), "model_backend", get_commit_hash());
        tracing::debug!(path = %recorder.path().display(), "recording session started");
        let recorder = Arc::new(Mutex::new(recorder));

        let backend = RecordingModelBackend::new(live_ctx.backend, Arc::clone(&recorder));

        Ok((Self { backend: Arc::new(backend) }, RecordingSession { recorder }))
    }

    /// Create a replaying context from a cassette file.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette file cannot be loaded.
    pub fn replaying(path: &Path) -> Result<Self, GatewayError> {
        let replayer = load_cassette(path)?;
        let backend = ReplayingModelBackend::new(Arc::new(Mutex::new(replayer)));
        Ok(Self { backend: Arc::new(backend) })
    }
}

/// Get the current git commit hash, or "unknown" if unavailable.
fn get_commit_hash() -> String {
    std::process::Command::new("git")
        .args(["rev-parse", "HEAD"])
        .output()
        .ok()
        .filter(|o| o.status.success())
        .and_then(|o| String::from_utf8(o.stdout).ok())
        .map_or_else(|| "unknown".to_string(), |s| s.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_without_token_is_missing_api_key() {
        if std::env::var(TOKEN_ENV).is_ok() {
            return;
        }
        let err = ServiceContext::live(&Config::default()).err().unwrap();
        assert!(matches!(err, GatewayError::MissingApiKey { .. }));
        assert!(err.to_string().contains(TOKEN_ENV));
    }

    #[test]
    fn live_with_configured_token() {
        let mut config = Config::default();
        config.keys.replicate = Some("r8_test".into());
        assert!(ServiceContext::live(&config).is_ok());
    }

    #[test]
    fn replaying_missing_cassette_is_config_error() {
        let err = ServiceContext::replaying(Path::new("/nonexistent/x.cassette.yaml")).err().unwrap();
        assert!(matches!(err, GatewayError::Config(_)));
        assert!(err.to_string().contains("Failed to load cassette /nonexistent/x.cassette.yaml"));
    }
}
