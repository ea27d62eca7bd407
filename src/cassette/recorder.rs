//! Records interactions into a cassette file.

use std::path::{Path, PathBuf};

use chrono::Utc;

use super::format::{Cassette, Interaction};

/// Collects the interactions of one session and writes them as a YAML
/// cassette when the session ends.
#[derive(Debug)]
pub struct CassetteRecorder {
    path: PathBuf,
    name: String,
    commit: String,
    interactions: Vec<Interaction>,
}

impl CassetteRecorder {
    /// Create a recorder that will write to `path`.
    pub fn new(
        path: impl Into<PathBuf>,
        name: impl Into<String>,
        commit: impl Into<String>,
    ) -> Self {
        Self { path: path.into(), name: name.into(), commit: commit.into(), interactions: Vec::new() }
    }

    /// Create a recorder for a new session of `port`, written to
    /// `<root>/<timestamp>/<port>.cassette.yaml`.
    pub fn session(root: &Path, port: &str, commit: impl Into<String>) -> Self {
        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S").to_string();
        let path = root.join(&timestamp).join(format!("{port}.cassette.yaml"));
        Self::new(path, format!("{timestamp}-{port}"), commit)
    }

    /// Where the cassette will be written.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append an interaction; its `seq` is its position in the session.
    pub fn record(
        &mut self,
        port: impl Into<String>,
        method: impl Into<String>,
        input: serde_json::Value,
        output: serde_json::Value,
    ) {
        let seq = self.interactions.len() as u64;
        self.interactions.push(Interaction {
            seq,
            port: port.into(),
            method: method.into(),
            input,
            output,
        });
    }

    /// Number of interactions recorded so far.
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Whether nothing has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }

    /// End the session and write the cassette, creating its directory.
    ///
    /// A session with no interactions writes nothing and returns `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the cassette cannot be encoded or written.
    pub fn finish(self) -> Result<Option<PathBuf>, std::io::Error> {
        if self.interactions.is_empty() {
            tracing::info!(cassette = %self.name, "no interactions recorded, nothing to save");
            return Ok(None);
        }
        let count = self.interactions.len();
        let cassette = Cassette {
            name: self.name,
            recorded_at: Utc::now(),
            commit: self.commit,
            interactions: self.interactions,
        };
        let yaml = serde_yaml::to_string(&cassette).map_err(std::io::Error::other)?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, yaml)?;
        tracing::debug!(path = %self.path.display(), interactions = count, "cassette written");
        Ok(Some(self.path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn record_and_finish() {
        let dir = std::env::temp_dir().join("mediagate_cassette_test");
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("test.cassette.yaml");

        let mut recorder = CassetteRecorder::new(&path, "test-recording", "deadbeef");
        assert!(recorder.is_empty());
        recorder.record(
            "model_backend",
            "run",
            json!({"model": "black-forest-labs/flux-1.1-pro", "input": {"prompt": "a cat"}}),
            json!({"Ok": {"value": "https://x/cat.webp"}}),
        );
        recorder.record(
            "model_backend",
            "run",
            json!({"model": "wan-video/wan-2.1-1.3b", "input": {"prompt": "a dog"}}),
            json!({"Ok": {"stream": {"chunks": ["AAE="]}}}),
        );
        assert_eq!(recorder.len(), 2);

        let result_path = recorder.finish().expect("finish should succeed");
        assert_eq!(result_path.as_deref(), Some(path.as_path()));

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("model_backend"));
        assert!(content.contains("a cat"));
        assert!(content.contains("a dog"));

        let cassette: super::super::format::Cassette = serde_yaml::from_str(&content).unwrap();
        assert_eq!(cassette.interactions.len(), 2);
        assert_eq!(cassette.interactions[0].seq, 0);
        assert_eq!(cassette.interactions[1].seq, 1);
        assert_eq!(cassette.commit, "deadbeef");

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn session_path_is_timestamped_per_port() {
        let root = Path::new("/tmp/mediagate-sessions");
        let recorder = CassetteRecorder::session(root, "model_backend", "abc");
        let path = recorder.path();
        assert!(path.starts_with(root));
        assert_eq!(path.file_name().unwrap(), "model_backend.cassette.yaml");
        assert_eq!(path.parent().unwrap().parent().unwrap(), root);
    }

    #[test]
    fn empty_session_writes_nothing() {
        let dir = std::env::temp_dir().join("mediagate_cassette_empty_session");
        let _ = std::fs::remove_dir_all(&dir);
        let recorder = CassetteRecorder::session(&dir, "model_backend", "abc");
        assert!(recorder.finish().unwrap().is_none());
        assert!(!dir.exists());
    }
}
