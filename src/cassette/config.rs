//! Cassette loading.

use std::path::Path;

use super::format::Cassette;
use super::replayer::CassetteReplayer;
use crate::error::GatewayError;

/// Port and method every gateway interaction is recorded under.
const BACKEND_CALL: (&str, &str) = ("model_backend", "run");

/// Load a cassette file and create a replayer over its interactions.
///
/// A cassette without backend calls still loads, with a warning: every
/// request replayed from it will fail as exhausted.
///
/// # Errors
///
/// Returns [`GatewayError::Config`] if the file cannot be read or parsed.
pub fn load_cassette(path: &Path) -> Result<CassetteReplayer, GatewayError> {
    let failed = |e: &dyn std::fmt::Display| {
        GatewayError::Config(format!("Failed to load cassette {}: {e}", path.display()))
    };
    let content = std::fs::read_to_string(path).map_err(|e| failed(&e))?;
    let cassette: Cassette = serde_yaml::from_str(&content).map_err(|e| failed(&e))?;

    let calls = backend_calls(&cassette);
    if calls == 0 {
        tracing::warn!(cassette = %cassette.name, "cassette holds no model_backend::run interactions");
    } else {
        tracing::debug!(cassette = %cassette.name, commit = %cassette.commit, calls, "cassette loaded");
    }
    Ok(CassetteReplayer::new(&cassette))
}

fn backend_calls(cassette: &Cassette) -> usize {
    cassette
        .interactions
        .iter()
        .filter(|i| (i.port.as_str(), i.method.as_str()) == BACKEND_CALL)
        .count()
}
