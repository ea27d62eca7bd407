//! Unified error type for the gateway.

use thiserror::Error;

/// Errors that can occur while serving a generation request.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The backend returned an error response or a failed prediction.
    #[error("Backend error ({status}): {message}")]
    Backend {
        /// HTTP status code, or 0 when the failure did not come from HTTP.
        status: u16,
        /// Error message from the backend.
        message: String,
    },

    /// A network error occurred while talking to the backend.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("Config error: {0}")]
    Config(String),

    /// No API key configured for the backend.
    #[error("No API key for {provider}. Set {env_var} or add it to config file.")]
    MissingApiKey {
        /// The provider name.
        provider: String,
        /// The environment variable name.
        env_var: String,
    },

    /// Caller input failed the per-operation schema.
    #[error("{0}")]
    Validation(String),

    /// The operation tag is not one of the supported operations.
    #[error("Unsupported operation '{0}'. Expected one of: image, video, character, upscale")]
    UnsupportedOperation(String),

    /// The backend succeeded but produced nothing usable.
    #[error("Backend returned no usable output: {0}")]
    EmptyOutput(String),

    /// The backend output could not be interpreted.
    #[error("Could not interpret backend output: {0}")]
    Normalization(String),
}

/// Coarse classification of a [`GatewayError`] as seen by callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Missing credential or unreadable configuration.
    Configuration,
    /// Request failed validation.
    Validation,
    /// Unknown operation tag.
    UnsupportedOperation,
    /// The backend call failed.
    Backend,
    /// The backend returned nothing usable.
    EmptyOutput,
    /// The backend returned something that could not be interpreted.
    Normalization,
    /// Local I/O failure.
    Internal,
}

impl ErrorKind {
    /// Stable identifier used in error envelopes.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Configuration => "configuration_error",
            Self::Validation => "validation_error",
            Self::UnsupportedOperation => "unsupported_operation",
            Self::Backend => "backend_error",
            Self::EmptyOutput => "empty_output",
            Self::Normalization => "normalization_error",
            Self::Internal => "internal_error",
        }
    }

    /// HTTP status code reported for this kind.
    #[must_use]
    pub fn status(self) -> u16 {
        match self {
            Self::Validation | Self::UnsupportedOperation => 400,
            _ => 500,
        }
    }
}

impl GatewayError {
    /// Classify this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::MissingApiKey { .. } => ErrorKind::Configuration,
            Self::Validation(_) => ErrorKind::Validation,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Backend { .. } | Self::Network(_) => ErrorKind::Backend,
            Self::EmptyOutput(_) => ErrorKind::EmptyOutput,
            Self::Normalization(_) => ErrorKind::Normalization,
            Self::Io(_) => ErrorKind::Internal,
        }
    }
}
