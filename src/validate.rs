//! Per-operation request validation.
//!
//! Turns a raw JSON parameter object into a typed [`GenerationRequest`].
//! Nothing here touches the backend.

use std::ops::RangeInclusive;

use serde_json::{Map, Value};

use crate::data_uri;
use crate::error::GatewayError;
use crate::operation::Operation;

/// Default number of character variations.
pub const DEFAULT_NUMBER_OF_OUTPUTS: u8 = 3;
/// Default upscale creativity.
pub const DEFAULT_CREATIVITY: f64 = 0.4;

const NUMBER_OF_OUTPUTS_RANGE: RangeInclusive<i64> = 1..=5;
const CREATIVITY_RANGE: RangeInclusive<f64> = 0.1..=1.0;

/// A validated request, one variant per operation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationRequest {
    /// Text-to-image.
    Image {
        /// Prompt text.
        prompt: String,
    },
    /// Text-to-video.
    Video {
        /// Prompt text.
        prompt: String,
    },
    /// Consistent-character set.
    Character {
        /// URL or data URI of the reference subject.
        subject: String,
        /// Prompt text.
        prompt: String,
        /// How many variations to produce, 1 to 5.
        number_of_outputs: u8,
    },
    /// Image upscaling.
    Upscale {
        /// URL or data URI of the source image.
        image: String,
        /// Optional prompt; the router supplies a default when absent.
        prompt: Option<String>,
        /// Creativity scalar in `[0.1, 1.0]`.
        creativity: f64,
    },
}

impl GenerationRequest {
    /// The operation this request belongs to.
    #[must_use]
    pub fn operation(&self) -> Operation {
        match self {
            Self::Image { .. } => Operation::Image,
            Self::Video { .. } => Operation::Video,
            Self::Character { .. } => Operation::Character,
            Self::Upscale { .. } => Operation::Upscale,
        }
    }
}

/// Validate `params` against the schema of `operation`.
///
/// # Errors
///
/// Returns [`GatewayError::Validation`] describing the first failing field.
pub fn validate(
    operation: Operation,
    params: &Map<String, Value>,
) -> Result<GenerationRequest, GatewayError> {
    match operation {
        Operation::Image => Ok(GenerationRequest::Image { prompt: required_text(params, "prompt")? }),
        Operation::Video => Ok(GenerationRequest::Video { prompt: required_text(params, "prompt")? }),
        Operation::Character => Ok(GenerationRequest::Character {
            subject: media_reference(params, "subject")?,
            prompt: required_text(params, "prompt")?,
            number_of_outputs: number_of_outputs(params)?,
        }),
        Operation::Upscale => Ok(GenerationRequest::Upscale {
            image: media_reference(params, "image")?,
            prompt: optional_text(params, "prompt")?,
            creativity: creativity(params)?,
        }),
    }
}

fn invalid(message: impl Into<String>) -> GatewayError {
    GatewayError::Validation(message.into())
}

/// Fetch a field, treating JSON `null` as absent.
fn field<'a>(params: &'a Map<String, Value>, name: &str) -> Option<&'a Value> {
    params.get(name).filter(|v| !v.is_null())
}

fn optional_text(params: &Map<String, Value>, name: &str) -> Result<Option<String>, GatewayError> {
    match field(params, name) {
        None => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(_) => Err(invalid(format!("{name} must be a string"))),
    }
}

fn required_text(params: &Map<String, Value>, name: &str) -> Result<String, GatewayError> {
    optional_text(params, name)?.ok_or_else(|| invalid(format!("{name} is required")))
}

/// A required URL or data URI pointing at an image.
fn media_reference(params: &Map<String, Value>, name: &str) -> Result<String, GatewayError> {
    let value = required_text(params, name)?;
    if value.starts_with("data:") {
        let uri = data_uri::parse(&value).map_err(|e| invalid(format!("{name}: {e}")))?;
        if !uri.media_type.starts_with("image/") {
            return Err(invalid(format!(
                "{name} must be an image, got data URI of type {}",
                uri.media_type
            )));
        }
    } else if !(value.starts_with("https://") || value.starts_with("http://")) {
        return Err(invalid(format!("{name} must be an http(s) URL or a data URI")));
    }
    Ok(value)
}

fn number_of_outputs(params: &Map<String, Value>) -> Result<u8, GatewayError> {
    let Some(value) = field(params, "numberOfOutputs") else {
        return Ok(DEFAULT_NUMBER_OF_OUTPUTS);
    };
    let count = value
        .as_i64()
        .ok_or_else(|| invalid("numberOfOutputs must be an integer"))?;
    if !NUMBER_OF_OUTPUTS_RANGE.contains(&count) {
        return Err(invalid(format!(
            "numberOfOutputs must be between {} and {}, got {count}",
            NUMBER_OF_OUTPUTS_RANGE.start(),
            NUMBER_OF_OUTPUTS_RANGE.end()
        )));
    }
    u8::try_from(count).map_err(|_| invalid("numberOfOutputs is out of range"))
}

fn creativity(params: &Map<String, Value>) -> Result<f64, GatewayError> {
    let creativity = match field(params, "creativity") {
        None => return Ok(DEFAULT_CREATIVITY),
        Some(Value::Number(n)) => n.as_f64(),
        // Numeric strings are accepted, e.g. values taken straight from a form field.
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| invalid("creativity must be a number"))?;

    if !CREATIVITY_RANGE.contains(&creativity) {
        return Err(invalid(format!(
            "creativity must be between {} and {}, got {creativity}",
            CREATIVITY_RANGE.start(),
            CREATIVITY_RANGE.end()
        )));
    }
    Ok(creativity)
}
