//! Base64 data URIs: encoding, parsing, and file conversion.

use std::path::Path;

use base64::Engine;

use crate::error::GatewayError;

/// A decoded `data:<media-type>;base64,<payload>` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUri {
    /// Media type, e.g. `"video/mp4"`.
    pub media_type: String,
    /// Decoded payload.
    pub data: Vec<u8>,
}

/// Encode bytes as a base64 data URI tagged with `media_type`.
#[must_use]
pub fn encode(media_type: &str, data: &[u8]) -> String {
    let payload = base64::engine::general_purpose::STANDARD.encode(data);
    format!("data:{media_type};base64,{payload}")
}

/// Parse a base64 data URI.
///
/// # Errors
///
/// Returns an error if the value is not a `data:` URI, is not base64-encoded,
/// or its payload does not decode.
pub fn parse(uri: &str) -> Result<DataUri, String> {
    let rest = uri.strip_prefix("data:").ok_or("not a data URI")?;
    let (header, payload) = rest.split_once(',').ok_or("data URI has no payload separator")?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or("only base64-encoded data URIs are supported")?;
    if media_type.is_empty() {
        return Err("data URI has no media type".to_string());
    }
    let data = base64::engine::general_purpose::STANDARD
        .decode(payload)
        .map_err(|e| format!("invalid base64 payload: {e}"))?;
    Ok(DataUri { media_type: media_type.to_string(), data })
}

/// Read an image file and convert it to a data URI.
///
/// The media type is sniffed from the file contents, not the extension.
///
/// # Errors
///
/// Returns an error if the file cannot be read or is not a recognized image.
pub fn from_file(path: &Path) -> Result<String, GatewayError> {
    let data = std::fs::read(path)?;
    let format = image::guess_format(&data).map_err(|e| {
        GatewayError::Validation(format!("{} is not a supported image: {e}", path.display()))
    })?;
    Ok(encode(format.to_mime_type(), &data))
}
