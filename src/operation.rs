//! The closed set of logical operations and the media kinds they produce.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::GatewayError;

/// A logical generation operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Text-to-image.
    Image,
    /// Text-to-video.
    Video,
    /// Consistent-character set from a subject image.
    Character,
    /// Image upscaling.
    Upscale,
}

/// Kind of media a locator resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    /// Still image.
    Image,
    /// Video clip.
    Video,
}

impl Operation {
    /// All operations, in table order.
    pub const ALL: [Self; 4] = [Self::Image, Self::Video, Self::Character, Self::Upscale];

    /// The wire tag for this operation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Image => "image",
            Self::Video => "video",
            Self::Character => "character",
            Self::Upscale => "upscale",
        }
    }

    /// The media kind this operation produces.
    #[must_use]
    pub fn media_kind(self) -> MediaKind {
        match self {
            Self::Video => MediaKind::Video,
            Self::Image | Self::Character | Self::Upscale => MediaKind::Image,
        }
    }

    /// Whether callers receive a list of locators rather than one.
    #[must_use]
    pub fn is_multi_output(self) -> bool {
        self == Self::Character
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = GatewayError;

    fn from_str(tag: &str) -> Result<Self, Self::Err> {
        let tag = tag.trim();
        Self::ALL
            .into_iter()
            .find(|op| op.as_str().eq_ignore_ascii_case(tag))
            .ok_or_else(|| GatewayError::UnsupportedOperation(tag.to_string()))
    }
}
