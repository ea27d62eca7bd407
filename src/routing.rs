//! Operation-to-model routing.
//!
//! The mapping is a fixed data table: each row names the model, its fixed
//! parameters, and how file outputs should be delivered. Adding an operation
//! means adding a row.

use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::operation::Operation;
use crate::ports::{Delivery, Invocation};
use crate::validate::GenerationRequest;

/// Prompt used for upscaling when the caller supplies none.
pub const DEFAULT_UPSCALE_PROMPT: &str = "enhance this image, 4k, high quality, detailed";

/// Negative prompt sent with every upscale.
pub const UPSCALE_NEGATIVE_PROMPT: &str = "Teeth, tooth, open mouth, longbody, lowres, bad anatomy, \
bad hands, missing fingers, extra digit, fewer digits, cropped, worst quality, low quality, mutant";

/// A fixed parameter value.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fixed {
    /// Boolean flag.
    Bool(bool),
    /// Integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(&'static str),
}

impl From<Fixed> for Value {
    fn from(fixed: Fixed) -> Self {
        match fixed {
            Fixed::Bool(b) => Self::Bool(b),
            Fixed::Int(i) => Self::from(i),
            Fixed::Float(f) => Self::from(f),
            Fixed::Str(s) => Self::from(s),
        }
    }
}

/// One row of the routing table.
#[derive(Debug)]
pub struct Route {
    /// Operation served by this row.
    pub operation: Operation,
    /// Backend model identifier.
    pub model: &'static str,
    /// Delivery of file outputs.
    pub delivery: Delivery,
    /// Media type used when the output arrives as raw bytes.
    pub stream_media_type: &'static str,
    /// Parameters sent on every call, never caller-tunable.
    pub fixed: &'static [(&'static str, Fixed)],
}

/// The routing table.
pub const ROUTES: &[Route] = &[
    Route {
        operation: Operation::Image,
        model: "black-forest-labs/flux-1.1-pro",
        delivery: Delivery::Locator,
        stream_media_type: "image/webp",
        fixed: &[
            ("prompt_upsampling", Fixed::Bool(true)),
            ("aspect_ratio", Fixed::Str("1:1")),
            ("output_format", Fixed::Str("webp")),
            ("output_quality", Fixed::Int(80)),
            ("safety_tolerance", Fixed::Int(2)),
        ],
    },
    Route {
        operation: Operation::Video,
        model: "wan-video/wan-2.1-1.3b",
        delivery: Delivery::Stream,
        stream_media_type: "video/mp4",
        fixed: &[
            ("frame_num", Fixed::Int(81)),
            ("resolution", Fixed::Str("480p")),
            ("aspect_ratio", Fixed::Str("16:9")),
            ("sample_shift", Fixed::Int(8)),
            ("sample_steps", Fixed::Int(30)),
            ("sample_guide_scale", Fixed::Int(6)),
        ],
    },
    Route {
        operation: Operation::Character,
        model: "fofr/consistent-character:9c77a3c2f884193fcee4d89645f02a0b9def9434f9e03cb98460456b831c8772",
        delivery: Delivery::Locator,
        stream_media_type: "image/webp",
        fixed: &[
            ("output_format", Fixed::Str("webp")),
            ("output_quality", Fixed::Int(80)),
            ("randomise_poses", Fixed::Bool(true)),
        ],
    },
    Route {
        operation: Operation::Upscale,
        model: "fermatresearch/high-resolution-controlnet-tile:8e6a54d7b2848c48dc741a109d3fb0ea2a7f554eb4becd39a25cc532536ea975",
        delivery: Delivery::Locator,
        stream_media_type: "image/png",
        fixed: &[
            ("negative_prompt", Fixed::Str(UPSCALE_NEGATIVE_PROMPT)),
            ("lora_details_strength", Fixed::Float(-0.25)),
            ("lora_sharpness_strength", Fixed::Float(0.75)),
        ],
    },
];

/// Look up the table row for `operation`.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedOperation`] if no row serves it.
pub fn lookup(operation: Operation) -> Result<&'static Route, GatewayError> {
    ROUTES
        .iter()
        .find(|route| route.operation == operation)
        .ok_or_else(|| GatewayError::UnsupportedOperation(operation.to_string()))
}

/// Build the backend invocation for a validated request.
///
/// # Errors
///
/// Returns [`GatewayError::UnsupportedOperation`] if the operation has no route.
pub fn route(request: &GenerationRequest) -> Result<Invocation, GatewayError> {
    let route = lookup(request.operation())?;

    let mut input = Map::new();
    match request {
        GenerationRequest::Image { prompt } | GenerationRequest::Video { prompt } => {
            input.insert("prompt".into(), Value::from(prompt.as_str()));
        }
        GenerationRequest::Character { subject, prompt, number_of_outputs } => {
            input.insert("prompt".into(), Value::from(prompt.as_str()));
            input.insert("subject".into(), Value::from(subject.as_str()));
            input.insert("number_of_outputs".into(), Value::from(*number_of_outputs));
        }
        GenerationRequest::Upscale { image, prompt, creativity } => {
            input.insert("image".into(), Value::from(image.as_str()));
            let prompt = prompt.as_deref().unwrap_or(DEFAULT_UPSCALE_PROMPT);
            input.insert("prompt".into(), Value::from(prompt));
            input.insert("creativity".into(), Value::from(*creativity));
        }
    }
    for &(name, value) in route.fixed {
        input.insert(name.into(), value.into());
    }

    Ok(Invocation { model: route.model.to_string(), input, delivery: route.delivery })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn every_operation_has_exactly_one_route() {
        for op in Operation::ALL {
            assert_eq!(ROUTES.iter().filter(|r| r.operation == op).count(), 1, "{op}");
        }
    }

    #[test]
    fn fixed_parameters_never_collide_with_caller_parameters() {
        let tunable = ["prompt", "subject", "number_of_outputs", "image", "creativity"];
        for route in ROUTES {
            for (name, _) in route.fixed {
                assert!(!tunable.contains(name), "{} fixes {name}", route.operation);
            }
        }
    }

    #[test]
    fn image_route() {
        let inv = route(&GenerationRequest::Image { prompt: "a cat".into() }).unwrap();
        assert_eq!(inv.model, "black-forest-labs/flux-1.1-pro");
        assert_eq!(inv.delivery, Delivery::Locator);
        assert_eq!(inv.input["prompt"], "a cat");
        assert_eq!(inv.input["aspect_ratio"], "1:1");
        assert_eq!(inv.input["output_quality"], 80);
        assert_eq!(inv.input["prompt_upsampling"], true);
    }

    #[test]
    fn video_route_streams() {
        let inv = route(&GenerationRequest::Video { prompt: "waves".into() }).unwrap();
        assert_eq!(inv.model, "wan-video/wan-2.1-1.3b");
        assert_eq!(inv.delivery, Delivery::Stream);
        assert_eq!(inv.input["frame_num"], 81);
        assert_eq!(inv.input["resolution"], "480p");
        assert_eq!(inv.input["aspect_ratio"], "16:9");
        assert_eq!(inv.input["sample_steps"], 30);
        assert_eq!(inv.input["sample_guide_scale"], 6);
        assert_eq!(lookup(Operation::Video).unwrap().stream_media_type, "video/mp4");
    }

    #[test]
    fn character_route() {
        let inv = route(&GenerationRequest::Character {
            subject: "https://example.com/face.png".into(),
            prompt: "smiling".into(),
            number_of_outputs: 4,
        })
        .unwrap();
        assert!(inv.model.starts_with("fofr/consistent-character:"));
        assert_eq!(inv.input["number_of_outputs"], 4);
        assert_eq!(inv.input["subject"], "https://example.com/face.png");
        assert_eq!(inv.input["output_format"], "webp");
        assert_eq!(inv.input["randomise_poses"], true);
    }

    #[test]
    fn upscale_defaults_are_supplied_unchanged() {
        let inv = route(&GenerationRequest::Upscale {
            image: "https://example.com/small.png".into(),
            prompt: None,
            creativity: 0.4,
        })
        .unwrap();
        assert!(inv.model.starts_with("fermatresearch/high-resolution-controlnet-tile:"));
        assert_eq!(inv.input["prompt"], DEFAULT_UPSCALE_PROMPT);
        assert_eq!(inv.input["creativity"], 0.4);
        assert_eq!(inv.input["negative_prompt"], UPSCALE_NEGATIVE_PROMPT);
        assert_eq!(inv.input["lora_details_strength"], json!(-0.25));
        assert_eq!(inv.input["lora_sharpness_strength"], json!(0.75));
    }

    #[test]
    fn upscale_keeps_caller_prompt() {
        let inv = route(&GenerationRequest::Upscale {
            image: "https://example.com/small.png".into(),
            prompt: Some("crisp line art".into()),
            creativity: 0.9,
        })
        .unwrap();
        assert_eq!(inv.input["prompt"], "crisp line art");
        assert_eq!(inv.input["creativity"], 0.9);
    }
}
