//! CLI argument parsing with clap.

use std::path::Path;

use clap::{Args, Parser, Subcommand};
use serde_json::{Map, Value};

use crate::data_uri;
use crate::error::GatewayError;

/// Media generation gateway: one front door for image, video, character and
/// upscale models.
#[derive(Parser, Debug)]
#[command(name = "mediagate", version, about)]
pub struct Cli {
    /// What to do.
    #[command(subcommand)]
    pub command: Command,

    /// Config file path override.
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the HTTP server.
    Serve(ServeArgs),
    /// Run one operation and print the response envelope.
    Run(RunArgs),
}

/// Options for `serve`.
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Bind address (defaults to the config file's `server.host`).
    #[arg(long)]
    pub host: Option<String>,

    /// Bind port (defaults to the config file's `server.port`).
    #[arg(long)]
    pub port: Option<u16>,
}

/// Options for `run`.
#[derive(Args, Debug)]
pub struct RunArgs {
    /// Operation: image, video, character, upscale.
    pub operation: String,

    /// Text prompt.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Subject image URL or data URI (character).
    #[arg(long, conflicts_with = "subject_file")]
    pub subject: Option<String>,

    /// Subject image file, sent inline as a data URI (character).
    #[arg(long, conflicts_with = "subject")]
    pub subject_file: Option<String>,

    /// Source image URL or data URI (upscale).
    #[arg(long, conflicts_with = "image_file")]
    pub image: Option<String>,

    /// Source image file, sent inline as a data URI (upscale).
    #[arg(long, conflicts_with = "image")]
    pub image_file: Option<String>,

    /// Upscale creativity, 0.1 to 1.0.
    #[arg(short, long)]
    pub creativity: Option<f64>,

    /// Number of character images, 1 to 5.
    #[arg(short = 'n', long)]
    pub outputs: Option<i64>,
}

impl RunArgs {
    /// Build the request parameters the gateway validates.
    ///
    /// Only flags that were given are included, so the gateway's own
    /// defaults and error messages apply.
    ///
    /// # Errors
    ///
    /// Returns an error if a `--*-file` cannot be read or is not an image.
    pub fn params(&self) -> Result<Map<String, Value>, GatewayError> {
        let mut params = Map::new();
        if let Some(prompt) = &self.prompt {
            params.insert("prompt".into(), Value::String(prompt.clone()));
        }
        if let Some(subject) = media(self.subject.as_deref(), self.subject_file.as_deref())? {
            params.insert("subject".into(), Value::String(subject));
        }
        if let Some(image) = media(self.image.as_deref(), self.image_file.as_deref())? {
            params.insert("image".into(), Value::String(image));
        }
        if let Some(creativity) = self.creativity {
            params.insert("creativity".into(), Value::from(creativity));
        }
        if let Some(outputs) = self.outputs {
            params.insert("numberOfOutputs".into(), Value::from(outputs));
        }
        Ok(params)
    }
}

fn media(reference: Option<&str>, file: Option<&str>) -> Result<Option<String>, GatewayError> {
    match (reference, file) {
        (Some(reference), _) => Ok(Some(reference.to_string())),
        (None, Some(path)) => data_uri::from_file(Path::new(path)).map(Some),
        (None, None) => Ok(None),
    }
}
