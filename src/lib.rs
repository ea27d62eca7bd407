//! Mediagate - a generation gateway for hosted media models.
//!
//! A request names an operation (`image`, `video`, `character`, `upscale`)
//! and carries loosely-typed parameters. The [`gateway::Gateway`] validates
//! them, routes them to a model, invokes the [`ports::ModelBackend`] and
//! normalizes whatever comes back into content locators.

pub mod adapters;
pub mod cassette;
pub mod cli;
pub mod config;
pub mod context;
pub mod data_uri;
pub mod error;
pub mod gateway;
pub mod normalize;
pub mod operation;
pub mod ports;
pub mod routing;
pub mod server;
pub mod validate;
