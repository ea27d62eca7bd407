//! Record/replay infrastructure for deterministic testing.

pub mod config;
pub mod format;
pub mod recorder;
pub mod replayer;
