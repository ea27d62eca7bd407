//! Live adapters that call real backend APIs.

pub mod replicate;
