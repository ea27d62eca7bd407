//! Port traits defining external boundaries.
//!
//! Each trait represents a boundary between the gateway core and an
//! external system. Implementations live in `src/adapters/`.

pub mod model_backend;

pub use model_backend::{
    ByteStream, Delivery, Invocation, ModelBackend, RawOutput, RecordedOutput, RunFuture,
};
