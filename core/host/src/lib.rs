//! Capability interface consumed by the zone-scheduler core from its
//! JavaScript engine collaborator.
//!
//! Nothing in this crate executes JavaScript. It only describes the shape
//! the scheduler core (`vmzone_core`) needs from whatever embeds a real
//! engine: something that can own an isolate, evaluate bootstrap source,
//! resolve a module/function pair into a callable, and invoke it with an
//! opaque argument payload. A reference, non-JavaScript implementation of
//! these traits lives in `vmzone_runtime` and is used by the scheduler's own
//! tests and by the CLI host.

mod result;
mod spec;
mod worker_id;

pub mod engine;

pub use result::{ResultCode, TaskResult};
pub use spec::{CallOptions, FunctionSpec, TransportContext};
pub use worker_id::WorkerId;
