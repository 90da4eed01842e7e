//! A non-JavaScript reference implementation of `vmzone_host`'s engine
//! traits.
//!
//! This is a test and demo fixture, not an engine: it never parses or
//! executes real JavaScript. It exists so `vmzone_core`'s own tests (and
//! the CLI's demo mode) have a concrete `Isolate` to schedule tasks onto.
//!
//! Exposes a handful of builtin functions:
//! - `demo.echo` returns its argument bytes unchanged, synchronously.
//! - `demo.sleep` takes a big-endian `u32` millisecond count and resolves
//!   asynchronously once that much time has passed, exercising the
//!   pending-call/event-loop path.
//! - `counter.increment` / `counter.get` mutate per-isolate state, to
//!   demonstrate that state does not leak across workers.

mod isolate;
mod registry;

pub use isolate::ReferenceIsolate;
pub use registry::ReferenceRegistry;
