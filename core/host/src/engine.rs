//! The capability interface itself.
//!
//! An `Isolate` owns a `ModuleRegistry`; resolving a module/function pair
//! against the registry yields a `Callable`; invoking a `Callable` yields
//! either an immediate result or a `PendingCall` the worker polls during its
//! event-loop pump phase. None of these traits know anything about
//! JavaScript — that knowledge lives entirely in whoever implements them.

use crate::TransportContext;

/// Failure resolving `(module, function)` against a registry.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ResolveError {
    #[error("module not found: {0}")]
    ModuleNotFound(String),
    #[error("function not found: {module}.{function}")]
    FunctionNotFound { module: String, function: String },
}

/// Failure compiling or first-turn-executing a bootstrap/eval source.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct EvalError(pub String);

/// Failure invoking a resolved callable, or settling a pending one.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
#[error("{0}")]
pub struct CallError(pub String);

/// What invoking a `Callable` produced.
pub enum Outcome {
    /// The call completed synchronously with a marshalled return value.
    Ready(Vec<u8>),
    /// The call returned a promise-like; the worker polls the handle from
    /// its event loop until it settles.
    Pending(Box<dyn PendingCall>),
}

/// A call whose result isn't available yet.
///
/// `poll` is only ever called from the owning worker's thread, between
/// tasks, during the event-loop pump phase.
pub trait PendingCall: Send {
    fn poll(&mut self) -> Option<Result<Vec<u8>, CallError>>;
}

/// A resolved, invocable module function.
pub trait Callable: Send {
    fn invoke(
        &mut self,
        arguments: &[u8],
        transport_context: TransportContext,
    ) -> Result<Outcome, CallError>;
}

/// The engine collaborator's module loader.
pub trait ModuleRegistry: Send {
    fn resolve(
        &mut self,
        module: &str,
        function: &str,
    ) -> Result<Box<dyn Callable>, ResolveError>;

    fn evaluate(&mut self, source: &str, origin: &str) -> Result<(), EvalError>;
}

/// A single JavaScript isolate, touched by exactly one worker thread.
pub trait Isolate: Send {
    fn module_registry(&mut self) -> &mut dyn ModuleRegistry;

    /// Drains one round of pending microtasks/expired timers.
    ///
    /// Returns whether it did any work; the worker keeps calling this until
    /// it returns `false` (quiescent) or a new task arrives on the queue.
    fn pump_microtasks(&mut self) -> bool;
}
