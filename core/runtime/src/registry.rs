use std::sync::{Arc, Mutex};

use vmzone_host::engine::{Callable, EvalError, ModuleRegistry, Outcome, PendingCall, ResolveError};
use vmzone_host::TransportContext;

use std::time::{Duration, Instant};

/// Resolves the builtin `demo.*` and `counter.*` functions, and records
/// every source string handed to `evaluate` (bootstrap scripts, in
/// practice).
pub struct ReferenceRegistry {
    evaluated: Vec<String>,
    counter: Arc<Mutex<i64>>,
}

impl ReferenceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            evaluated: Vec::new(),
            counter: Arc::new(Mutex::new(0)),
        }
    }

    /// Sources passed to `evaluate` so far, in order.
    #[must_use]
    pub fn evaluated(&self) -> &[String] {
        &self.evaluated
    }
}

impl Default for ReferenceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ModuleRegistry for ReferenceRegistry {
    fn resolve(&mut self, module: &str, function: &str) -> Result<Box<dyn Callable>, ResolveError> {
        match module {
            "demo" => match function {
                "echo" => Ok(Box::new(EchoFn)),
                "sleep" => Ok(Box::new(SleepFn)),
                _ => Err(ResolveError::FunctionNotFound {
                    module: module.to_string(),
                    function: function.to_string(),
                }),
            },
            "counter" => match function {
                "increment" => Ok(Box::new(CounterFn {
                    state: self.counter.clone(),
                    op: CounterOp::Increment,
                })),
                "get" => Ok(Box::new(CounterFn {
                    state: self.counter.clone(),
                    op: CounterOp::Get,
                })),
                _ => Err(ResolveError::FunctionNotFound {
                    module: module.to_string(),
                    function: function.to_string(),
                }),
            },
            _ => Err(ResolveError::ModuleNotFound(module.to_string())),
        }
    }

    fn evaluate(&mut self, source: &str, _origin: &str) -> Result<(), EvalError> {
        // "fail" is a sentinel used by tests to exercise the bootstrap
        // failure path without needing a real parser to reject anything.
        if source == "fail" {
            return Err(EvalError("bootstrap script requested failure".to_string()));
        }
        self.evaluated.push(source.to_string());
        Ok(())
    }
}

struct EchoFn;

impl Callable for EchoFn {
    fn invoke(&mut self, arguments: &[u8], _transport_context: TransportContext) -> Result<Outcome, vmzone_host::engine::CallError> {
        Ok(Outcome::Ready(arguments.to_vec()))
    }
}

struct SleepFn;

impl Callable for SleepFn {
    fn invoke(&mut self, arguments: &[u8], _transport_context: TransportContext) -> Result<Outcome, vmzone_host::engine::CallError> {
        let millis = arguments
            .get(0..4)
            .and_then(|bytes| bytes.try_into().ok())
            .map(u32::from_be_bytes)
            .unwrap_or(0);
        Ok(Outcome::Pending(Box::new(SleepCall {
            deadline: Instant::now() + Duration::from_millis(u64::from(millis)),
        })))
    }
}

struct SleepCall {
    deadline: Instant,
}

impl PendingCall for SleepCall {
    fn poll(&mut self) -> Option<Result<Vec<u8>, vmzone_host::engine::CallError>> {
        if Instant::now() >= self.deadline {
            Some(Ok(Vec::new()))
        } else {
            None
        }
    }
}

enum CounterOp {
    Increment,
    Get,
}

struct CounterFn {
    state: Arc<Mutex<i64>>,
    op: CounterOp,
}

impl Callable for CounterFn {
    fn invoke(&mut self, _arguments: &[u8], _transport_context: TransportContext) -> Result<Outcome, vmzone_host::engine::CallError> {
        let mut value = self.state.lock().unwrap();
        if matches!(self.op, CounterOp::Increment) {
            *value += 1;
        }
        Ok(Outcome::Ready(value.to_le_bytes().to_vec()))
    }
}
