use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use vmzone_host::{FunctionSpec, TaskResult};

use crate::completion::Completion;

/// Per-invocation state shared between the submitter, the executing worker,
/// and (for timeout-decorated calls) the watchdog timer.
///
/// Created by the submitter with `{spec, callback}`; resolved exactly once
/// by whichever of those agents reaches completion first.
pub struct CallContext {
    spec: FunctionSpec,
    completion: Completion,
}

impl CallContext {
    #[must_use]
    pub fn new(spec: FunctionSpec, callback: impl FnOnce(TaskResult) + Send + 'static) -> Arc<Self> {
        Arc::new(Self {
            spec,
            completion: Completion::new(callback),
        })
    }

    #[must_use]
    pub fn spec(&self) -> &FunctionSpec {
        &self.spec
    }

    /// Resolves the context with `result`. Returns `true` if this call won
    /// the single-shot race.
    pub fn resolve(&self, result: TaskResult) -> bool {
        self.completion.complete(result)
    }

    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.completion.is_done()
    }

    pub(crate) fn on_settle(&self, hook: impl FnOnce() + Send + 'static) {
        self.completion.on_settle(hook);
    }
}

impl fmt::Debug for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallContext")
            .field("module", &self.spec.module)
            .field("function", &self.spec.function)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Builds `count` `CallContext`s that share one "last writer wins" result
/// slot and callback, per `Zone::broadcast`'s documented semantics: the
/// callback fires exactly once, when the last of the `count` contexts
/// resolves, carrying whichever result resolved most recently (not
/// necessarily the one that made the counter hit zero).
pub(crate) fn broadcast_contexts(
    spec: &FunctionSpec,
    count: usize,
    callback: impl FnOnce(TaskResult) + Send + 'static,
) -> Vec<Arc<CallContext>> {
    let state = Arc::new(BroadcastState {
        remaining: AtomicUsize::new(count),
        last_result: Mutex::new(None),
        callback: Mutex::new(Some(Box::new(callback))),
    });

    (0..count)
        .map(|_| {
            let state = state.clone();
            CallContext::new(spec.clone(), move |result| state.record(result))
        })
        .collect()
}

struct BroadcastState {
    remaining: AtomicUsize,
    last_result: Mutex<Option<TaskResult>>,
    callback: Mutex<Option<Box<dyn FnOnce(TaskResult) + Send>>>,
}

impl BroadcastState {
    fn record(&self, result: TaskResult) {
        *self.last_result.lock().unwrap() = Some(result);
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            let result = self
                .last_result
                .lock()
                .unwrap()
                .take()
                .expect("just stored a result above");
            if let Some(callback) = self.callback.lock().unwrap().take() {
                callback(result);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as Counter;
    use vmzone_host::ResultCode;

    #[test]
    fn broadcast_fires_once_with_last_result() {
        let fired = Arc::new(Counter::new(0));
        let fired2 = fired.clone();
        let spec = FunctionSpec::new("m", "f");
        let contexts = broadcast_contexts(&spec, 3, move |result| {
            fired2.fetch_add(1, Ordering::SeqCst);
            assert_eq!(result.code, ResultCode::ExecutionError);
        });

        contexts[0].resolve(TaskResult::success(Vec::new()));
        contexts[1].resolve(TaskResult::success(Vec::new()));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        contexts[2].resolve(TaskResult::error(ResultCode::ExecutionError, "boom"));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
