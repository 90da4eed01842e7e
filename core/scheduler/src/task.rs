use std::sync::Arc;
use std::time::Duration;

use log::debug;

use vmzone_host::engine::Outcome;
use vmzone_host::{ResultCode, TaskResult};

use crate::call_context::CallContext;
use crate::completion::Completion;
use crate::worker::WorkerCx;

/// An opaque unit of work executed on a worker thread.
///
/// `Eval` and `Call` are the two leaf variants; `Timeout` is a decorator
/// that races a watchdog timer against whichever leaf it wraps. All three
/// share the property that `execute` never returns a value — results flow
/// out through the wrapped completion exactly once.
pub enum Task {
    Eval(EvalTask),
    Call(CallTask),
    Timeout { inner: Box<Task>, deadline: Duration },
}

impl Task {
    /// Wraps this task in a `TimeoutDecorator` with the given deadline.
    #[must_use]
    pub fn with_timeout(self, deadline: Duration) -> Self {
        Task::Timeout {
            inner: Box::new(self),
            deadline,
        }
    }

    pub(crate) fn execute(self, cx: &mut WorkerCx<'_>) {
        match self {
            Task::Eval(task) => task.execute(cx),
            Task::Call(task) => task.execute(cx),
            Task::Timeout { inner, deadline } => {
                let handle = inner.completion_handle();
                let for_timer = handle.clone();
                let timer = cx.timers().arm(deadline, move || {
                    for_timer.resolve_timeout();
                });
                // Registered before `inner.execute` runs, so there is no
                // window where `complete` could fire before this hook
                // exists to cancel the timer.
                handle.on_settle(move || timer.cancel());
                inner.execute(cx);
            }
        }
    }

    fn completion_handle(&self) -> CompletionHandle {
        match self {
            Task::Eval(task) => CompletionHandle::Eval(task.completion.clone()),
            Task::Call(task) => CompletionHandle::Call(task.context.clone()),
            Task::Timeout { inner, .. } => inner.completion_handle(),
        }
    }

    /// Resolves this task (and, transitively, whatever it decorates) with
    /// `Terminated`, without ever touching a worker's isolate. Used when a
    /// worker shuts down with tasks still queued.
    pub(crate) fn terminate(self) {
        self.completion_handle().resolve_terminated();
    }
}

impl From<EvalTask> for Task {
    fn from(task: EvalTask) -> Self {
        Task::Eval(task)
    }
}

impl From<CallTask> for Task {
    fn from(task: CallTask) -> Self {
        Task::Call(task)
    }
}

/// Bridges `EvalTask`'s bare `Completion` and `CallTask`'s `CallContext` so
/// `TimeoutDecorator` can race either uniformly without knowing which one
/// it wraps.
#[derive(Clone)]
enum CompletionHandle {
    Eval(Arc<Completion>),
    Call(Arc<CallContext>),
}

impl CompletionHandle {
    fn on_settle(&self, hook: impl FnOnce() + Send + 'static) {
        match self {
            CompletionHandle::Eval(completion) => completion.on_settle(hook),
            CompletionHandle::Call(context) => context.on_settle(hook),
        }
    }

    fn resolve_timeout(&self) {
        let won = match self {
            CompletionHandle::Eval(completion) => completion.complete(TaskResult::timeout()),
            CompletionHandle::Call(context) => context.resolve(TaskResult::timeout()),
        };
        if won {
            debug!("timeout fired, task resolved as Timeout");
        }
    }

    fn resolve_terminated(&self) {
        match self {
            CompletionHandle::Eval(completion) => {
                completion.complete(TaskResult::terminated());
            }
            CompletionHandle::Call(context) => {
                context.resolve(TaskResult::terminated());
            }
        }
    }
}

/// Evaluates a source string under an origin on the worker's isolate.
///
/// Broadcast-style: no value is returned on success, only a `ResultCode`.
pub struct EvalTask {
    source: String,
    origin: String,
    completion: Arc<Completion>,
}

impl EvalTask {
    pub fn new(
        source: impl Into<String>,
        origin: impl Into<String>,
        callback: impl FnOnce(TaskResult) + Send + 'static,
    ) -> Self {
        Self {
            source: source.into(),
            origin: origin.into(),
            completion: Arc::new(Completion::new(callback)),
        }
    }

    fn execute(self, cx: &mut WorkerCx<'_>) {
        let result = match cx
            .isolate()
            .module_registry()
            .evaluate(&self.source, &self.origin)
        {
            Ok(()) => TaskResult::success(Vec::new()),
            Err(err) => TaskResult::error(ResultCode::ExecutionError, err.0),
        };
        self.completion.complete(result);
    }
}

/// Resolves `spec.module`/`spec.function`, unmarshals the argument payload
/// and invokes the function, attaching a pending-call handle to the
/// worker's event loop if the call doesn't settle synchronously.
pub struct CallTask {
    context: Arc<CallContext>,
}

impl CallTask {
    #[must_use]
    pub fn new(context: Arc<CallContext>) -> Self {
        Self { context }
    }

    fn execute(self, cx: &mut WorkerCx<'_>) {
        let spec = self.context.spec().clone();
        let registry = cx.isolate().module_registry();

        let mut callable = match registry.resolve(&spec.module, &spec.function) {
            Ok(callable) => callable,
            Err(vmzone_host::engine::ResolveError::ModuleNotFound(module)) => {
                self.context
                    .resolve(TaskResult::error(ResultCode::ModuleNotFound, module));
                return;
            }
            Err(vmzone_host::engine::ResolveError::FunctionNotFound { function, .. }) => {
                self.context
                    .resolve(TaskResult::error(ResultCode::FunctionNotFound, function));
                return;
            }
        };

        match callable.invoke(&spec.arguments, spec.options.transport_context) {
            Err(err) => {
                self.context
                    .resolve(TaskResult::error(ResultCode::ExecutionError, err.0));
            }
            Ok(Outcome::Ready(payload)) => {
                self.context.resolve(TaskResult::success(payload));
            }
            Ok(Outcome::Pending(pending)) => {
                cx.register_pending(self.context.clone(), pending);
            }
        }
    }
}
