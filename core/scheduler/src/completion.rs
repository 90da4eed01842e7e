use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use vmzone_host::TaskResult;

type Callback = Box<dyn FnOnce(TaskResult) + Send>;
type SettleHook = Box<dyn FnOnce() + Send>;

/// Single-shot completion state shared between a task's submitter, the
/// worker executing it, and (when timeout-decorated) a watchdog timer.
///
/// The first party to call [`Completion::complete`] wins; every later call
/// is a no-op. This is the compare-and-set primitive `CallContext` and
/// `EvalTask` are both built on top of.
pub(crate) struct Completion {
    done: AtomicBool,
    callback: Mutex<Option<Callback>>,
    on_settle: Mutex<Vec<SettleHook>>,
}

impl Completion {
    pub(crate) fn new(callback: impl FnOnce(TaskResult) + Send + 'static) -> Self {
        Self {
            done: AtomicBool::new(false),
            callback: Mutex::new(Some(Box::new(callback))),
            on_settle: Mutex::new(Vec::new()),
        }
    }

    /// Registers a hook to run exactly once, the moment *some* party wins
    /// the completion race — regardless of which party it was. Used by
    /// `TimeoutDecorator` to cancel its watchdog timer on early completion.
    ///
    /// Must be called before any party can possibly call `complete`, or the
    /// hook may be registered too late to run.
    pub(crate) fn on_settle(&self, hook: impl FnOnce() + Send + 'static) {
        self.on_settle.lock().unwrap().push(Box::new(hook));
    }

    /// Resolves the completion with `result`. Returns `true` if this call
    /// won the race (and therefore ran the settle hooks and the callback).
    pub(crate) fn complete(&self, result: TaskResult) -> bool {
        if self.done.swap(true, Ordering::AcqRel) {
            return false;
        }
        for hook in self.on_settle.lock().unwrap().drain(..) {
            hook();
        }
        if let Some(callback) = self.callback.lock().unwrap().take() {
            callback(result);
        }
        true
    }

    pub(crate) fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use vmzone_host::ResultCode;

    #[test]
    fn fires_exactly_once() {
        let count = Arc::new(AtomicBool::new(false));
        let count2 = count.clone();
        let completion = Completion::new(move |_result| {
            assert!(!count2.swap(true, Ordering::SeqCst), "callback ran twice");
        });

        assert!(completion.complete(TaskResult::success(Vec::new())));
        assert!(!completion.complete(TaskResult::timeout()));
        assert!(completion.is_done());
        assert!(count.load(Ordering::SeqCst));
    }

    #[test]
    fn settle_hooks_run_once_on_first_completion() {
        let hook_runs = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let hook_runs2 = hook_runs.clone();
        let completion = Completion::new(|result| assert_eq!(result.code, ResultCode::Success));
        completion.on_settle(move || {
            hook_runs2.fetch_add(1, Ordering::SeqCst);
        });

        completion.complete(TaskResult::success(Vec::new()));
        completion.complete(TaskResult::success(Vec::new()));
        assert_eq!(hook_runs.load(Ordering::SeqCst), 1);
    }
}
