use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{Arc, Condvar, Mutex, OnceLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// The ambient timer thread backing every `TimeoutDecorator` in a process.
///
/// One `TimerService` is shared process-wide (see [`crate::zone`]); arming a
/// timer and cancelling it are both lock-free from the caller's perspective
/// beyond a brief mutex acquisition, matching the submission-path
/// suspension budget the scheduler itself holds to.
pub(crate) struct TimerService {
    inner: Arc<Inner>,
    join_handle: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<State>,
    condvar: Condvar,
}

struct State {
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    callbacks: HashMap<u64, Box<dyn FnOnce() + Send>>,
    next_id: u64,
    shutdown: bool,
}

pub(crate) struct TimerHandle {
    inner: Arc<Inner>,
    id: u64,
}

impl TimerHandle {
    /// Cancels the timer if it hasn't fired yet. A timer that already fired
    /// (or was already cancelled) is a no-op, matching `Completion`'s
    /// single-shot semantics.
    pub(crate) fn cancel(&self) {
        self.inner.state.lock().unwrap().callbacks.remove(&self.id);
    }
}

impl TimerService {
    pub(crate) fn start() -> Self {
        let inner = Arc::new(Inner {
            state: Mutex::new(State {
                heap: BinaryHeap::new(),
                callbacks: HashMap::new(),
                next_id: 0,
                shutdown: false,
            }),
            condvar: Condvar::new(),
        });

        let run_inner = inner.clone();
        let join_handle = thread::Builder::new()
            .name("vmzone-timer".into())
            .spawn(move || Self::run(run_inner))
            .expect("failed to spawn ambient timer thread");

        Self {
            inner,
            join_handle: Some(join_handle),
        }
    }

    pub(crate) fn arm(
        &self,
        deadline: Duration,
        callback: impl FnOnce() + Send + 'static,
    ) -> TimerHandle {
        let mut state = self.inner.state.lock().unwrap();
        let id = state.next_id;
        state.next_id += 1;
        let at = Instant::now() + deadline;
        state.heap.push(Reverse((at, id)));
        state.callbacks.insert(id, Box::new(callback));
        drop(state);
        self.inner.condvar.notify_all();

        TimerHandle {
            inner: self.inner.clone(),
            id,
        }
    }

    fn run(inner: Arc<Inner>) {
        loop {
            let mut state = inner.state.lock().unwrap();
            if state.shutdown {
                return;
            }

            loop {
                match state.heap.peek() {
                    None => {
                        state = inner.condvar.wait(state).unwrap();
                        if state.shutdown {
                            return;
                        }
                    }
                    Some(&Reverse((at, _))) => {
                        let now = Instant::now();
                        if at <= now {
                            break;
                        }
                        let (guard, _timeout) =
                            inner.condvar.wait_timeout(state, at - now).unwrap();
                        state = guard;
                        if state.shutdown {
                            return;
                        }
                    }
                }
            }

            let now = Instant::now();
            let mut due = Vec::new();
            while let Some(&Reverse((at, _))) = state.heap.peek() {
                if at > now {
                    break;
                }
                let Reverse((_, id)) = state.heap.pop().expect("just peeked");
                // A cancelled timer's callback was already removed; its
                // stale heap entry is simply dropped here rather than
                // removed eagerly on cancel.
                if let Some(callback) = state.callbacks.remove(&id) {
                    due.push(callback);
                }
            }
            drop(state);

            for callback in due {
                callback();
            }
        }
    }
}

impl Drop for TimerService {
    fn drop(&mut self) {
        self.inner.state.lock().unwrap().shutdown = true;
        self.inner.condvar.notify_all();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

static GLOBAL: OnceLock<Arc<TimerService>> = OnceLock::new();

/// The single timer thread shared by every zone in the process, matching
/// §4.3's "one ambient timer thread, not one per zone" wording.
pub(crate) fn global() -> Arc<TimerService> {
    GLOBAL.get_or_init(|| Arc::new(TimerService::start())).clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[test]
    fn fires_after_deadline() {
        let service = TimerService::start();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        service.arm(Duration::from_millis(20), move || {
            fired2.store(true, Ordering::SeqCst);
        });

        thread::sleep(Duration::from_millis(200));
        assert!(fired.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_prevents_firing() {
        let service = TimerService::start();
        let fired = Arc::new(AtomicBool::new(false));
        let fired2 = fired.clone();
        let handle = service.arm(Duration::from_millis(50), move || {
            fired2.store(true, Ordering::SeqCst);
        });
        handle.cancel();

        thread::sleep(Duration::from_millis(200));
        assert!(!fired.load(Ordering::SeqCst));
    }
}
