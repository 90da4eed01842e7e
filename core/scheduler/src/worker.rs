use std::collections::VecDeque;
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, trace, warn};

use vmzone_host::engine::{Isolate, PendingCall};
use vmzone_host::{ResultCode, TaskResult, WorkerId};

use crate::call_context::CallContext;
use crate::error::HostError;
use crate::scheduler::IdleTracker;
use crate::task::Task;
use crate::timer::TimerService;

/// Builds the isolate a worker owns, on that worker's own thread.
///
/// This doubles as the "setup hook" §4.2 describes: constructing the
/// isolate and its module registry together, before the worker reports
/// `idle` and accepts its first task.
pub type IsolateFactory = Arc<dyn Fn(WorkerId) -> Box<dyn Isolate> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WorkerState {
    Starting,
    Idle,
    Busy,
    Draining,
    Stopped,
}

struct QueueState {
    tasks: VecDeque<Task>,
    capacity: Option<usize>,
    shutdown: bool,
    state: WorkerState,
}

struct WorkerQueue {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

impl WorkerQueue {
    fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                tasks: VecDeque::new(),
                capacity,
                shutdown: false,
                state: WorkerState::Starting,
            }),
            condvar: Condvar::new(),
        }
    }

    fn push(&self, task: Task) -> Result<(), HostError> {
        let mut state = self.state.lock().unwrap();
        if let Some(capacity) = state.capacity {
            if state.tasks.len() >= capacity {
                return Err(HostError::QueueFull);
            }
        }
        state.tasks.push_back(task);
        drop(state);
        self.condvar.notify_one();
        Ok(())
    }

    fn len(&self) -> usize {
        self.state.lock().unwrap().tasks.len()
    }

    fn has_pending(&self) -> bool {
        !self.state.lock().unwrap().tasks.is_empty()
    }

    fn set_state(&self, next: WorkerState) {
        self.state.lock().unwrap().state = next;
    }

    fn request_shutdown(&self) {
        self.state.lock().unwrap().shutdown = true;
        self.condvar.notify_all();
    }

    /// Blocks until either a task is available or shutdown has been
    /// requested, in which case the remaining queue is drained and
    /// returned for the caller to resolve with `terminated`.
    fn wait(&self) -> WaitOutcome {
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(task) = state.tasks.pop_front() {
                return WaitOutcome::Task(task);
            }
            if state.shutdown {
                return WaitOutcome::Drain(state.tasks.drain(..).collect());
            }
            state = self.condvar.wait(state).unwrap();
        }
    }
}

enum WaitOutcome {
    Task(Task),
    Drain(Vec<Task>),
}

/// Per-invocation context a `Task::execute` is given: the worker's own
/// isolate, the process-wide timer service, and the slot to register a
/// `CallTask` whose result didn't settle synchronously.
pub(crate) struct WorkerCx<'a> {
    isolate: &'a mut dyn Isolate,
    timers: &'a TimerService,
    pending: &'a mut Vec<(Arc<CallContext>, Box<dyn PendingCall>)>,
}

impl<'a> WorkerCx<'a> {
    pub(crate) fn isolate(&mut self) -> &mut dyn Isolate {
        self.isolate
    }

    pub(crate) fn timers(&self) -> &TimerService {
        self.timers
    }

    pub(crate) fn register_pending(&mut self, context: Arc<CallContext>, pending: Box<dyn PendingCall>) {
        self.pending.push((context, pending));
    }
}

/// An external handle to a running worker: its submission queue and the
/// join handle reaped at zone teardown.
pub(crate) struct WorkerHandle {
    id: WorkerId,
    queue: Arc<WorkerQueue>,
    join_handle: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub(crate) fn spawn(
        id: WorkerId,
        factory: IsolateFactory,
        timers: Arc<TimerService>,
        idle: Arc<IdleTracker>,
        queue_capacity: Option<usize>,
    ) -> Self {
        let queue = Arc::new(WorkerQueue::new(queue_capacity));
        let thread_queue = queue.clone();

        let join_handle = thread::Builder::new()
            .name(format!("vmzone-{id}"))
            .spawn(move || run(id, thread_queue, factory, timers, idle))
            .expect("failed to spawn worker thread");

        Self {
            id,
            queue,
            join_handle: Some(join_handle),
        }
    }

    pub(crate) fn id(&self) -> WorkerId {
        self.id
    }

    pub(crate) fn enqueue(&self, task: Task) -> Result<(), HostError> {
        self.queue.push(task)
    }

    pub(crate) fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn has_pending(&self) -> bool {
        self.queue.has_pending()
    }

    /// Requests shutdown and joins the worker thread. Idempotent.
    pub(crate) fn shutdown(&mut self) {
        self.queue.request_shutdown();
        if let Some(handle) = self.join_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run(
    id: WorkerId,
    queue: Arc<WorkerQueue>,
    factory: IsolateFactory,
    timers: Arc<TimerService>,
    idle: Arc<IdleTracker>,
) {
    let mut isolate = factory(id);
    debug!("{id} starting: isolate constructed");

    queue.set_state(WorkerState::Idle);
    idle.mark_idle(id);

    let mut pending: Vec<(Arc<CallContext>, Box<dyn PendingCall>)> = Vec::new();

    loop {
        let task = match queue.wait() {
            WaitOutcome::Task(task) => task,
            WaitOutcome::Drain(drained) => {
                queue.set_state(WorkerState::Draining);
                warn!("{id} draining {} task(s) on shutdown", drained.len());
                for leftover in drained {
                    terminate(leftover);
                }
                queue.set_state(WorkerState::Stopped);
                break;
            }
        };

        idle.mark_busy(id);
        queue.set_state(WorkerState::Busy);
        debug!("{id} busy");

        let mut cx = WorkerCx {
            isolate: isolate.as_mut(),
            timers: &timers,
            pending: &mut pending,
        };
        task.execute(&mut cx);

        pump_until_quiescent(isolate.as_mut(), &mut pending, &queue);

        // `pump_until_quiescent` returns early once the queue has a
        // task waiting; stay marked busy in that case so the idle
        // tracker never hands this already-backlogged worker a second
        // task while a genuinely idle worker sits unused.
        if queue.has_pending() {
            trace!("{id} has queued work, skipping idle transition");
            continue;
        }

        queue.set_state(WorkerState::Idle);
        debug!("{id} idle");
        idle.mark_idle(id);
    }
}

/// Drains microtasks/timers and polls outstanding pending calls until the
/// isolate is quiescent, a new task arrives, or every pending call has been
/// polled at least once this cycle with no forward progress.
fn pump_until_quiescent(
    isolate: &mut dyn Isolate,
    pending: &mut Vec<(Arc<CallContext>, Box<dyn PendingCall>)>,
    queue: &WorkerQueue,
) {
    loop {
        let before = pending.len();
        pending.retain_mut(|(context, call)| match call.poll() {
            None => true,
            Some(Ok(payload)) => {
                context.resolve(TaskResult::success(payload));
                false
            }
            Some(Err(err)) => {
                context.resolve(TaskResult::error(ResultCode::ExecutionError, err.0));
                false
            }
        });
        let settled_some = pending.len() < before;

        let did_work = isolate.pump_microtasks();

        if queue.has_pending() {
            trace!("worker pump yielding to newly queued task");
            return;
        }
        if !did_work && !settled_some {
            if pending.is_empty() {
                return;
            }
            // Still waiting on a pending call with nothing to pump; avoid a
            // hot spin while it settles asynchronously.
            thread::sleep(Duration::from_millis(1));
        }
    }
}

fn terminate(task: Task) {
    // Force the task into its terminal state without an isolate to run on;
    // `TimeoutDecorator` and leaf tasks both resolve via the same
    // single-shot completion, so this just wins whichever race was still
    // outstanding.
    task.terminate();
}
