use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use vmzone_host::WorkerId;

use crate::error::HostError;
use crate::task::Task;
use crate::timer::TimerService;
use crate::worker::{IsolateFactory, WorkerHandle};

/// Tracks which workers are currently idle, so `Scheduler::schedule` can
/// prefer handing work to one over probing every worker's queue length.
///
/// A worker pushes its own id when it goes idle and is marked busy the
/// instant it's handed a task. A popped id that the busy bit now disagrees
/// with is stale — the worker moved on since it queued itself up — and is
/// simply discarded in favor of the next candidate.
pub(crate) struct IdleTracker {
    queue: Mutex<VecDeque<WorkerId>>,
    busy: Vec<AtomicBool>,
}

impl IdleTracker {
    fn new(worker_count: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::new()),
            busy: (0..worker_count).map(|_| AtomicBool::new(true)).collect(),
        }
    }

    pub(crate) fn mark_idle(&self, id: WorkerId) {
        self.busy[id.index()].store(false, Ordering::Release);
        self.queue.lock().unwrap().push_back(id);
    }

    pub(crate) fn mark_busy(&self, id: WorkerId) {
        self.busy[id.index()].store(true, Ordering::Release);
    }

    fn pop_idle(&self) -> Option<WorkerId> {
        let mut queue = self.queue.lock().unwrap();
        while let Some(id) = queue.pop_front() {
            if !self.busy[id.index()].load(Ordering::Acquire) {
                return Some(id);
            }
        }
        None
    }
}

/// Owns a zone's fixed worker pool and routes tasks onto it.
///
/// Routing prefers an idle worker; lacking one, it falls back to the
/// shortest queue, breaking ties toward the lowest `WorkerId` so routing
/// stays deterministic under equal load. Submission never blocks: a full
/// bounded queue is reported back as [`HostError::QueueFull`] rather than
/// waited on.
pub(crate) struct Scheduler {
    workers: Vec<WorkerHandle>,
    idle: Arc<IdleTracker>,
}

impl Scheduler {
    pub(crate) fn start(
        worker_count: u32,
        factory: IsolateFactory,
        timers: Arc<TimerService>,
        queue_capacity: Option<usize>,
    ) -> Self {
        let idle = Arc::new(IdleTracker::new(worker_count as usize));
        let workers = (0..worker_count)
            .map(|index| {
                WorkerHandle::spawn(
                    WorkerId::new(index),
                    factory.clone(),
                    timers.clone(),
                    idle.clone(),
                    queue_capacity,
                )
            })
            .collect();

        Self { workers, idle }
    }

    pub(crate) fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Routes `task` onto the worker chosen by the idle-first/shortest-queue
    /// policy. Non-blocking for the caller.
    pub(crate) fn schedule(&self, task: Task) -> Result<(), HostError> {
        let target = self.idle.pop_idle().unwrap_or_else(|| self.shortest_queue());
        self.schedule_on_worker(target, task)
    }

    pub(crate) fn schedule_on_worker(&self, id: WorkerId, task: Task) -> Result<(), HostError> {
        let worker = self
            .workers
            .get(id.index())
            .ok_or(HostError::WorkerOutOfRange(id))?;
        worker.enqueue(task)
    }

    /// Used by `Zone::broadcast`: every worker receives its own copy of the
    /// work "together", none skipped because another looked idle first.
    pub(crate) fn schedule_on_all_workers(
        &self,
        mut tasks: Vec<Task>,
    ) -> Result<(), HostError> {
        assert_eq!(tasks.len(), self.workers.len(), "one task per worker");
        for worker in &self.workers {
            let task = tasks.remove(0);
            worker.enqueue(task)?;
        }
        Ok(())
    }

    fn shortest_queue(&self) -> WorkerId {
        self.workers
            .iter()
            .min_by_key(|worker| worker.queue_len())
            .map(WorkerHandle::id)
            .expect("at least one worker")
    }

    pub(crate) fn shutdown(&mut self) {
        for worker in &mut self.workers {
            worker.shutdown();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;
    use vmzone_runtime::ReferenceIsolate;

    fn factory() -> IsolateFactory {
        Arc::new(|_id| Box::new(ReferenceIsolate::new()) as Box<dyn vmzone_host::engine::Isolate>)
    }

    #[test]
    fn idle_tracker_discards_stale_entries() {
        let tracker = IdleTracker::new(2);
        tracker.mark_idle(WorkerId::new(0));
        tracker.mark_idle(WorkerId::new(1));
        // Worker 0 became busy again without ever being popped; its queue
        // entry is now stale and must be skipped, not handed out twice.
        tracker.mark_busy(WorkerId::new(0));

        assert_eq!(tracker.pop_idle(), Some(WorkerId::new(1)));
        assert_eq!(tracker.pop_idle(), None);
    }

    #[test]
    fn routes_eval_tasks_and_reports_results() {
        let timers = Arc::new(TimerService::start());
        let scheduler = Scheduler::start(2, factory(), timers, None);

        let (tx, rx) = mpsc::channel();
        let task = crate::task::EvalTask::new("", "origin", move |result| {
            tx.send(result).unwrap();
        });
        scheduler.schedule(task.into()).unwrap();

        let result = rx.recv_timeout(Duration::from_secs(1)).unwrap();
        assert!(result.code.is_success());
    }
}
