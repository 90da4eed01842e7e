use std::sync::mpsc;
use std::sync::Arc;
use std::time::Duration;

use log::{error, info};

use vmzone_host::{CallOptions, FunctionSpec, ResultCode, TaskResult, WorkerId};

use crate::call_context::{broadcast_contexts, CallContext};
use crate::error::HostError;
use crate::registry;
use crate::scheduler::Scheduler;
use crate::settings::ZoneSettings;
use crate::task::{CallTask, EvalTask, Task};
use crate::timer;
use crate::worker::IsolateFactory;

/// Shared state behind every [`ZoneHandle`] pointing at the same zone:
/// the worker pool, the process-wide timer service, and the settings it
/// was created with.
///
/// Removed from the process registry when the last `ZoneHandle` is
/// dropped; its workers are joined at that point too.
pub struct Zone {
    settings: ZoneSettings,
    scheduler: Scheduler,
}

impl Zone {
    fn effective_timeout(&self, options: &CallOptions) -> Option<Duration> {
        let millis = if options.timeout_ms == 0 {
            self.settings.default_timeout_ms()
        } else {
            options.timeout_ms
        };
        (millis > 0).then(|| Duration::from_millis(u64::from(millis)))
    }
}

impl Drop for Zone {
    fn drop(&mut self) {
        info!("zone '{}' tearing down", self.settings.id());
        self.scheduler.shutdown();
        registry::remove_reservation(self.settings.id());
    }
}

/// The named, reference-counted façade callers interact with.
///
/// Cloning a `ZoneHandle` is cheap and shares the same underlying `Zone`;
/// the zone itself is only torn down once every clone (and every entry
/// `Zone::get` could still resolve to) has been dropped.
#[derive(Clone)]
pub struct ZoneHandle(Arc<Zone>);

impl std::fmt::Debug for ZoneHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZoneHandle").finish_non_exhaustive()
    }
}

impl ZoneHandle {
    /// Reserves `settings.id()` in the process registry, starts the worker
    /// pool, and — if `bootstrap` is given — evaluates it on every worker
    /// before returning, failing the whole creation if any worker's
    /// evaluation errors.
    pub fn create(
        settings: ZoneSettings,
        factory: IsolateFactory,
        bootstrap: Option<&str>,
    ) -> Result<Self, HostError> {
        registry::reserve(settings.id())?;

        let scheduler = Scheduler::start(
            settings.workers(),
            factory,
            timer::global(),
            settings.queue_capacity(),
        );

        let zone = Arc::new(Zone { settings, scheduler });

        if let Some(source) = bootstrap {
            if let Err(err) = run_bootstrap(&zone, source) {
                // `zone`'s Drop joins the workers and frees the reservation.
                return Err(err);
            }
        }

        registry::insert(zone.settings.id(), &zone);
        info!(
            "zone '{}' ready with {} worker(s)",
            zone.settings.id(),
            zone.scheduler.worker_count()
        );
        Ok(Self(zone))
    }

    /// Looks up a previously created, still-live zone by id.
    pub fn get(id: &str) -> Result<Self, HostError> {
        registry::get(id)
            .map(Self)
            .ok_or_else(|| HostError::ZoneNotFound(id.to_string()))
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.0.settings.id()
    }

    #[must_use]
    pub fn settings(&self) -> &ZoneSettings {
        &self.0.settings
    }

    /// Routes a single call onto one worker, chosen by the scheduler's
    /// routing policy. `callback` fires exactly once.
    pub fn execute(
        &self,
        spec: FunctionSpec,
        callback: impl FnOnce(TaskResult) + Send + 'static,
    ) -> Result<(), HostError> {
        let timeout = self.0.effective_timeout(&spec.options);
        let context = CallContext::new(spec, callback);
        let task: Task = CallTask::new(context).into();
        let task = match timeout {
            Some(deadline) => task.with_timeout(deadline),
            None => task,
        };
        self.0.scheduler.schedule(task)
    }

    /// Sends the call to every worker in the zone "together" (none skipped
    /// because another looked idle first); `callback` fires exactly once,
    /// when the last worker settles, carrying that last settlement's
    /// result.
    pub fn broadcast(
        &self,
        spec: FunctionSpec,
        callback: impl FnOnce(TaskResult) + Send + 'static,
    ) -> Result<(), HostError> {
        let timeout = self.0.effective_timeout(&spec.options);
        let worker_count = self.0.scheduler.worker_count();
        let contexts = broadcast_contexts(&spec, worker_count, callback);

        let tasks = contexts
            .into_iter()
            .map(|context| {
                let task: Task = CallTask::new(context).into();
                match timeout {
                    Some(deadline) => task.with_timeout(deadline),
                    None => task,
                }
            })
            .collect();

        self.0.scheduler.schedule_on_all_workers(tasks)
    }
}

fn run_bootstrap(zone: &Arc<Zone>, source: &str) -> Result<(), HostError> {
    let worker_count = zone.scheduler.worker_count();
    let (tx, rx) = mpsc::channel();

    let tasks: Vec<Task> = (0..worker_count)
        .map(|index| {
            let tx = tx.clone();
            let id = WorkerId::new(u32::try_from(index).expect("worker count fits u32"));
            EvalTask::new(source, "bootstrap", move |result| {
                let _ = tx.send((id, result));
            })
            .into()
        })
        .collect();
    drop(tx);

    zone.scheduler.schedule_on_all_workers(tasks)?;

    for _ in 0..worker_count {
        match rx.recv() {
            Ok((_worker, result)) if result.code == ResultCode::Success => {}
            Ok((worker, result)) => {
                error!("bootstrap failed on {worker}: {}", result.message());
                return Err(HostError::BootstrapFailed {
                    worker,
                    message: result.message(),
                });
            }
            Err(_) => unreachable!("every scheduled bootstrap task resolves its callback"),
        }
    }

    Ok(())
}
