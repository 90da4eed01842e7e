/// Rust-level error for the synchronous submission-path APIs.
///
/// This is distinct from [`crate::ResultCode`], which is the wire-level
/// outcome carried through a task's completion callback. `HostError` is
/// returned directly to the caller of a fallible, non-blocking call such as
/// `Zone::create` or `Scheduler::schedule_on_worker`.
#[derive(Debug, thiserror::Error)]
pub enum HostError {
    #[error("zone id already in use: {0}")]
    ZoneAlreadyExists(String),

    #[error("zone not found: {0}")]
    ZoneNotFound(String),

    #[error("worker id out of range: {0}")]
    WorkerOutOfRange(crate::WorkerId),

    #[error("worker queue is full")]
    QueueFull,

    #[error("bootstrap evaluation failed on {worker}: {message}")]
    BootstrapFailed {
        worker: crate::WorkerId,
        message: String,
    },
}
