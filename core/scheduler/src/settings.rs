/// Construction-time configuration for a [`crate::Zone`].
///
/// `id` must be unique within the process registry; everything else has a
/// sane default suitable for tests and the reference engine.
#[derive(Debug, Clone)]
pub struct ZoneSettings {
    id: String,
    workers: u32,
    queue_capacity: Option<usize>,
    default_timeout_ms: u32,
}

impl ZoneSettings {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            workers: 2,
            queue_capacity: None,
            default_timeout_ms: 0,
        }
    }

    #[must_use]
    pub fn with_workers(mut self, workers: u32) -> Self {
        assert!(workers > 0, "a zone needs at least one worker");
        self.workers = workers;
        self
    }

    /// Bounds each worker's task queue. `None` (the default) leaves it
    /// unbounded, matching the original spec's silence on backpressure.
    #[must_use]
    pub fn with_queue_capacity(mut self, capacity: Option<usize>) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Applied to any `FunctionSpec` submitted with `options.timeout_ms ==
    /// 0`; `0` here means "no default", i.e. untimed.
    #[must_use]
    pub fn with_default_timeout_ms(mut self, timeout_ms: u32) -> Self {
        self.default_timeout_ms = timeout_ms;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn workers(&self) -> u32 {
        self.workers
    }

    #[must_use]
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_capacity
    }

    #[must_use]
    pub fn default_timeout_ms(&self) -> u32 {
        self.default_timeout_ms
    }
}
