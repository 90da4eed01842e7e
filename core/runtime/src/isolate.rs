use vmzone_host::engine::{Isolate, ModuleRegistry};

use crate::registry::ReferenceRegistry;

/// A reference `Isolate`: one `ReferenceRegistry`, no real microtask queue
/// to pump. `pump_microtasks` always reports "no work done", since every
/// builtin here either resolves synchronously or through `PendingCall`
/// polling rather than a microtask queue.
pub struct ReferenceIsolate {
    registry: ReferenceRegistry,
}

impl ReferenceIsolate {
    #[must_use]
    pub fn new() -> Self {
        Self {
            registry: ReferenceRegistry::new(),
        }
    }

    /// Sources this isolate has evaluated so far, in order.
    #[must_use]
    pub fn evaluated(&self) -> &[String] {
        self.registry.evaluated()
    }
}

impl Default for ReferenceIsolate {
    fn default() -> Self {
        Self::new()
    }
}

impl Isolate for ReferenceIsolate {
    fn module_registry(&mut self) -> &mut dyn ModuleRegistry {
        &mut self.registry
    }

    fn pump_microtasks(&mut self) -> bool {
        false
    }
}
