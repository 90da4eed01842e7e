use std::fmt;

/// Dense index of a worker within a zone, in `[0, settings.workers)`.
///
/// Assigned at zone creation and stable for the zone's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WorkerId(u32);

impl WorkerId {
    #[must_use]
    pub const fn new(index: u32) -> Self {
        Self(index)
    }

    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "worker#{}", self.0)
    }
}

impl From<usize> for WorkerId {
    fn from(index: usize) -> Self {
        Self(u32::try_from(index).expect("worker index overflowed u32"))
    }
}
