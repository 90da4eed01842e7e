use std::collections::HashMap;
use std::sync::{Mutex, OnceLock, Weak};

use crate::error::HostError;
use crate::zone::Zone;

/// Process-wide zone directory: `Zone::create` reserves a name under this
/// lock and `Zone::get` resolves one back to a live handle.
///
/// Holds only `Weak` references. A zone with no outstanding `ZoneHandle`
/// is gone even if its name is still sitting in the map; lookups reap the
/// stale entry rather than handing back a zone nobody holds anymore.
struct Registry {
    zones: Mutex<HashMap<String, Weak<Zone>>>,
}

static REGISTRY: OnceLock<Registry> = OnceLock::new();

fn registry() -> &'static Registry {
    REGISTRY.get_or_init(|| Registry {
        zones: Mutex::new(HashMap::new()),
    })
}

/// Reserves `id` for a zone under construction. The caller must insert the
/// constructed zone with [`insert`] or the reservation is simply dropped
/// (no entry survives a failed construction).
pub(crate) fn reserve(id: &str) -> Result<(), HostError> {
    let mut zones = registry().zones.lock().unwrap();
    if let Some(existing) = zones.get(id) {
        if existing.strong_count() > 0 {
            return Err(HostError::ZoneAlreadyExists(id.to_string()));
        }
    }
    zones.insert(id.to_string(), Weak::new());
    Ok(())
}

pub(crate) fn insert(id: &str, zone: &std::sync::Arc<Zone>) {
    registry()
        .zones
        .lock()
        .unwrap()
        .insert(id.to_string(), std::sync::Arc::downgrade(zone));
}

pub(crate) fn remove_reservation(id: &str) {
    registry().zones.lock().unwrap().remove(id);
}

pub(crate) fn get(id: &str) -> Option<std::sync::Arc<Zone>> {
    registry().zones.lock().unwrap().get(id)?.upgrade()
}
