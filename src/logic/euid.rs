use parking_lot::Mutex;
use std::collections::HashMap;

use crate::error::{CoreError, CoreResult};
use crate::model::{validate_prefix, Euid};

/// Per-prefix monotonic counter producing external identifiers of the
/// form `<prefix><n>`. Each registered prefix owns an independent
/// counter; `next` is an atomic increment-and-read, so concurrent
/// callers on the same prefix observe strictly increasing values.
/// Allocated values are never handed out twice, even when the owning
/// row is later soft-deleted or the surrounding transaction aborts.
#[derive(Debug, Default)]
pub struct EuidAllocator {
    counters: Mutex<HashMap<String, u64>>,
}

impl EuidAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a prefix with a configurable start value (first issued
    /// number). Re-registering an existing prefix keeps its counter:
    /// resetting would allow reuse.
    pub fn register_prefix(&self, prefix: &str, start: u64) -> CoreResult<()> {
        validate_prefix(prefix)?;
        if start == 0 {
            return Err(CoreError::Configuration {
                message: format!("start value for prefix {} must be positive", prefix),
            });
        }
        self.counters
            .lock()
            .entry(prefix.to_string())
            .or_insert(start);
        Ok(())
    }

    pub fn is_registered(&self, prefix: &str) -> bool {
        self.counters.lock().contains_key(prefix)
    }

    /// Allocate the next identifier for `prefix`. An unregistered
    /// prefix is a configuration error, fatal for the category.
    pub fn next(&self, prefix: &str) -> CoreResult<Euid> {
        let mut counters = self.counters.lock();
        let counter = counters
            .get_mut(prefix)
            .ok_or_else(|| CoreError::Configuration {
                message: format!("no EUID prefix registered for {:?}", prefix),
            })?;
        let n = *counter;
        *counter += 1;
        Ok(Euid::from_parts(prefix, n))
    }
}
