use std::collections::HashMap;
use std::sync::Mutex;

use crate::lock_utils::lock_recover;

#[derive(Debug, Clone, Copy, Default)]
struct ModelHealth {
    consecutive_errors: u32,
    disabled: bool,
}

/// Per-model failure state shared by every in-flight request. Owned by the
/// gateway (not a module static) so tests construct isolated instances.
///
/// Invariant: a model is disabled exactly when its consecutive-error count
/// has reached the threshold; any success resets both.
#[derive(Debug)]
pub struct HealthTracker {
    error_threshold: u32,
    table: Mutex<HashMap<String, ModelHealth>>,
}

impl HealthTracker {
    pub fn new(error_threshold: u32) -> Self {
        Self {
            error_threshold: error_threshold.max(1),
            table: Mutex::new(HashMap::new()),
        }
    }

    pub fn record_success(&self, model_id: &str) {
        let mut table = lock_recover(&self.table, "health_table");
        // Dropping the entry instead of zeroing keeps the table bounded by
        // the set of currently-degraded models.
        table.remove(model_id);
    }

    pub fn record_failure(&self, model_id: &str) {
        let mut table = lock_recover(&self.table, "health_table");
        let entry = table.entry(model_id.to_string()).or_default();
        entry.consecutive_errors = entry.consecutive_errors.saturating_add(1);
        if entry.consecutive_errors >= self.error_threshold && !entry.disabled {
            entry.disabled = true;
            log::warn!(
                "model disabled after {} consecutive errors: {}",
                entry.consecutive_errors,
                model_id
            );
        }
    }

    pub fn is_available(&self, model_id: &str) -> bool {
        let table = lock_recover(&self.table, "health_table");
        table.get(model_id).map(|entry| !entry.disabled).unwrap_or(true)
    }

    pub fn consecutive_errors(&self, model_id: &str) -> u32 {
        let table = lock_recover(&self.table, "health_table");
        table.get(model_id).map(|entry| entry.consecutive_errors).unwrap_or(0)
    }

    /// Administrative override: forget one model's failures.
    pub fn reset(&self, model_id: &str) {
        let mut table = lock_recover(&self.table, "health_table");
        table.remove(model_id);
    }

    /// Administrative override: forget everything.
    pub fn reset_all(&self) {
        let mut table = lock_recover(&self.table, "health_table");
        table.clear();
    }

    /// Disabled model ids for the health endpoint, sorted for stable output.
    pub fn disabled_models(&self) -> Vec<String> {
        let table = lock_recover(&self.table, "health_table");
        let mut out: Vec<String> = table
            .iter()
            .filter(|(_, entry)| entry.disabled)
            .map(|(id, _)| id.clone())
            .collect();
        out.sort();
        out
    }
}
