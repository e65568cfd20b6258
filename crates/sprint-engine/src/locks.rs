//! Per-lead write serialization

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

/// Lock plus the number of holders and waiters using it
type Table = HashMap<String, (Arc<AsyncMutex<()>>, usize)>;

/// One async mutex per lead id, created on first use.
///
/// Every read-modify-write of a lead record runs while holding that lead's
/// guard, so two writers never interleave on the same record. An entry is
/// dropped again once its last holder or waiter is gone, so the table only
/// holds leads that are being written right now.
#[derive(Default)]
pub struct LeadLocks {
    // Never held across an await
    table: Mutex<Table>,
}

/// Exclusive access to one lead; releases and prunes on drop
pub struct LeadGuard<'a> {
    locks: &'a LeadLocks,
    lead_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl LeadLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> std::sync::MutexGuard<'_, Table> {
        self.table.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub async fn lock(&self, lead_id: &str) -> LeadGuard<'_> {
        let lock = {
            let mut table = self.table();
            let entry = table.entry(lead_id.to_string()).or_default();
            entry.1 += 1;
            entry.0.clone()
        };
        let mut guard = LeadGuard {
            locks: self,
            lead_id: lead_id.to_string(),
            guard: None,
        };
        // If this future is dropped while waiting, the guard still prunes
        guard.guard = Some(lock.lock_owned().await);
        guard
    }

    /// Number of leads with a live holder or waiter
    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for LeadGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();

        let mut table = self.locks.table();
        if let Some(entry) = table.get_mut(&self.lead_id) {
            entry.1 = entry.1.saturating_sub(1);
            if entry.1 == 0 {
                table.remove(&self.lead_id);
            }
        }
    }
}
