//! Mirror Types
//!
//! Shared store list and reconciliation statistics.

use crate::domain::ports::BackingStore;
use crate::domain::value_objects::StoreId;
use parking_lot::Mutex;
use std::sync::Arc;

/// Ordered list of backing stores shared by the mirror set, the change
/// propagator and the reconciler thread.
///
/// The lock is only ever held long enough to copy or edit the list. Store
/// calls always run against a snapshot.
#[derive(Default)]
pub struct StoreList {
    stores: Mutex<Vec<Arc<dyn BackingStore>>>,
}

impl StoreList {
    pub fn new(stores: Vec<Arc<dyn BackingStore>>) -> Self {
        Self {
            stores: Mutex::new(stores),
        }
    }

    /// Copy of the current list, in configured order.
    pub fn snapshot(&self) -> Vec<Arc<dyn BackingStore>> {
        self.stores.lock().clone()
    }

    pub fn push(&self, store: Arc<dyn BackingStore>) {
        self.stores.lock().push(store);
    }

    /// Remove a store by identity. Returns false if it was not present.
    pub fn remove(&self, id: StoreId) -> bool {
        let mut stores = self.stores.lock();
        let before = stores.len();
        stores.retain(|s| s.id() != id);
        stores.len() != before
    }

    pub fn len(&self) -> usize {
        self.stores.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.stores.lock().is_empty()
    }
}

/// Counters from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileStats {
    pub stores_scanned: usize,
    pub networks_visited: usize,
    pub members_visited: usize,
    /// Silent writes issued for networks
    pub networks_pushed: usize,
    /// Silent writes issued for members
    pub members_pushed: usize,
    /// Malformed entries that were skipped
    pub skipped: usize,
    /// True if the pass stopped early because of shutdown
    pub interrupted: bool,
}

impl ReconcileStats {
    pub fn pushed(&self) -> usize {
        self.networks_pushed + self.members_pushed
    }
}
