//! Mirror Set
//!
//! Presents an ordered list of backing stores as one logical store.
//! Reads take the first store that has the record, writes either stop at
//! the first store that accepts or go to every store.

use crate::domain::entities::{MemberRecord, NetworkRecord, NetworkSummary, Record};
use crate::domain::ports::{BackingStore, ChangeListener};
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use crate::mirror::config::MirrorConfig;
use crate::mirror::propagator::{ChangePropagator, StoreNotifier};
use crate::mirror::reconciler::{reconcile_pass, Reconciler};
use crate::mirror::types::{ReconcileStats, StoreList};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

/// Multi-master mirror of network and member records.
///
/// Owns the background reconciler; dropping the set (or calling
/// [`shutdown`](Self::shutdown)) stops and joins it.
pub struct MirrorSet {
    stores: Arc<StoreList>,
    propagator: Arc<ChangePropagator>,
    reconciler: Reconciler,
}

impl MirrorSet {
    /// Create an empty mirror set and start its reconciler.
    ///
    /// Stores that report changes need a notifier from
    /// [`notifier`](Self::notifier) and are attached with
    /// [`add_store`](Self::add_store).
    pub fn new(listener: Arc<dyn ChangeListener>, config: MirrorConfig) -> anyhow::Result<Self> {
        MirrorSetBuilder::new(listener).config(config).build()
    }

    /// A fresh notifier bound to this set's change propagator.
    pub fn notifier(&self) -> StoreNotifier {
        StoreNotifier::attached(&self.propagator)
    }

    /// Append a store at the lowest read priority.
    pub fn add_store(&self, store: Arc<dyn BackingStore>) {
        tracing::info!("mirror: adding {}", store.id());
        self.stores.push(store);
    }

    pub fn remove_store(&self, id: StoreId) -> bool {
        let removed = self.stores.remove(id);
        if removed {
            tracing::info!("mirror: removed {}", id);
        }
        removed
    }

    pub fn store_count(&self) -> usize {
        self.stores.len()
    }

    // ===== Reads =====

    pub fn get_network(&self, network_id: NetworkId) -> Option<NetworkRecord> {
        self.stores
            .snapshot()
            .iter()
            .find_map(|s| s.get_network(network_id))
    }

    pub fn get_member(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord)> {
        self.stores
            .snapshot()
            .iter()
            .find_map(|s| s.get_member(network_id, member_id))
    }

    pub fn get_member_with_summary(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord, NetworkSummary)> {
        self.stores
            .snapshot()
            .iter()
            .find_map(|s| s.get_member_with_summary(network_id, member_id))
    }

    pub fn get_network_members(
        &self,
        network_id: NetworkId,
    ) -> Option<(NetworkRecord, Vec<MemberRecord>)> {
        self.stores
            .snapshot()
            .iter()
            .find_map(|s| s.get_network_members(network_id))
    }

    pub fn has_network(&self, network_id: NetworkId) -> bool {
        self.stores
            .snapshot()
            .iter()
            .any(|s| s.has_network(network_id))
    }

    /// Union of the network ids held by every store.
    pub fn network_ids(&self) -> BTreeSet<NetworkId> {
        self.stores
            .snapshot()
            .iter()
            .flat_map(|s| s.network_ids())
            .collect()
    }

    /// True only if every store is ready.
    pub fn is_ready(&self) -> bool {
        self.stores.snapshot().iter().all(|s| s.is_ready())
    }

    /// Wait on every store. Returns true if any store became ready during
    /// the call.
    pub fn wait_until_ready(&self) -> bool {
        self.stores
            .snapshot()
            .iter()
            .fold(false, |changed, s| s.wait_until_ready() | changed)
    }

    // ===== Writes =====

    /// Save a record.
    ///
    /// With `notify_listeners` set, stores are tried in order and the first
    /// one that accepts wins; it is responsible for propagating the change.
    /// Returns false if no store accepted.
    ///
    /// Without it, every store gets a silent write and the result is true if
    /// any of them changed.
    pub fn save(&self, record: &Record, notify_listeners: bool) -> bool {
        let stores = self.stores.snapshot();
        if notify_listeners {
            let accepted = stores.iter().find(|s| s.save(record, true));
            if accepted.is_none() {
                tracing::warn!(
                    "mirror: no store accepted write for network {} rev={}",
                    record.network_id(),
                    record.revision()
                );
            }
            accepted.is_some()
        } else {
            stores
                .iter()
                .fold(false, |modified, s| s.save(record, false) | modified)
        }
    }

    pub fn erase_network(&self, network_id: NetworkId) {
        for store in self.stores.snapshot() {
            store.erase_network(network_id);
        }
    }

    pub fn erase_member(&self, network_id: NetworkId, member_id: MemberId) {
        for store in self.stores.snapshot() {
            store.erase_member(network_id, member_id);
        }
    }

    pub fn node_is_online(&self, network_id: NetworkId, member_id: MemberId, address: SocketAddr) {
        for store in self.stores.snapshot() {
            store.node_is_online(network_id, member_id, address);
        }
    }

    // ===== Reconciliation =====

    /// Run one reconciliation pass on the calling thread.
    pub fn reconcile_now(&self) -> ReconcileStats {
        let snapshot = self.stores.snapshot();
        if snapshot.len() < 2 {
            return ReconcileStats::default();
        }
        reconcile_pass(&snapshot, &AtomicBool::new(true))
    }

    pub fn is_running(&self) -> bool {
        self.reconciler.is_running()
    }

    /// Stop the reconciler and wait for it to exit.
    pub fn shutdown(&mut self) {
        if self.reconciler.is_running() {
            tracing::info!("mirror: shutting down reconciler");
        }
        self.reconciler.stop();
    }
}

/// Builder for [`MirrorSet`] that lets stores be created with a notifier
/// before the set starts.
pub struct MirrorSetBuilder {
    config: MirrorConfig,
    stores: Arc<StoreList>,
    propagator: Arc<ChangePropagator>,
}

impl MirrorSetBuilder {
    pub fn new(listener: Arc<dyn ChangeListener>) -> Self {
        let stores = Arc::new(StoreList::default());
        let propagator = Arc::new(ChangePropagator::new(stores.clone(), listener));
        Self {
            config: MirrorConfig::default(),
            stores,
            propagator,
        }
    }

    pub fn config(mut self, config: MirrorConfig) -> Self {
        self.config = config;
        self
    }

    /// A notifier for a store that will be passed to [`store`](Self::store).
    pub fn notifier(&self) -> StoreNotifier {
        StoreNotifier::attached(&self.propagator)
    }

    /// Append a store. Order of calls is read and write priority order.
    pub fn store(self, store: Arc<dyn BackingStore>) -> Self {
        self.stores.push(store);
        self
    }

    pub fn build(self) -> anyhow::Result<MirrorSet> {
        self.config.validate()?;
        let reconciler = Reconciler::spawn(self.stores.clone(), self.config)?;
        tracing::info!("mirror set started with {} stores", self.stores.len());

        Ok(MirrorSet {
            stores: self.stores,
            propagator: self.propagator,
            reconciler,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::outbound::{InMemoryStore, RecordingChangeListener};
    use std::time::{Duration, Instant};

    const NWID: NetworkId = NetworkId(0x1234);

    fn quiet_config() -> MirrorConfig {
        MirrorConfig::new()
            .reconcile_interval(Duration::from_secs(3600))
            .poll_tick(Duration::from_millis(10))
    }

    fn mirror_with(count: usize) -> (MirrorSet, Vec<Arc<InMemoryStore>>, Arc<RecordingChangeListener>) {
        let listener = Arc::new(RecordingChangeListener::new());
        let mirror = MirrorSet::new(listener.clone(), quiet_config()).unwrap();
        let stores: Vec<_> = (0..count)
            .map(|_| Arc::new(InMemoryStore::new(mirror.notifier())))
            .collect();
        for store in &stores {
            mirror.add_store(store.clone());
        }
        (mirror, stores, listener)
    }

    #[test]
    fn test_read_prefers_first_store() {
        let (mirror, stores, _) = mirror_with(2);
        stores[0].save(&NetworkRecord::new(NWID, 1).with_field("name", "a").into(), false);
        stores[1].save(&NetworkRecord::new(NWID, 9).with_field("name", "b").into(), false);

        let network = mirror.get_network(NWID).unwrap();
        assert_eq!(network.revision(), 1);
    }

    #[test]
    fn test_read_falls_through_to_later_store() {
        let (mirror, stores, _) = mirror_with(2);
        stores[1].save(&NetworkRecord::new(NWID, 2).into(), false);
        stores[1].save(&MemberRecord::new(NWID, MemberId(3), 1).into(), false);

        assert!(mirror.get_network(NWID).is_some());
        assert!(mirror.get_member(NWID, MemberId(3)).is_some());
        assert!(mirror.get_member_with_summary(NWID, MemberId(3)).is_some());
        assert_eq!(mirror.get_network_members(NWID).unwrap().1.len(), 1);
        assert!(mirror.get_member(NWID, MemberId(4)).is_none());
    }

    #[test]
    fn test_network_ids_is_union() {
        let (mirror, stores, _) = mirror_with(2);
        stores[0].save(&NetworkRecord::new(NetworkId(1), 1).into(), false);
        stores[1].save(&NetworkRecord::new(NetworkId(2), 1).into(), false);

        let ids: Vec<_> = mirror.network_ids().into_iter().collect();
        assert_eq!(ids, vec![NetworkId(1), NetworkId(2)]);
        assert!(mirror.has_network(NetworkId(2)));
        assert!(!mirror.has_network(NetworkId(3)));
    }

    #[test]
    fn test_notifying_save_propagates_and_notifies_once() {
        let (mirror, stores, listener) = mirror_with(3);
        let network = NetworkRecord::new(NWID, 1);

        assert!(mirror.save(&network.clone().into(), true));

        for store in &stores {
            assert_eq!(store.get_network(NWID), Some(network.clone()));
        }
        assert_eq!(listener.network_updates(), vec![(stores[0].id(), NWID)]);
    }

    #[test]
    fn test_silent_save_reaches_every_store_without_notifying() {
        let (mirror, stores, listener) = mirror_with(2);

        assert!(mirror.save(&NetworkRecord::new(NWID, 1).into(), false));
        assert!(stores.iter().all(|s| s.has_network(NWID)));
        assert!(listener.is_empty());

        // Nothing changes the second time
        assert!(!mirror.save(&NetworkRecord::new(NWID, 1).into(), false));
    }

    #[test]
    fn test_save_with_no_stores_fails() {
        let (mirror, _, _) = mirror_with(0);
        assert!(!mirror.save(&NetworkRecord::new(NWID, 1).into(), true));
        assert!(!mirror.save(&NetworkRecord::new(NWID, 1).into(), false));
    }

    #[test]
    fn test_erase_fans_out() {
        let (mirror, stores, _) = mirror_with(2);
        mirror.save(&NetworkRecord::new(NWID, 1).into(), false);
        mirror.save(&MemberRecord::new(NWID, MemberId(1), 1).into(), false);

        mirror.erase_member(NWID, MemberId(1));
        assert!(stores.iter().all(|s| s.get_member(NWID, MemberId(1)).is_none()));

        mirror.erase_network(NWID);
        assert!(stores.iter().all(|s| !s.has_network(NWID)));
    }

    #[test]
    fn test_node_is_online_fans_out() {
        let (mirror, stores, _) = mirror_with(2);
        let addr: SocketAddr = "192.0.2.1:9993".parse().unwrap();

        mirror.node_is_online(NWID, MemberId(1), addr);

        for store in &stores {
            assert_eq!(store.last_seen_address(NWID, MemberId(1)), Some(addr));
        }
    }

    #[test]
    fn test_readiness_aggregation() {
        let listener = Arc::new(RecordingChangeListener::new());
        let mirror = MirrorSet::new(listener, quiet_config()).unwrap();
        let ready = Arc::new(InMemoryStore::new(mirror.notifier()));
        let loading = Arc::new(InMemoryStore::loading(mirror.notifier()));
        mirror.add_store(ready);
        mirror.add_store(loading.clone());

        assert!(!mirror.is_ready());
        loading.mark_ready();
        assert!(mirror.is_ready());
    }

    #[test]
    fn test_reconcile_now_skips_single_store() {
        let (mirror, stores, _) = mirror_with(1);
        stores[0].save(&NetworkRecord::new(NWID, 1).into(), false);
        assert_eq!(mirror.reconcile_now(), ReconcileStats::default());
    }

    #[test]
    fn test_remove_store() {
        let (mirror, stores, _) = mirror_with(2);
        assert!(mirror.remove_store(stores[0].id()));
        assert_eq!(mirror.store_count(), 1);
        assert!(!mirror.remove_store(stores[0].id()));
    }

    #[test]
    fn test_builder_orders_stores() {
        let listener = Arc::new(RecordingChangeListener::new());
        let builder = MirrorSetBuilder::new(listener).config(quiet_config());
        let a = Arc::new(InMemoryStore::new(builder.notifier()));
        let b = Arc::new(InMemoryStore::new(builder.notifier()));
        b.save(&NetworkRecord::new(NWID, 1).into(), false);
        a.save(&NetworkRecord::new(NWID, 2).into(), false);

        let mirror = builder.store(a).store(b).build().unwrap();
        assert_eq!(mirror.store_count(), 2);
        assert_eq!(mirror.get_network(NWID).unwrap().revision(), 2);
    }

    #[test]
    fn test_build_rejects_invalid_config() {
        let listener = Arc::new(RecordingChangeListener::new());
        let result = MirrorSet::new(listener, MirrorConfig::new().poll_tick(Duration::ZERO));
        assert!(result.is_err());
    }

    #[test]
    fn test_shutdown_is_prompt() {
        let (mut mirror, _, _) = mirror_with(2);
        assert!(mirror.is_running());

        let started = Instant::now();
        mirror.shutdown();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!mirror.is_running());

        // A second shutdown is a no-op
        mirror.shutdown();
    }
}
