//! Change Propagator
//!
//! Fans a change accepted by one store out to every other store, then tells
//! the external listener about it exactly once.

use crate::domain::entities::{MemberRecord, NetworkRecord, Record};
use crate::domain::ports::ChangeListener;
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use crate::mirror::types::StoreList;
use std::sync::{Arc, Weak};

/// Receives change callbacks from backing stores.
///
/// Fan-out writes are silent (`notify = false`) so the receiving stores do
/// not call back in, and the originating store is never written to.
pub struct ChangePropagator {
    stores: Arc<StoreList>,
    listener: Arc<dyn ChangeListener>,
}

impl ChangePropagator {
    pub(crate) fn new(stores: Arc<StoreList>, listener: Arc<dyn ChangeListener>) -> Self {
        Self { stores, listener }
    }

    pub fn network_updated(&self, origin: StoreId, network: &NetworkRecord) {
        let record = Record::Network(network.clone());
        let changed = self.fan_out(origin, &record);
        tracing::debug!(
            "propagated network {} rev={} from {} changed={}",
            network.id(),
            network.revision(),
            origin,
            changed
        );
        self.listener.on_network_update(origin, network.id(), network);
    }

    pub fn member_updated(&self, origin: StoreId, member: &MemberRecord) {
        let record = Record::Member(member.clone());
        let changed = self.fan_out(origin, &record);
        tracing::debug!(
            "propagated member {}/{} rev={} from {} changed={}",
            member.network_id(),
            member.id(),
            member.revision(),
            origin,
            changed
        );
        self.listener
            .on_member_update(origin, member.network_id(), member.id(), member);
    }

    /// Deauthorization is store-local bookkeeping; it is only reported.
    pub fn member_deauthorized(&self, origin: StoreId, network_id: NetworkId, member_id: MemberId) {
        self.listener.on_member_deauthorize(origin, network_id, member_id);
    }

    /// Silent write to every store except `origin`. Returns how many changed.
    fn fan_out(&self, origin: StoreId, record: &Record) -> usize {
        self.stores
            .snapshot()
            .iter()
            .filter(|store| store.id() != origin)
            .filter(|store| store.save(record, false))
            .count()
    }
}

/// A store's handle back to the mirror set it belongs to.
///
/// Carries the store's identity. A detached notifier, or one whose mirror
/// set has been dropped, discards notifications.
#[derive(Clone)]
pub struct StoreNotifier {
    id: StoreId,
    propagator: Weak<ChangePropagator>,
}

impl StoreNotifier {
    /// A notifier that belongs to no mirror set.
    pub fn detached() -> Self {
        Self {
            id: StoreId::next(),
            propagator: Weak::new(),
        }
    }

    pub(crate) fn attached(propagator: &Arc<ChangePropagator>) -> Self {
        Self {
            id: StoreId::next(),
            propagator: Arc::downgrade(propagator),
        }
    }

    pub fn id(&self) -> StoreId {
        self.id
    }

    pub fn is_attached(&self) -> bool {
        self.propagator.strong_count() > 0
    }

    pub fn network_updated(&self, network: &NetworkRecord) {
        if let Some(propagator) = self.propagator.upgrade() {
            propagator.network_updated(self.id, network);
        }
    }

    pub fn member_updated(&self, member: &MemberRecord) {
        if let Some(propagator) = self.propagator.upgrade() {
            propagator.member_updated(self.id, member);
        }
    }

    pub fn member_deauthorized(&self, network_id: NetworkId, member_id: MemberId) {
        if let Some(propagator) = self.propagator.upgrade() {
            propagator.member_deauthorized(self.id, network_id, member_id);
        }
    }
}

impl std::fmt::Debug for StoreNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreNotifier")
            .field("id", &self.id)
            .field("attached", &self.is_attached())
            .finish()
    }
}
