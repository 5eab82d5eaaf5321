//! Channel Change Listener
//!
//! Forwards mirror events onto a tokio channel so async code can consume
//! them without blocking the store that reported the change.

use crate::domain::entities::{MemberRecord, NetworkRecord};
use crate::domain::ports::ChangeListener;
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use tokio::sync::mpsc;

/// Events emitted by the mirror set.
#[derive(Debug, Clone, PartialEq)]
pub enum MirrorEvent {
    /// A network was created or changed
    NetworkUpdated { origin: StoreId, network: NetworkRecord },
    /// A member was created or changed
    MemberUpdated { origin: StoreId, member: MemberRecord },
    /// A member lost its authorization
    MemberDeauthorized {
        origin: StoreId,
        network_id: NetworkId,
        member_id: MemberId,
    },
}

impl MirrorEvent {
    pub fn origin(&self) -> StoreId {
        match self {
            MirrorEvent::NetworkUpdated { origin, .. }
            | MirrorEvent::MemberUpdated { origin, .. }
            | MirrorEvent::MemberDeauthorized { origin, .. } => *origin,
        }
    }

    pub fn network_id(&self) -> NetworkId {
        match self {
            MirrorEvent::NetworkUpdated { network, .. } => network.id(),
            MirrorEvent::MemberUpdated { member, .. } => member.network_id(),
            MirrorEvent::MemberDeauthorized { network_id, .. } => *network_id,
        }
    }
}

/// Listener that sends every callback as a [`MirrorEvent`].
///
/// The channel is unbounded: callbacks run on store threads and must not
/// wait for the consumer. Events sent after the receiver is dropped are
/// discarded.
pub struct ChannelChangeListener {
    event_tx: mpsc::UnboundedSender<MirrorEvent>,
}

impl ChannelChangeListener {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<MirrorEvent>) {
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (Self { event_tx }, event_rx)
    }

    fn send(&self, event: MirrorEvent) {
        if self.event_tx.send(event).is_err() {
            tracing::trace!("mirror event receiver closed, dropping event");
        }
    }
}

impl ChangeListener for ChannelChangeListener {
    fn on_network_update(&self, origin: StoreId, _network_id: NetworkId, network: &NetworkRecord) {
        self.send(MirrorEvent::NetworkUpdated {
            origin,
            network: network.clone(),
        });
    }

    fn on_member_update(
        &self,
        origin: StoreId,
        _network_id: NetworkId,
        _member_id: MemberId,
        member: &MemberRecord,
    ) {
        self.send(MirrorEvent::MemberUpdated {
            origin,
            member: member.clone(),
        });
    }

    fn on_member_deauthorize(&self, origin: StoreId, network_id: NetworkId, member_id: MemberId) {
        self.send(MirrorEvent::MemberDeauthorized {
            origin,
            network_id,
            member_id,
        });
    }
}
