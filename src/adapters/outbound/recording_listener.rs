//! Recording Change Listener
//!
//! Keeps every event in memory. Used by tests and by callers that want to
//! inspect what the mirror set reported.

use super::channel_listener::MirrorEvent;
use crate::domain::entities::{MemberRecord, NetworkRecord};
use crate::domain::ports::ChangeListener;
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use parking_lot::Mutex;

#[derive(Debug, Default)]
pub struct RecordingChangeListener {
    events: Mutex<Vec<MirrorEvent>>,
}

impl RecordingChangeListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<MirrorEvent> {
        self.events.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }

    pub fn network_updates(&self) -> Vec<(StoreId, NetworkId)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MirrorEvent::NetworkUpdated { origin, network } => Some((*origin, network.id())),
                _ => None,
            })
            .collect()
    }

    pub fn member_updates(&self) -> Vec<(StoreId, NetworkId, MemberId)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MirrorEvent::MemberUpdated { origin, member } => {
                    Some((*origin, member.network_id(), member.id()))
                }
                _ => None,
            })
            .collect()
    }

    pub fn member_deauthorizations(&self) -> Vec<(StoreId, NetworkId, MemberId)> {
        self.events
            .lock()
            .iter()
            .filter_map(|event| match event {
                MirrorEvent::MemberDeauthorized {
                    origin,
                    network_id,
                    member_id,
                } => Some((*origin, *network_id, *member_id)),
                _ => None,
            })
            .collect()
    }
}

impl ChangeListener for RecordingChangeListener {
    fn on_network_update(&self, origin: StoreId, _network_id: NetworkId, network: &NetworkRecord) {
        self.events.lock().push(MirrorEvent::NetworkUpdated {
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
        self.events.lock().push(MirrorEvent::MemberUpdated {
            origin,
            member: member.clone(),
        });
    }

    fn on_member_deauthorize(&self, origin: StoreId, network_id: NetworkId, member_id: MemberId) {
        self.events.lock().push(MirrorEvent::MemberDeauthorized {
            origin,
            network_id,
            member_id,
        });
    }
}
