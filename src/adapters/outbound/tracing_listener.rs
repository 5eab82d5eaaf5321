//! Tracing Change Listener
//!
//! Logs every change at info level. Useful when nothing else is watching
//! the mirror set.

use crate::domain::entities::{MemberRecord, NetworkRecord};
use crate::domain::ports::ChangeListener;
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingChangeListener;

impl ChangeListener for TracingChangeListener {
    fn on_network_update(&self, origin: StoreId, network_id: NetworkId, network: &NetworkRecord) {
        tracing::info!(
            "network {} updated by {} (rev={})",
            network_id,
            origin,
            network.revision()
        );
    }

    fn on_member_update(
        &self,
        origin: StoreId,
        network_id: NetworkId,
        member_id: MemberId,
        member: &MemberRecord,
    ) {
        tracing::info!(
            "member {}/{} updated by {} (rev={}, authorized={})",
            network_id,
            member_id,
            origin,
            member.revision(),
            member.authorized()
        );
    }

    fn on_member_deauthorize(&self, origin: StoreId, network_id: NetworkId, member_id: MemberId) {
        tracing::info!("member {}/{} deauthorized by {}", network_id, member_id, origin);
    }
}
