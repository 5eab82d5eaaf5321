//! Change Listener Port
//!
//! Outbound notifications for an observer of the mirror set, e.g. a
//! controller that pushes fresh configuration to live sessions.

use crate::domain::entities::{MemberRecord, NetworkRecord};
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};

/// Observer of logical changes to the mirrored records.
///
/// Each callback fires once per change, after it has been fanned out to the
/// other stores. `origin` is the store that accepted the write.
pub trait ChangeListener: Send + Sync {
    fn on_network_update(&self, origin: StoreId, network_id: NetworkId, network: &NetworkRecord);

    fn on_member_update(
        &self,
        origin: StoreId,
        network_id: NetworkId,
        member_id: MemberId,
        member: &MemberRecord,
    );

    fn on_member_deauthorize(&self, origin: StoreId, network_id: NetworkId, member_id: MemberId);
}
