//! Backing Store Port
//!
//! Defines the capability contract every mirrored store must implement.
//! Implementations may keep records in memory, in SQLite, or on a remote
//! controller.

use crate::domain::entities::{MemberRecord, NetworkRecord, NetworkSummary, Record};
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use serde_json::Value;
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::ops::ControlFlow;

/// One item yielded by [`BackingStore::for_each`].
///
/// Documents are handed out raw: a store may hold entries that are not
/// well-formed records, and it is up to the visitor to skip them.
#[derive(Debug, Clone, Copy)]
pub struct StoreEntry<'a> {
    pub network_id: NetworkId,
    pub network: &'a Value,
    /// `None` when the entry is the network itself
    pub member: Option<(MemberId, &'a Value)>,
}

/// A store of network and member records that can be mirrored.
///
/// Every call is synchronous and may block on I/O. Stores must tolerate
/// being called concurrently from the reconciler thread and caller threads.
pub trait BackingStore: Send + Sync {
    /// Identity used to recognise this store as the origin of a change.
    fn id(&self) -> StoreId;

    fn get_network(&self, network_id: NetworkId) -> Option<NetworkRecord>;

    /// Returns a value only if both the network and the member exist.
    fn get_member(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord)>;

    /// Like [`get_member`](Self::get_member), plus statistics for the network.
    fn get_member_with_summary(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord, NetworkSummary)>;

    fn get_network_members(&self, network_id: NetworkId)
        -> Option<(NetworkRecord, Vec<MemberRecord>)>;

    fn has_network(&self, network_id: NetworkId) -> bool;

    fn network_ids(&self) -> BTreeSet<NetworkId>;

    /// Persist a record and return whether the store's state changed.
    ///
    /// With `notify` set, an accepted write must be reported through the
    /// store's [`StoreNotifier`](crate::mirror::StoreNotifier). With `notify`
    /// cleared the write is silent.
    fn save(&self, record: &Record, notify: bool) -> bool;

    fn erase_network(&self, network_id: NetworkId);

    fn erase_member(&self, network_id: NetworkId, member_id: MemberId);

    /// Liveness hint for a member. Store-local, never replicated.
    fn node_is_online(&self, network_id: NetworkId, member_id: MemberId, address: SocketAddr);

    fn is_ready(&self) -> bool;

    /// Block until the initial load has finished. Returns true if the store
    /// became ready during this call.
    fn wait_until_ready(&self) -> bool;

    /// Visit every network (with `member: None`) and every member.
    ///
    /// Iteration stops early when the visitor returns `ControlFlow::Break`.
    /// The visitor may call back into other stores, so implementations must
    /// not hold locks that those calls could need.
    fn for_each(&self, visitor: &mut dyn FnMut(StoreEntry<'_>) -> ControlFlow<()>);
}
