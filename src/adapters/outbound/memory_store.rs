//! In-Memory Backing Store
//!
//! Implements BackingStore using DashMap for concurrent access.

use crate::domain::entities::{MemberRecord, NetworkRecord, NetworkSummary, Record};
use crate::domain::ports::{BackingStore, StoreEntry};
use crate::domain::value_objects::{MemberId, NetworkId, StoreId};
use crate::mirror::StoreNotifier;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

struct NetworkEntry {
    network: NetworkRecord,
    members: BTreeMap<MemberId, MemberRecord>,
}

/// Last liveness hint received for a member.
#[derive(Debug, Clone, Copy)]
pub struct OnlineStatus {
    pub address: SocketAddr,
    pub last_seen: Instant,
}

/// Result of applying a write to the map, decided before any notification.
enum SaveOutcome {
    Rejected,
    Unchanged,
    Changed { deauthorized: bool },
}

/// DashMap-backed store.
///
/// Writes carrying a revision lower than the stored copy are rejected.
/// Notifications are sent after all map guards are released.
pub struct InMemoryStore {
    notifier: StoreNotifier,
    networks: DashMap<NetworkId, NetworkEntry>,
    online: DashMap<(NetworkId, MemberId), OnlineStatus>,
    ready: Mutex<bool>,
    ready_cv: Condvar,
    writes: AtomicU64,
}

impl InMemoryStore {
    /// Create a store that is ready immediately.
    pub fn new(notifier: StoreNotifier) -> Self {
        Self::with_ready(notifier, true)
    }

    /// Create a store that reports not-ready until [`mark_ready`](Self::mark_ready).
    pub fn loading(notifier: StoreNotifier) -> Self {
        Self::with_ready(notifier, false)
    }

    fn with_ready(notifier: StoreNotifier, ready: bool) -> Self {
        Self {
            notifier,
            networks: DashMap::new(),
            online: DashMap::new(),
            ready: Mutex::new(ready),
            ready_cv: Condvar::new(),
            writes: AtomicU64::new(0),
        }
    }

    /// Finish the initial load and wake anyone in `wait_until_ready`.
    pub fn mark_ready(&self) {
        let mut ready = self.ready.lock();
        if !*ready {
            *ready = true;
            tracing::debug!("{} ready", self.notifier.id());
        }
        self.ready_cv.notify_all();
    }

    /// Number of `save` calls received, accepted or not.
    pub fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn last_seen_address(&self, network_id: NetworkId, member_id: MemberId) -> Option<SocketAddr> {
        self.online_status(network_id, member_id).map(|s| s.address)
    }

    pub fn online_status(&self, network_id: NetworkId, member_id: MemberId) -> Option<OnlineStatus> {
        self.online.get(&(network_id, member_id)).map(|e| *e.value())
    }

    pub fn network_count(&self) -> usize {
        self.networks.len()
    }

    fn apply_network(&self, network: &NetworkRecord) -> SaveOutcome {
        match self.networks.entry(network.id()) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                if network.revision() < entry.network.revision() {
                    return SaveOutcome::Rejected;
                }
                if entry.network == *network {
                    return SaveOutcome::Unchanged;
                }
                entry.network = network.clone();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(NetworkEntry {
                    network: network.clone(),
                    members: BTreeMap::new(),
                });
            }
        }
        SaveOutcome::Changed { deauthorized: false }
    }

    fn apply_member(&self, member: &MemberRecord) -> SaveOutcome {
        let Some(mut entry) = self.networks.get_mut(&member.network_id()) else {
            tracing::warn!(
                "{} rejected member {}/{}: unknown network",
                self.notifier.id(),
                member.network_id(),
                member.id()
            );
            return SaveOutcome::Rejected;
        };

        let previous = entry.members.get(&member.id());
        if let Some(previous) = previous {
            if member.revision() < previous.revision() {
                return SaveOutcome::Rejected;
            }
            if previous == member {
                return SaveOutcome::Unchanged;
            }
        }
        let deauthorized = previous.map(|p| p.authorized()).unwrap_or(false) && !member.authorized();
        entry.members.insert(member.id(), member.clone());
        SaveOutcome::Changed { deauthorized }
    }
}

impl BackingStore for InMemoryStore {
    fn id(&self) -> StoreId {
        self.notifier.id()
    }

    fn get_network(&self, network_id: NetworkId) -> Option<NetworkRecord> {
        self.networks.get(&network_id).map(|e| e.network.clone())
    }

    fn get_member(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord)> {
        let entry = self.networks.get(&network_id)?;
        let member = entry.members.get(&member_id)?.clone();
        Some((entry.network.clone(), member))
    }

    fn get_member_with_summary(
        &self,
        network_id: NetworkId,
        member_id: MemberId,
    ) -> Option<(NetworkRecord, MemberRecord, NetworkSummary)> {
        let entry = self.networks.get(&network_id)?;
        let member = entry.members.get(&member_id)?.clone();
        let summary = NetworkSummary::from_members(entry.members.values());
        Some((entry.network.clone(), member, summary))
    }

    fn get_network_members(
        &self,
        network_id: NetworkId,
    ) -> Option<(NetworkRecord, Vec<MemberRecord>)> {
        let entry = self.networks.get(&network_id)?;
        Some((entry.network.clone(), entry.members.values().cloned().collect()))
    }

    fn has_network(&self, network_id: NetworkId) -> bool {
        self.networks.contains_key(&network_id)
    }

    fn network_ids(&self) -> BTreeSet<NetworkId> {
        self.networks.iter().map(|e| *e.key()).collect()
    }

    fn save(&self, record: &Record, notify: bool) -> bool {
        self.writes.fetch_add(1, Ordering::SeqCst);

        let outcome = match record {
            Record::Network(network) => self.apply_network(network),
            Record::Member(member) => self.apply_member(member),
        };

        match outcome {
            SaveOutcome::Rejected => {
                tracing::debug!(
                    "{} rejected write for network {} rev={}",
                    self.id(),
                    record.network_id(),
                    record.revision()
                );
                false
            }
            SaveOutcome::Unchanged => false,
            SaveOutcome::Changed { deauthorized } => {
                if notify {
                    match record {
                        Record::Network(network) => self.notifier.network_updated(network),
                        Record::Member(member) => {
                            self.notifier.member_updated(member);
                            if deauthorized {
                                self.notifier
                                    .member_deauthorized(member.network_id(), member.id());
                            }
                        }
                    }
                }
                true
            }
        }
    }

    fn erase_network(&self, network_id: NetworkId) {
        if self.networks.remove(&network_id).is_some() {
            self.online.retain(|&(nwid, _), _| nwid != network_id);
            tracing::debug!("{} erased network {}", self.id(), network_id);
        }
    }

    fn erase_member(&self, network_id: NetworkId, member_id: MemberId) {
        if let Some(mut entry) = self.networks.get_mut(&network_id) {
            entry.members.remove(&member_id);
        }
        self.online.remove(&(network_id, member_id));
    }

    fn node_is_online(&self, network_id: NetworkId, member_id: MemberId, address: SocketAddr) {
        self.online.insert(
            (network_id, member_id),
            OnlineStatus {
                address,
                last_seen: Instant::now(),
            },
        );
    }

    fn is_ready(&self) -> bool {
        *self.ready.lock()
    }

    fn wait_until_ready(&self) -> bool {
        let mut ready = self.ready.lock();
        if *ready {
            return false;
        }
        while !*ready {
            self.ready_cv.wait(&mut ready);
        }
        true
    }

    fn for_each(&self, visitor: &mut dyn FnMut(StoreEntry<'_>) -> ControlFlow<()>) {
        // Copy out first so no shard lock is held while the visitor runs
        let snapshot: Vec<(NetworkId, Value, Vec<(MemberId, Value)>)> = self
            .networks
            .iter()
            .map(|e| {
                let members = e
                    .members
                    .iter()
                    .map(|(id, m)| (*id, m.to_json()))
                    .collect();
                (*e.key(), e.network.to_json(), members)
            })
            .collect();

        for (network_id, network, members) in &snapshot {
            let entry = StoreEntry {
                network_id: *network_id,
                network,
                member: None,
            };
            if visitor(entry).is_break() {
                return;
            }
            for (member_id, member) in members {
                let entry = StoreEntry {
                    network_id: *network_id,
                    network,
                    member: Some((*member_id, member)),
                };
                if visitor(entry).is_break() {
                    return;
                }
            }
        }
    }
}
