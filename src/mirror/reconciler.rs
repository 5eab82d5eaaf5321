//! Reconciler
//!
//! Anti-entropy for the mirror set. A dedicated thread wakes once per
//! interval, scans every store and pushes the newest revision of each record
//! into any store holding a missing or older copy.
//!
//! ## Rules
//!
//! - A copy is replaced only if its revision is strictly lower. Equal
//!   revisions are left alone, so repeated passes are idempotent.
//! - Pushes are silent writes, so they never trigger change propagation.
//! - Entries that are not well-formed records are skipped one at a time.
//! - The store list is snapshotted and the lock released before any store
//!   is touched.

use crate::domain::entities::{MemberRecord, NetworkRecord, Record, RecordError};
use crate::domain::ports::{BackingStore, StoreEntry};
use crate::mirror::config::MirrorConfig;
use crate::mirror::types::{ReconcileStats, StoreList};
use serde_json::Value;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Outcome of decoding one entry yielded by [`BackingStore::for_each`].
#[derive(Debug, Clone, PartialEq)]
pub enum EntryDecode {
    Network(NetworkRecord),
    Member(MemberRecord),
    Skip(RecordError),
}

impl EntryDecode {
    pub fn from_entry(entry: StoreEntry<'_>) -> Self {
        if !entry.network.is_object() {
            return Self::Skip(RecordError::NotAnObject);
        }
        match entry.member {
            None => match NetworkRecord::from_json(entry.network.clone()) {
                Ok(network) if network.id() == entry.network_id => Self::Network(network),
                Ok(_) => Self::Skip(RecordError::InvalidField("id")),
                Err(e) => Self::Skip(e),
            },
            Some((member_id, doc)) => match decode_member(doc) {
                Ok(member)
                    if member.network_id() == entry.network_id && member.id() == member_id =>
                {
                    Self::Member(member)
                }
                Ok(_) => Self::Skip(RecordError::InvalidField("id")),
                Err(e) => Self::Skip(e),
            },
        }
    }
}

fn decode_member(doc: &Value) -> Result<MemberRecord, RecordError> {
    if !doc.is_object() {
        return Err(RecordError::NotAnObject);
    }
    MemberRecord::from_json(doc.clone())
}

/// Run one full pass over `stores`.
///
/// `running` is checked before every entry; clearing it ends the pass early.
pub fn reconcile_pass(stores: &[Arc<dyn BackingStore>], running: &AtomicBool) -> ReconcileStats {
    let mut stats = ReconcileStats::default();

    for source in stores {
        if !running.load(Ordering::SeqCst) {
            stats.interrupted = true;
            break;
        }
        stats.stores_scanned += 1;
        let source_id = source.id();

        source.for_each(&mut |entry: StoreEntry<'_>| {
            if !running.load(Ordering::SeqCst) {
                stats.interrupted = true;
                return ControlFlow::Break(());
            }

            match EntryDecode::from_entry(entry) {
                EntryDecode::Network(network) => {
                    stats.networks_visited += 1;
                    let revision = network.revision();
                    let record = Record::Network(network);
                    for target in stores.iter().filter(|s| s.id() != source_id) {
                        let stale = match target.get_network(record.network_id()) {
                            None => true,
                            Some(existing) => existing.revision() < revision,
                        };
                        if stale {
                            tracing::debug!(
                                "reconcile: network {} rev={} {} -> {}",
                                record.network_id(),
                                revision,
                                source_id,
                                target.id()
                            );
                            target.save(&record, false);
                            stats.networks_pushed += 1;
                        }
                    }
                }
                EntryDecode::Member(member) => {
                    stats.members_visited += 1;
                    let (network_id, member_id) = (member.network_id(), member.id());
                    let revision = member.revision();
                    let record = Record::Member(member);
                    for target in stores.iter().filter(|s| s.id() != source_id) {
                        let stale = match target.get_member(network_id, member_id) {
                            None => true,
                            Some((_, existing)) => existing.revision() < revision,
                        };
                        if stale {
                            tracing::debug!(
                                "reconcile: member {}/{} rev={} {} -> {}",
                                network_id,
                                member_id,
                                revision,
                                source_id,
                                target.id()
                            );
                            target.save(&record, false);
                            stats.members_pushed += 1;
                        }
                    }
                }
                EntryDecode::Skip(reason) => {
                    stats.skipped += 1;
                    tracing::debug!(
                        "reconcile: skipping malformed entry in network {} of {}: {}",
                        entry.network_id,
                        source_id,
                        reason
                    );
                }
            }
            ControlFlow::Continue(())
        });
    }

    stats
}

/// Handle to the background reconciliation thread.
///
/// The thread only holds the shared store list, never the mirror set, and
/// is joined by [`stop`](Self::stop).
pub struct Reconciler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Reconciler {
    /// Spawn the worker thread.
    pub fn spawn(stores: Arc<StoreList>, config: MirrorConfig) -> std::io::Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = running.clone();
        let handle = thread::Builder::new()
            .name("mirror-reconciler".into())
            .spawn(move || run(stores, flag, config))?;

        Ok(Self {
            running,
            handle: Some(handle),
        })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst) && self.handle.is_some()
    }

    /// Signal shutdown and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::error!("reconciler thread panicked");
            }
        }
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn run(stores: Arc<StoreList>, running: Arc<AtomicBool>, config: MirrorConfig) {
    let ticks = config.ticks_per_interval();
    tracing::info!(
        "reconciler started interval={:?} tick={:?}",
        config.reconcile_interval,
        config.poll_tick
    );

    'outer: loop {
        for _ in 0..ticks {
            if !running.load(Ordering::SeqCst) {
                break 'outer;
            }
            thread::sleep(config.poll_tick);
        }

        let snapshot = stores.snapshot();
        if snapshot.len() < 2 {
            continue;
        }

        let stats = reconcile_pass(&snapshot, &running);
        if stats.pushed() > 0 || stats.skipped > 0 {
            tracing::info!(
                "reconcile pass: stores={} networks={} members={} pushed={} skipped={}",
                stats.stores_scanned,
                stats.networks_visited,
                stats.members_visited,
                stats.pushed(),
                stats.skipped
            );
        }
    }

    tracing::info!("reconciler stopped");
}
