//! Mirror Set Module
//!
//! Keeps several independently writable stores of network and member
//! records eventually consistent while presenting them as one store.
//!
//! ## Architecture
//!
//! - **MirrorSet**: ordered store list, delegated reads and writes
//! - **ChangePropagator**: pushes a change accepted by one store to the others
//!   and notifies the [`ChangeListener`](crate::domain::ports::ChangeListener)
//! - **Reconciler**: background anti-entropy pass using revision-based
//!   last-write-wins
//!
//! ## How It Works
//!
//! 1. A notifying write goes to the first store that accepts it
//! 2. That store reports the change through its [`StoreNotifier`]
//! 3. The propagator silently writes the record to every other store
//! 4. Once per interval the reconciler repairs anything propagation missed
//!
//! ## Usage
//!
//! ```rust,ignore
//! use netconf_mirror::adapters::outbound::{InMemoryStore, TracingChangeListener};
//! use netconf_mirror::mirror::{MirrorConfig, MirrorSet};
//!
//! let mirror = MirrorSet::new(Arc::new(TracingChangeListener), MirrorConfig::default())?;
//! mirror.add_store(Arc::new(InMemoryStore::new(mirror.notifier())));
//! mirror.add_store(Arc::new(InMemoryStore::new(mirror.notifier())));
//! ```

mod config;
mod propagator;
mod reconciler;
mod set;
mod types;

pub use config::{ConfigError, MirrorConfig};
pub use propagator::{ChangePropagator, StoreNotifier};
pub use reconciler::{reconcile_pass, EntryDecode, Reconciler};
pub use set::{MirrorSet, MirrorSetBuilder};
pub use types::{ReconcileStats, StoreList};
