//! netconf-mirror Library
//!
//! Mirrors network and member configuration records across several
//! backing stores and keeps them converged.

pub mod adapters;
pub mod config;
pub mod domain;
pub mod infrastructure;
pub mod mirror;

// Re-export commonly used types
pub use config::load_config;
pub use domain::entities::{MemberRecord, NetworkRecord, NetworkSummary, Record, RecordError};
pub use domain::ports::{BackingStore, ChangeListener, StoreEntry};
pub use domain::value_objects::{MemberId, NetworkId, StoreId};
pub use mirror::{MirrorConfig, MirrorSet, MirrorSetBuilder, ReconcileStats, StoreNotifier};
