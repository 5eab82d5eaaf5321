//! Domain Layer
//!
//! Records, identifiers and the ports the mirror set is built against.

pub mod entities;
pub mod ports;
pub mod value_objects;

pub use entities::{MemberRecord, NetworkRecord, NetworkSummary, Record, RecordError};
pub use value_objects::{MemberId, NetworkId, StoreId};
