//! Adapters Layer
//!
//! Concrete backing stores and change listeners.

pub mod outbound;
