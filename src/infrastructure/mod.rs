//! Infrastructure Layer
//!
//! Process-level concerns shared by the binary and integration tests.

pub mod shutdown;

pub use shutdown::{shutdown_signal, ShutdownController, TaskGuard};
