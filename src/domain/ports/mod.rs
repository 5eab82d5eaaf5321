mod backing_store;
mod change_listener;

pub use backing_store::{BackingStore, StoreEntry};
pub use change_listener::ChangeListener;
