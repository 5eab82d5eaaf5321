mod channel_listener;
mod memory_store;
mod recording_listener;
mod sqlite_store;
mod tracing_listener;

pub use channel_listener::{ChannelChangeListener, MirrorEvent};
pub use memory_store::{InMemoryStore, OnlineStatus};
pub use recording_listener::RecordingChangeListener;
pub use sqlite_store::{SqliteStore, StoreError};
pub use tracing_listener::TracingChangeListener;
