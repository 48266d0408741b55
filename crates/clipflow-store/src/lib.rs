//! Local durable key/value persistence.
//!
//! This crate provides:
//! - A `KeyValueStore` abstraction with file-backed and in-memory implementations
//! - `SessionStore`, which remembers the current session id across restarts
//! - `LocalState`, which keeps saved results, log lines and filter tags

pub mod error;
pub mod kv;
pub mod local_state;
pub mod session_store;

pub use error::{StoreError, StoreResult};
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use local_state::{LocalState, MAX_LOG_LINES};
pub use session_store::SessionStore;
