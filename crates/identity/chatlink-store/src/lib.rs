//! Store implementations for the linking handshake.
//!
//! The in-memory stores keep one `DashMap` entry per key, so every operation
//! locks only the shard holding the record it touches. They are sufficient
//! for a single-instance deployment. [`FileCredentialStore`] keeps linked
//! credentials across restarts.

mod codes;
mod credentials;
mod handshakes;

pub use codes::{DEFAULT_CODE_LENGTH, DEFAULT_CODE_TTL_SECONDS, InMemoryCodeStore};
pub use credentials::{FileCredentialStore, InMemoryCredentialStore};
pub use handshakes::{DEFAULT_HANDSHAKE_TTL_SECONDS, InMemoryHandshakeStore};
