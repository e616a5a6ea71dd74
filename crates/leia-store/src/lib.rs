//! # leia-store
//!
//! The host key/value store the telemetry pipeline persists through.
//!
//! - [`KeyValueStore`]: async get/put/delete of JSON values under namespaced keys
//! - [`SqliteStore`]: durable implementation backed by a single `entries` table (WAL)
//! - [`MemoryStore`]: in-process implementation with write-failure injection for tests
//! - [`keys`]: the well-known keys shared with the host

#![deny(unsafe_code)]

pub mod error;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod schema;
pub mod sqlite;

pub use error::StoreError;
pub use kv::KeyValueStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
