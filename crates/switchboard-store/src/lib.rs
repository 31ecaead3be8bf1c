//! Configuration, counter and history stores.
//!
//! The router reads channel configuration and settings through
//! [`ConfigStore`], coordinates in-flight requests through [`CounterStore`]
//! and pulls chat history through [`HistorySource`]. [`SqliteStore`] backs all
//! three with one database file; [`MemoryStore`] keeps everything in process.

/// Configuration store and settings.
pub mod config;
/// Counter store and key layout.
pub mod counter;
/// Chat history source.
pub mod history;
/// In-process store.
pub mod memory;
/// Channel lookup by model.
pub mod registry;
/// SQLite-backed store.
pub mod sqlite;

pub use config::{ConfigStore, Settings};
pub use counter::{capacity_total_key, inflight_key, CounterStore};
pub use history::HistorySource;
pub use memory::MemoryStore;
pub use registry::{total_parallelism, ChannelRegistry};
pub use sqlite::SqliteStore;
