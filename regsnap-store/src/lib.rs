//! # regsnap Store
//!
//! In-memory mirror of the registry dump: the entry store, the inverted
//! indexes keyed by resource values, and the single-writer/multi-reader
//! snapshot surface.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Write Path                             │
//! │                                                             │
//! │  (id, raw bytes, fingerprint) ──> upsert ──> diff/apply     │
//! │                                     │            │          │
//! │                                     ▼            ▼          │
//! │                                  Entry map   7 inverted     │
//! │                                              indexes        │
//! └─────────────────────────────────────────────────────────────┘
//!
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      Read Path                              │
//! │                                                             │
//! │  lookup(value) ──> normalize ──> index ──> id set ──> Entry │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod entry;
pub mod idset;
pub mod index;
pub mod record;
pub mod store;

pub use entry::{BlockType, Entry};
pub use idset::IdSet;
pub use index::ResourceIndex;
pub use record::{Decision, Record};
pub use store::{DumpStore, LookupMatch, Snapshot, StoreStats, UpsertOutcome};
