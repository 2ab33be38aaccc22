//! # regsnap Ingest
//!
//! Streaming ingest of the registry dump into the store.
//!
//! ## Data Flow
//!
//! ```text
//! bytes ──> charset tee ──> XML tokens ──> (id, raw slice, fingerprint)
//!                                               │
//!                 unchanged ── touch            ▼
//!                 added ────── decode + insert  upsert
//!                 updated ──── decode + merge
//!                                               │
//!                                               ▼
//!                                     sweep(journal) + stats
//! ```

mod decode;
pub mod parser;

pub use parser::{parse_dump, refresh, RefreshStats, RegisterMeta};
