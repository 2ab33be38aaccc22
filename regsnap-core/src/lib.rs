//! # regsnap Core
//!
//! This crate provides the fundamental building blocks for the regsnap
//! registry mirror:
//! - Error types
//! - Configuration
//! - Cumulative metrics
//! - Resource value normalizers and timestamp parsing
//! - FNV-1a fingerprints
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │                  regsnap-core                   │
//! ├─────────────────────────────────────────────────┤
//! │  • error       - Error handling                 │
//! │  • config      - Store / ingest configuration   │
//! │  • metrics     - Cumulative counters            │
//! │  • normalize   - Value canonicalization         │
//! │  • fingerprint - 64-bit FNV-1a hashing          │
//! └─────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod fingerprint;
pub mod metrics;
pub mod normalize;

pub use error::{Error, Result};

/// Registry record identifier, stable across refreshes.
pub type ContentId = i32;

/// Unix seconds.
pub type UnixTime = i64;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
