//! # Configuration
//!
//! Configuration for the store and the ingest pipeline.

use serde::{Deserialize, Serialize};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    pub store: StoreConfig,
    pub ingest: IngestConfig,
}

/// Store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Capacity hint for the entry map. Zero grows on demand.
    pub expected_entries: usize,
}

/// Ingest configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    /// Initial capacity of the writer-local scratch buffer that captures
    /// raw record bytes.
    pub scratch_capacity: usize,
    /// Chunk size for reads from the dump stream.
    pub read_chunk: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            scratch_capacity: 256 * 1024,
            read_chunk: 64 * 1024,
        }
    }
}
