//! # cassandra-compaction
//!
//! Compaction-time retention for Cassandra-format wide rows stored in an
//! LSM key-value store:
//! - Per-cell TTL expiry (purge outright or convert to tombstone)
//! - Cell, range and partition tombstones
//! - gc grace period before tombstones are reclaimed
//! - Partition headers from the compaction input or a metadata store
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Compaction Driver                         │
//! │          (merge SSTables, newest version wins)               │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │  key / value type / value
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │               CassandraCompactionFilter                      │
//! │     (Keep | Remove | ChangeValue, one per entry)             │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Input Scan  │          │ Meta Store  │
//!   │ (headers)   │          │ (point get) │
//!   └─────────────┘          └─────────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;
pub mod clock;

pub mod format;
pub mod meta;
pub mod filter;
pub mod storage;
pub mod compaction;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{CompactionError, Result};
pub use config::FilterConfig;
pub use filter::{CassandraCompactionFilter, CompactionFilter, Decision, FilterContext, ValueType};
pub use compaction::{CompactionJob, SortedRun};

// =============================================================================
// Version Info
// =============================================================================

/// Current crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
