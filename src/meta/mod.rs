//! Metadata Store Module
//!
//! The auxiliary store holding partition-level delete headers.
//!
//! ## Responsibilities
//! - Point reads keyed by raw partition key
//! - Column-family addressing
//! - Read options controlling range-deletion processing
//!
//! The filter reads headers with `ignore_range_deletions` set so that a
//! lookup made from inside a compaction never re-enters range-delete
//! handling of the store it is compacting.

mod memory;

use std::fmt;
use std::sync::Arc;

use crate::error::Result;

pub use memory::MemoryMetaStore;

/// Options for a metadata read
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadOptions {
    /// Skip range-deletion processing for this read
    pub ignore_range_deletions: bool,
}

impl ReadOptions {
    /// Options used for partition header lookups
    pub fn for_partition_header() -> Self {
        Self {
            ignore_range_deletions: true,
        }
    }
}

/// Handle naming a column family inside a metadata store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnFamily(String);

impl ColumnFamily {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ColumnFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-read interface of the metadata store
pub trait MetaStore: Send + Sync {
    /// `Ok(None)` when the key is absent
    fn get(&self, options: &ReadOptions, column_family: &ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>>;
}

/// A store plus the column family holding partition headers
#[derive(Clone)]
pub struct MetaHandle {
    store: Arc<dyn MetaStore>,
    column_family: ColumnFamily,
}

impl MetaHandle {
    pub fn new(store: Arc<dyn MetaStore>, column_family: ColumnFamily) -> Self {
        Self {
            store,
            column_family,
        }
    }

    pub fn store(&self) -> &dyn MetaStore {
        self.store.as_ref()
    }

    pub fn column_family(&self) -> &ColumnFamily {
        &self.column_family
    }
}

impl fmt::Debug for MetaHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaHandle")
            .field("column_family", &self.column_family)
            .finish_non_exhaustive()
    }
}
