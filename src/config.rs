//! Configuration for the Cassandra compaction filter
//!
//! Centralized configuration with sensible defaults.

use crate::error::{CompactionError, Result};

/// Cassandra's default `gc_grace_seconds` (10 days)
pub const DEFAULT_GC_GRACE_PERIOD_SECS: i32 = 10 * 24 * 60 * 60;

/// Options the filter is constructed with
///
/// `purge_ttl_on_expiration` should only be enabled when every write in the
/// table uses the same TTL. With mixed TTLs an older, longer-lived cell can
/// come back once a newer, shorter-lived one is purged outright.
#[derive(Debug, Clone)]
pub struct FilterConfig {
    // -------------------------------------------------------------------------
    // Expiration
    // -------------------------------------------------------------------------
    /// Hard-delete expired TTL cells instead of converting them to tombstones
    pub purge_ttl_on_expiration: bool,

    // -------------------------------------------------------------------------
    // Tombstones
    // -------------------------------------------------------------------------
    /// Drop rows covered by range/partition deletes without waiting for the
    /// grace period. Trades read-after-delete consistency for disk space.
    pub ignore_range_delete_on_read: bool,

    /// Minimum time (seconds) a tombstone is retained before it can be purged
    pub gc_grace_period_in_seconds: i32,

    // -------------------------------------------------------------------------
    // Key Layout
    // -------------------------------------------------------------------------
    /// Fixed partition key length in bytes.
    /// 0 means the key embeds the length as a u16 prefix.
    pub partition_key_length: usize,
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            purge_ttl_on_expiration: false,
            ignore_range_delete_on_read: false,
            gc_grace_period_in_seconds: DEFAULT_GC_GRACE_PERIOD_SECS,
            partition_key_length: 0,
        }
    }
}

impl FilterConfig {
    /// Create a new config builder
    pub fn builder() -> FilterConfigBuilder {
        FilterConfigBuilder::default()
    }

    /// Reject settings the filter cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.gc_grace_period_in_seconds < 0 {
            return Err(CompactionError::Config(format!(
                "gc grace period must not be negative, got {}",
                self.gc_grace_period_in_seconds
            )));
        }
        if self.partition_key_length > u16::MAX as usize {
            return Err(CompactionError::Config(format!(
                "partition key length {} exceeds {}",
                self.partition_key_length,
                u16::MAX
            )));
        }
        Ok(())
    }
}

/// Builder for FilterConfig
#[derive(Default)]
pub struct FilterConfigBuilder {
    config: FilterConfig,
}

impl FilterConfigBuilder {
    /// Purge expired TTL cells outright
    pub fn purge_ttl_on_expiration(mut self, enabled: bool) -> Self {
        self.config.purge_ttl_on_expiration = enabled;
        self
    }

    /// Skip the grace period for range and partition deletes
    pub fn ignore_range_delete_on_read(mut self, enabled: bool) -> Self {
        self.config.ignore_range_delete_on_read = enabled;
        self
    }

    /// Set the gc grace period (in seconds)
    pub fn gc_grace_period_in_seconds(mut self, secs: i32) -> Self {
        self.config.gc_grace_period_in_seconds = secs;
        self
    }

    /// Set a fixed partition key length (0 = length-prefixed keys)
    pub fn partition_key_length(mut self, len: usize) -> Self {
        self.config.partition_key_length = len;
        self
    }

    pub fn build(self) -> FilterConfig {
        self.config
    }
}
