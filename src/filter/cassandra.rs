//! Compaction filter for expired and deleted Cassandra data
//!
//! With `purge_ttl_on_expiration` expired cells are removed outright;
//! otherwise they become tombstones first and are removed once the gc grace
//! period has passed. With `ignore_range_delete_on_read` rows covered by
//! range or partition deletes are dropped without waiting for the grace
//! period.

use std::sync::{Arc, OnceLock};

use tracing::{debug, info, trace, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::FilterConfig;
use crate::error::{CompactionError, Result};
use crate::format::{DecodedKey, DeletionTime, KeyCodec, Markers, PartitionValue};
use crate::meta::{ColumnFamily, MetaHandle, MetaStore};

use super::compare::compare_range_tombstone;
use super::header;
use super::{CompactionFilter, Decision, FilterContext, ValueType};

const FILTER_NAME: &str = "CassandraCompactionFilter";

/// Retention filter for Cassandra-format wide rows
///
/// ## Concurrency:
/// - Shared by every compaction thread (`Send + Sync`)
/// - `meta`: set at most once, read lock-free afterwards
/// - Everything else is immutable after construction
pub struct CassandraCompactionFilter {
    /// Filter options
    config: FilterConfig,

    /// Stored key layout
    keys: KeyCodec,

    /// Source of "now"
    clock: Arc<dyn Clock>,

    /// Metadata store holding partition headers, attached after construction
    meta: OnceLock<MetaHandle>,
}

impl CassandraCompactionFilter {
    /// Create a filter reading the wall clock
    pub fn new(config: FilterConfig) -> Result<Self> {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create a filter with an explicit time source
    pub fn with_clock(config: FilterConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            keys: KeyCodec::new(config.partition_key_length),
            config,
            clock,
            meta: OnceLock::new(),
        })
    }

    /// Attach the metadata store holding partition headers
    ///
    /// May be called while compactions are running; later invocations on any
    /// thread switch from input scans to point queries. Only one store can
    /// ever be attached.
    pub fn set_meta_store(&self, store: Arc<dyn MetaStore>, column_family: ColumnFamily) -> Result<()> {
        let handle = MetaHandle::new(store, column_family.clone());
        match self.meta.set(handle) {
            Ok(()) => {
                info!(column_family = %column_family, "metadata store attached to compaction filter");
                Ok(())
            }
            Err(_) => {
                warn!(column_family = %column_family, "metadata store already attached, ignoring");
                Err(CompactionError::Config(
                    "metadata store is already attached to this filter".to_string(),
                ))
            }
        }
    }

    /// Whether partition headers come from the metadata store
    pub fn has_meta_store(&self) -> bool {
        self.meta.get().is_some()
    }

    pub fn config(&self) -> &FilterConfig {
        &self.config
    }

    pub fn key_codec(&self) -> &KeyCodec {
        &self.keys
    }

    /// Tombstones deleted strictly before this instant (seconds) are purgeable
    pub fn gc_before(&self, now: i64) -> i64 {
        now - i64::from(self.config.gc_grace_period_in_seconds)
    }

    // =========================================================================
    // Partition Header
    // =========================================================================

    /// Partition state for `partition_key`, from the metadata store when one is
    /// attached, otherwise from the compaction input
    pub fn partition_header(&self, ctx: &FilterContext<'_>, partition_key: &[u8]) -> Result<PartitionValue> {
        match self.meta.get() {
            Some(handle) => header::by_point_query(handle, partition_key),
            None => header::by_scan(&self.keys, ctx.input, partition_key),
        }
    }

    /// Whether a partition or range delete removes this row
    pub fn should_drop_by_partition_header(
        &self,
        ctx: &FilterContext<'_>,
        key: &DecodedKey,
        row_timestamp: i64,
        now: i64,
    ) -> Result<bool> {
        let header = self.partition_header(ctx, &key.partition_key)?;
        if header.is_live() {
            return Ok(false);
        }
        let gc_before = self.gc_before(now);

        if let Some(deletion) = header.deletion {
            if deletion.deletes(row_timestamp) && self.collectable(&deletion, gc_before) {
                debug!(
                    row_timestamp,
                    marked_for_delete_at = deletion.marked_for_delete_at,
                    "row dropped by partition deletion"
                );
                return Ok(true);
            }
        }

        for tombstone in &header.range_tombstones {
            if compare_range_tombstone(&key.clustering, tombstone, row_timestamp)
                && self.collectable(&tombstone.deletion, gc_before)
            {
                debug!(
                    row_timestamp,
                    marked_for_delete_at = tombstone.deletion.marked_for_delete_at,
                    "row dropped by partition range tombstone"
                );
                return Ok(true);
            }
        }

        Ok(false)
    }

    // =========================================================================
    // Markers
    // =========================================================================

    /// Whether the row's own markers make it droppable
    pub fn should_drop_by_marker(&self, key: &DecodedKey, markers: &Markers, row_timestamp: i64, now: i64) -> bool {
        if markers.is_empty() {
            return false;
        }

        if self.config.purge_ttl_on_expiration && markers.all_cells_expired(now) {
            debug!(row_timestamp, now, "row purged: every cell expired");
            return true;
        }

        let gc_before = self.gc_before(now);

        for tombstone in markers.range_tombstones() {
            if compare_range_tombstone(&key.clustering, tombstone, row_timestamp)
                && self.collectable(&tombstone.deletion, gc_before)
            {
                debug!(row_timestamp, "row dropped by inline range tombstone");
                return true;
            }
        }

        if markers.all_cells_deleted_before(gc_before) {
            debug!(row_timestamp, gc_before, "row dropped: tombstones past gc grace");
            return true;
        }

        false
    }

    /// Partition and range deletes may go once past grace, or at once when
    /// reads ignore them
    fn collectable(&self, deletion: &DeletionTime, gc_before: i64) -> bool {
        self.config.ignore_range_delete_on_read || i64::from(deletion.local_deletion_time) < gc_before
    }

    /// Rewrite the surviving value: expire TTL cells and drop old tombstones
    fn compact_markers(&self, markers: &Markers, value_type: ValueType, now: i64) -> (Markers, bool) {
        let (compacted, mut changed) = if self.config.purge_ttl_on_expiration {
            markers.purge_expired(now)
        } else {
            markers.expired_to_tombstones(now)
        };

        // Merge operands may shadow older versions below them; keep their tombstones.
        if value_type != ValueType::Value {
            return (compacted, changed);
        }

        let (compacted, removed) = compacted.remove_tombstones(self.gc_before(now));
        changed |= removed;
        (compacted, changed)
    }
}

impl CompactionFilter for CassandraCompactionFilter {
    fn name(&self) -> &str {
        FILTER_NAME
    }

    /// Decide on one entry
    ///
    /// Partition deletion and range tombstone entries are always kept, even
    /// once past gc grace: the filter sees one entry at a time and cannot tell
    /// whether older rows they shadow still exist in lower levels. In scan
    /// mode they therefore accumulate until removed outside compaction.
    fn filter(
        &self,
        ctx: &FilterContext<'_>,
        key: &[u8],
        value_type: ValueType,
        existing_value: &[u8],
    ) -> Result<Decision> {
        let decoded = self.keys.decode(key)?;
        if decoded.kind.is_header() {
            trace!(kind = ?decoded.kind, "partition header entry kept");
            return Ok(Decision::Keep);
        }

        let markers = Markers::decode(existing_value)?;
        if markers.is_empty() {
            return Ok(Decision::Keep);
        }

        let now = self.clock.now_secs();

        if let Some(row_timestamp) = markers.latest_timestamp() {
            if self.should_drop_by_partition_header(ctx, &decoded, row_timestamp, now)? {
                return Ok(Decision::Remove);
            }
            if value_type == ValueType::Value
                && self.should_drop_by_marker(&decoded, &markers, row_timestamp, now)
            {
                return Ok(Decision::Remove);
            }
        }

        let (compacted, changed) = self.compact_markers(&markers, value_type, now);
        if compacted.is_empty() {
            debug!(level = ctx.level, "row removed: nothing left after compaction");
            return Ok(Decision::Remove);
        }
        if changed {
            debug!(
                level = ctx.level,
                before = markers.len(),
                after = compacted.len(),
                "row value rewritten"
            );
            return Ok(Decision::ChangeValue(compacted.encode()?));
        }

        trace!(level = ctx.level, "row kept");
        Ok(Decision::Keep)
    }
}
