//! Partition-level deletion state
//!
//! Partition deletions and range tombstones are persisted with bincode, both
//! in the metadata store and as header entries in the data stream.

use serde::{Deserialize, Serialize};

use crate::error::{CompactionError, Result};

use super::clustering::ClusteringBound;

/// When something was deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionTime {
    /// Write timestamp of the delete (microseconds); shadows older writes
    pub marked_for_delete_at: i64,
    /// Server-local time of the delete (seconds); drives the grace period
    pub local_deletion_time: i32,
}

impl DeletionTime {
    pub fn new(marked_for_delete_at: i64, local_deletion_time: i32) -> Self {
        Self {
            marked_for_delete_at,
            local_deletion_time,
        }
    }

    /// Whether this delete shadows a write made at `timestamp`
    pub fn deletes(&self, timestamp: i64) -> bool {
        self.marked_for_delete_at >= timestamp
    }

    /// The newer of two deletions
    pub fn supersede(self, other: DeletionTime) -> DeletionTime {
        if other.marked_for_delete_at > self.marked_for_delete_at {
            other
        } else {
            self
        }
    }
}

/// Deletion of a contiguous span of clustering keys within a partition
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeTombstone {
    pub start: ClusteringBound,
    pub end: ClusteringBound,
    pub deletion: DeletionTime,
}

impl RangeTombstone {
    /// Create a range tombstone, checking the bound kinds
    pub fn new(start: ClusteringBound, end: ClusteringBound, deletion: DeletionTime) -> Result<Self> {
        let tombstone = Self {
            start,
            end,
            deletion,
        };
        tombstone.validate()?;
        Ok(tombstone)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let tombstone: RangeTombstone = bincode::deserialize(bytes)
            .map_err(|e| CompactionError::Corruption(format!("range tombstone: {}", e)))?;
        tombstone.validate()?;
        Ok(tombstone)
    }

    /// Check that the bounds are a start and an end
    pub(crate) fn validate(&self) -> Result<()> {
        if !self.start.kind.is_start() || !self.end.kind.is_end() {
            return Err(CompactionError::Corruption(format!(
                "range tombstone bounds must be (start, end), got ({:?}, {:?})",
                self.start.kind, self.end.kind
            )));
        }
        Ok(())
    }
}

/// Resolved partition state used for retention decisions
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionValue {
    /// Partition-wide delete, if any
    pub deletion: Option<DeletionTime>,
    /// Range deletes recorded for the partition
    pub range_tombstones: Vec<RangeTombstone>,
}

impl PartitionValue {
    /// No partition-level delete in effect
    pub fn live() -> Self {
        Self::default()
    }

    pub fn is_live(&self) -> bool {
        self.deletion.is_none() && self.range_tombstones.is_empty()
    }

    /// Record a partition delete, keeping the newest one
    pub fn add_deletion(&mut self, deletion: DeletionTime) {
        self.deletion = Some(match self.deletion {
            Some(existing) => existing.supersede(deletion),
            None => deletion,
        });
    }

    pub fn add_range_tombstone(&mut self, tombstone: RangeTombstone) {
        self.range_tombstones.push(tombstone);
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let value: PartitionValue = bincode::deserialize(bytes)
            .map_err(|e| CompactionError::Corruption(format!("partition header: {}", e)))?;
        for tombstone in &value.range_tombstones {
            tombstone.validate()?;
        }
        Ok(value)
    }
}

/// Encode a partition deletion header entry
pub fn encode_deletion(deletion: &DeletionTime) -> Result<Vec<u8>> {
    Ok(bincode::serialize(deletion)?)
}

/// Decode a partition deletion header entry
pub fn decode_deletion(bytes: &[u8]) -> Result<DeletionTime> {
    bincode::deserialize(bytes)
        .map_err(|e| CompactionError::Corruption(format!("partition deletion: {}", e)))
}
