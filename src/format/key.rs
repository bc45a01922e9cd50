//! Stored key layout
//!
//! ```text
//! ┌───────────────────────────┬─────────┬──────────────────────────┐
//! │ Partition key section     │ Tag (1) │ Clustering bytes         │
//! └───────────────────────────┴─────────┴──────────────────────────┘
//! ```
//! The partition key section is either exactly `partition_key_length` raw
//! bytes, or `[len: u16 BE][bytes]` when no fixed length is configured.
//! Tags order partition-level entries ahead of the rows they govern.

use crate::error::{CompactionError, Result};

use super::clustering::{ClusteringBound, ClusteringKey};

/// What a stored key addresses
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum EntryKind {
    /// Partition-wide delete header
    PartitionDeletion = 0,
    /// Range delete header, keyed by its start bound
    RangeTombstone = 1,
    /// A row
    Row = 2,
}

impl EntryKind {
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(EntryKind::PartitionDeletion),
            1 => Ok(EntryKind::RangeTombstone),
            2 => Ok(EntryKind::Row),
            other => Err(CompactionError::Corruption(format!(
                "unknown entry tag {}",
                other
            ))),
        }
    }

    /// Partition-level entries (deletions and range tombstones)
    pub fn is_header(self) -> bool {
        self != EntryKind::Row
    }
}

/// A stored key split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKey {
    pub partition_key: Vec<u8>,
    pub kind: EntryKind,
    /// Row clustering, or the start bound's key for range tombstone entries
    pub clustering: ClusteringKey,
}

/// Encodes and decodes stored keys for one partition-key layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyCodec {
    partition_key_length: usize,
}

impl KeyCodec {
    /// `partition_key_length == 0` selects length-prefixed partition keys
    pub fn new(partition_key_length: usize) -> Self {
        Self {
            partition_key_length,
        }
    }

    pub fn partition_key_length(&self) -> usize {
        self.partition_key_length
    }

    /// Encoded partition key section shared by every key of the partition
    pub fn partition_prefix(&self, partition_key: &[u8]) -> Result<Vec<u8>> {
        if self.partition_key_length > 0 {
            if partition_key.len() != self.partition_key_length {
                return Err(CompactionError::Corruption(format!(
                    "partition key is {} bytes, expected {}",
                    partition_key.len(),
                    self.partition_key_length
                )));
            }
            return Ok(partition_key.to_vec());
        }

        let len = u16::try_from(partition_key.len()).map_err(|_| {
            CompactionError::Corruption(format!(
                "partition key of {} bytes is too long",
                partition_key.len()
            ))
        })?;
        let mut prefix = Vec::with_capacity(2 + partition_key.len());
        prefix.extend_from_slice(&len.to_be_bytes());
        prefix.extend_from_slice(partition_key);
        Ok(prefix)
    }

    /// Key of a row
    pub fn row_key(&self, partition_key: &[u8], clustering: &ClusteringKey) -> Result<Vec<u8>> {
        let mut key = self.partition_prefix(partition_key)?;
        key.push(EntryKind::Row as u8);
        key.extend_from_slice(clustering.data());
        Ok(key)
    }

    /// Key of the partition deletion header
    pub fn partition_deletion_key(&self, partition_key: &[u8]) -> Result<Vec<u8>> {
        let mut key = self.partition_prefix(partition_key)?;
        key.push(EntryKind::PartitionDeletion as u8);
        Ok(key)
    }

    /// Key of a range tombstone header: start bound bytes then its kind
    pub fn range_tombstone_key(&self, partition_key: &[u8], start: &ClusteringBound) -> Result<Vec<u8>> {
        let mut key = self.partition_prefix(partition_key)?;
        key.push(EntryKind::RangeTombstone as u8);
        key.extend_from_slice(start.key.data());
        key.push(start.kind.code() as u8);
        Ok(key)
    }

    /// Length of the partition key section at the front of `key`
    pub fn partition_section_len(&self, key: &[u8]) -> Result<usize> {
        if self.partition_key_length > 0 {
            if key.len() < self.partition_key_length {
                return Err(CompactionError::Corruption(format!(
                    "key of {} bytes is shorter than the partition key length {}",
                    key.len(),
                    self.partition_key_length
                )));
            }
            return Ok(self.partition_key_length);
        }

        if key.len() < 2 {
            return Err(CompactionError::Corruption(
                "key too short for a partition key length".to_string(),
            ));
        }
        let len = u16::from_be_bytes([key[0], key[1]]) as usize;
        if key.len() < 2 + len {
            return Err(CompactionError::Corruption(format!(
                "partition key length {} overruns a {}-byte key",
                len,
                key.len()
            )));
        }
        Ok(2 + len)
    }

    /// Split a stored key into partition key, entry kind and clustering
    pub fn decode(&self, key: &[u8]) -> Result<DecodedKey> {
        let section = self.partition_section_len(key)?;
        let partition_key = if self.partition_key_length > 0 {
            key[..section].to_vec()
        } else {
            key[2..section].to_vec()
        };

        let tag = *key.get(section).ok_or_else(|| {
            CompactionError::Corruption("key has no entry tag".to_string())
        })?;
        let kind = EntryKind::from_tag(tag)?;
        let rest = &key[section + 1..];

        let clustering = match kind {
            EntryKind::Row => ClusteringKey::from_encoded(rest.to_vec())?,
            EntryKind::RangeTombstone => match rest.split_last() {
                Some((_kind, start)) => ClusteringKey::from_encoded(start.to_vec())?,
                None => {
                    return Err(CompactionError::Corruption(
                        "range tombstone key has no start bound".to_string(),
                    ))
                }
            },
            EntryKind::PartitionDeletion => {
                if !rest.is_empty() {
                    return Err(CompactionError::Corruption(
                        "partition deletion key has trailing bytes".to_string(),
                    ));
                }
                ClusteringKey::empty()
            }
        };

        Ok(DecodedKey {
            partition_key,
            kind,
            clustering,
        })
    }
}
