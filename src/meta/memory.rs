//! In-memory metadata store
//!
//! BTreeMap per column family behind a RwLock, with range deletions that
//! hide covered keys unless a read asks to ignore them.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::error::{CompactionError, Result};
use crate::format::PartitionValue;

use super::{ColumnFamily, MetaStore, ReadOptions};

#[derive(Default)]
struct ColumnFamilyData {
    entries: BTreeMap<Vec<u8>, Vec<u8>>,
    /// Deleted `[start, end)` key ranges
    range_deletions: Vec<(Vec<u8>, Vec<u8>)>,
}

impl ColumnFamilyData {
    fn range_deleted(&self, key: &[u8]) -> bool {
        self.range_deletions
            .iter()
            .any(|(start, end)| start.as_slice() <= key && key < end.as_slice())
    }
}

/// Metadata store kept entirely in memory
///
/// ## Concurrency:
/// - `families`: RwLock (concurrent readers from compaction threads)
/// - `reads`: Atomic counter (lock-free)
#[derive(Default)]
pub struct MemoryMetaStore {
    families: RwLock<HashMap<String, ColumnFamilyData>>,
    reads: AtomicU64,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reopen) a column family
    pub fn create_column_family(&self, name: &str) -> ColumnFamily {
        self.families.write().entry(name.to_string()).or_default();
        ColumnFamily::new(name)
    }

    pub fn put(&self, column_family: &ColumnFamily, key: &[u8], value: &[u8]) -> Result<()> {
        let mut families = self.families.write();
        let family = families
            .get_mut(column_family.name())
            .ok_or_else(|| unknown_family(column_family))?;
        family.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    /// Store the header for a partition
    pub fn put_partition_header(
        &self,
        column_family: &ColumnFamily,
        partition_key: &[u8],
        header: &PartitionValue,
    ) -> Result<()> {
        self.put(column_family, partition_key, &header.encode()?)
    }

    /// Hide every key in `[start, end)` from reads that honor range deletions
    pub fn delete_range(&self, column_family: &ColumnFamily, start: &[u8], end: &[u8]) -> Result<()> {
        let mut families = self.families.write();
        let family = families
            .get_mut(column_family.name())
            .ok_or_else(|| unknown_family(column_family))?;
        family.range_deletions.push((start.to_vec(), end.to_vec()));
        Ok(())
    }

    /// Number of point reads served
    pub fn reads(&self) -> u64 {
        self.reads.load(Ordering::SeqCst)
    }
}

impl MetaStore for MemoryMetaStore {
    fn get(&self, options: &ReadOptions, column_family: &ColumnFamily, key: &[u8]) -> Result<Option<Vec<u8>>> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let families = self.families.read();
        let family = families
            .get(column_family.name())
            .ok_or_else(|| unknown_family(column_family))?;

        if !options.ignore_range_deletions && family.range_deleted(key) {
            return Ok(None);
        }
        Ok(family.entries.get(key).cloned())
    }
}

fn unknown_family(column_family: &ColumnFamily) -> CompactionError {
    CompactionError::MetaStore(format!("unknown column family '{}'", column_family))
}
