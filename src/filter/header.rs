//! Partition header resolution
//!
//! Two sources, picked by whether a metadata store is attached:
//! - **scan**: read the partition's header entries from the compaction input
//! - **point query**: one `get` against the metadata store's header family

use tracing::trace;

use crate::error::{CompactionError, Result};
use crate::format::{decode_deletion, EntryKind, KeyCodec, PartitionValue, RangeTombstone};
use crate::meta::{MetaHandle, ReadOptions};

use super::PartitionScan;

/// Collect the partition's header entries from the compaction input
///
/// Header entries sort directly before the partition's rows, so the scan
/// starts at the partition deletion key and stops at the first row or at the
/// next partition.
pub(crate) fn by_scan(
    keys: &KeyCodec,
    input: Option<&dyn PartitionScan>,
    partition_key: &[u8],
) -> Result<PartitionValue> {
    let mut header = PartitionValue::live();
    let input = match input {
        Some(input) => input,
        None => return Ok(header),
    };

    let prefix = keys.partition_prefix(partition_key)?;
    let start = keys.partition_deletion_key(partition_key)?;

    for (key, value) in input.seek(&start) {
        if !key.starts_with(&prefix) {
            break;
        }
        let tag = match key.get(prefix.len()) {
            Some(&tag) => EntryKind::from_tag(tag)?,
            None => break,
        };
        match tag {
            EntryKind::PartitionDeletion => header.add_deletion(decode_deletion(value)?),
            EntryKind::RangeTombstone => header.add_range_tombstone(RangeTombstone::decode(value)?),
            EntryKind::Row => break,
        }
    }

    trace!(
        range_tombstones = header.range_tombstones.len(),
        deleted = header.deletion.is_some(),
        "partition header resolved by scan"
    );
    Ok(header)
}

/// Look the header up in the metadata store by raw partition key
pub(crate) fn by_point_query(handle: &MetaHandle, partition_key: &[u8]) -> Result<PartitionValue> {
    let options = ReadOptions::for_partition_header();
    let raw = handle
        .store()
        .get(&options, handle.column_family(), partition_key)
        .map_err(|e| match e {
            CompactionError::MetaStore(msg) => CompactionError::MetaStore(msg),
            other => CompactionError::MetaStore(format!(
                "partition header lookup in '{}' failed: {}",
                handle.column_family(),
                other
            )),
        })?;

    match raw {
        Some(bytes) => PartitionValue::decode(&bytes),
        None => Ok(PartitionValue::live()),
    }
}
