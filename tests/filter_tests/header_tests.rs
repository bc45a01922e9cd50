//! Tests for partition header resolution
//!
//! These tests verify:
//! - Scans of the compaction input stay inside the partition
//! - Point queries replace scans once a metadata store is attached
//! - Metadata reads ignore range deletions
//! - Store failures and corrupt headers are fatal

use std::sync::Arc;
use std::thread;

use cassandra_compaction::format::{DeletionTime, PartitionValue};
use cassandra_compaction::meta::{ColumnFamily, MemoryMetaStore, MetaStore, ReadOptions};
use cassandra_compaction::{
    CassandraCompactionFilter, CompactionError, CompactionFilter, Decision, FilterContext,
    Result, SortedRun, ValueType,
};

use crate::common::*;

// =============================================================================
// Helper Functions
// =============================================================================

fn old_deletion() -> DeletionTime {
    DeletionTime::new(written(0), deleted(GRACE as i64 + 1))
}

fn deleted_header() -> PartitionValue {
    let mut header = PartitionValue::live();
    header.add_deletion(old_deletion());
    header
}

fn store_with_header(partition: &str) -> (Arc<MemoryMetaStore>, ColumnFamily) {
    let store = Arc::new(MemoryMetaStore::new());
    let cf = store.create_column_family("partitions");
    store
        .put_partition_header(&cf, partition.as_bytes(), &deleted_header())
        .unwrap();
    (store, cf)
}

fn filter_row(filter: &CassandraCompactionFilter, ctx: &FilterContext<'_>, partition: &str) -> Result<Decision> {
    filter.filter(
        ctx,
        &row_key(partition, &["c"]),
        ValueType::Value,
        &value(vec![live(1, written(100))]),
    )
}

/// Store whose reads always fail
struct FailingStore;

impl MetaStore for FailingStore {
    fn get(&self, _: &ReadOptions, _: &ColumnFamily, _: &[u8]) -> Result<Option<Vec<u8>>> {
        Err(CompactionError::Io(std::io::Error::new(
            std::io::ErrorKind::Other,
            "disk unavailable",
        )))
    }
}

// =============================================================================
// Scan Tests
// =============================================================================

#[test]
fn test_scan_collects_partition_header() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(10, 1));
    put_partition_deletion(&mut run, "q", DeletionTime::new(99, 1));
    put_range_tombstone(&mut run, "p", &range(&["a"], &["c"], 20, 2));
    put_range_tombstone(&mut run, "p", &range(&["x"], &["z"], 30, 3));
    put_row(&mut run, "p", &["b"], vec![live(1, 5)]);
    let ctx = FilterContext::with_input(0, &run);

    let header = filter.partition_header(&ctx, b"p").unwrap();

    assert_eq!(header.deletion, Some(DeletionTime::new(10, 1)));
    assert_eq!(
        header.range_tombstones,
        vec![range(&["a"], &["c"], 20, 2), range(&["x"], &["z"], 30, 3)]
    );
}

#[test]
fn test_scan_stays_inside_partition() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", old_deletion());
    put_row(&mut run, "pp", &["c"], vec![live(1, written(100))]);
    let ctx = FilterContext::with_input(0, &run);

    assert_eq!(filter_row(&filter, &ctx, "p").unwrap(), Decision::Remove);
    assert_eq!(filter_row(&filter, &ctx, "pp").unwrap(), Decision::Keep);
    assert_eq!(filter_row(&filter, &ctx, "o").unwrap(), Decision::Keep);
    assert!(filter.partition_header(&ctx, b"pp").unwrap().is_live());
}

#[test]
fn test_no_store_and_no_input_means_live() {
    let (_, filter) = default_filter();
    let ctx = FilterContext::new(0);

    assert!(filter.partition_header(&ctx, b"p").unwrap().is_live());
    assert_eq!(filter_row(&filter, &ctx, "p").unwrap(), Decision::Keep);
}

// =============================================================================
// Point Query Tests
// =============================================================================

#[test]
fn test_point_query_used_once_attached() {
    let (_, filter) = default_filter();
    let (store, cf) = store_with_header("p");

    assert!(!filter.has_meta_store());
    filter.set_meta_store(store.clone(), cf).unwrap();
    assert!(filter.has_meta_store());

    let decision = filter_row(&filter, &FilterContext::new(0), "p").unwrap();

    assert_eq!(decision, Decision::Remove);
    assert_eq!(store.reads(), 1);
}

#[test]
fn test_point_query_replaces_scan() {
    let (_, filter) = default_filter();
    let store = Arc::new(MemoryMetaStore::new());
    let cf = store.create_column_family("partitions");
    filter.set_meta_store(store, cf).unwrap();

    // The input says "deleted" but the store is the source of truth
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", old_deletion());
    let ctx = FilterContext::with_input(0, &run);

    assert_eq!(filter_row(&filter, &ctx, "p").unwrap(), Decision::Keep);
}

#[test]
fn test_point_query_ignores_range_deletions() {
    let (_, filter) = default_filter();
    let (store, cf) = store_with_header("p");
    store.delete_range(&cf, b"a", b"z").unwrap();

    // Ordinary reads no longer see the header
    assert_eq!(store.get(&ReadOptions::default(), &cf, b"p").unwrap(), None);

    filter.set_meta_store(store, cf).unwrap();
    assert_eq!(filter_row(&filter, &FilterContext::new(0), "p").unwrap(), Decision::Remove);
}

#[test]
fn test_store_failure_is_fatal() {
    let (_, filter) = default_filter();
    filter
        .set_meta_store(Arc::new(FailingStore), ColumnFamily::new("partitions"))
        .unwrap();

    let result = filter_row(&filter, &FilterContext::new(0), "p");

    assert!(matches!(result, Err(CompactionError::MetaStore(_))));
}

#[test]
fn test_unknown_column_family_is_fatal() {
    let (_, filter) = default_filter();
    filter
        .set_meta_store(Arc::new(MemoryMetaStore::new()), ColumnFamily::new("missing"))
        .unwrap();

    let result = filter_row(&filter, &FilterContext::new(0), "p");

    assert!(matches!(result, Err(CompactionError::MetaStore(_))));
}

#[test]
fn test_corrupt_stored_header_is_fatal() {
    let (_, filter) = default_filter();
    let store = Arc::new(MemoryMetaStore::new());
    let cf = store.create_column_family("partitions");
    store.put(&cf, b"p", &[0xff, 0xff, 0xff]).unwrap();
    filter.set_meta_store(store, cf).unwrap();

    let result = filter_row(&filter, &FilterContext::new(0), "p");

    assert!(matches!(result, Err(CompactionError::Corruption(_))));
}

#[test]
fn test_store_attached_only_once() {
    let (_, filter) = default_filter();
    let (first, cf) = store_with_header("p");
    filter.set_meta_store(first.clone(), cf).unwrap();

    let second = Arc::new(MemoryMetaStore::new());
    let other_cf = second.create_column_family("partitions");
    let result = filter.set_meta_store(second.clone(), other_cf);

    assert!(matches!(result, Err(CompactionError::Config(_))));

    filter_row(&filter, &FilterContext::new(0), "p").unwrap();
    assert_eq!(first.reads(), 1);
    assert_eq!(second.reads(), 0);
}

#[test]
fn test_store_attached_on_another_thread() {
    let (_, filter) = default_filter();
    let filter = Arc::new(filter);
    let (store, cf) = store_with_header("p");

    let setter = {
        let filter = Arc::clone(&filter);
        thread::spawn(move || filter.set_meta_store(store, cf))
    };
    setter.join().unwrap().unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let filter = Arc::clone(&filter);
            thread::spawn(move || filter_row(&filter, &FilterContext::new(0), "p"))
        })
        .collect();

    for reader in readers {
        assert_eq!(reader.join().unwrap().unwrap(), Decision::Remove);
    }
}
