//! Tests for CassandraCompactionFilter decisions
//!
//! These tests verify:
//! - Partition and range deletes drop covered rows once collectable
//! - TTL expiry purges or converts cells
//! - Grace-period boundary for tombstones
//! - Merge operands keep their tombstones
//! - Malformed input is an error, never a guess

use cassandra_compaction::format::{DeletionTime, KeyCodec, Marker, Markers};
use cassandra_compaction::{
    CassandraCompactionFilter, CompactionError, CompactionFilter, Decision, FilterConfig,
    FilterContext, SortedRun, ValueType,
};

use crate::common::*;

// =============================================================================
// Helper Functions
// =============================================================================

/// Run the filter over the row `p/fragments` with `run` as compaction input
fn decide(
    filter: &CassandraCompactionFilter,
    run: &SortedRun,
    fragments: &[&str],
    value_type: ValueType,
    markers: Vec<Marker>,
) -> Decision {
    let ctx = FilterContext::with_input(1, run);
    filter
        .filter(&ctx, &row_key("p", fragments), value_type, &value(markers))
        .unwrap()
}

fn decide_row(filter: &CassandraCompactionFilter, run: &SortedRun, markers: Vec<Marker>) -> Decision {
    decide(filter, run, &["c"], ValueType::Value, markers)
}

fn changed_markers(decision: Decision) -> Vec<Marker> {
    match decision {
        Decision::ChangeValue(bytes) => Markers::decode(&bytes).unwrap().into_inner(),
        other => panic!("expected ChangeValue, got {:?}", other),
    }
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_row_without_markers_is_kept() {
    let (_, filter) = default_filter();

    assert_eq!(decide_row(&filter, &SortedRun::new(), vec![]), Decision::Keep);
}

#[test]
fn test_partition_deletion_drops_older_row() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(150, deleted(GRACE as i64 + 60)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, 100)]), Decision::Remove);
}

#[test]
fn test_partition_deletion_spares_newer_row() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(150, deleted(GRACE as i64 + 60)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, 151)]), Decision::Keep);
}

#[test]
fn test_young_range_tombstone_keeps_row() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_range_tombstone(&mut run, "p", &range(&["a"], &["m"], written(10), deleted(10)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, written(100))]), Decision::Keep);
}

#[test]
fn test_old_range_tombstone_drops_row() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_range_tombstone(
        &mut run,
        "p",
        &range(&["a"], &["m"], written(GRACE as i64 + 10), deleted(GRACE as i64 + 10)),
    );

    assert_eq!(
        decide_row(&filter, &run, vec![live(1, written(GRACE as i64 + 100))]),
        Decision::Remove
    );
}

#[test]
fn test_range_tombstone_outside_row_is_ignored() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_range_tombstone(&mut run, "p", &range(&["d"], &["m"], written(0), deleted(GRACE as i64 + 10)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, written(100))]), Decision::Keep);
}

#[test]
fn test_ignore_range_delete_on_read_skips_grace() {
    let (_, filter) = filter_with(config().ignore_range_delete_on_read(true).build());
    let mut run = SortedRun::new();
    put_range_tombstone(&mut run, "p", &range(&["a"], &["m"], written(10), deleted(10)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, written(100))]), Decision::Remove);
}

#[test]
fn test_expired_cell_purged() {
    let (_, filter) = filter_with(config().purge_ttl_on_expiration(true).build());

    assert_eq!(
        decide_row(&filter, &SortedRun::new(), vec![expiring(1, written(100), 50)]),
        Decision::Remove
    );
}

#[test]
fn test_expired_cell_converted_to_tombstone() {
    let (_, filter) = default_filter();

    let decision = decide_row(&filter, &SortedRun::new(), vec![expiring(1, written(100), 50)]);

    assert_eq!(
        changed_markers(decision),
        vec![tombstone(1, written(100), deleted(50))]
    );
}

// =============================================================================
// Grace Period Tests
// =============================================================================

#[test]
fn test_tombstone_at_grace_boundary_is_retained() {
    let (_, filter) = default_filter();
    let at_boundary = deleted(GRACE as i64);

    assert_eq!(
        decide_row(&filter, &SortedRun::new(), vec![tombstone(1, written(GRACE as i64), at_boundary)]),
        Decision::Keep
    );
}

#[test]
fn test_tombstone_past_grace_is_dropped() {
    let (_, filter) = default_filter();
    let past = deleted(GRACE as i64 + 1);

    assert_eq!(
        decide_row(&filter, &SortedRun::new(), vec![tombstone(1, written(GRACE as i64 + 1), past)]),
        Decision::Remove
    );
}

#[test]
fn test_partition_deletion_at_grace_boundary_is_retained() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(written(0), deleted(GRACE as i64)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, written(100))]), Decision::Keep);

    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(written(0), deleted(GRACE as i64 + 1)));

    assert_eq!(decide_row(&filter, &run, vec![live(1, written(100))]), Decision::Remove);
}

#[test]
fn test_zero_grace_period() {
    let (_, filter) = filter_with(config().gc_grace_period_in_seconds(0).build());

    assert_eq!(
        decide_row(&filter, &SortedRun::new(), vec![tombstone(1, written(1), deleted(1))]),
        Decision::Remove
    );
    assert_eq!(
        decide_row(&filter, &SortedRun::new(), vec![tombstone(1, written(0), deleted(0))]),
        Decision::Keep
    );
}

// =============================================================================
// TTL Tests
// =============================================================================

#[test]
fn test_ttl_purge_is_monotonic() {
    let (clock, filter) = filter_with(config().purge_ttl_on_expiration(true).build());
    // Expires at NOW + 10
    let cells = || vec![expiring(1, written(0), 10)];

    assert_eq!(decide_row(&filter, &SortedRun::new(), cells()), Decision::Keep);

    for now in [NOW + 10, NOW + 11, NOW + 3_600, NOW + 10 * 365 * 86_400] {
        clock.set(now);
        assert_eq!(
            decide_row(&filter, &SortedRun::new(), cells()),
            Decision::Remove,
            "now = {}",
            now
        );
    }
}

#[test]
fn test_partial_expiry_purges_only_expired_cells() {
    let (_, filter) = filter_with(config().purge_ttl_on_expiration(true).build());

    let decision = decide_row(
        &filter,
        &SortedRun::new(),
        vec![live(1, written(10)), expiring(2, written(100), 50)],
    );

    assert_eq!(changed_markers(decision), vec![live(1, written(10))]);
}

#[test]
fn test_partial_expiry_converts_only_expired_cells() {
    let (_, filter) = default_filter();

    let decision = decide_row(
        &filter,
        &SortedRun::new(),
        vec![live(1, written(10)), expiring(2, written(100), 50)],
    );

    assert_eq!(
        changed_markers(decision),
        vec![live(1, written(10)), tombstone(2, written(100), deleted(50))]
    );
}

#[test]
fn test_converted_tombstone_ages_out() {
    let (clock, filter) = default_filter();
    let converted = changed_markers(decide_row(
        &filter,
        &SortedRun::new(),
        vec![expiring(1, written(100), 50)],
    ));

    // Tombstone was deleted at NOW - 50; it is purgeable once NOW - 50 < now - GRACE
    clock.set(NOW - 50 + GRACE as i64);
    assert_eq!(decide_row(&filter, &SortedRun::new(), converted.clone()), Decision::Keep);

    clock.advance(1);
    assert_eq!(decide_row(&filter, &SortedRun::new(), converted), Decision::Remove);
}

#[test]
fn test_old_tombstone_removed_from_live_row() {
    let (_, filter) = default_filter();
    let old = GRACE as i64 + 100;

    let decision = decide_row(
        &filter,
        &SortedRun::new(),
        vec![live(1, written(10)), tombstone(2, written(old), deleted(old))],
    );

    assert_eq!(changed_markers(decision), vec![live(1, written(10))]);
}

// =============================================================================
// Inline Range Tombstone Tests
// =============================================================================

#[test]
fn test_inline_range_tombstone_with_ignore_drops_row() {
    let (_, filter) = filter_with(config().ignore_range_delete_on_read(true).build());
    let cells = vec![
        live(1, written(100)),
        Marker::Range(range(&["a"], &["m"], written(0), deleted(0))),
    ];

    assert_eq!(decide_row(&filter, &SortedRun::new(), cells), Decision::Remove);
}

#[test]
fn test_young_inline_range_tombstone_is_kept() {
    let (_, filter) = default_filter();
    let cells = vec![
        live(1, written(100)),
        Marker::Range(range(&["a"], &["m"], written(0), deleted(0))),
    ];

    assert_eq!(decide_row(&filter, &SortedRun::new(), cells), Decision::Keep);
}

#[test]
fn test_inline_range_tombstone_older_than_row_is_dropped_alone() {
    let (_, filter) = default_filter();
    let old = GRACE as i64 + 100;
    let cells = vec![
        live(1, written(10)),
        Marker::Range(range(&["a"], &["m"], written(old), deleted(old))),
    ];

    assert_eq!(
        changed_markers(decide_row(&filter, &SortedRun::new(), cells)),
        vec![live(1, written(10))]
    );
}

// =============================================================================
// Merge Operand Tests
// =============================================================================

#[test]
fn test_merge_operand_keeps_old_tombstones() {
    let (_, filter) = default_filter();
    let old = GRACE as i64 + 100;

    let decision = decide(
        &filter,
        &SortedRun::new(),
        &["c"],
        ValueType::MergeOperand,
        vec![tombstone(1, written(old), deleted(old))],
    );

    assert_eq!(decision, Decision::Keep);
}

#[test]
fn test_merge_operand_dropped_by_partition_deletion() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_partition_deletion(&mut run, "p", DeletionTime::new(written(0), deleted(GRACE as i64 + 1)));

    let decision = decide(&filter, &run, &["c"], ValueType::MergeOperand, vec![live(1, written(5))]);

    assert_eq!(decision, Decision::Remove);
}

#[test]
fn test_merge_operand_expired_cells_converted() {
    let (_, filter) = default_filter();

    let decision = decide(
        &filter,
        &SortedRun::new(),
        &["c"],
        ValueType::MergeOperand,
        vec![expiring(1, written(100), 50)],
    );

    assert_eq!(changed_markers(decision), vec![tombstone(1, written(100), deleted(50))]);
}

// =============================================================================
// Idempotence Tests
// =============================================================================

#[test]
fn test_same_input_same_decision() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    put_range_tombstone(&mut run, "p", &range(&["a"], &["m"], written(10), deleted(10)));
    let cells = || vec![live(1, written(100)), expiring(2, written(100), 50)];

    let first = decide_row(&filter, &run, cells());
    let second = decide_row(&filter, &run, cells());

    assert_eq!(first, second);
}

#[test]
fn test_rewritten_value_is_stable() {
    let (_, filter) = default_filter();
    let rewritten = changed_markers(decide_row(
        &filter,
        &SortedRun::new(),
        vec![live(1, written(10)), expiring(2, written(100), 50)],
    ));

    assert_eq!(decide_row(&filter, &SortedRun::new(), rewritten), Decision::Keep);
}

// =============================================================================
// Input Handling Tests
// =============================================================================

#[test]
fn test_header_entries_pass_through() {
    let (_, filter) = filter_with(config().ignore_range_delete_on_read(true).build());
    let keys = KeyCodec::new(0);
    let ctx = FilterContext::new(1);

    let deletion_key = keys.partition_deletion_key(b"p").unwrap();
    let range_key = keys
        .range_tombstone_key(b"p", &range(&["a"], &["b"], 1, 1).start)
        .unwrap();

    for key in [deletion_key, range_key] {
        let decision = filter
            .filter(&ctx, &key, ValueType::Value, b"not markers")
            .unwrap();
        assert_eq!(decision, Decision::Keep);
    }
}

#[test]
fn test_malformed_key_is_an_error() {
    let (_, filter) = default_filter();
    let ctx = FilterContext::new(1);

    for key in [&b""[..], b"\x00", b"\x00\x09p", b"\x00\x01p\x07", b"\x00\x01p\x02open"] {
        let result = filter.filter(&ctx, key, ValueType::Value, &value(vec![]));
        assert!(
            matches!(result, Err(CompactionError::Corruption(_))),
            "key {:?} should be rejected",
            key
        );
    }
}

#[test]
fn test_malformed_value_is_an_error() {
    let (_, filter) = default_filter();
    let ctx = FilterContext::new(1);

    let result = filter.filter(&ctx, &row_key("p", &["c"]), ValueType::Value, &[0, 1, 9]);

    assert!(matches!(result, Err(CompactionError::Corruption(_))));
}

#[test]
fn test_malformed_header_in_input_is_an_error() {
    let (_, filter) = default_filter();
    let mut run = SortedRun::new();
    run.insert(
        KeyCodec::new(0).partition_deletion_key(b"p").unwrap(),
        ValueType::Value,
        vec![1],
    );
    let ctx = FilterContext::with_input(1, &run);

    let result = filter.filter(&ctx, &row_key("p", &["c"]), ValueType::Value, &value(vec![live(1, 5)]));

    assert!(matches!(result, Err(CompactionError::Corruption(_))));
}

#[test]
fn test_fixed_partition_key_length() {
    let (_, filter) = filter_with(config().partition_key_length(4).build());
    let keys = KeyCodec::new(4);
    let mut run = SortedRun::new();
    run.insert(
        keys.partition_deletion_key(b"user").unwrap(),
        ValueType::Value,
        cassandra_compaction::format::encode_deletion(&DeletionTime::new(
            written(0),
            deleted(GRACE as i64 + 1),
        ))
        .unwrap(),
    );
    let ctx = FilterContext::with_input(1, &run);

    let covered = keys.row_key(b"user", &ck(&["a"])).unwrap();
    let other = keys.row_key(b"usex", &ck(&["a"])).unwrap();
    let cells = value(vec![live(1, written(10))]);

    assert_eq!(filter.filter(&ctx, &covered, ValueType::Value, &cells).unwrap(), Decision::Remove);
    assert_eq!(filter.filter(&ctx, &other, ValueType::Value, &cells).unwrap(), Decision::Keep);
}

// =============================================================================
// Construction Tests
// =============================================================================

#[test]
fn test_filter_name() {
    let (_, filter) = default_filter();

    assert_eq!(filter.name(), "CassandraCompactionFilter");
}

#[test]
fn test_negative_grace_period_rejected() {
    let result = CassandraCompactionFilter::new(config().gc_grace_period_in_seconds(-1).build());

    assert!(matches!(result, Err(CompactionError::Config(_))));
}

#[test]
fn test_default_config() {
    let config = FilterConfig::default();

    assert!(!config.purge_ttl_on_expiration);
    assert!(!config.ignore_range_delete_on_read);
    assert_eq!(config.gc_grace_period_in_seconds, 864_000);
    assert_eq!(config.partition_key_length, 0);
}

#[test]
fn test_gc_before() {
    let (_, filter) = default_filter();

    assert_eq!(filter.gc_before(NOW), NOW - GRACE as i64);
}

#[test]
fn test_filter_is_shareable() {
    fn assert_send_sync<T: Send + Sync>() {}
    assert_send_sync::<CassandraCompactionFilter>();
}
