//! Clustering comparison and range tombstone matching

use std::cmp::Ordering;

use crate::format::{ClusteringBound, ClusteringKey, Kind, RangeTombstone};

/// Total order over encoded clustering prefixes
///
/// Bytes over the shared length first, then the shorter sequence, then the
/// kind, then the fragment count. Must agree with the order the range bounds
/// were written in.
pub fn compare(a: &[u8], kind_a: Kind, ck_size_a: u32, b: &[u8], kind_b: Kind, ck_size_b: u32) -> Ordering {
    let shared = a.len().min(b.len());
    a[..shared]
        .cmp(&b[..shared])
        .then(a.len().cmp(&b.len()))
        .then(kind_a.cmp(&kind_b))
        .then(ck_size_a.cmp(&ck_size_b))
}

/// Position of a row's clustering relative to a bound
///
/// A bound over `k` fragments is compared with the row's first `k`
/// fragments, so a prefix bound governs every row extending the prefix.
pub fn compare_to_bound(clustering: &ClusteringKey, bound: &ClusteringBound) -> Ordering {
    let n = bound.key.size().min(clustering.size());
    compare(
        clustering.prefix(n),
        Kind::Clustering,
        n,
        bound.key.data(),
        bound.kind,
        bound.key.size(),
    )
}

/// Clustering lies inside the tombstone's range
pub fn covers(clustering: &ClusteringKey, tombstone: &RangeTombstone) -> bool {
    compare_to_bound(clustering, &tombstone.start) == Ordering::Greater
        && compare_to_bound(clustering, &tombstone.end) == Ordering::Less
}

/// Clustering lies inside the range and the delete is not older than the row
pub fn compare_range_tombstone(clustering: &ClusteringKey, tombstone: &RangeTombstone, row_timestamp: i64) -> bool {
    covers(clustering, tombstone) && tombstone.deletion.deletes(row_timestamp)
}
