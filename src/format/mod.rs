//! Wide-Row Format Module
//!
//! Decoded forms of the Cassandra-style rows the filter reasons about.
//!
//! ## Responsibilities
//! - Clustering keys and range bounds with an order-preserving encoding
//! - Stored key layout (partition key section, entry tag, clustering)
//! - Row value markers (live / expiring / deleted cells, inline range deletes)
//! - Partition-level state (partition deletion, range tombstones)

mod clustering;
mod key;
mod marker;
mod partition;

pub use clustering::{ClusteringBound, ClusteringKey, Kind};
pub use key::{DecodedKey, EntryKind, KeyCodec};
pub use marker::{Marker, Markers};
pub use partition::{decode_deletion, encode_deletion, DeletionTime, PartitionValue, RangeTombstone};
