//! Storage Module
//!
//! Data files consumed and produced by compaction.
//!
//! ## Responsibilities
//! - Persist sorted, value-typed entries to disk
//! - Detect corruption via a CRC over the data block
//! - Sequential iteration for merging

mod sstable;

pub use sstable::{Entry, SSTable, SSTableBuilder, SSTableIterator, SSTableReader};
