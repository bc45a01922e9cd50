//! Compaction Filter Module
//!
//! Per-entry retention decisions made while compaction merges data files.
//!
//! ## Responsibilities
//! - Plugin contract between the compaction driver and a filter
//! - Clustering comparison and range tombstone matching
//! - Partition header resolution (input scan or metadata point query)
//! - TTL, tombstone and grace-period policy for Cassandra-format rows
//!
//! ## Decision Flow
//! ```text
//!   key/value ──► decode key ──► header entry? ──yes──► Keep
//!                                    │ no
//!                                    ▼
//!                             decode markers
//!                                    │
//!                                    ▼
//!                 partition/range coverage? ──yes──► Remove
//!                                    │ no
//!                                    ▼
//!                 own markers droppable? ──yes──► Remove
//!                                    │ no
//!                                    ▼
//!          purge / convert expired, drop old tombstones
//!                                    │
//!                  empty ──► Remove  │  changed ──► ChangeValue
//!                                    ▼
//!                                  Keep
//! ```

mod cassandra;
mod compare;
mod header;

pub use cassandra::CassandraCompactionFilter;
pub use compare::{compare, compare_range_tombstone, compare_to_bound, covers};

use crate::error::{CompactionError, Result};

/// Kind of entry handed to the filter
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ValueType {
    /// A full value
    Value = 0,
    /// A merge operand (partial row applied on top of older versions)
    MergeOperand = 1,
}

impl ValueType {
    pub fn code(self) -> u8 {
        self as u8
    }

    pub fn from_code(code: u8) -> Result<Self> {
        match code {
            0 => Ok(ValueType::Value),
            1 => Ok(ValueType::MergeOperand),
            other => Err(CompactionError::Corruption(format!(
                "unknown value type {}",
                other
            ))),
        }
    }
}

/// What the compaction driver should do with an entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Write the entry through unchanged
    Keep,
    /// Drop the entry
    Remove,
    /// Write the entry with this value instead
    ChangeValue(Vec<u8>),
}

/// Sorted view over the entries of the running compaction
pub trait PartitionScan {
    /// Entries with key >= `start`, in key order
    fn seek<'a>(&'a self, start: &[u8]) -> Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a>;
}

/// Per-invocation context supplied by the compaction driver
#[derive(Clone, Copy)]
pub struct FilterContext<'a> {
    /// Output level of the compaction
    pub level: u32,
    /// The compaction's own input, when the driver can expose it
    pub input: Option<&'a dyn PartitionScan>,
}

impl<'a> FilterContext<'a> {
    pub fn new(level: u32) -> Self {
        Self { level, input: None }
    }

    pub fn with_input(level: u32, input: &'a dyn PartitionScan) -> Self {
        Self {
            level,
            input: Some(input),
        }
    }
}

/// Plugin contract the compaction driver calls once per entry
pub trait CompactionFilter: Send + Sync {
    fn name(&self) -> &str;

    fn filter(
        &self,
        ctx: &FilterContext<'_>,
        key: &[u8],
        value_type: ValueType,
        existing_value: &[u8],
    ) -> Result<Decision>;
}
