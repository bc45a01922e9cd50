//! Compaction Module
//!
//! Merges data files and runs a compaction filter over every entry.
//!
//! ## Responsibilities
//! - Merge input SSTables (newest version of a key wins, merge operands
//!   are folded into the versions below them)
//! - Expose the merged input to the filter for partition header scans
//! - Apply filter decisions (keep / remove / rewrite)
//! - Write survivors to a new SSTable

use std::collections::{btree_map, BTreeMap};
use std::ops::Bound;
use std::path::Path;

use tracing::{debug, info};

use crate::error::Result;
use crate::filter::{CompactionFilter, Decision, FilterContext, PartitionScan, ValueType};
use crate::format::Markers;
use crate::storage::{Entry, SSTable, SSTableBuilder, SSTableReader};

/// Sorted, de-duplicated set of entries
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SortedRun {
    entries: BTreeMap<Vec<u8>, (ValueType, Vec<u8>)>,
}

impl SortedRun {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace an entry
    pub fn insert(&mut self, key: Vec<u8>, value_type: ValueType, value: Vec<u8>) {
        self.entries.insert(key, (value_type, value));
    }

    /// Merge SSTables ordered newest → oldest
    ///
    /// The newest full value of a key shadows everything older. A merge
    /// operand is folded onto the next older version of its key; the result
    /// takes that version's type, so an operand chain ending in a full value
    /// becomes a full value.
    pub fn merge(readers: &mut [SSTableReader]) -> Result<Self> {
        let mut run = Self::new();
        for reader in readers.iter_mut() {
            let before = run.len();
            let mut folded = 0usize;
            for entry in reader.iter()? {
                let Entry {
                    key,
                    value_type,
                    value,
                } = entry?;
                match run.entries.entry(key) {
                    btree_map::Entry::Vacant(slot) => {
                        slot.insert((value_type, value));
                    }
                    btree_map::Entry::Occupied(mut slot) => {
                        let (newer_type, newer_value) = slot.get_mut();
                        if *newer_type == ValueType::MergeOperand {
                            let operand = Markers::decode(newer_value)?;
                            *newer_value = Markers::decode(&value)?.apply(&operand).encode()?;
                            *newer_type = value_type;
                            folded += 1;
                        }
                    }
                }
            }
            debug!(
                path = %reader.path().display(),
                entries = reader.entry_count(),
                new_keys = run.len() - before,
                folded_operands = folded,
                "merged compaction input"
            );
        }
        Ok(run)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &[u8]) -> Option<(ValueType, &[u8])> {
        self.entries.get(key).map(|(t, v)| (*t, v.as_slice()))
    }

    /// Entries in key order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], ValueType, &[u8])> {
        self.entries
            .iter()
            .map(|(k, (t, v))| (k.as_slice(), *t, v.as_slice()))
    }

    /// Write every entry to a new SSTable
    pub fn write_to(&self, path: &Path) -> Result<SSTable> {
        let mut builder = SSTableBuilder::new(path)?;
        for (key, value_type, value) in self.iter() {
            builder.add(key, value_type, value)?;
        }
        builder.finish()
    }
}

impl FromIterator<Entry> for SortedRun {
    fn from_iter<T: IntoIterator<Item = Entry>>(iter: T) -> Self {
        let mut run = Self::new();
        for entry in iter {
            run.insert(entry.key, entry.value_type, entry.value);
        }
        run
    }
}

impl PartitionScan for SortedRun {
    fn seek<'a>(&'a self, start: &[u8]) -> Box<dyn Iterator<Item = (&'a [u8], &'a [u8])> + 'a> {
        Box::new(
            self.entries
                .range::<[u8], _>((Bound::Included(start), Bound::Unbounded))
                .map(|(k, (_, v))| (k.as_slice(), v.as_slice())),
        )
    }
}

/// Counters for one compaction
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CompactionStats {
    /// Entries after merging inputs
    pub input_entries: u64,
    /// Entries written through unchanged
    pub kept: u64,
    /// Entries dropped
    pub removed: u64,
    /// Entries written with a rewritten value
    pub changed: u64,
}

/// Result of a file-to-file compaction
#[derive(Debug)]
pub struct CompactionOutput {
    pub stats: CompactionStats,
    /// Output file, absent when nothing survived
    pub sstable: Option<SSTable>,
}

/// Runs one compaction through a filter
pub struct CompactionJob<'f> {
    filter: &'f dyn CompactionFilter,
    level: u32,
}

impl<'f> CompactionJob<'f> {
    pub fn new(filter: &'f dyn CompactionFilter, level: u32) -> Self {
        Self { filter, level }
    }

    /// Apply the filter to every entry of `input`
    ///
    /// Any filter error aborts the compaction; no partial output is returned.
    pub fn filter_run(&self, input: &SortedRun) -> Result<(SortedRun, CompactionStats)> {
        let ctx = FilterContext::with_input(self.level, input);
        let mut output = SortedRun::new();
        let mut stats = CompactionStats {
            input_entries: input.len() as u64,
            ..CompactionStats::default()
        };

        for (key, value_type, value) in input.iter() {
            match self.filter.filter(&ctx, key, value_type, value)? {
                Decision::Keep => {
                    output.insert(key.to_vec(), value_type, value.to_vec());
                    stats.kept += 1;
                }
                Decision::Remove => stats.removed += 1,
                Decision::ChangeValue(new_value) => {
                    output.insert(key.to_vec(), value_type, new_value);
                    stats.changed += 1;
                }
            }
        }

        Ok((output, stats))
    }

    /// Merge `inputs` (newest first), filter, and write survivors to `output_path`
    pub fn run(&self, inputs: &mut [SSTableReader], output_path: &Path) -> Result<CompactionOutput> {
        let merged = SortedRun::merge(inputs)?;
        let (survivors, stats) = self.filter_run(&merged)?;

        let sstable = if survivors.is_empty() {
            None
        } else {
            Some(survivors.write_to(output_path)?)
        };

        info!(
            filter = self.filter.name(),
            level = self.level,
            inputs = inputs.len(),
            input_entries = stats.input_entries,
            kept = stats.kept,
            changed = stats.changed,
            removed = stats.removed,
            "compaction finished"
        );

        Ok(CompactionOutput { stats, sstable })
    }
}
