//! Row value markers
//!
//! A stored row value is an ordered list of markers: cells (live, expiring
//! or deleted) plus any range deletes carried inline with the row.
//!
//! ## Value Format
//! ```text
//! ┌────────────┬─────────────────────────────────────────────┐
//! │ Count (2)  │ Marker 1 │ Marker 2 │ ...                    │
//! └────────────┴─────────────────────────────────────────────┘
//!
//! Live      (0): column (1) | timestamp (8) | value_len (4) | value
//! Expiring  (1): column (1) | timestamp (8) | ttl (4) | value_len (4) | value
//! Tombstone (2): column (1) | timestamp (8) | local_deletion_time (4)
//! Range     (3): start kind (1) | start_len (4) | start | end kind (1)
//!                | end_len (4) | end | marked_for_delete_at (8)
//!                | local_deletion_time (4)
//! ```
//! All integers are big-endian. Timestamps are microseconds, deletion times
//! and TTLs are seconds.

use std::collections::BTreeMap;

use bytes::{Buf, BufMut};

use crate::error::{CompactionError, Result};

use super::clustering::{ClusteringBound, ClusteringKey, Kind};
use super::partition::{DeletionTime, RangeTombstone};

const MARKER_LIVE: u8 = 0;
const MARKER_EXPIRING: u8 = 1;
const MARKER_TOMBSTONE: u8 = 2;
const MARKER_RANGE: u8 = 3;

const MICROS_PER_SEC: i64 = 1_000_000;

/// A single marker attached to a stored row value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Marker {
    /// A live cell
    Live {
        column: u8,
        timestamp: i64,
        value: Vec<u8>,
    },

    /// A cell that expires `ttl` seconds after its write
    Expiring {
        column: u8,
        timestamp: i64,
        ttl: i32,
        value: Vec<u8>,
    },

    /// A deleted cell
    Tombstone {
        column: u8,
        timestamp: i64,
        local_deletion_time: i32,
    },

    /// A range delete stored with the row
    Range(RangeTombstone),
}

impl Marker {
    /// Write timestamp of a cell marker; `None` for inline range deletes
    pub fn timestamp(&self) -> Option<i64> {
        match self {
            Marker::Live { timestamp, .. }
            | Marker::Expiring { timestamp, .. }
            | Marker::Tombstone { timestamp, .. } => Some(*timestamp),
            Marker::Range(_) => None,
        }
    }

    /// Column of a cell marker
    pub fn column(&self) -> Option<u8> {
        match self {
            Marker::Live { column, .. }
            | Marker::Expiring { column, .. }
            | Marker::Tombstone { column, .. } => Some(*column),
            Marker::Range(_) => None,
        }
    }

    pub fn is_cell(&self) -> bool {
        !matches!(self, Marker::Range(_))
    }

    /// Expiry instant in seconds for expiring cells
    pub fn expires_at(&self) -> Option<i64> {
        match self {
            Marker::Expiring { timestamp, ttl, .. } => {
                Some(timestamp.div_euclid(MICROS_PER_SEC) + i64::from(*ttl))
            }
            _ => None,
        }
    }

    /// TTL has run out at `now`
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires_at().map_or(false, |at| at <= now)
    }

    /// Local deletion time of tombstones and range deletes
    pub fn local_deletion_time(&self) -> Option<i64> {
        match self {
            Marker::Tombstone {
                local_deletion_time,
                ..
            } => Some(i64::from(*local_deletion_time)),
            Marker::Range(tombstone) => Some(i64::from(tombstone.deletion.local_deletion_time)),
            _ => None,
        }
    }

    /// Replace an expiring cell by the tombstone it turns into
    fn to_tombstone(&self) -> Option<Marker> {
        match self {
            Marker::Expiring {
                column, timestamp, ..
            } => {
                let expires_at = self.expires_at()?;
                Some(Marker::Tombstone {
                    column: *column,
                    timestamp: *timestamp,
                    local_deletion_time: clamp_secs(expires_at),
                })
            }
            _ => None,
        }
    }
}

fn clamp_secs(secs: i64) -> i32 {
    secs.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
}

/// Ordered marker collection decoded from one stored value
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Markers(Vec<Marker>);

impl Markers {
    pub fn new(markers: Vec<Marker>) -> Self {
        Self(markers)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Marker> {
        self.0.iter()
    }

    pub fn into_inner(self) -> Vec<Marker> {
        self.0
    }

    /// Cell markers only
    pub fn cells(&self) -> impl Iterator<Item = &Marker> {
        self.0.iter().filter(|m| m.is_cell())
    }

    /// Inline range deletes
    pub fn range_tombstones(&self) -> impl Iterator<Item = &RangeTombstone> {
        self.0.iter().filter_map(|m| match m {
            Marker::Range(tombstone) => Some(tombstone),
            _ => None,
        })
    }

    /// The row's own timestamp: the newest cell write
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.0.iter().filter_map(Marker::timestamp).max()
    }

    /// At least one cell, and every cell is an expired TTL cell
    pub fn all_cells_expired(&self, now: i64) -> bool {
        let mut cells = self.cells().peekable();
        cells.peek().is_some() && cells.all(|m| m.is_expired(now))
    }

    /// At least one cell, and every cell is a tombstone deleted before `gc_before`
    pub fn all_cells_deleted_before(&self, gc_before: i64) -> bool {
        let mut cells = self.cells().peekable();
        cells.peek().is_some()
            && cells.all(|m| {
                matches!(m, Marker::Tombstone { .. })
                    && m.local_deletion_time().map_or(false, |t| t < gc_before)
            })
    }

    /// Drop expired TTL cells. Returns the new markers and whether anything changed.
    pub fn purge_expired(&self, now: i64) -> (Markers, bool) {
        let kept: Vec<Marker> = self
            .0
            .iter()
            .filter(|m| !m.is_expired(now))
            .cloned()
            .collect();
        let changed = kept.len() != self.0.len();
        (Markers(kept), changed)
    }

    /// Turn expired TTL cells into tombstones
    pub fn expired_to_tombstones(&self, now: i64) -> (Markers, bool) {
        let mut changed = false;
        let converted = self
            .0
            .iter()
            .map(|m| {
                if m.is_expired(now) {
                    if let Some(tombstone) = m.to_tombstone() {
                        changed = true;
                        return tombstone;
                    }
                }
                m.clone()
            })
            .collect();
        (Markers(converted), changed)
    }

    /// Drop tombstones and inline range deletes older than `gc_before`
    pub fn remove_tombstones(&self, gc_before: i64) -> (Markers, bool) {
        let kept: Vec<Marker> = self
            .0
            .iter()
            .filter(|m| m.local_deletion_time().map_or(true, |t| t >= gc_before))
            .cloned()
            .collect();
        let changed = kept.len() != self.0.len();
        (Markers(kept), changed)
    }

    /// Apply a newer version of the row (a merge operand) on top of this one
    ///
    /// Cells are matched by column and the higher timestamp wins, the newer
    /// side on ties. Inline range deletes from both sides are kept. Cells come
    /// out in column order, followed by the range deletes.
    pub fn apply(&self, newer: &Markers) -> Markers {
        let mut cells: BTreeMap<u8, &Marker> = BTreeMap::new();
        let mut ranges: Vec<&Marker> = Vec::new();

        for marker in self.0.iter().chain(newer.0.iter()) {
            match marker.column() {
                Some(column) => {
                    let replace = cells
                        .get(&column)
                        .map_or(true, |existing| marker.timestamp() >= existing.timestamp());
                    if replace {
                        cells.insert(column, marker);
                    }
                }
                None => {
                    if !ranges.contains(&marker) {
                        ranges.push(marker);
                    }
                }
            }
        }

        cells.into_values().chain(ranges).cloned().collect()
    }

    // =========================================================================
    // Codec
    // =========================================================================

    /// Decode a stored row value
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut buf = bytes;
        ensure(&buf, 2, "marker count")?;
        let count = buf.get_u16() as usize;

        let mut markers = Vec::with_capacity(count);
        for _ in 0..count {
            ensure(&buf, 1, "marker type")?;
            let marker = match buf.get_u8() {
                MARKER_LIVE => {
                    ensure(&buf, 9, "live cell")?;
                    let column = buf.get_u8();
                    let timestamp = buf.get_i64();
                    let value = read_bytes(&mut buf, "live cell value")?;
                    Marker::Live {
                        column,
                        timestamp,
                        value,
                    }
                }
                MARKER_EXPIRING => {
                    ensure(&buf, 13, "expiring cell")?;
                    let column = buf.get_u8();
                    let timestamp = buf.get_i64();
                    let ttl = buf.get_i32();
                    let value = read_bytes(&mut buf, "expiring cell value")?;
                    Marker::Expiring {
                        column,
                        timestamp,
                        ttl,
                        value,
                    }
                }
                MARKER_TOMBSTONE => {
                    ensure(&buf, 13, "tombstone")?;
                    Marker::Tombstone {
                        column: buf.get_u8(),
                        timestamp: buf.get_i64(),
                        local_deletion_time: buf.get_i32(),
                    }
                }
                MARKER_RANGE => {
                    let start = read_bound(&mut buf)?;
                    let end = read_bound(&mut buf)?;
                    ensure(&buf, 12, "range deletion time")?;
                    let deletion = DeletionTime::new(buf.get_i64(), buf.get_i32());
                    Marker::Range(RangeTombstone::new(start, end, deletion)?)
                }
                other => {
                    return Err(CompactionError::Corruption(format!(
                        "unknown marker type {}",
                        other
                    )))
                }
            };
            markers.push(marker);
        }

        if buf.has_remaining() {
            return Err(CompactionError::Corruption(format!(
                "{} trailing bytes after markers",
                buf.remaining()
            )));
        }

        Ok(Markers(markers))
    }

    /// Encode into the stored value format
    pub fn encode(&self) -> Result<Vec<u8>> {
        let count = u16::try_from(self.0.len()).map_err(|_| {
            CompactionError::Serialization(format!("{} markers exceed the format limit", self.0.len()))
        })?;

        let mut out = Vec::new();
        out.put_u16(count);
        for marker in &self.0 {
            match marker {
                Marker::Live {
                    column,
                    timestamp,
                    value,
                } => {
                    out.put_u8(MARKER_LIVE);
                    out.put_u8(*column);
                    out.put_i64(*timestamp);
                    write_bytes(&mut out, value)?;
                }
                Marker::Expiring {
                    column,
                    timestamp,
                    ttl,
                    value,
                } => {
                    out.put_u8(MARKER_EXPIRING);
                    out.put_u8(*column);
                    out.put_i64(*timestamp);
                    out.put_i32(*ttl);
                    write_bytes(&mut out, value)?;
                }
                Marker::Tombstone {
                    column,
                    timestamp,
                    local_deletion_time,
                } => {
                    out.put_u8(MARKER_TOMBSTONE);
                    out.put_u8(*column);
                    out.put_i64(*timestamp);
                    out.put_i32(*local_deletion_time);
                }
                Marker::Range(tombstone) => {
                    out.put_u8(MARKER_RANGE);
                    write_bound(&mut out, &tombstone.start)?;
                    write_bound(&mut out, &tombstone.end)?;
                    out.put_i64(tombstone.deletion.marked_for_delete_at);
                    out.put_i32(tombstone.deletion.local_deletion_time);
                }
            }
        }
        Ok(out)
    }
}

impl FromIterator<Marker> for Markers {
    fn from_iter<T: IntoIterator<Item = Marker>>(iter: T) -> Self {
        Markers(iter.into_iter().collect())
    }
}

// =============================================================================
// Codec Helpers
// =============================================================================

fn ensure(buf: &&[u8], needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(CompactionError::Corruption(format!(
            "truncated {}: need {} bytes, have {}",
            what,
            needed,
            buf.remaining()
        )));
    }
    Ok(())
}

fn read_bytes(buf: &mut &[u8], what: &str) -> Result<Vec<u8>> {
    ensure(buf, 4, what)?;
    let len = buf.get_u32() as usize;
    ensure(buf, len, what)?;
    let bytes = buf[..len].to_vec();
    buf.advance(len);
    Ok(bytes)
}

fn write_bytes(out: &mut Vec<u8>, bytes: &[u8]) -> Result<()> {
    let len = u32::try_from(bytes.len()).map_err(|_| {
        CompactionError::Serialization(format!("{}-byte field is too large", bytes.len()))
    })?;
    out.put_u32(len);
    out.put_slice(bytes);
    Ok(())
}

fn read_bound(buf: &mut &[u8]) -> Result<ClusteringBound> {
    ensure(buf, 1, "range bound kind")?;
    let kind = Kind::from_code(buf.get_i8())?;
    let data = read_bytes(buf, "range bound")?;
    Ok(ClusteringBound::new(ClusteringKey::from_encoded(data)?, kind))
}

fn write_bound(out: &mut Vec<u8>, bound: &ClusteringBound) -> Result<()> {
    out.put_i8(bound.kind.code());
    write_bytes(out, bound.key.data())
}
