//! Clustering keys and range bounds
//!
//! ## Fragment Encoding
//! ```text
//! ┌──────────────────────────────┬─────────────┐
//! │ fragment bytes (0x00 → 00 FF)│ Term: 00 01 │  ... repeated per fragment
//! └──────────────────────────────┴─────────────┘
//! ```
//! Escaping zero bytes and terminating with `00 01` makes plain byte order
//! equal to fragment-wise lexicographic order, with a prefix sorting before
//! every key that extends it.

use serde::{Deserialize, Serialize};

use crate::error::{CompactionError, Result};

const ESCAPE: u8 = 0x00;
const ESCAPED_ZERO: u8 = 0xFF;
const TERMINATOR: u8 = 0x01;

/// Position of a clustering prefix relative to the rows sharing its bytes.
///
/// Declaration order is the comparison order:
/// `ExclusiveEnd < InclusiveStart < Clustering < InclusiveEnd < ExclusiveStart`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(i8)]
pub enum Kind {
    /// End of a range that excludes rows equal to the bound
    ExclusiveEnd = 0,
    /// Start of a range that includes rows equal to the bound
    InclusiveStart = 1,
    /// An actual row
    Clustering = 2,
    /// End of a range that includes rows equal to the bound
    InclusiveEnd = 3,
    /// Start of a range that excludes rows equal to the bound
    ExclusiveStart = 4,
}

impl Kind {
    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn from_code(code: i8) -> Result<Self> {
        match code {
            0 => Ok(Kind::ExclusiveEnd),
            1 => Ok(Kind::InclusiveStart),
            2 => Ok(Kind::Clustering),
            3 => Ok(Kind::InclusiveEnd),
            4 => Ok(Kind::ExclusiveStart),
            other => Err(CompactionError::Corruption(format!(
                "unknown clustering kind {}",
                other
            ))),
        }
    }

    pub fn is_start(self) -> bool {
        matches!(self, Kind::InclusiveStart | Kind::ExclusiveStart)
    }

    pub fn is_end(self) -> bool {
        matches!(self, Kind::InclusiveEnd | Kind::ExclusiveEnd)
    }
}

/// Encoded clustering key plus its fragment count (`ck_size`)
///
/// Deserialized keys are reparsed, so `size` always matches `data`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "StoredClusteringKey")]
pub struct ClusteringKey {
    data: Vec<u8>,
    size: u32,
}

/// Unchecked serialized form of a `ClusteringKey`
#[derive(Deserialize)]
struct StoredClusteringKey {
    data: Vec<u8>,
    size: u32,
}

impl TryFrom<StoredClusteringKey> for ClusteringKey {
    type Error = CompactionError;

    fn try_from(stored: StoredClusteringKey) -> Result<Self> {
        let key = ClusteringKey::from_encoded(stored.data)?;
        if key.size != stored.size {
            return Err(CompactionError::Corruption(format!(
                "clustering key claims {} fragments but encodes {}",
                stored.size, key.size
            )));
        }
        Ok(key)
    }
}

impl ClusteringKey {
    /// The empty clustering (no fragments)
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a key from raw fragment values
    pub fn from_fragments<I, F>(fragments: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: AsRef<[u8]>,
    {
        let mut data = Vec::new();
        let mut size = 0u32;
        for fragment in fragments {
            for &b in fragment.as_ref() {
                data.push(b);
                if b == ESCAPE {
                    data.push(ESCAPED_ZERO);
                }
            }
            data.push(ESCAPE);
            data.push(TERMINATOR);
            size += 1;
        }
        Self { data, size }
    }

    /// Validate already-encoded bytes and count their fragments
    pub fn from_encoded(data: Vec<u8>) -> Result<Self> {
        let mut size = 0u32;
        let mut pos = 0;
        let mut open_fragment = false;
        while pos < data.len() {
            if data[pos] != ESCAPE {
                open_fragment = true;
                pos += 1;
                continue;
            }
            match data.get(pos + 1) {
                Some(&ESCAPED_ZERO) => open_fragment = true,
                Some(&TERMINATOR) => {
                    size += 1;
                    open_fragment = false;
                }
                Some(other) => {
                    return Err(CompactionError::Corruption(format!(
                        "invalid clustering escape 0x00 0x{:02x} at offset {}",
                        other, pos
                    )))
                }
                None => {
                    return Err(CompactionError::Corruption(
                        "clustering key ends inside an escape sequence".to_string(),
                    ))
                }
            }
            pos += 2;
        }
        if open_fragment {
            return Err(CompactionError::Corruption(
                "clustering key has an unterminated fragment".to_string(),
            ));
        }
        Ok(Self { data, size })
    }

    /// Encoded bytes
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Number of fragments
    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Encoded bytes of the first `n` fragments (all of them if `n >= size`)
    pub fn prefix(&self, n: u32) -> &[u8] {
        if n >= self.size {
            return &self.data;
        }
        let mut seen = 0;
        let mut pos = 0;
        while seen < n {
            if self.data[pos] == ESCAPE {
                if self.data[pos + 1] == TERMINATOR {
                    seen += 1;
                }
                pos += 2;
            } else {
                pos += 1;
            }
        }
        &self.data[..pos]
    }

    /// Decode the fragment values
    pub fn fragments(&self) -> Vec<Vec<u8>> {
        let mut out = Vec::with_capacity(self.size as usize);
        let mut current = Vec::new();
        let mut pos = 0;
        while pos < self.data.len() {
            let b = self.data[pos];
            if b == ESCAPE {
                if self.data[pos + 1] == TERMINATOR {
                    out.push(std::mem::take(&mut current));
                } else {
                    current.push(0);
                }
                pos += 2;
            } else {
                current.push(b);
                pos += 1;
            }
        }
        out
    }
}

/// One end of a range tombstone
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusteringBound {
    pub key: ClusteringKey,
    pub kind: Kind,
}

impl ClusteringBound {
    pub fn new(key: ClusteringKey, kind: Kind) -> Self {
        Self { key, kind }
    }

    pub fn inclusive_start(key: ClusteringKey) -> Self {
        Self::new(key, Kind::InclusiveStart)
    }

    pub fn exclusive_start(key: ClusteringKey) -> Self {
        Self::new(key, Kind::ExclusiveStart)
    }

    pub fn inclusive_end(key: ClusteringKey) -> Self {
        Self::new(key, Kind::InclusiveEnd)
    }

    pub fn exclusive_end(key: ClusteringKey) -> Self {
        Self::new(key, Kind::ExclusiveEnd)
    }

    /// Start bound before every row of the partition
    pub fn bottom() -> Self {
        Self::inclusive_start(ClusteringKey::empty())
    }

    /// End bound after every row of the partition
    pub fn top() -> Self {
        Self::inclusive_end(ClusteringKey::empty())
    }
}
