//! SSTable Builder
//!
//! Writes sorted entries to a new SSTable file.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::error::{CompactionError, Result};
use crate::filter::ValueType;

use super::{SSTable, HEADER_SIZE, MAGIC, VERSION};

/// Builder for creating new SSTables from sorted entries
pub struct SSTableBuilder {
    /// Output file path
    path: PathBuf,
    /// Buffered writer for performance
    writer: BufWriter<File>,
    /// Number of entries written
    entry_count: u64,
    /// Current write position
    current_offset: u64,
    /// Track min/max keys for metadata (max is also the ordering check)
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    /// Running CRC hasher for data section
    data_hasher: crc32fast::Hasher,
}

impl SSTableBuilder {
    /// Create a new SSTable builder
    ///
    /// Writes header immediately; call `add()` in strictly ascending key
    /// order, then `finish()` to write the footer.
    pub fn new(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut writer = BufWriter::new(file);

        // Write header (entry_count placeholder, will be updated in finish)
        writer.write_all(MAGIC)?;
        writer.write_all(&VERSION.to_le_bytes())?;
        writer.write_all(&0u64.to_le_bytes())?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            entry_count: 0,
            current_offset: HEADER_SIZE,
            min_key: None,
            max_key: None,
            data_hasher: crc32fast::Hasher::new(),
        })
    }

    /// Add an entry (keys must be strictly ascending)
    pub fn add(&mut self, key: &[u8], value_type: ValueType, value: &[u8]) -> Result<()> {
        if let Some(last) = &self.max_key {
            if key <= last.as_slice() {
                return Err(CompactionError::Storage(format!(
                    "SSTable keys out of order: {:?} after {:?}",
                    key, last
                )));
            }
        }

        let key_len = u32::try_from(key.len())
            .map_err(|_| CompactionError::Storage(format!("key of {} bytes is too large", key.len())))?;
        let val_len = u32::try_from(value.len())
            .map_err(|_| CompactionError::Storage(format!("value of {} bytes is too large", value.len())))?;

        // Entry: [key_len(4)][val_len(4)][type(1)][key][value]
        let mut header = [0u8; super::ENTRY_HEADER_SIZE];
        header[0..4].copy_from_slice(&key_len.to_le_bytes());
        header[4..8].copy_from_slice(&val_len.to_le_bytes());
        header[8] = value_type.code();

        for chunk in [&header[..], key, value] {
            self.writer.write_all(chunk)?;
            self.data_hasher.update(chunk);
        }

        if self.min_key.is_none() {
            self.min_key = Some(key.to_vec());
        }
        self.max_key = Some(key.to_vec());

        self.current_offset += (super::ENTRY_HEADER_SIZE + key.len() + value.len()) as u64;
        self.entry_count += 1;

        Ok(())
    }

    /// Number of entries added so far
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Finish building: write footer and return metadata
    pub fn finish(mut self) -> Result<SSTable> {
        let data_end = self.current_offset;
        let data_crc = self.data_hasher.finalize();

        // Footer: data_end (8) + data_crc (4) + padding (4)
        self.writer.write_all(&data_end.to_le_bytes())?;
        self.writer.write_all(&data_crc.to_le_bytes())?;
        self.writer.write_all(&[0u8; 4])?;

        self.writer.flush()?;

        // Seek back and update entry count in header
        let mut file = self.writer.into_inner().map_err(|e| {
            CompactionError::Storage(format!("Failed to flush SSTable: {}", e))
        })?;
        file.seek(SeekFrom::Start(6))?; // After magic + version
        file.write_all(&self.entry_count.to_le_bytes())?;
        file.sync_all()?;

        let file_size = file.metadata()?.len();

        Ok(SSTable {
            path: self.path,
            entry_count: self.entry_count,
            min_key: self.min_key.unwrap_or_default(),
            max_key: self.max_key.unwrap_or_default(),
            file_size,
        })
    }
}
