//! SSTable Iterator
//!
//! Sequential iteration over all entries in an SSTable.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};

use crate::error::{CompactionError, Result};
use crate::filter::ValueType;

use super::{Entry, ENTRY_HEADER_SIZE, HEADER_SIZE};

/// Iterator over SSTable entries in sorted key order
pub struct SSTableIterator<'a> {
    file: &'a mut BufReader<File>,
    /// Stop reading when we reach this offset (start of footer)
    end_offset: u64,
    /// Current position in file
    current_offset: u64,
}

impl<'a> SSTableIterator<'a> {
    /// Create a new iterator starting from the data block
    pub(super) fn new(file: &'a mut BufReader<File>, end_offset: u64) -> Result<Self> {
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        Ok(Self {
            file,
            end_offset,
            current_offset: HEADER_SIZE,
        })
    }

    fn read_entry(&mut self) -> Result<Entry> {
        let mut header = [0u8; ENTRY_HEADER_SIZE];
        self.file.read_exact(&mut header)?;

        let key_len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
        let val_len = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let value_type = ValueType::from_code(header[8])?;

        let entry_size = (ENTRY_HEADER_SIZE + key_len + val_len) as u64;
        if self.current_offset + entry_size > self.end_offset {
            return Err(CompactionError::Storage(format!(
                "SSTable entry at offset {} overruns the data block",
                self.current_offset
            )));
        }

        let mut key = vec![0u8; key_len];
        self.file.read_exact(&mut key)?;
        let mut value = vec![0u8; val_len];
        self.file.read_exact(&mut value)?;

        self.current_offset += entry_size;

        Ok(Entry {
            key,
            value_type,
            value,
        })
    }
}

impl<'a> Iterator for SSTableIterator<'a> {
    type Item = Result<Entry>;

    fn next(&mut self) -> Option<Self::Item> {
        // Stop at footer
        if self.current_offset >= self.end_offset {
            return None;
        }

        match self.read_entry() {
            Ok(entry) => Some(Ok(entry)),
            Err(e) => {
                // No resynchronising after a bad entry
                self.current_offset = self.end_offset;
                Some(Err(e))
            }
        }
    }
}
