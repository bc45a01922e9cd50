//! SSTable Reader
//!
//! Opens SSTable files, validates header, footer and data CRC.

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use crate::error::{CompactionError, Result};

use super::iterator::SSTableIterator;
use super::{FOOTER_SIZE, HEADER_SIZE, MAGIC, VERSION};

/// Read buffer for CRC verification
const VERIFY_CHUNK: usize = 64 * 1024;

/// Reader for SSTable files
pub struct SSTableReader {
    /// Path the reader was opened from
    path: PathBuf,
    /// File handle for reading entries
    file: BufReader<File>,
    /// Entry count from the header
    entry_count: u64,
    /// End of the data block (start of footer)
    data_end: u64,
}

impl SSTableReader {
    /// Open an SSTable for reading
    ///
    /// Rejects files with a bad magic, unknown version or a data block
    /// whose CRC does not match the footer.
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = File::open(path)?;
        let file_size = file.metadata()?.len();

        if file_size < HEADER_SIZE + FOOTER_SIZE {
            return Err(CompactionError::Storage(format!(
                "SSTable {} is too small ({} bytes)",
                path.display(),
                file_size
            )));
        }

        // Read and validate header
        let mut header = [0u8; HEADER_SIZE as usize];
        file.read_exact(&mut header)?;

        if &header[0..4] != MAGIC {
            return Err(CompactionError::Storage(format!(
                "Invalid SSTable magic: expected CWRS, got {:?}",
                &header[0..4]
            )));
        }

        let version = u16::from_le_bytes([header[4], header[5]]);
        if version != VERSION {
            return Err(CompactionError::Storage(format!(
                "Unsupported SSTable version: {}",
                version
            )));
        }

        let mut count_bytes = [0u8; 8];
        count_bytes.copy_from_slice(&header[6..14]);
        let entry_count = u64::from_le_bytes(count_bytes);

        // Read footer
        file.seek(SeekFrom::End(-(FOOTER_SIZE as i64)))?;
        let mut footer = [0u8; FOOTER_SIZE as usize];
        file.read_exact(&mut footer)?;

        let mut end_bytes = [0u8; 8];
        end_bytes.copy_from_slice(&footer[0..8]);
        let data_end = u64::from_le_bytes(end_bytes);
        let expected_crc = u32::from_le_bytes([footer[8], footer[9], footer[10], footer[11]]);

        if data_end < HEADER_SIZE || data_end != file_size - FOOTER_SIZE {
            return Err(CompactionError::Storage(format!(
                "SSTable footer points at offset {} in a {}-byte file",
                data_end, file_size
            )));
        }

        // Verify data CRC
        file.seek(SeekFrom::Start(HEADER_SIZE))?;
        let mut hasher = crc32fast::Hasher::new();
        let mut remaining = data_end - HEADER_SIZE;
        let mut chunk = vec![0u8; VERIFY_CHUNK];
        while remaining > 0 {
            let n = remaining.min(VERIFY_CHUNK as u64) as usize;
            file.read_exact(&mut chunk[..n])?;
            hasher.update(&chunk[..n]);
            remaining -= n as u64;
        }
        let actual_crc = hasher.finalize();
        if actual_crc != expected_crc {
            return Err(CompactionError::Storage(format!(
                "SSTable {} data CRC mismatch: expected {:08x}, got {:08x}",
                path.display(),
                expected_crc,
                actual_crc
            )));
        }

        file.seek(SeekFrom::Start(0))?;

        Ok(Self {
            path: path.to_path_buf(),
            file: BufReader::new(file),
            entry_count,
            data_end,
        })
    }

    /// Get entry count
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    /// Path this reader was opened from
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create an iterator over all entries in key order
    pub fn iter(&mut self) -> Result<SSTableIterator<'_>> {
        SSTableIterator::new(&mut self.file, self.data_end)
    }
}
