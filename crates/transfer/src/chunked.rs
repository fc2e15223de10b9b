use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

// ---------------------------------------------------------------------------
// Checksum helpers
// ---------------------------------------------------------------------------

/// Computes SHA-256 of `data` and returns the hex-encoded digest.
pub fn checksum_bytes(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Computes SHA-256 of an entire file and returns the hex-encoded digest.
///
/// Clients use this digest as the upload identifier.
pub fn calculate_file_checksum(path: &Path) -> Result<String, TransferError> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

// ---------------------------------------------------------------------------
// ChunkReader
// ---------------------------------------------------------------------------

/// One indexed slice of a local file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexedChunk {
    pub index: u32,
    pub data: Vec<u8>,
}

/// Splits a local file into fixed-size chunks numbered from 0.
///
/// Every chunk except possibly the last is exactly `chunk_size` bytes, so
/// the chunk count matches `ceil(file_size / chunk_size)`.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    next_index: u32,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            next_index: 0,
            offset: 0,
            file_size,
        })
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<IndexedChunk>, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(None);
        }

        let read_size = remaining.min(self.chunk_size as u64) as usize;
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = IndexedChunk {
            index: self.next_index,
            data: buf,
        };
        self.next_index += 1;
        self.offset += read_size as u64;
        Ok(Some(chunk))
    }

    /// Skips the next chunk without reading it.
    pub fn skip_chunk(&mut self) -> Result<bool, TransferError> {
        let remaining = self.remaining();
        if remaining == 0 {
            return Ok(false);
        }
        let step = remaining.min(self.chunk_size as u64);
        self.offset += step;
        self.file.seek(SeekFrom::Start(self.offset))?;
        self.next_index += 1;
        Ok(true)
    }

    /// Index the next call to [`next_chunk`](Self::next_chunk) returns.
    pub fn next_index(&self) -> u32 {
        self.next_index
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Total file size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of chunks the whole file splits into.
    pub fn total_chunks(&self) -> u64 {
        self.file_size.div_ceil(self.chunk_size as u64)
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}
