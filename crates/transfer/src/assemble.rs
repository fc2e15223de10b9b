//! Ordered merge of a complete chunk set into one output file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError};

use chunkyard_protocol::ErrorCode;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::config::StorageConfig;
use crate::sanitize::sanitize_file_name;
use crate::store::ChunkStore;
use crate::{COPY_BUFFER_SIZE, TransferError};

/// Reasons a merge does not produce a valid file.
#[derive(Debug, thiserror::Error)]
pub enum AssemblyError {
    #[error("invalid file name")]
    InvalidName,

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("missing chunks")]
    MissingChunks,

    #[error("missing chunk: {0}")]
    MissingChunk(u32),

    #[error("empty chunk: {0}")]
    EmptyChunk(u32),

    #[error("merged file is empty")]
    EmptyResult,

    #[error("merge failed at chunk {index}: {source}")]
    ChunkIo {
        index: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("merge failed: {0}")]
    Storage(#[from] TransferError),
}

impl From<std::io::Error> for AssemblyError {
    fn from(err: std::io::Error) -> Self {
        AssemblyError::Storage(TransferError::Io(err))
    }
}

impl AssemblyError {
    /// Wire code for this failure.
    pub fn code(&self) -> ErrorCode {
        match self {
            AssemblyError::InvalidName => ErrorCode::InvalidName,
            AssemblyError::BadRequest(_) => ErrorCode::BadRequest,
            AssemblyError::MissingChunks => ErrorCode::MissingChunks,
            AssemblyError::MissingChunk(_) => ErrorCode::MissingChunk,
            AssemblyError::EmptyChunk(_) => ErrorCode::EmptyChunk,
            AssemblyError::EmptyResult => ErrorCode::EmptyResult,
            AssemblyError::Storage(TransferError::InvalidUploadId(_)) => ErrorCode::BadRequest,
            AssemblyError::ChunkIo { .. } | AssemblyError::Storage(_) => ErrorCode::StorageError,
        }
    }

    /// HTTP-style status class.
    pub fn status(&self) -> u16 {
        self.code().status()
    }

    /// Index of the chunk the failure is attributed to, if any.
    pub fn chunk_index(&self) -> Option<u32> {
        match self {
            AssemblyError::MissingChunk(index)
            | AssemblyError::EmptyChunk(index)
            | AssemblyError::ChunkIo { index, .. } => Some(*index),
            _ => None,
        }
    }
}

/// A request to merge the chunks of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblyRequest {
    /// Client-supplied display name of the final file.
    pub file_name: String,
    pub upload_id: String,
    pub file_size: i64,
    pub chunk_size: i64,
}

/// What happened to the chunk namespace after a successful merge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cleanup {
    Purged,
    /// Purging is disabled by configuration.
    Skipped,
    /// The file is valid but its chunks could not be removed.
    Failed(String),
}

impl Cleanup {
    pub fn warning(&self) -> Option<&str> {
        match self {
            Cleanup::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

/// A merged file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledFile {
    pub path: PathBuf,
    pub size: u64,
    /// Hex SHA-256 of the merged content.
    pub sha256: String,
    pub total_chunks: u32,
    pub cleanup: Cleanup,
}

/// Number of chunks a file of `file_size` bytes splits into: `ceil(file_size / chunk_size)`.
pub fn total_chunks(file_size: i64, chunk_size: i64) -> Result<u32, AssemblyError> {
    if file_size < 1 {
        return Err(AssemblyError::BadRequest(format!(
            "fileSize must be at least 1, got {file_size}"
        )));
    }
    if chunk_size < 1 {
        return Err(AssemblyError::BadRequest(format!(
            "chunkSize must be at least 1, got {chunk_size}"
        )));
    }
    let total = (file_size - 1) / chunk_size + 1;
    u32::try_from(total)
        .map_err(|_| AssemblyError::BadRequest(format!("too many chunks: {total}")))
}

/// Merges stored chunks into files under the output root.
///
/// Merges of the same upload identifier are serialized; merges of distinct
/// identifiers run concurrently. Chunk uploads racing a merge of the same
/// identifier are not coordinated: callers must finish uploading before
/// they merge.
pub struct Assembler {
    store: ChunkStore,
    output_root: PathBuf,
    purge_after_merge: bool,
    locks: UploadLocks,
}

type UploadLocks = Arc<std::sync::Mutex<HashMap<String, Arc<Mutex<()>>>>>;

/// Holds one upload's merge mutex and drops its map entry once unused.
///
/// Removal runs in `Drop`, so a merge future cancelled mid-flight still
/// releases its entry.
struct UploadLock {
    locks: UploadLocks,
    upload_id: String,
    mutex: Arc<Mutex<()>>,
}

impl UploadLock {
    fn acquire(locks: &UploadLocks, upload_id: &str) -> Self {
        let mutex = {
            let mut map = locks.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(map.entry(upload_id.to_string()).or_default())
        };
        Self {
            locks: Arc::clone(locks),
            upload_id: upload_id.to_string(),
            mutex,
        }
    }
}

impl Drop for UploadLock {
    fn drop(&mut self) {
        let mut map = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // The map and this handle are the last two owners.
        if map
            .get(&self.upload_id)
            .is_some_and(|entry| Arc::ptr_eq(entry, &self.mutex) && Arc::strong_count(entry) == 2)
        {
            map.remove(&self.upload_id);
        }
    }
}

impl Assembler {
    pub fn new(store: ChunkStore, output_root: impl Into<PathBuf>) -> Self {
        Self {
            store,
            output_root: output_root.into(),
            purge_after_merge: true,
            locks: UploadLocks::default(),
        }
    }

    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(ChunkStore::new(&config.temp_root), &config.output_root)
            .purge_after_merge(config.purge_after_merge)
    }

    /// Sets whether chunks are deleted after a successful merge.
    pub fn purge_after_merge(mut self, purge: bool) -> Self {
        self.purge_after_merge = purge;
        self
    }

    pub fn output_root(&self) -> &Path {
        &self.output_root
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    /// Merges chunks `0..ceil(file_size / chunk_size)` of `request.upload_id`
    /// in ascending order.
    ///
    /// The first absent or empty chunk (lowest index) aborts the merge. A
    /// partially written output file is left in place and must not be served.
    pub async fn assemble(&self, request: &AssemblyRequest) -> Result<AssembledFile, AssemblyError> {
        let lock = UploadLock::acquire(&self.locks, &request.upload_id);
        let _guard = lock.mutex.lock().await;
        self.assemble_locked(request).await
    }

    #[cfg(test)]
    fn held_locks(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    async fn assemble_locked(&self, request: &AssemblyRequest) -> Result<AssembledFile, AssemblyError> {
        let upload_id = request.upload_id.as_str();

        let safe_name = match sanitize_file_name(&request.file_name) {
            Some(name) if name != "." && name != ".." => name,
            _ => {
                warn!(upload_id, file_name = %request.file_name, "rejected file name");
                return Err(AssemblyError::InvalidName);
            }
        };

        let total = total_chunks(request.file_size, request.chunk_size)?;

        if !self.store.namespace_exists(upload_id).await? {
            warn!(upload_id, "no chunks stored for upload");
            return Err(AssemblyError::MissingChunks);
        }

        if !tokio::fs::try_exists(&self.output_root).await? {
            tokio::fs::create_dir_all(&self.output_root).await?;
            info!(path = %self.output_root.display(), "created output directory");
        }

        let output_path = self.output_root.join(&safe_name);
        info!(upload_id, path = %output_path.display(), total_chunks = total, "merging chunks");

        let file = tokio::fs::File::create(&output_path).await?;
        let mut out = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
        let mut hasher = Sha256::new();
        let mut buf = vec![0u8; COPY_BUFFER_SIZE];

        for index in 0..total {
            let size = match self.store.size(upload_id, index).await {
                Ok(size) => size,
                Err(TransferError::NotFound { .. }) => {
                    warn!(upload_id, index, "missing chunk");
                    return Err(AssemblyError::MissingChunk(index));
                }
                Err(e) => return Err(e.into()),
            };
            if size == 0 {
                warn!(upload_id, index, "empty chunk");
                return Err(AssemblyError::EmptyChunk(index));
            }

            debug!(upload_id, index, size, "copying chunk");
            if let Err(e) = self
                .copy_chunk(upload_id, index, &mut out, &mut hasher, &mut buf)
                .await
            {
                error!(upload_id, index, error = %e, "chunk copy failed");
                return Err(e);
            }
        }

        out.shutdown().await?;
        out.get_ref().sync_all().await?;
        drop(out);

        let merged_size = tokio::fs::metadata(&output_path).await?.len();
        info!(upload_id, size = merged_size, "merge completed");
        if merged_size == 0 {
            error!(upload_id, path = %output_path.display(), "merged file is empty");
            return Err(AssemblyError::EmptyResult);
        }

        let cleanup = if self.purge_after_merge {
            match self.store.purge(upload_id).await {
                Ok(()) => Cleanup::Purged,
                Err(e) => {
                    warn!(upload_id, error = %e, "failed to purge chunks after merge");
                    Cleanup::Failed(e.to_string())
                }
            }
        } else {
            Cleanup::Skipped
        };

        Ok(AssembledFile {
            path: output_path,
            size: merged_size,
            sha256: hex::encode(hasher.finalize()),
            total_chunks: total,
            cleanup,
        })
    }

    /// Appends one chunk to `out` and flushes, so I/O failures are attributed
    /// to `index`.
    async fn copy_chunk(
        &self,
        upload_id: &str,
        index: u32,
        out: &mut BufWriter<tokio::fs::File>,
        hasher: &mut Sha256,
        buf: &mut [u8],
    ) -> Result<(), AssemblyError> {
        let mut chunk = match self.store.open(upload_id, index).await {
            Ok(file) => file,
            Err(TransferError::NotFound { .. }) => return Err(AssemblyError::MissingChunk(index)),
            Err(e) => return Err(e.into()),
        };

        let io = |source: std::io::Error| AssemblyError::ChunkIo { index, source };
        loop {
            let n = chunk.read(buf).await.map_err(io)?;
            if n == 0 {
                break;
            }
            hasher.update(&buf[..n]);
            out.write_all(&buf[..n]).await.map_err(io)?;
        }
        out.flush().await.map_err(io)
    }
}
