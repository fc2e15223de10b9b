//! On-disk chunk store.
//!
//! Layout: `<root>/<upload_id>/<index>`, one file per chunk named by its
//! decimal index.

use std::collections::BTreeSet;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::TransferError;
use crate::sanitize::validate_upload_id;

/// Distinguishes staging files of concurrent writers within one process.
static STAGING_SEQ: AtomicU64 = AtomicU64::new(0);

/// Persists and enumerates chunks, namespaced by upload identifier.
///
/// Re-uploading an index replaces the previous content (last writer wins).
#[derive(Debug, Clone)]
pub struct ChunkStore {
    root: PathBuf,
}

impl ChunkStore {
    /// Creates a store rooted at `root`. The directory is created lazily.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Returns the store root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the namespace directory for `upload_id`.
    pub fn namespace_dir(&self, upload_id: &str) -> Result<PathBuf, TransferError> {
        validate_upload_id(upload_id)?;
        Ok(self.root.join(upload_id))
    }

    fn chunk_path(&self, upload_id: &str, index: u32) -> Result<PathBuf, TransferError> {
        Ok(self.namespace_dir(upload_id)?.join(index.to_string()))
    }

    /// Stores `data` as chunk `index` of `upload_id`.
    ///
    /// Content is written to a staging file and renamed into place, so a
    /// reader never observes a partially written chunk.
    pub async fn put(&self, upload_id: &str, index: u32, data: &[u8]) -> Result<(), TransferError> {
        let dir = self.namespace_dir(upload_id)?;
        tokio::fs::create_dir_all(&dir).await?;

        let seq = STAGING_SEQ.fetch_add(1, Ordering::Relaxed);
        let staging = dir.join(format!(".{index}.{}.{seq}.part", std::process::id()));
        let target = dir.join(index.to_string());

        let write = async {
            let mut file = tokio::fs::File::create(&staging).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            tokio::fs::rename(&staging, &target).await
        };
        if let Err(e) = write.await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(e.into());
        }

        info!(upload_id, index, size = data.len(), "chunk stored");
        Ok(())
    }

    /// Returns the indices currently stored for `upload_id`.
    ///
    /// A namespace that does not exist yields an empty set. Entries whose
    /// names are not canonical decimal indices are ignored.
    pub async fn list_indices(&self, upload_id: &str) -> Result<BTreeSet<u32>, TransferError> {
        let dir = self.namespace_dir(upload_id)?;
        let mut indices = BTreeSet::new();

        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(indices),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            match name.to_str().and_then(parse_index) {
                Some(index) => {
                    indices.insert(index);
                }
                None => debug!(upload_id, entry = ?name, "ignoring non-chunk entry"),
            }
        }

        Ok(indices)
    }

    /// Returns `true` if any state exists for `upload_id`.
    pub async fn namespace_exists(&self, upload_id: &str) -> Result<bool, TransferError> {
        let dir = self.namespace_dir(upload_id)?;
        Ok(tokio::fs::try_exists(&dir).await?)
    }

    /// Opens chunk `index` for reading.
    pub async fn open(&self, upload_id: &str, index: u32) -> Result<tokio::fs::File, TransferError> {
        let path = self.chunk_path(upload_id, index)?;
        tokio::fs::File::open(&path)
            .await
            .map_err(|e| not_found_or(e, upload_id, index))
    }

    /// Returns the stored byte length of chunk `index`.
    pub async fn size(&self, upload_id: &str, index: u32) -> Result<u64, TransferError> {
        let path = self.chunk_path(upload_id, index)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| not_found_or(e, upload_id, index))?;
        if !meta.is_file() {
            return Err(TransferError::NotFound {
                upload_id: upload_id.to_string(),
                index,
            });
        }
        Ok(meta.len())
    }

    /// Removes every chunk of `upload_id`. Purging an absent namespace is a no-op.
    pub async fn purge(&self, upload_id: &str) -> Result<(), TransferError> {
        let dir = self.namespace_dir(upload_id)?;
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => {
                info!(upload_id, "chunk namespace purged");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Parses a canonical decimal index (`"7"`, not `"07"` or `"+7"`).
fn parse_index(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let index: u32 = name.parse().ok()?;
    (index.to_string() == name).then_some(index)
}

fn not_found_or(err: std::io::Error, upload_id: &str, index: u32) -> TransferError {
    if err.kind() == ErrorKind::NotFound {
        TransferError::NotFound {
            upload_id: upload_id.to_string(),
            index,
        }
    } else {
        err.into()
    }
}
