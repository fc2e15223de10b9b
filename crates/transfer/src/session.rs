use std::collections::BTreeSet;

use chunkyard_protocol::UploadProgress;

use crate::TransferError;
use crate::store::ChunkStore;

/// Most missing indices listed in one progress report.
pub const MAX_LISTED_MISSING: usize = 1024;

/// Read-only view of which chunks an upload already has.
///
/// Answers are advisory: completeness is only decided by a merge.
#[derive(Debug, Clone)]
pub struct UploadSessionQuery {
    store: ChunkStore,
}

impl UploadSessionQuery {
    pub fn new(store: ChunkStore) -> Self {
        Self { store }
    }

    /// Returns the stored chunk indices for `upload_id` (empty if none).
    pub async fn list_uploaded(&self, upload_id: &str) -> Result<BTreeSet<u32>, TransferError> {
        self.store.list_indices(upload_id).await
    }

    /// Compares stored chunks against the `total_chunks` a client expects.
    ///
    /// Indices at or beyond `total_chunks` are reported as uploaded but never
    /// count towards completion. At most [`MAX_LISTED_MISSING`] missing
    /// indices are listed, lowest first.
    pub async fn progress(
        &self,
        upload_id: &str,
        total_chunks: u32,
    ) -> Result<UploadProgress, TransferError> {
        let uploaded = self.list_uploaded(upload_id).await?;
        let present = uploaded.range(..total_chunks).count() as u32;
        let missing = (0..total_chunks)
            .filter(|index| !uploaded.contains(index))
            .take(MAX_LISTED_MISSING)
            .collect();

        Ok(UploadProgress {
            file_hash: upload_id.to_string(),
            total_chunks,
            uploaded: uploaded.into_iter().collect(),
            missing,
            missing_count: total_chunks - present,
        })
    }
}
