//! Transport-agnostic entry points for the three upload operations.
//!
//! A transport maps `check`, `upload_chunk` and `merge` one-to-one onto its
//! endpoints and answers failures with [`ErrorBody::status`].

use chunkyard_protocol::{
    CheckRequest, CheckResponse, ErrorBody, ErrorCode, MergeRequest, MergeResponse,
    UploadChunkRequest, UploadProgress,
};
use tracing::{info, warn};

use crate::TransferError;
use crate::assemble::{AssembledFile, Assembler, AssemblyError, AssemblyRequest, total_chunks};
use crate::config::StorageConfig;
use crate::session::UploadSessionQuery;
use crate::store::ChunkStore;

impl From<&TransferError> for ErrorBody {
    fn from(err: &TransferError) -> Self {
        let code = match err {
            TransferError::InvalidUploadId(_) => ErrorCode::BadRequest,
            _ => ErrorCode::StorageError,
        };
        ErrorBody::new(code, err.to_string())
    }
}

impl From<&AssemblyError> for ErrorBody {
    fn from(err: &AssemblyError) -> Self {
        let body = ErrorBody::new(err.code(), err.to_string());
        match err.chunk_index() {
            Some(index) => body.with_chunk_index(index),
            None => body,
        }
    }
}

impl From<AssembledFile> for MergeResponse {
    fn from(merged: AssembledFile) -> Self {
        MergeResponse {
            cleanup_warning: merged.cleanup.warning().map(str::to_owned),
            path: merged.path.to_string_lossy().into_owned(),
            size: merged.size,
            sha256: merged.sha256,
        }
    }
}

/// Chunk store, session query and merge engine sharing one configuration.
pub struct UploadService {
    store: ChunkStore,
    sessions: UploadSessionQuery,
    assembler: Assembler,
}

impl UploadService {
    /// Builds the service after validating `config`.
    pub fn new(config: &StorageConfig) -> Result<Self, TransferError> {
        config.validate()?;
        let store = ChunkStore::new(&config.temp_root);
        Ok(Self {
            sessions: UploadSessionQuery::new(store.clone()),
            assembler: Assembler::from_config(config),
            store,
        })
    }

    pub fn store(&self) -> &ChunkStore {
        &self.store
    }

    pub fn assembler(&self) -> &Assembler {
        &self.assembler
    }

    /// Lists stored chunk indices for a file, ascending.
    pub async fn check(&self, req: &CheckRequest) -> Result<CheckResponse, ErrorBody> {
        info!(file_hash = %req.file_hash, "checking chunk upload status");
        let uploaded = self
            .sessions
            .list_uploaded(&req.file_hash)
            .await
            .map_err(|e| ErrorBody::from(&e))?;
        Ok(CheckResponse {
            chunks: uploaded.into_iter().collect(),
        })
    }

    /// Stores one chunk.
    pub async fn upload_chunk(&self, req: &UploadChunkRequest) -> Result<(), ErrorBody> {
        info!(file_hash = %req.file_hash, chunk_index = req.chunk_index, "uploading chunk");
        self.store
            .put(&req.file_hash, req.chunk_index, &req.data)
            .await
            .map_err(|e| {
                warn!(file_hash = %req.file_hash, chunk_index = req.chunk_index, error = %e, "chunk upload failed");
                ErrorBody::from(&e)
            })
    }

    /// Reports which of the chunks implied by `file_size` / `chunk_size` remain.
    pub async fn progress(
        &self,
        file_hash: &str,
        file_size: i64,
        chunk_size: i64,
    ) -> Result<UploadProgress, ErrorBody> {
        let total = total_chunks(file_size, chunk_size).map_err(|e| ErrorBody::from(&e))?;
        self.sessions
            .progress(file_hash, total)
            .await
            .map_err(|e| ErrorBody::from(&e))
    }

    /// Validates the request and merges the file's chunks.
    pub async fn merge(&self, req: &MergeRequest) -> Result<MergeResponse, ErrorBody> {
        info!(file_hash = %req.file_hash, "merging chunks");
        req.validate().map_err(ErrorBody::from)?;

        let request = AssemblyRequest {
            file_name: req.file_name.clone(),
            upload_id: req.file_hash.clone(),
            file_size: req.file_size,
            chunk_size: req.chunk_size,
        };

        match self.assembler.assemble(&request).await {
            Ok(merged) => {
                if let Some(reason) = merged.cleanup.warning() {
                    warn!(file_hash = %req.file_hash, reason, "merged but chunks were not purged");
                }
                Ok(MergeResponse::from(merged))
            }
            Err(e) => Err(ErrorBody::from(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assemble::Cleanup;
    use tempfile::TempDir;

    fn service(dir: &TempDir) -> UploadService {
        let config = StorageConfig::new(dir.path().join("upload_temp"), dir.path().join("uploads"));
        UploadService::new(&config).unwrap()
    }

    fn chunk(file_hash: &str, chunk_index: u32, data: &[u8]) -> UploadChunkRequest {
        UploadChunkRequest {
            file_hash: file_hash.into(),
            chunk_index,
            data: data.to_vec(),
        }
    }

    fn merge(file_name: &str, file_hash: &str, file_size: i64, chunk_size: i64) -> MergeRequest {
        MergeRequest {
            file_name: file_name.into(),
            file_hash: file_hash.into(),
            file_size,
            chunk_size,
        }
    }

    fn check(file_hash: &str) -> CheckRequest {
        CheckRequest {
            file_hash: file_hash.into(),
        }
    }

    #[test]
    fn failed_cleanup_becomes_warning() {
        let merged = AssembledFile {
            path: "uploads/a.bin".into(),
            size: 3,
            sha256: "ab".into(),
            total_chunks: 1,
            cleanup: Cleanup::Failed("permission denied".into()),
        };
        let resp = MergeResponse::from(merged.clone());
        assert_eq!(resp.cleanup_warning.as_deref(), Some("permission denied"));
        assert_eq!(resp.size, 3);
        assert_eq!(resp.path, "uploads/a.bin");

        let purged = MergeResponse::from(AssembledFile {
            cleanup: Cleanup::Purged,
            ..merged
        });
        assert!(purged.cleanup_warning.is_none());
    }

    #[test]
    fn rejects_invalid_config() {
        let config = StorageConfig::new("same", "same");
        assert!(UploadService::new(&config).is_err());
    }

    #[tokio::test]
    async fn full_upload_flow() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        assert!(svc.check(&check("abc")).await.unwrap().chunks.is_empty());

        svc.upload_chunk(&chunk("abc", 1, &[2u8; 512])).await.unwrap();
        svc.upload_chunk(&chunk("abc", 0, &[1u8; 1024])).await.unwrap();
        assert_eq!(svc.check(&check("abc")).await.unwrap().chunks, vec![0, 1]);

        let resp = svc.merge(&merge("big file.bin", "abc", 1536, 1024)).await.unwrap();
        assert_eq!(resp.size, 1536);
        assert!(resp.path.ends_with("big_file.bin"));
        assert!(resp.cleanup_warning.is_none());

        assert!(svc.check(&check("abc")).await.unwrap().chunks.is_empty());
    }

    #[tokio::test]
    async fn missing_chunk_body_names_index() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.upload_chunk(&chunk("abc", 0, &[1u8; 1024])).await.unwrap();

        let err = svc.merge(&merge("v.bin", "abc", 1536, 1024)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingChunk);
        assert_eq!(err.chunk_index, Some(1));
        assert_eq!(err.status(), 400);
        assert_eq!(err.message, "missing chunk: 1");
    }

    #[tokio::test]
    async fn merge_without_chunks() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        let err = svc.merge(&merge("v.bin", "nothing", 10, 10)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::MissingChunks);
        assert_eq!(err.chunk_index, None);
    }

    #[tokio::test]
    async fn merge_rejects_traversal_name() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.upload_chunk(&chunk("abc", 0, b"x")).await.unwrap();

        let err = svc
            .merge(&merge("../../etc/passwd", "abc", 1, 1))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::InvalidName);
        assert!(!dir.path().join("etc").exists());
    }

    #[tokio::test]
    async fn merge_validates_fields_first() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let err = svc.merge(&merge("a.bin", "abc", 0, 1024)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);

        let err = svc.merge(&merge("  ", "abc", 10, 1024)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);

        let err = svc.merge(&merge("a.bin", "", 10, 1024)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn traversal_hash_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let err = svc.upload_chunk(&chunk("../evil", 0, b"x")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        let err = svc.check(&check("..")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        let err = svc.merge(&merge("a.bin", "a/b", 1, 1)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
        assert!(!dir.path().join("evil").exists());
    }

    #[tokio::test]
    async fn progress_lists_remaining_chunks() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);
        svc.upload_chunk(&chunk("abc", 1, b"x")).await.unwrap();

        let p = svc.progress("abc", 3000, 1024).await.unwrap();
        assert_eq!(p.total_chunks, 3);
        assert_eq!(p.missing, vec![0, 2]);

        let err = svc.progress("abc", 3000, 0).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::BadRequest);
    }

    #[tokio::test]
    async fn progress_stays_bounded_for_huge_sizes() {
        let dir = TempDir::new().unwrap();
        let svc = service(&dir);

        let p = svc.progress("abc", i64::from(u32::MAX), 1).await.unwrap();
        assert_eq!(p.total_chunks, u32::MAX);
        assert_eq!(p.missing_count, u32::MAX);
        assert_eq!(p.missing.len(), crate::MAX_LISTED_MISSING);
    }

    #[tokio::test]
    async fn storage_failure_maps_to_server_error() {
        let dir = TempDir::new().unwrap();
        // A regular file where the chunk root should be makes every write fail.
        let blocker = dir.path().join("upload_temp");
        std::fs::write(&blocker, "not a directory").unwrap();
        let svc = service(&dir);

        let err = svc.upload_chunk(&chunk("abc", 0, b"x")).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::StorageError);
        assert_eq!(err.status(), 500);
    }
}
