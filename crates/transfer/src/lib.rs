//! Chunked upload core: stores indexed chunks per upload identifier,
//! reports which are present, and merges a complete set into one file.

mod assemble;
mod chunked;
mod config;
mod sanitize;
mod service;
mod session;
mod store;

pub use assemble::{
    AssembledFile, Assembler, AssemblyError, AssemblyRequest, Cleanup, total_chunks,
};
pub use chunked::{ChunkReader, IndexedChunk, calculate_file_checksum, checksum_bytes};
pub use config::StorageConfig;
pub use sanitize::{sanitize_file_name, validate_upload_id};
pub use service::UploadService;
pub use session::{MAX_LISTED_MISSING, UploadSessionQuery};
pub use store::ChunkStore;

/// Default client chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Buffer size used when copying chunk content into the merged file.
pub const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Errors produced by the chunk store and its collaborators.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("chunk {index} not found for upload {upload_id}")]
    NotFound { upload_id: String, index: u32 },

    #[error("invalid upload id: {0}")]
    InvalidUploadId(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
