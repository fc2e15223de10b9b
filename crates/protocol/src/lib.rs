//! Wire payloads exchanged between upload clients and the chunkyard core.
//!
//! The transport layer (HTTP or otherwise) maps the three logical
//! operations `check`, `upload_chunk` and `merge` onto these types.

pub mod messages;
pub mod types;

pub use messages::{
    CheckRequest, CheckResponse, ErrorBody, MergeRequest, MergeResponse, UploadChunkRequest,
};
pub use types::{ErrorCode, UploadProgress};

/// Rejection of a request whose fields violate the wire constraints.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {reason}")]
pub struct ValidationError {
    pub field: &'static str,
    pub reason: &'static str,
}
