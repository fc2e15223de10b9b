use serde::{Deserialize, Serialize};

/// Machine-readable failure reason carried in an [`ErrorBody`](crate::ErrorBody).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    InvalidName,
    BadRequest,
    MissingChunks,
    MissingChunk,
    EmptyChunk,
    EmptyResult,
    StorageError,
}

impl ErrorCode {
    /// HTTP-style status class the transport should answer with.
    pub fn status(self) -> u16 {
        match self {
            ErrorCode::InvalidName
            | ErrorCode::BadRequest
            | ErrorCode::MissingChunks
            | ErrorCode::MissingChunk
            | ErrorCode::EmptyChunk => 400,
            ErrorCode::EmptyResult | ErrorCode::StorageError => 500,
        }
    }

    /// Returns `true` when the client can fix the failure by changing its request
    /// or re-uploading chunks.
    pub fn is_client_error(self) -> bool {
        self.status() < 500
    }
}

/// Resume information for one upload identifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadProgress {
    pub file_hash: String,
    pub total_chunks: u32,
    /// Stored indices, ascending.
    pub uploaded: Vec<u32>,
    /// Lowest indices in `[0, total_chunks)` not yet stored, ascending.
    /// Truncated for very large files; `missing_count` is always exact.
    pub missing: Vec<u32>,
    pub missing_count: u32,
}

impl UploadProgress {
    /// Returns the share of required chunks already stored (0-100).
    pub fn percentage(&self) -> f64 {
        if self.total_chunks == 0 {
            return 0.0;
        }
        let present = self.total_chunks.saturating_sub(self.missing_count);
        f64::from(present) / f64::from(self.total_chunks) * 100.0
    }

    /// Returns `true` when every required chunk is present.
    pub fn is_complete(&self) -> bool {
        self.total_chunks > 0 && self.missing_count == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_serialization() {
        assert_eq!(
            serde_json::to_string(&ErrorCode::MissingChunk).unwrap(),
            "\"missing_chunk\""
        );
        assert_eq!(
            serde_json::to_string(&ErrorCode::StorageError).unwrap(),
            "\"storage_error\""
        );
    }

    #[test]
    fn error_code_status_classes() {
        assert_eq!(ErrorCode::InvalidName.status(), 400);
        assert_eq!(ErrorCode::MissingChunks.status(), 400);
        assert_eq!(ErrorCode::EmptyChunk.status(), 400);
        assert_eq!(ErrorCode::EmptyResult.status(), 500);
        assert!(!ErrorCode::StorageError.is_client_error());
        assert!(ErrorCode::BadRequest.is_client_error());
    }

    #[test]
    fn upload_progress_percentage() {
        let p = UploadProgress {
            file_hash: "abc".into(),
            total_chunks: 4,
            uploaded: vec![0, 2],
            missing: vec![1, 3],
            missing_count: 2,
        };
        assert!((p.percentage() - 50.0).abs() < f64::EPSILON);
        assert!(!p.is_complete());
    }

    #[test]
    fn upload_progress_field_names() {
        let json = r#"{"fileHash":"abc","totalChunks":2,"uploaded":[0,1],"missing":[],"missingCount":0}"#;
        let p: UploadProgress = serde_json::from_str(json).unwrap();
        assert_eq!(p.total_chunks, 2);
        assert!(p.is_complete());
    }

    #[test]
    fn upload_progress_zero_total() {
        let p = UploadProgress {
            file_hash: "abc".into(),
            total_chunks: 0,
            uploaded: vec![],
            missing: vec![],
            missing_count: 0,
        };
        assert_eq!(p.percentage(), 0.0);
        assert!(!p.is_complete());
    }

    #[test]
    fn upload_progress_inconsistent_counts_do_not_underflow() {
        let json = r#"{"fileHash":"abc","totalChunks":1,"uploaded":[],"missing":[0,1,2],"missingCount":3}"#;
        let p: UploadProgress = serde_json::from_str(json).unwrap();
        assert_eq!(p.percentage(), 0.0);
        assert!(!p.is_complete());
    }
}
