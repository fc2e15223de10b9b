use serde::{Deserialize, Serialize};

use crate::ValidationError;
use crate::types::ErrorCode;

// ---------------------------------------------------------------------------
// Request payloads
// ---------------------------------------------------------------------------

/// Asks which chunk indices are already stored for a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckRequest {
    pub file_hash: String,
}

/// Sends one chunk of a file.
///
/// The `data` field is base64-encoded in JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadChunkRequest {
    pub file_hash: String,
    pub chunk_index: u32,
    #[serde(with = "base64_bytes")]
    pub data: Vec<u8>,
}

/// Asks the server to assemble all chunks of a file.
///
/// Sizes are signed so that a negative value from a client reaches
/// validation instead of failing deserialization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub file_name: String,
    pub file_hash: String,
    pub file_size: i64,
    pub chunk_size: i64,
}

impl MergeRequest {
    /// Checks the field constraints a transport enforces before dispatch.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.file_name.trim().is_empty() {
            return Err(ValidationError {
                field: "fileName",
                reason: "cannot be blank",
            });
        }
        if self.file_hash.trim().is_empty() {
            return Err(ValidationError {
                field: "fileHash",
                reason: "cannot be blank",
            });
        }
        if self.file_size < 1 {
            return Err(ValidationError {
                field: "fileSize",
                reason: "must be at least 1",
            });
        }
        if self.chunk_size < 1 {
            return Err(ValidationError {
                field: "chunkSize",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Response payloads
// ---------------------------------------------------------------------------

/// Stored chunk indices, serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckResponse {
    pub chunks: Vec<u32>,
}

/// Result of a successful merge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResponse {
    pub path: String,
    pub size: u64,
    pub sha256: String,
    /// Set when the file was assembled but its chunks could not be removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cleanup_warning: Option<String>,
}

/// Error payload returned by any of the three operations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    /// Index of the offending chunk for `missing_chunk` and `empty_chunk`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_index: Option<u32>,
}

impl ErrorBody {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            chunk_index: None,
        }
    }

    pub fn with_chunk_index(mut self, index: u32) -> Self {
        self.chunk_index = Some(index);
        self
    }

    /// HTTP-style status for this error.
    pub fn status(&self) -> u16 {
        self.code.status()
    }
}

impl From<ValidationError> for ErrorBody {
    fn from(err: ValidationError) -> Self {
        ErrorBody::new(ErrorCode::BadRequest, err.to_string())
    }
}

mod base64_bytes {
    use base64::{Engine, engine::general_purpose::STANDARD};
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(data: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        STANDARD.encode(data).serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn merge_request() -> MergeRequest {
        MergeRequest {
            file_name: "movie.mp4".into(),
            file_hash: "abc".into(),
            file_size: 1536,
            chunk_size: 1024,
        }
    }

    #[test]
    fn upload_chunk_base64() {
        let req = UploadChunkRequest {
            file_hash: "abc".into(),
            chunk_index: 3,
            data: b"Hello".to_vec(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("SGVsbG8="));
        assert!(json.contains("\"chunkIndex\":3"));
        let parsed: UploadChunkRequest = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.data, b"Hello");
    }

    #[test]
    fn merge_request_field_names() {
        let json = r#"{"fileName":"a.bin","fileHash":"h","fileSize":10,"chunkSize":4}"#;
        let req: MergeRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.file_name, "a.bin");
        assert_eq!(req.chunk_size, 4);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn merge_request_negative_size_parses_then_fails_validation() {
        let json = r#"{"fileName":"a.bin","fileHash":"h","fileSize":-5,"chunkSize":4}"#;
        let req: MergeRequest = serde_json::from_str(json).unwrap();
        let err = req.validate().unwrap_err();
        assert_eq!(err.field, "fileSize");
    }

    #[test]
    fn merge_request_rejects_blank_fields() {
        let mut req = merge_request();
        req.file_name = "   ".into();
        assert_eq!(req.validate().unwrap_err().field, "fileName");

        let mut req = merge_request();
        req.file_hash = String::new();
        assert_eq!(req.validate().unwrap_err().field, "fileHash");

        let mut req = merge_request();
        req.chunk_size = 0;
        assert_eq!(req.validate().unwrap_err().field, "chunkSize");
    }

    #[test]
    fn check_response_is_bare_array() {
        let resp = CheckResponse {
            chunks: vec![0, 1, 4],
        };
        assert_eq!(serde_json::to_string(&resp).unwrap(), "[0,1,4]");
        let empty: CheckResponse = serde_json::from_str("[]").unwrap();
        assert!(empty.chunks.is_empty());
    }

    #[test]
    fn merge_response_omits_missing_warning() {
        let resp = MergeResponse {
            path: "uploads/a.bin".into(),
            size: 10,
            sha256: "00".into(),
            cleanup_warning: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("cleanupWarning"));
    }

    #[test]
    fn error_body_carries_chunk_index() {
        let body = ErrorBody::new(ErrorCode::MissingChunk, "Missing chunk: 1").with_chunk_index(1);
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"code\":\"missing_chunk\""));
        assert!(json.contains("\"chunkIndex\":1"));
        assert_eq!(body.status(), 400);
    }

    #[test]
    fn error_body_from_validation() {
        let body: ErrorBody = merge_request_with_zero_size().validate().unwrap_err().into();
        assert_eq!(body.code, ErrorCode::BadRequest);
        assert!(body.chunk_index.is_none());
        assert!(body.message.contains("fileSize"));
    }

    fn merge_request_with_zero_size() -> MergeRequest {
        MergeRequest {
            file_size: 0,
            ..merge_request()
        }
    }
}
