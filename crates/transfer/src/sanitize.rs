use std::path::{Component, Path};

use crate::TransferError;

/// Maps a client-supplied display name to a safe file name.
///
/// Returns `None` for an empty name or one containing `/` or `\`.
/// Every other character outside `[a-zA-Z0-9._-]` becomes `_`.
pub fn sanitize_file_name(name: &str) -> Option<String> {
    if name.is_empty() || name.contains('/') || name.contains('\\') {
        return None;
    }

    Some(
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect(),
    )
}

/// Validates that an upload identifier is usable as a single directory name.
///
/// Rejects:
/// - Blank identifiers
/// - Path separators (`/`, `\`) and NUL bytes
/// - `.` and `..`
pub fn validate_upload_id(upload_id: &str) -> Result<(), TransferError> {
    if upload_id.trim().is_empty() {
        return Err(TransferError::InvalidUploadId("blank identifier".into()));
    }

    if upload_id.contains(['/', '\\', '\0']) {
        return Err(TransferError::InvalidUploadId(format!(
            "separator not allowed: {upload_id}"
        )));
    }

    let mut components = Path::new(upload_id).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(_)), None) => Ok(()),
        _ => Err(TransferError::InvalidUploadId(format!(
            "not a plain name: {upload_id}"
        ))),
    }
}
