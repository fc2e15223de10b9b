use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::TransferError;

/// Filesystem locations and cleanup policy shared by the store and the merge engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Directory holding one sub-directory of chunks per upload identifier.
    #[serde(default = "default_temp_root")]
    pub temp_root: PathBuf,

    /// Directory receiving merged files.
    #[serde(default = "default_output_root")]
    pub output_root: PathBuf,

    /// Delete an upload's chunks once its merge succeeds.
    #[serde(default = "default_true")]
    pub purge_after_merge: bool,
}

fn default_temp_root() -> PathBuf {
    PathBuf::from("upload_temp")
}

fn default_output_root() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_true() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            temp_root: default_temp_root(),
            output_root: default_output_root(),
            purge_after_merge: default_true(),
        }
    }
}

impl StorageConfig {
    /// Creates a configuration with the given roots and default cleanup policy.
    pub fn new(temp_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            temp_root: temp_root.into(),
            output_root: output_root.into(),
            ..Self::default()
        }
    }

    /// Rejects empty roots and a chunk root that coincides with the output root.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.temp_root.as_os_str().is_empty() {
            return Err(TransferError::InvalidConfig("temp_root is empty".into()));
        }
        if self.output_root.as_os_str().is_empty() {
            return Err(TransferError::InvalidConfig("output_root is empty".into()));
        }
        if self.temp_root.components().eq(self.output_root.components()) {
            return Err(TransferError::InvalidConfig(format!(
                "temp_root and output_root must differ: {}",
                self.temp_root.display()
            )));
        }
        Ok(())
    }
}
