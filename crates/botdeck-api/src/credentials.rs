use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::warn;
use uuid::Uuid;

use crate::error::ApiError;

/// Validates and stores the credentials document uploaded with a bot.
pub struct CredentialStore {
    dir: PathBuf,
}

impl CredentialStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// The upload must be well-formed JSON; its contents are otherwise opaque.
    pub fn parse(bytes: &[u8]) -> Result<serde_json::Value, ApiError> {
        serde_json::from_slice(bytes).map_err(|e| {
            warn!("Rejected credentials file: {}", e);
            ApiError::InvalidCredentials
        })
    }

    /// Write the blob for `bot_id` and return where it landed.
    pub fn store(&self, bot_id: Uuid, bytes: &[u8]) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create upload directory {}", self.dir.display()))?;

        let path = self.dir.join(format!("{}.json", bot_id));
        std::fs::write(&path, bytes)
            .with_context(|| format!("Failed to write credentials {}", path.display()))?;
        Ok(path)
    }

    pub fn discard(&self, path: &Path) {
        if let Err(e) = std::fs::remove_file(path) {
            warn!("Failed to remove credentials {}: {}", path.display(), e);
        }
    }
}
