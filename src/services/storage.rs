//! Upload storage for book covers and PDFs.
//!
//! Files are addressed by a generated name (`{unix_nanos}-{basename}`); only
//! that name is stored in the database.

use std::path::{Path, PathBuf};

use chrono::Utc;

use crate::{
    config::StorageConfig,
    error::{AppError, AppResult},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    Cover,
    Pdf,
}

#[derive(Clone)]
pub struct FileStorage {
    cover_dir: PathBuf,
    pdf_dir: PathBuf,
}

impl FileStorage {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            cover_dir: PathBuf::from(&config.cover_dir),
            pdf_dir: PathBuf::from(&config.pdf_dir),
        }
    }

    fn dir(&self, kind: AssetKind) -> &Path {
        match kind {
            AssetKind::Cover => &self.cover_dir,
            AssetKind::Pdf => &self.pdf_dir,
        }
    }

    /// Write an uploaded file and return its generated name
    pub async fn save(&self, kind: AssetKind, original_name: &str, bytes: &[u8]) -> AppResult<String> {
        let name = generated_name(original_name)?;
        let dir = self.dir(kind);

        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to create {}: {}", dir.display(), e)))?;

        let path = dir.join(&name);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| AppError::Internal(format!("Failed to write {}: {}", path.display(), e)))?;

        tracing::debug!(file = %name, size = bytes.len(), "Stored upload");
        Ok(name)
    }

    /// Delete a stored file. Failures are logged, never returned.
    pub async fn remove(&self, kind: AssetKind, name: &str) {
        let path = self.dir(kind).join(name);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            tracing::warn!("Failed to remove {}: {}", path.display(), e);
        }
    }
}

/// `{unix_nanos}-{basename}`; any directory part of the client name is dropped
fn generated_name(original_name: &str) -> AppResult<String> {
    let basename = Path::new(original_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| AppError::Validation(format!("Invalid file name: {:?}", original_name)))?;

    let nanos = Utc::now()
        .timestamp_nanos_opt()
        .ok_or_else(|| AppError::Internal("Clock out of range".to_string()))?;

    Ok(format!("{}-{}", nanos, basename))
}
