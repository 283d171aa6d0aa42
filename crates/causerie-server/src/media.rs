//! Disk-backed media storage.
//!
//! The chat core never sees raw bytes: uploads land here and messages carry
//! only the opaque reference URL plus a kind classification.

use std::path::{Path, PathBuf};

use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Video,
}

impl MediaKind {
    /// Classify by MIME type; anything else is rejected at upload.
    pub fn from_content_type(content_type: &str) -> Result<Self, ApiError> {
        if content_type.starts_with("image/") {
            Ok(MediaKind::Image)
        } else if content_type.starts_with("video/") {
            Ok(MediaKind::Video)
        } else {
            Err(ApiError::UnsupportedMedia(content_type.to_string()))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaKind::Image => "image",
            MediaKind::Video => "video",
        }
    }
}

/// Result of a successful upload; `url` is what messages reference.
#[derive(Debug, Clone)]
pub struct MediaRef {
    pub id: Uuid,
    pub url: String,
    pub kind: MediaKind,
}

#[derive(Debug, Clone)]
pub struct MediaStore {
    base_path: PathBuf,
    max_size: usize,
}

impl MediaStore {
    pub async fn new(base_path: PathBuf, max_size: usize) -> Result<Self, ApiError> {
        fs::create_dir_all(&base_path).await.map_err(|e| {
            ApiError::Internal(format!(
                "Failed to create media directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Media store initialized");
        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub async fn store(&self, data: &[u8], content_type: &str) -> Result<MediaRef, ApiError> {
        let kind = MediaKind::from_content_type(content_type)?;

        if data.is_empty() {
            return Err(ApiError::BadRequest("empty upload".to_string()));
        }
        if data.len() > self.max_size {
            return Err(ApiError::MediaTooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.safe_path(&id.to_string())?;
        fs::write(&path, data)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write media {id}: {e}")))?;
        // Content type rides in a sidecar so downloads can be served with
        // the type they were uploaded with.
        fs::write(self.safe_path(&format!("{id}.type"))?, content_type)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to write media type {id}: {e}")))?;

        debug!(id = %id, size = data.len(), kind = kind.as_str(), "Stored media");
        Ok(MediaRef {
            id,
            url: format!("/media/{id}"),
            kind,
        })
    }

    /// Fetch a blob and the content type it was uploaded with.
    pub async fn get(&self, id: Uuid) -> Result<(Vec<u8>, String), ApiError> {
        let path = self.safe_path(&id.to_string())?;
        if !path.exists() {
            return Err(ApiError::MediaNotFound(id.to_string()));
        }
        let data = fs::read(&path)
            .await
            .map_err(|e| ApiError::Internal(format!("Failed to read media {id}: {e}")))?;
        let content_type = fs::read_to_string(self.safe_path(&format!("{id}.type"))?)
            .await
            .unwrap_or_else(|_| "application/octet-stream".to_string());
        Ok((data, content_type))
    }

    // Filenames are UUID-derived, but verify the resolved path stays inside
    // the base directory anyway.
    fn safe_path(&self, name: &str) -> Result<PathBuf, ApiError> {
        let path = self.base_path.join(name);
        if path.parent() != Some(self.base_path.as_path()) {
            return Err(ApiError::BadRequest("path traversal detected".to_string()));
        }
        Ok(path)
    }

    #[allow(dead_code)]
    pub fn base_path(&self) -> &Path {
        &self.base_path
    }
}
