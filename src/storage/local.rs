//! Filesystem object store, served back over HTTP under `/images`

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::error::{AppError, Result};
use crate::storage::{check_key, ObjectStore};

/// Stores objects as `<base_path>/<bucket>/<key>`
pub struct LocalStore {
    storage_path: PathBuf,
    url_prefix: String,
}

impl LocalStore {
    /// Create a new local store
    pub fn new(storage_path: impl Into<PathBuf>, url_prefix: impl Into<String>) -> Self {
        let url_prefix: String = url_prefix.into();
        Self {
            storage_path: storage_path.into(),
            url_prefix: url_prefix.trim_end_matches('/').to_string(),
        }
    }

    /// Ensure the bucket directory exists
    async fn ensure_bucket_dir(&self, bucket: &str) -> Result<PathBuf> {
        check_key(bucket)?;
        let dir = self.storage_path.join(bucket);
        if !dir.exists() {
            fs::create_dir_all(&dir).await?;
            debug!(path = ?dir, "Created bucket directory");
        }
        Ok(dir)
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &str {
        "local"
    }

    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        check_key(key)?;

        if content_type.starts_with("image/") && detect_image_format(&data).is_none() {
            return Err(AppError::Storage(format!(
                "Payload for '{}' is not a recognised image",
                key
            )));
        }

        let file_path = self.ensure_bucket_dir(bucket).await?.join(key);

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&file_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::AlreadyExists => {
                    AppError::Storage(format!("Object '{}/{}' already exists", bucket, key))
                }
                _ => AppError::Io(e),
            })?;
        write_or_remove(&file_path, file, &data).await?;

        debug!(path = ?file_path, size = data.len(), content_type = %content_type, "Saved image file");

        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.url_prefix, bucket, key)
    }
}

/// Write `data` through `writer`, deleting `path` if the write fails so the
/// key is not left holding a partial object
async fn write_or_remove<W>(path: &Path, mut writer: W, data: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(data).await?;
        writer.flush().await
    }
    .await;

    if written.is_err() {
        drop(writer);
        if let Err(e) = fs::remove_file(path).await {
            warn!(path = ?path, error = %e, "Failed to remove partial object");
        }
    }
    written
}

/// Detect image format from binary data using magic bytes
pub fn detect_image_format(data: &[u8]) -> Option<&'static str> {
    if data.len() < 8 {
        return None;
    }

    // PNG: 89 50 4E 47 0D 0A 1A 0A
    if data.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
        return Some("png");
    }

    // JPEG: FF D8 FF
    if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
        return Some("jpg");
    }

    // GIF: GIF87a or GIF89a
    if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
        return Some("gif");
    }

    // WebP: RIFF....WEBP
    if data.len() >= 12 && data.starts_with(b"RIFF") && &data[8..12] == b"WEBP" {
        return Some("webp");
    }

    None
}
