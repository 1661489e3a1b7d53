//! Object storage for generated images - local filesystem or Supabase Storage

pub mod local;
pub mod supabase;

use async_trait::async_trait;
use std::sync::Arc;

use crate::config::{StorageConfig, StorageProvider};
use crate::error::{AppError, Result};

pub use local::LocalStore;
pub use supabase::SupabaseStore;

/// Bucket/key object store that hands out public URLs
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Get the store name
    fn name(&self) -> &str;

    /// Store `data` under `bucket/key`. Existing objects are not overwritten.
    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()>;

    /// Public URL of `bucket/key`; does not check that the object exists
    fn public_url(&self, bucket: &str, key: &str) -> String;
}

/// Build the configured object store
pub fn from_config(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match config.provider {
        StorageProvider::Local => Ok(Arc::new(LocalStore::new(
            config.base_path.clone(),
            config.public_url_prefix.clone(),
        ))),
        StorageProvider::Supabase => Ok(Arc::new(SupabaseStore::new(config)?)),
    }
}

/// Reject keys that could escape the bucket or break a URL path segment
pub(crate) fn check_key(key: &str) -> Result<()> {
    let valid = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));

    if valid {
        Ok(())
    } else {
        Err(AppError::Storage(format!("Invalid object key '{}'", key)))
    }
}
