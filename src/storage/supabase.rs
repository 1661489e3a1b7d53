//! Supabase Storage object store

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::{check_key, ObjectStore};

/// Uploads through the Storage REST API with the service role key
pub struct SupabaseStore {
    client: Client,
    base_url: String,
}

impl SupabaseStore {
    pub fn new(config: &StorageConfig) -> Result<Self> {
        let key = &config.supabase_service_key;
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", key))
                .map_err(|e| AppError::Internal(format!("Invalid storage key: {}", e)))?,
        );
        headers.insert(
            "apikey",
            HeaderValue::from_str(key)
                .map_err(|e| AppError::Internal(format!("Invalid storage key: {}", e)))?,
        );

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.supabase_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ObjectStore for SupabaseStore {
    fn name(&self) -> &str {
        "supabase"
    }

    async fn upload(&self, bucket: &str, key: &str, data: Vec<u8>, content_type: &str) -> Result<()> {
        check_key(bucket)?;
        check_key(key)?;

        let url = format!("{}/storage/v1/object/{}/{}", self.base_url, bucket, key);
        let size = data.len();

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, content_type)
            .header("x-upsert", "false")
            .body(data)
            .send()
            .await
            .map_err(|e| AppError::Storage(format!("Upload to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(bucket = %bucket, key = %key, status = %status, "Upload rejected");
            return Err(AppError::Storage(format!(
                "Upload rejected ({}): {}",
                status, body
            )));
        }

        debug!(bucket = %bucket, key = %key, size, "Uploaded object");
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/storage/v1/object/public/{}/{}", self.base_url, bucket, key)
    }
}
