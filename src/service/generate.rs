//! Prompt submission: provider call, image transfer, storage upload, insert

use chrono::{DateTime, Utc};
use reqwest::Client;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::backend::{GenerateRequest, ImageBackend};
use crate::db::{GeneratedItem, ItemStore};
use crate::error::{AppError, Result};
use crate::service::base64;
use crate::storage::ObjectStore;

const IMAGE_CONTENT_TYPE: &str = "image/png";
const MAX_KEY_PROMPT_CHARS: usize = 64;

/// Everything a generation needs besides the item store
pub struct GenerationPipeline {
    backend: Arc<dyn ImageBackend>,
    storage: Arc<dyn ObjectStore>,
    http: Client,
    bucket: String,
    max_prompt_chars: usize,
}

impl GenerationPipeline {
    pub fn new(
        backend: Arc<dyn ImageBackend>,
        storage: Arc<dyn ObjectStore>,
        http: Client,
        bucket: impl Into<String>,
        max_prompt_chars: usize,
    ) -> Self {
        Self {
            backend,
            storage,
            http,
            bucket: bucket.into(),
            max_prompt_chars,
        }
    }

    /// Generate one image for `prompt`, store it and record it as `user_id`'s item.
    ///
    /// Validation happens before any external call. Nothing is retried and
    /// nothing is cleaned up if a later step fails.
    pub async fn generate<S: ItemStore>(
        &self,
        store: &S,
        prompt: &str,
        user_id: &str,
    ) -> Result<GeneratedItem> {
        let prompt = validate_prompt(prompt, self.max_prompt_chars)?;
        if user_id.is_empty() {
            return Err(AppError::Unauthorized("No user identity".to_string()));
        }

        info!(user_id = %user_id, backend = %self.backend.name(), "Generating image");
        let response = self.backend.generate(GenerateRequest::emoji(prompt)).await?;
        let image_ref = single_output(response.outputs)?;

        let bytes = self.fetch_image(&image_ref).await?;

        let key = object_key(prompt, Utc::now());
        self.storage
            .upload(&self.bucket, &key, bytes, IMAGE_CONTENT_TYPE)
            .await?;
        let public_url = self.storage.public_url(&self.bucket, &key);
        debug!(store = %self.storage.name(), key = %key, url = %public_url, "Stored image");

        let item = GeneratedItem::new(prompt, public_url, user_id);
        store.insert_item(&item).await?;

        info!(item_id = %item.id, user_id = %user_id, "Generated item saved");
        Ok(item)
    }

    /// Download the provider's output, or decode it when it is inline
    async fn fetch_image(&self, image_ref: &str) -> Result<Vec<u8>> {
        if base64::is_data_url(image_ref) {
            debug!(format = ?base64::get_format_from_data_url(image_ref), "Decoding inline image");
            return base64::decode_data_url(image_ref);
        }

        let response = self
            .http
            .get(image_ref)
            .send()
            .await
            .map_err(|e| AppError::Transport(format!("Image download failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            warn!(url = %image_ref, status = %status, "Image download rejected");
            return Err(AppError::Transport(format!(
                "Image download returned {}",
                status
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::Transport(format!("Image download interrupted: {}", e)))?;
        Ok(bytes.to_vec())
    }
}

/// Trimmed prompt, or an error when it is empty or too long
pub fn validate_prompt(prompt: &str, max_chars: usize) -> Result<&str> {
    let prompt = prompt.trim();
    if prompt.is_empty() {
        return Err(AppError::InvalidRequest("Prompt must not be empty".to_string()));
    }
    if prompt.chars().count() > max_chars {
        return Err(AppError::InvalidRequest(format!(
            "Prompt exceeds {} characters",
            max_chars
        )));
    }
    Ok(prompt)
}

/// The provider must return exactly one image reference
pub fn single_output(mut outputs: Vec<String>) -> Result<String> {
    match outputs.len() {
        1 => {
            let output = outputs.remove(0);
            if output.trim().is_empty() {
                Err(AppError::Upstream("Provider returned an empty image reference".to_string()))
            } else {
                Ok(output)
            }
        }
        0 => Err(AppError::Upstream("No image generated".to_string())),
        n => Err(AppError::Upstream(format!("Expected one image, provider returned {}", n))),
    }
}

/// `<unix-millis>-<prompt with whitespace runs as hyphens>.png`
///
/// Characters that are unsafe in a URL path segment are dropped. Identical
/// prompts in the same millisecond map to the same key.
pub fn object_key(prompt: &str, at: DateTime<Utc>) -> String {
    let mut slug = String::new();
    let mut in_whitespace = false;

    for c in prompt.chars() {
        if c.is_whitespace() {
            if !in_whitespace {
                slug.push('-');
            }
            in_whitespace = true;
            continue;
        }
        in_whitespace = false;
        if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
            slug.push(c);
        }
    }

    let slug: String = slug.chars().take(MAX_KEY_PROMPT_CHARS).collect();
    format!("{}-{}.png", at.timestamp_millis(), slug)
}
