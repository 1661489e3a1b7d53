//! Inline `data:` URL handling for provider outputs

use base64::{engine::general_purpose::STANDARD, Engine};
use crate::error::{AppError, Result};

/// Whether an image reference carries its bytes inline
pub fn is_data_url(reference: &str) -> bool {
    reference.starts_with("data:")
}

/// Decode a base64 `data:` URL to binary data
pub fn decode_data_url(data_url: &str) -> Result<Vec<u8>> {
    let (header, payload) = data_url
        .split_once(',')
        .ok_or_else(|| AppError::Upstream("Data URL has no payload".to_string()))?;

    if !header.ends_with(";base64") {
        return Err(AppError::Upstream(format!(
            "Unsupported data URL encoding: {}",
            header
        )));
    }

    STANDARD
        .decode(payload.trim())
        .map_err(|e| AppError::Upstream(format!("Invalid base64 image data: {}", e)))
}

/// Get the image format from a base64 data URL prefix
pub fn get_format_from_data_url(data_url: &str) -> Option<&str> {
    let rest = data_url.strip_prefix("data:image/")?;
    let end = rest.find(';')?;
    Some(&rest[..end])
}
