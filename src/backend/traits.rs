//! Common traits and types for image generation backends

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Square output edge in pixels
pub const IMAGE_SIZE: u32 = 1024;
/// Sampler used for every generation
pub const SCHEDULER: &str = "K_EULER";
pub const GUIDANCE_SCALE: f32 = 7.5;
pub const INFERENCE_STEPS: u32 = 50;
pub const OUTPUT_COUNT: u32 = 1;

/// Request to generate images.
///
/// Everything except the prompt is fixed by [`GenerateRequest::emoji`];
/// callers cannot tune the sampling parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    /// The prompt to generate images from
    pub prompt: String,

    /// Negative prompt (things to avoid)
    pub negative_prompt: String,

    /// Image width
    pub width: u32,

    /// Image height
    pub height: u32,

    /// Sampling schedule
    pub scheduler: String,

    /// Guidance scale / CFG scale
    pub guidance_scale: f32,

    /// Number of inference steps
    pub num_inference_steps: u32,

    /// Number of images to generate
    pub num_outputs: u32,
}

impl GenerateRequest {
    /// The fixed emoji generation parameters applied to `prompt`
    pub fn emoji(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            negative_prompt: String::new(),
            width: IMAGE_SIZE,
            height: IMAGE_SIZE,
            scheduler: SCHEDULER.to_string(),
            guidance_scale: GUIDANCE_SCALE,
            num_inference_steps: INFERENCE_STEPS,
            num_outputs: OUTPUT_COUNT,
        }
    }
}

/// Response from image generation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    /// Provider-side prediction id, when it has one
    pub id: Option<String>,

    /// Output image references: `http(s)` URLs or inline `data:` URLs
    pub outputs: Vec<String>,
}

/// Trait for image generation backends
#[async_trait]
pub trait ImageBackend: Send + Sync {
    /// Get the backend name
    fn name(&self) -> &str;

    /// Run a generation and wait for it to finish
    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse>;
}
