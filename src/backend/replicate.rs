//! Replicate-style predictions API client

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::backend::traits::{GenerateRequest, GenerateResponse, ImageBackend};
use crate::config::GeneratorConfig;
use crate::error::{AppError, Result};

/// Knobs the emoji model expects besides the common parameters
const REFINE: &str = "no_refiner";
const LORA_SCALE: f32 = 0.6;
const HIGH_NOISE_FRAC: f32 = 0.8;
const PROMPT_STRENGTH: f32 = 0.8;

/// Image backend that creates a prediction and waits for it to complete
pub struct ReplicateBackend {
    client: Client,
    base_url: String,
    model_version: String,
    poll_interval: Duration,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ApiPredictionRequest<'a> {
    version: &'a str,
    input: ApiInput<'a>,
}

#[derive(Debug, Serialize)]
struct ApiInput<'a> {
    prompt: &'a str,
    negative_prompt: &'a str,
    width: u32,
    height: u32,
    scheduler: &'a str,
    guidance_scale: f32,
    num_inference_steps: u32,
    num_outputs: u32,
    refine: &'static str,
    lora_scale: f32,
    apply_watermark: bool,
    high_noise_frac: f32,
    prompt_strength: f32,
}

#[derive(Debug, Deserialize)]
struct ApiPrediction {
    #[serde(default)]
    id: Option<String>,
    status: String,
    #[serde(default)]
    output: Option<Value>,
    #[serde(default)]
    error: Option<Value>,
    #[serde(default)]
    urls: Option<ApiUrls>,
}

#[derive(Debug, Deserialize)]
struct ApiUrls {
    #[serde(default)]
    get: Option<String>,
}

impl ApiPrediction {
    fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "succeeded" | "failed" | "canceled")
    }
}

impl ReplicateBackend {
    /// Create a new backend from configuration
    pub fn new(config: &GeneratorConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", config.api_token))
            .map_err(|e| AppError::Internal(format!("Invalid generator token: {}", e)))?;
        headers.insert(header::AUTHORIZATION, auth);
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model_version: config.model_version.clone(),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
        })
    }

    async fn read_prediction(response: reqwest::Response) -> Result<ApiPrediction> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Provider returned {}: {}",
                status, body
            )));
        }

        response
            .json::<ApiPrediction>()
            .await
            .map_err(|e| AppError::Upstream(format!("Failed to parse prediction: {}", e)))
    }

    async fn wait_for_completion(
        &self,
        mut prediction: ApiPrediction,
        started: Instant,
    ) -> Result<ApiPrediction> {
        while !prediction.is_terminal() {
            if started.elapsed() >= self.timeout {
                return Err(AppError::Timeout(format!(
                    "Prediction {} still '{}' after {:?}",
                    prediction.id.as_deref().unwrap_or("?"),
                    prediction.status,
                    self.timeout
                )));
            }

            let poll_url = prediction
                .urls
                .as_ref()
                .and_then(|urls| urls.get.clone())
                .or_else(|| {
                    prediction
                        .id
                        .as_ref()
                        .map(|id| format!("{}/v1/predictions/{}", self.base_url, id))
                })
                .ok_or_else(|| {
                    AppError::Upstream("Pending prediction has neither id nor poll URL".to_string())
                })?;

            tokio::time::sleep(self.poll_interval).await;
            debug!(url = %poll_url, status = %prediction.status, "Polling prediction");

            let response = self.client.get(&poll_url).send().await?;
            prediction = Self::read_prediction(response).await?;
        }

        Ok(prediction)
    }
}

/// Pull image references out of a prediction's `output` field.
///
/// Accepts a list of strings or a single string; anything else is malformed.
fn parse_outputs(output: Option<Value>) -> Result<Vec<String>> {
    match output {
        Some(Value::Array(values)) => values
            .into_iter()
            .map(|value| match value {
                Value::String(url) => Ok(url),
                other => Err(AppError::Upstream(format!(
                    "Malformed output entry: {}",
                    other
                ))),
            })
            .collect(),
        Some(Value::String(url)) => Ok(vec![url]),
        Some(Value::Null) | None => Ok(Vec::new()),
        Some(other) => Err(AppError::Upstream(format!("Malformed output: {}", other))),
    }
}

#[async_trait]
impl ImageBackend for ReplicateBackend {
    fn name(&self) -> &str {
        "replicate"
    }

    async fn generate(&self, request: GenerateRequest) -> Result<GenerateResponse> {
        let started = Instant::now();
        let api_request = ApiPredictionRequest {
            version: &self.model_version,
            input: ApiInput {
                prompt: &request.prompt,
                negative_prompt: &request.negative_prompt,
                width: request.width,
                height: request.height,
                scheduler: &request.scheduler,
                guidance_scale: request.guidance_scale,
                num_inference_steps: request.num_inference_steps,
                num_outputs: request.num_outputs,
                refine: REFINE,
                lora_scale: LORA_SCALE,
                apply_watermark: false,
                high_noise_frac: HIGH_NOISE_FRAC,
                prompt_strength: PROMPT_STRENGTH,
            },
        };

        info!(backend = %self.name(), "Creating prediction");

        let response = self
            .client
            .post(format!("{}/v1/predictions", self.base_url))
            .header("Prefer", "wait")
            .json(&api_request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AppError::Timeout(format!("Provider did not answer: {}", e))
                } else {
                    AppError::HttpClient(e)
                }
            })?;

        let prediction = Self::read_prediction(response).await?;
        let prediction = self.wait_for_completion(prediction, started).await?;

        match prediction.status.as_str() {
            "succeeded" => {
                let outputs = parse_outputs(prediction.output)?;
                debug!(
                    backend = %self.name(),
                    id = ?prediction.id,
                    outputs = outputs.len(),
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Prediction succeeded"
                );
                Ok(GenerateResponse {
                    id: prediction.id,
                    outputs,
                })
            }
            status => {
                let detail = match prediction.error {
                    Some(Value::String(message)) => message,
                    Some(other) => other.to_string(),
                    None => "no error detail".to_string(),
                };
                warn!(backend = %self.name(), id = ?prediction.id, status = %status, "Prediction did not succeed");
                Err(AppError::Upstream(format!("Prediction {}: {}", status, detail)))
            }
        }
    }
}
