// ABOUTME: Single-shot image generation providers: NVIDIA NIM Stable Diffusion and Qwen-Image
// ABOUTME: Both return a displayable URL (data URL for NVIDIA, hosted URL for DashScope)
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 Study Chat Server Contributors

//! # Image Providers
//!
//! Image generation is not streamed: one request, one image. The chat pipeline
//! wraps the returned URL in Markdown and paces it like any other answer.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, error, instrument};

use super::Provider;
use crate::errors::{AppError, AppResult};

/// A generated image ready to embed in Markdown
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GeneratedImage {
    /// `https://` URL or `data:` URL
    pub url: String,
}

/// Single-shot image generation
#[async_trait]
pub trait ImageProvider: Send + Sync {
    /// Provider family
    fn provider(&self) -> Provider;

    /// Generate one image for a prompt
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage>;
}

/// Map a non-2xx answer to an error carrying the status text and body
fn upstream_error(provider: Provider, status: StatusCode, body: &str) -> AppError {
    let service = provider.display_name();
    error!(
        provider = service,
        status = status.as_u16(),
        body = %body.chars().take(500).collect::<String>(),
        "Image generation request failed"
    );
    let status_text = status.canonical_reason().unwrap_or("Upstream error");
    let error = AppError::external_service(service, status_text);
    if body.is_empty() {
        error
    } else {
        error.with_details(body)
    }
}

// ============================================================================
// NVIDIA NIM
// ============================================================================

/// Generation parameters for NVIDIA-hosted Stable Diffusion
#[derive(Debug, Clone, Serialize)]
struct NvidiaImageConfig {
    cfg_scale: f32,
    aspect_ratio: String,
    /// `0` lets the service pick
    seed: u32,
    steps: u32,
    negative_prompt: String,
}

impl Default for NvidiaImageConfig {
    fn default() -> Self {
        Self {
            cfg_scale: 5.0,
            aspect_ratio: "1:1".to_owned(),
            seed: 0,
            steps: 50,
            negative_prompt: "blurry, low quality, distorted, watermark, text artifacts"
                .to_owned(),
        }
    }
}

#[derive(Debug, Serialize)]
struct NvidiaRequest<'a> {
    prompt: &'a str,
    #[serde(flatten)]
    params: &'a NvidiaImageConfig,
}

#[derive(Debug, Deserialize)]
struct NvidiaResponse {
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    artifacts: Vec<NvidiaArtifact>,
}

#[derive(Debug, Deserialize)]
struct NvidiaArtifact {
    base64: Option<String>,
}

/// Sniff the MIME type of base64 image data from its magic bytes
fn sniff_image_mime(encoded: &str) -> &'static str {
    // 16 base64 chars decode to 12 bytes, enough for every signature below
    let prefix: String = encoded.chars().take(16).collect();
    let Ok(bytes) = STANDARD.decode(prefix) else {
        return "image/png";
    };

    if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        "image/jpeg"
    } else if bytes.starts_with(b"RIFF") && bytes.get(8..12) == Some(b"WEBP".as_slice()) {
        "image/webp"
    } else {
        "image/png"
    }
}

/// Wrap base64 image data in a `data:` URL
#[must_use]
pub fn to_data_url(encoded: &str) -> String {
    let encoded = encoded.trim();
    format!("data:{};base64,{encoded}", sniff_image_mime(encoded))
}

/// NVIDIA NIM hosted Stable Diffusion
pub struct NvidiaImageProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
    config: NvidiaImageConfig,
}

impl NvidiaImageProvider {
    /// Create a provider for one model id (e.g. `stabilityai/stable-diffusion-3.5-large`)
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, model_id: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model_id: model_id.to_owned(),
            config: NvidiaImageConfig::default(),
        }
    }
}

#[async_trait]
impl ImageProvider for NvidiaImageProvider {
    fn provider(&self) -> Provider {
        Provider::Nvidia
    }

    #[instrument(skip(self, prompt), fields(model = %self.model_id))]
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage> {
        let service = Provider::Nvidia.display_name();
        let url = format!("{}/{}", self.base_url, self.model_id);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .header("Accept", "application/json")
            .json(&NvidiaRequest {
                prompt,
                params: &self.config,
            })
            .send()
            .await
            .map_err(|e| AppError::external_service(service, format!("Failed to connect: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::external_service(service, format!("Failed to read response: {e}"))
        })?;
        if !status.is_success() {
            return Err(upstream_error(Provider::Nvidia, status, &body));
        }

        let parsed: NvidiaResponse = serde_json::from_str(&body)?;
        let encoded = parsed
            .image
            .or_else(|| parsed.artifacts.into_iter().find_map(|a| a.base64))
            .filter(|b| !b.trim().is_empty())
            .ok_or_else(|| AppError::external_service(service, "Response contained no image"))?;

        debug!(bytes = encoded.len(), "Received NVIDIA image");
        Ok(GeneratedImage {
            url: to_data_url(&encoded),
        })
    }
}

// ============================================================================
// Qwen-Image (DashScope)
// ============================================================================

/// `DashScope` multimodal generation path
const DASHSCOPE_GENERATION_PATH: &str = "services/aigc/multimodal-generation/generation";

/// Output resolution requested from Qwen-Image
const QWEN_IMAGE_SIZE: &str = "1328*1328";

/// Alibaba `DashScope` Qwen-Image
pub struct QwenImageProvider {
    client: Client,
    base_url: String,
    api_key: String,
    model_id: String,
}

impl QwenImageProvider {
    /// Create a provider for one model id (e.g. `qwen-image-plus`)
    #[must_use]
    pub fn new(base_url: &str, api_key: &str, model_id: &str, client: Client) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_owned(),
            api_key: api_key.to_owned(),
            model_id: model_id.to_owned(),
        }
    }

    fn build_body(&self, prompt: &str) -> Value {
        serde_json::json!({
            "model": self.model_id,
            "input": {
                "messages": [
                    { "role": "user", "content": [ { "text": prompt } ] }
                ]
            },
            "parameters": {
                "size": QWEN_IMAGE_SIZE,
                "prompt_extend": true,
                "watermark": false
            }
        })
    }

    /// First image URL in `output.choices[0].message.content`
    fn extract_image_url(body: &Value) -> Option<String> {
        body.pointer("/output/choices/0/message/content")?
            .as_array()?
            .iter()
            .find_map(|item| item.get("image")?.as_str())
            .filter(|url| !url.is_empty())
            .map(ToOwned::to_owned)
    }
}

#[async_trait]
impl ImageProvider for QwenImageProvider {
    fn provider(&self) -> Provider {
        Provider::Qwen
    }

    #[instrument(skip(self, prompt), fields(model = %self.model_id))]
    async fn generate(&self, prompt: &str) -> AppResult<GeneratedImage> {
        let service = Provider::Qwen.display_name();
        let url = format!("{}/{DASHSCOPE_GENERATION_PATH}", self.base_url);

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&self.build_body(prompt))
            .send()
            .await
            .map_err(|e| AppError::external_service(service, format!("Failed to connect: {e}")))?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            AppError::external_service(service, format!("Failed to read response: {e}"))
        })?;
        if !status.is_success() {
            return Err(upstream_error(Provider::Qwen, status, &body));
        }

        let parsed: Value = serde_json::from_str(&body)?;
        let url = Self::extract_image_url(&parsed).ok_or_else(|| {
            AppError::external_service(service, "Response contained no image URL")
                .with_details(body.chars().take(500).collect::<String>())
        })?;

        debug!(%url, "Received Qwen image");
        Ok(GeneratedImage { url })
    }
}
