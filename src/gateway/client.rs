use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use image::imageops::FilterType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::prompts;
use super::{
    GatewayError, IntentResult, MicroGuidance, PerceptionGateway, SceneContext, SceneJudgment,
    TaskVerdict,
};
use crate::config::Config;
use crate::task::TaskStep;

const JPEG_QUALITY: u8 = 85;
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_b64: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    audio_b64: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    response_format: &'static str,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    content: String,
}

/// HTTP perception gateway client.
///
/// Owns the blocking work around each call: frames are decoded, bounded and
/// re-encoded on the blocking pool before upload, and responses are parsed
/// leniently (models love to wrap JSON in code fences).
pub struct HttpGateway {
    client: reqwest::Client,
    config: Arc<Config>,
}

impl HttpGateway {
    pub fn new(config: Arc<Config>) -> Self {
        Self {
            client: reqwest::Client::builder()
                .timeout(HTTP_TIMEOUT)
                .build()
                .unwrap_or_else(|_| reqwest::Client::new()),
            config,
        }
    }

    /// Decode + bound + JPEG-re-encode an incoming frame, off the async
    /// runtime, returning it base64-encoded for upload.
    async fn prepare_image(&self, bytes: &[u8], bounds: (u32, u32)) -> Result<String, GatewayError> {
        let bytes = bytes.to_vec();
        tokio::task::spawn_blocking(move || {
            let img = image::load_from_memory(&bytes)
                .map_err(|e| GatewayError::ImageDecode(e.to_string()))?;
            let img = img.resize(bounds.0, bounds.1, FilterType::Lanczos3);
            let mut out = Vec::new();
            img.write_to(&mut out, image::ImageOutputFormat::Jpeg(JPEG_QUALITY))
                .map_err(|e| GatewayError::ImageDecode(e.to_string()))?;
            Ok(BASE64.encode(out))
        })
        .await
        .map_err(|e| GatewayError::ImageDecode(e.to_string()))?
    }

    async fn generate(
        &self,
        prompt: &str,
        image_b64: Option<&str>,
        audio_b64: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<String, GatewayError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or(GatewayError::MissingCredential)?;

        let body = GenerateRequest {
            model: &self.config.model,
            prompt,
            image_b64,
            audio_b64,
            temperature,
            response_format: "json",
        };

        let response = self
            .client
            .post(format!("{}/v1/generate", self.config.gateway_url))
            .header("x-api-key", key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(GatewayError::Status(response.status()));
        }

        let parsed: GenerateResponse = response.json().await?;
        if parsed.content.trim().is_empty() {
            return Err(GatewayError::EmptyResponse);
        }
        debug!(bytes = parsed.content.len(), "gateway response received");
        Ok(parsed.content)
    }
}

/// Parse model output, stripping markdown code fences if present.
fn parse_lenient<T: DeserializeOwned>(text: &str) -> Result<T, GatewayError> {
    let mut cleaned = text.trim();
    if let Some(rest) = cleaned.strip_prefix("```json") {
        cleaned = rest;
    } else if let Some(rest) = cleaned.strip_prefix("```") {
        cleaned = rest;
    }
    if let Some(rest) = cleaned.strip_suffix("```") {
        cleaned = rest;
    }
    let cleaned = cleaned.trim();
    if cleaned.is_empty() {
        return Err(GatewayError::EmptyResponse);
    }
    serde_json::from_str(cleaned).map_err(|e| GatewayError::Malformed(e.to_string()))
}

#[async_trait]
impl PerceptionGateway for HttpGateway {
    async fn scene_judgment(
        &self,
        image: &[u8],
        heading: f64,
        ctx: &SceneContext,
    ) -> Result<SceneJudgment, GatewayError> {
        let image_b64 = self.prepare_image(image, self.config.nav_image_size).await?;
        let prompt = prompts::SCENE_PROMPT
            .replace("{heading}", &format!("{:.0}", heading))
            .replace("{task}", &ctx.task)
            .replace("{temporal_context}", &ctx.temporal)
            .replace("{memory}", &ctx.memory)
            .replace("{known_locations}", &ctx.known_locations);

        let content = self.generate(&prompt, Some(&image_b64), None, None).await?;
        parse_lenient(&content)
    }

    async fn micro_guidance(
        &self,
        image: &[u8],
        target: &str,
    ) -> Result<MicroGuidance, GatewayError> {
        let image_b64 = self
            .prepare_image(image, self.config.micro_image_size)
            .await?;
        let prompt = prompts::MICRO_PROMPT.replace("{target}", target);

        let content = self
            .generate(&prompt, Some(&image_b64), None, Some(0.1))
            .await?;
        parse_lenient(&content)
    }

    async fn task_guidance(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<TaskVerdict, GatewayError> {
        let image_b64 = self.prepare_image(image, self.config.nav_image_size).await?;
        let prompt = prompts::TASK_GUIDANCE_PROMPT.replace("{current_step}", instruction);

        let content = self
            .generate(&prompt, Some(&image_b64), None, Some(0.1))
            .await?;
        parse_lenient(&content)
    }

    async fn plan_task(
        &self,
        task_name: &str,
        memory_context: &str,
    ) -> Result<Vec<TaskStep>, GatewayError> {
        let prompt = prompts::PLANNER_PROMPT
            .replace("{user_query}", task_name)
            .replace("{memory_context}", memory_context);

        let content = self.generate(&prompt, None, None, None).await?;
        parse_lenient(&content)
    }

    async fn classify_intent(
        &self,
        image: &[u8],
        audio: &[u8],
        history_context: &str,
        task_context: &str,
    ) -> Result<IntentResult, GatewayError> {
        let image_b64 = if image.is_empty() {
            None
        } else {
            Some(self.prepare_image(image, self.config.nav_image_size).await?)
        };
        let audio_b64 = (!audio.is_empty()).then(|| BASE64.encode(audio));

        let prompt = prompts::INQUIRY_PROMPT
            .replace("{history_context}", history_context)
            .replace("{task_state}", task_context);

        let content = self
            .generate(&prompt, image_b64.as_deref(), audio_b64.as_deref(), None)
            .await?;
        parse_lenient(&content)
    }
}
