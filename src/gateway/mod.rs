pub mod client;
pub mod prompts;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::speech::Priority;
use crate::task::TaskStep;

pub use client::HttpGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway credential missing")]
    MissingCredential,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("gateway returned status {0}")]
    Status(reqwest::StatusCode),
    #[error("gateway returned empty text")]
    EmptyResponse,
    #[error("malformed gateway response: {0}")]
    Malformed(String),
    #[error("image decode failed: {0}")]
    ImageDecode(String),
}

fn default_distance() -> f64 {
    2.0
}

fn default_direction() -> String {
    "ahead".to_string()
}

fn default_category() -> String {
    "navigation".to_string()
}

fn default_unknown() -> String {
    "unknown".to_string()
}

fn default_confidence() -> f64 {
    100.0
}

fn default_action() -> String {
    "move".to_string()
}

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// One raw per-object detection inside a scene judgment.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Detection {
    #[serde(default)]
    pub name: String,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub distance: f64,
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_unknown")]
    pub category: String,
    #[serde(default)]
    pub risk_level: Option<String>,
}

/// Structured scene judgment returned for navigation frames.
///
/// Every field defaults so a partially-populated payload degrades gracefully
/// instead of failing the frame.
#[derive(Debug, Clone, Deserialize)]
pub struct SceneJudgment {
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub target_detected: bool,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub current_location_tag: Option<String>,
    #[serde(default = "default_distance")]
    pub distance: f64,
    #[serde(default = "default_direction")]
    pub direction: String,
    #[serde(default = "default_confidence")]
    pub confidence_score: f64,
    #[serde(default)]
    pub speech: String,
    #[serde(default)]
    pub scene_description: String,
    #[serde(default = "empty_object")]
    pub social_cues: Value,
    #[serde(default = "empty_object")]
    pub environment: Value,
    #[serde(default)]
    pub objects: Vec<Detection>,
}

impl Default for SceneJudgment {
    fn default() -> Self {
        Self {
            thinking: String::new(),
            target_detected: false,
            priority: Priority::Low,
            category: default_category(),
            subject: String::new(),
            current_location_tag: None,
            distance: default_distance(),
            direction: default_direction(),
            confidence_score: default_confidence(),
            speech: String::new(),
            scene_description: String::new(),
            social_cues: empty_object(),
            environment: empty_object(),
            objects: Vec::new(),
        }
    }
}

/// Hand-guidance vector for micro-navigation frames.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MicroGuidance {
    #[serde(default)]
    pub x: i32,
    #[serde(default)]
    pub y: i32,
    #[serde(default = "default_action")]
    pub action: String,
    #[serde(default)]
    pub guidance_speech: Option<String>,
}

/// Step-completion verdict for task-guidance frames.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TaskVerdict {
    #[serde(default)]
    pub step_completed: bool,
    #[serde(default)]
    pub speech: String,
    #[serde(default)]
    pub visual_feedback: String,
}

/// Intent classification for a voice inquiry. `intent` stays a raw string
/// here; the session layer maps it onto its closed command set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntentResult {
    #[serde(default)]
    pub thinking: String,
    #[serde(default)]
    pub intent: String,
    #[serde(default)]
    pub search_target: Option<String>,
    #[serde(default)]
    pub goal: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub tag_name: Option<String>,
    #[serde(default)]
    pub task_name: Option<String>,
    #[serde(default)]
    pub scene_description: Option<String>,
    #[serde(default)]
    pub speech: String,
}

/// Textual context accompanying a navigation frame.
#[derive(Debug, Clone, Default)]
pub struct SceneContext {
    /// "SEARCHING FOR: x" or a general-guidance line.
    pub task: String,
    /// Short-term object memory summary.
    pub memory: String,
    /// Tagged-location summary from the persistent store.
    pub known_locations: String,
    /// Recent scene descriptions, newest last.
    pub temporal: String,
}

/// The perception backend, treated as an opaque collaborator: images (and
/// optionally audio) plus textual context in, structured judgments out.
///
/// A failed or unparseable response surfaces as a [`GatewayError`]; callers
/// treat that as "no result for this frame", never as a session fault.
#[async_trait]
pub trait PerceptionGateway: Send + Sync {
    async fn scene_judgment(
        &self,
        image: &[u8],
        heading: f64,
        ctx: &SceneContext,
    ) -> Result<SceneJudgment, GatewayError>;

    async fn micro_guidance(&self, image: &[u8], target: &str)
        -> Result<MicroGuidance, GatewayError>;

    async fn task_guidance(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<TaskVerdict, GatewayError>;

    async fn plan_task(
        &self,
        task_name: &str,
        memory_context: &str,
    ) -> Result<Vec<TaskStep>, GatewayError>;

    async fn classify_intent(
        &self,
        image: &[u8],
        audio: &[u8],
        history_context: &str,
        task_context: &str,
    ) -> Result<IntentResult, GatewayError>;
}
