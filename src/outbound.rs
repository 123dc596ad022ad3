use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::warn;

use crate::gateway::Detection;
use crate::session::state::Mode;
use crate::speech::Priority;
use crate::task::TaskStep;
use crate::tracking::TrackedObject;

/// Frame counters reported alongside results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameStats {
    pub received: u64,
    pub processed: u64,
}

/// Compact object view for the client UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectView {
    pub name: String,
    pub distance: f64,
    pub category: String,
}

impl From<&TrackedObject> for ObjectView {
    fn from(obj: &TrackedObject) -> Self {
        Self {
            name: obj.name.clone(),
            distance: obj.distance,
            category: obj.category.clone(),
        }
    }
}

impl From<&Detection> for ObjectView {
    fn from(det: &Detection) -> Self {
        Self {
            name: det.name.clone(),
            distance: det.distance,
            category: det.category.clone(),
        }
    }
}

/// Session boundary messages emitted to the client.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Speak {
        text: String,
    },
    Result {
        priority: Priority,
        distance: f64,
        direction: String,
        target_detected: bool,
        current_goal: Option<String>,
        social_cues: Value,
        environment: Value,
        objects: Vec<ObjectView>,
        scene: String,
        ms: u64,
        stats: FrameStats,
    },
    MicroResult {
        x: i32,
        y: i32,
        action: String,
        guidance_speech: Option<String>,
        ms: u64,
    },
    TaskUpdate {
        plan: Vec<TaskStep>,
        current_step_index: usize,
        #[serde(skip_serializing_if = "Option::is_none")]
        visual_feedback: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        restored: Option<bool>,
        #[serde(skip_serializing_if = "Option::is_none")]
        ms: Option<u64>,
    },
    InquiryResult {
        thinking: String,
        current_goal: Option<String>,
        mode: Mode,
        task_active: bool,
        ms: u64,
    },
}

impl ClientMessage {
    pub fn speak(text: impl Into<String>) -> Self {
        ClientMessage::Speak { text: text.into() }
    }
}

/// Outbound delivery seam. A send never fails the session: failures are
/// swallowed and reported as `false`, with no retry.
#[async_trait]
pub trait ClientSink: Send + Sync {
    async fn send(&self, msg: ClientMessage) -> bool;
}

/// Channel-backed sink; the transport layer drains the receiving side.
pub struct ChannelSink {
    tx: mpsc::Sender<ClientMessage>,
}

impl ChannelSink {
    pub fn new(tx: mpsc::Sender<ClientMessage>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, msg: ClientMessage) -> bool {
        if self.tx.send(msg).await.is_err() {
            warn!("client sink closed, message dropped");
            return false;
        }
        true
    }
}
