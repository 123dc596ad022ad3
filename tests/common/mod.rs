#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, Semaphore};

use sightline::config::Config;
use sightline::gateway::{
    GatewayError, IntentResult, MicroGuidance, PerceptionGateway, SceneContext, SceneJudgment,
    TaskVerdict,
};
use sightline::memory::MemoryStore;
use sightline::outbound::{ChannelSink, ClientMessage};
use sightline::session::{InquiryRequest, SessionEngine, SessionHandle};
use sightline::task::{TaskBoard, TaskStep};

/// Scripted perception gateway. Scene judgments block on a semaphore so
/// tests control exactly when an inference call completes.
pub struct MockGateway {
    scene_gate: Semaphore,
    pub seen_headings: Mutex<Vec<f64>>,
    pub intent_response: Mutex<IntentResult>,
    pub plan_response: Mutex<Option<Vec<TaskStep>>>,
    pub verdict_response: Mutex<TaskVerdict>,
    pub scene_failures: Mutex<u32>,
}

impl MockGateway {
    /// Gateway whose scene calls complete immediately.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            scene_gate: Semaphore::new(Semaphore::MAX_PERMITS),
            seen_headings: Mutex::new(Vec::new()),
            intent_response: Mutex::new(IntentResult::default()),
            plan_response: Mutex::new(None),
            verdict_response: Mutex::new(TaskVerdict::default()),
            scene_failures: Mutex::new(0),
        })
    }

    /// Gateway whose scene calls block until released.
    pub fn blocking() -> Arc<Self> {
        Arc::new(Self {
            scene_gate: Semaphore::new(0),
            seen_headings: Mutex::new(Vec::new()),
            intent_response: Mutex::new(IntentResult::default()),
            plan_response: Mutex::new(None),
            verdict_response: Mutex::new(TaskVerdict::default()),
            scene_failures: Mutex::new(0),
        })
    }

    /// Let exactly one pending (or future) scene call complete.
    pub fn release_scene(&self) {
        self.scene_gate.add_permits(1);
    }

    pub fn set_intent(&self, result: IntentResult) {
        *self.intent_response.lock().unwrap() = result;
    }

    pub fn set_plan(&self, plan: Vec<TaskStep>) {
        *self.plan_response.lock().unwrap() = Some(plan);
    }

    pub fn set_verdict(&self, verdict: TaskVerdict) {
        *self.verdict_response.lock().unwrap() = verdict;
    }

    /// Make the next `n` scene calls fail with a malformed-response error.
    pub fn fail_next_scenes(&self, n: u32) {
        *self.scene_failures.lock().unwrap() = n;
    }

    pub fn headings(&self) -> Vec<f64> {
        self.seen_headings.lock().unwrap().clone()
    }
}

#[async_trait]
impl PerceptionGateway for MockGateway {
    async fn scene_judgment(
        &self,
        _image: &[u8],
        heading: f64,
        _ctx: &SceneContext,
    ) -> Result<SceneJudgment, GatewayError> {
        self.seen_headings.lock().unwrap().push(heading);
        let permit = self
            .scene_gate
            .acquire()
            .await
            .map_err(|_| GatewayError::EmptyResponse)?;
        permit.forget();

        {
            let mut failures = self.scene_failures.lock().unwrap();
            if *failures > 0 {
                *failures -= 1;
                return Err(GatewayError::Malformed("scripted failure".to_string()));
            }
        }
        Ok(SceneJudgment::default())
    }

    async fn micro_guidance(
        &self,
        _image: &[u8],
        _target: &str,
    ) -> Result<MicroGuidance, GatewayError> {
        Ok(MicroGuidance::default())
    }

    async fn task_guidance(
        &self,
        _image: &[u8],
        _instruction: &str,
    ) -> Result<TaskVerdict, GatewayError> {
        Ok(self.verdict_response.lock().unwrap().clone())
    }

    async fn plan_task(
        &self,
        _task_name: &str,
        _memory_context: &str,
    ) -> Result<Vec<TaskStep>, GatewayError> {
        Ok(self.plan_response.lock().unwrap().clone().unwrap_or_default())
    }

    async fn classify_intent(
        &self,
        _image: &[u8],
        _audio: &[u8],
        _history_context: &str,
        _task_context: &str,
    ) -> Result<IntentResult, GatewayError> {
        Ok(self.intent_response.lock().unwrap().clone())
    }
}

pub fn temp_memory() -> Arc<MemoryStore> {
    let path = std::env::temp_dir().join(format!("sightline-test-{}.json", uuid::Uuid::new_v4()));
    Arc::new(MemoryStore::open(&path))
}

pub fn start_session(
    gateway: Arc<MockGateway>,
    board: Arc<TaskBoard>,
) -> (SessionHandle, mpsc::Receiver<ClientMessage>) {
    let (tx, rx) = mpsc::channel(64);
    let handle = SessionEngine::spawn(
        gateway,
        Arc::new(ChannelSink::new(tx)),
        temp_memory(),
        board,
        Arc::new(Config::default()),
    );
    (handle, rx)
}

pub async fn recv(rx: &mut mpsc::Receiver<ClientMessage>) -> ClientMessage {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for client message")
        .expect("sink closed")
}

/// An inquiry payload with decodable (if meaningless) image and audio.
pub fn voice_inquiry() -> InquiryRequest {
    InquiryRequest {
        image_b64: "data:image/jpeg;base64,aGVsbG8=".to_string(),
        audio_b64: "data:audio/webm;base64,d29ybGQ=".to_string(),
    }
}

pub fn plan_of(instructions: &[&str]) -> Vec<TaskStep> {
    instructions
        .iter()
        .enumerate()
        .map(|(i, instruction)| TaskStep {
            step_id: i as u32 + 1,
            instruction: instruction.to_string(),
            items: Vec::new(),
            completed: false,
        })
        .collect()
}
