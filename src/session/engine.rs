use std::sync::Arc;
use std::time::Instant;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::mailbox::{FrameMailbox, FramePayload};
use super::state::{Mode, SessionState};
use crate::config::Config;
use crate::gateway::{GatewayError, IntentResult, PerceptionGateway, SceneContext};
use crate::memory::MemoryStore;
use crate::outbound::{ClientMessage, ClientSink, ObjectView};
use crate::speech::{format_distance, Priority, SpeechRequest};
use crate::task::{ControlOutcome, TaskBoard, TaskControl, TaskState};

/// A voice inquiry captured by the client: one still frame plus the spoken
/// audio, both as data-URL base64.
#[derive(Debug, Clone)]
pub struct InquiryRequest {
    pub image_b64: String,
    pub audio_b64: String,
}

/// Closed set of voice-intent commands the session acts on. Anything the
/// classifier returns outside this set degrades to `Info`; unknown
/// `task_*` strings stay in the task-control family so the user hears an
/// "unknown command" response instead of silence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceIntent {
    Search,
    Stop,
    Tag,
    MicroNav,
    Task,
    TaskSkip,
    TaskPrevious,
    TaskRepeat,
    TaskDone,
    TaskStatus,
    TaskUnknown,
    Info,
}

impl VoiceIntent {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "search" => VoiceIntent::Search,
            "stop" => VoiceIntent::Stop,
            "tag" => VoiceIntent::Tag,
            "micro_nav" => VoiceIntent::MicroNav,
            "task" => VoiceIntent::Task,
            "task_skip" => VoiceIntent::TaskSkip,
            "task_previous" => VoiceIntent::TaskPrevious,
            "task_repeat" => VoiceIntent::TaskRepeat,
            "task_done" => VoiceIntent::TaskDone,
            "task_status" => VoiceIntent::TaskStatus,
            other if other.starts_with("task_") => VoiceIntent::TaskUnknown,
            _ => VoiceIntent::Info,
        }
    }

    fn is_task_control(self) -> bool {
        matches!(
            self,
            VoiceIntent::TaskSkip
                | VoiceIntent::TaskPrevious
                | VoiceIntent::TaskRepeat
                | VoiceIntent::TaskDone
                | VoiceIntent::TaskStatus
                | VoiceIntent::TaskUnknown
        )
    }
}

/// Handle held by the transport layer for one live session.
///
/// Dropping the inquiry channel (or calling [`close`](Self::close)) tears the
/// session down; `close` waits for the consumer task to flush durable state
/// and exit before returning.
pub struct SessionHandle {
    mailbox: Arc<FrameMailbox>,
    cmd_tx: mpsc::Sender<InquiryRequest>,
    cancel: CancellationToken,
    join: JoinHandle<()>,
}

impl SessionHandle {
    /// Non-blocking frame ingestion; see [`FrameMailbox::submit`].
    pub fn submit_frame(&self, image: Vec<u8>, heading: f64) {
        self.mailbox.submit(FramePayload { image, heading });
    }

    /// Queue a voice inquiry for the session's consumer task.
    pub async fn inquiry(&self, req: InquiryRequest) -> bool {
        self.cmd_tx.send(req).await.is_ok()
    }

    pub fn stats(&self) -> crate::outbound::FrameStats {
        self.mailbox.stats()
    }

    pub fn skipped_frames(&self) -> u64 {
        self.mailbox.skipped()
    }

    /// End the session: cancels the consumer and awaits it, so durable task
    /// state is flushed before resources are released.
    pub async fn close(self) {
        self.cancel.cancel();
        let _ = self.join.await;
    }
}

/// Per-session orchestrator: owns the [`SessionState`], routes frames to the
/// handler for the current mode, applies voice-intent transitions, and keeps
/// the durable task board in sync.
pub struct SessionEngine {
    state: SessionState,
    mailbox: Arc<FrameMailbox>,
    gateway: Arc<dyn PerceptionGateway>,
    sink: Arc<dyn ClientSink>,
    memory: Arc<MemoryStore>,
    board: Arc<TaskBoard>,
    config: Arc<Config>,
}

impl SessionEngine {
    /// Start a session: constructs its state and spawns the consumer task.
    pub fn spawn(
        gateway: Arc<dyn PerceptionGateway>,
        sink: Arc<dyn ClientSink>,
        memory: Arc<MemoryStore>,
        board: Arc<TaskBoard>,
        config: Arc<Config>,
    ) -> SessionHandle {
        let mailbox = Arc::new(FrameMailbox::new());
        let (cmd_tx, cmd_rx) = mpsc::channel(8);
        let cancel = CancellationToken::new();

        let engine = SessionEngine {
            state: SessionState::new(),
            mailbox: Arc::clone(&mailbox),
            gateway,
            sink,
            memory,
            board,
            config,
        };

        let join = tokio::spawn(engine.run(cmd_rx, cancel.clone()));

        SessionHandle {
            mailbox,
            cmd_tx,
            cancel,
            join,
        }
    }

    /// Consumer loop: blocks until signalled, claims the freshest pending
    /// frame, dispatches it by mode. At most one inference call is in flight
    /// per session; handler failures are contained here and never terminate
    /// the loop.
    async fn run(mut self, mut cmd_rx: mpsc::Receiver<InquiryRequest>, cancel: CancellationToken) {
        info!(session = %self.state.id, "session started");
        self.adopt_durable_task().await;

        let mailbox = Arc::clone(&self.mailbox);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                req = cmd_rx.recv() => match req {
                    Some(req) => {
                        if let Err(e) = self.process_inquiry(req).await {
                            error!(session = %self.state.id, error = %e, "inquiry failed");
                            self.sink
                                .send(ClientMessage::speak("Sorry, I had an error processing that."))
                                .await;
                        }
                    }
                    // Transport dropped its handle without closing.
                    None => break,
                },
                _ = mailbox.signalled() => {
                    if let Some(frame) = self.mailbox.claim() {
                        if let Err(e) = self.dispatch_frame(frame).await {
                            self.mailbox.note_skip();
                            warn!(session = %self.state.id, error = %e, "frame handling failed");
                        }
                        self.mailbox.finish();
                    }
                }
            }
        }

        // Durable flush before the session's resources go away.
        if self.state.task.active {
            self.board.sync_at(&self.state.task, None, Instant::now());
            info!(session = %self.state.id, "task state saved for reconnect");
        }
        info!(session = %self.state.id, stats = ?self.mailbox.stats(), "session closed");
    }

    /// Adopt a valid durable task left by a previous connection.
    async fn adopt_durable_task(&mut self) {
        let Some((task, name)) = self.board.adopt_at(Instant::now()) else {
            return;
        };
        info!(session = %self.state.id, task = %name, "restored task from previous session");
        self.state.task = task;
        self.state.mode = Mode::Task;

        self.sink
            .send(ClientMessage::TaskUpdate {
                plan: self.state.task.plan.clone(),
                current_step_index: self.state.task.current_step_index,
                visual_feedback: None,
                restored: Some(true),
                ms: None,
            })
            .await;

        if let Some(step) = self.state.task.current_step() {
            self.sink
                .send(ClientMessage::speak(format!(
                    "Resuming. Step: {}",
                    step.instruction
                )))
                .await;
        }
    }

    async fn dispatch_frame(&mut self, frame: FramePayload) -> anyhow::Result<()> {
        match self.state.mode {
            Mode::Micro => self.handle_micro_frame(frame).await,
            Mode::Task => self.handle_task_frame(frame).await,
            Mode::Nav => self.handle_nav_frame(frame).await,
        }
    }

    /// Standard navigation processing: scene judgment, memory updates,
    /// speech gating, object tracking, UI payload.
    async fn handle_nav_frame(&mut self, frame: FramePayload) -> anyhow::Result<()> {
        let started = Instant::now();

        let ctx = SceneContext {
            task: match &self.state.current_goal {
                Some(goal) => format!("SEARCHING FOR: {}", goal),
                None => "General Guidance".to_string(),
            },
            memory: self.state.memory_context_at(started),
            known_locations: self.memory.location_summary(),
            temporal: self.state.temporal_context(),
        };

        let judgment = match timeout(
            self.config.model_timeout,
            self.gateway.scene_judgment(&frame.image, frame.heading, &ctx),
        )
        .await
        {
            Err(_) => {
                self.mailbox.note_skip();
                warn!(session = %self.state.id, "inference timed out");
                return Ok(());
            }
            Ok(Err(GatewayError::EmptyResponse)) => {
                warn!(session = %self.state.id, "gateway returned empty judgment");
                return Ok(());
            }
            Ok(Err(e)) => return Err(e.into()),
            Ok(Ok(judgment)) => judgment,
        };

        let now = Instant::now();

        if !judgment.scene_description.is_empty() {
            self.state.push_scene(judgment.scene_description.clone());
        }

        // Persistent sighting log, restricted to the categories worth
        // recalling later.
        if !judgment.subject.is_empty()
            && matches!(
                judgment.category.as_str(),
                "target" | "social" | "text" | "furniture"
            )
        {
            self.memory.log_object(
                &judgment.subject,
                judgment.current_location_tag.as_deref(),
                &judgment.scene_description,
            );
        }

        if !judgment.subject.is_empty() {
            self.state.remember_object_at(
                &judgment.subject,
                &judgment.direction,
                judgment.distance,
                &judgment.category,
                now,
            );
        }

        if judgment.target_detected {
            if let Some(goal) = &self.state.current_goal {
                if judgment.subject.to_lowercase().contains(&goal.to_lowercase()) {
                    info!(session = %self.state.id, goal = %goal, "search target in view");
                }
            }
        }

        // Append a spoken distance phrase unless the text already carries one.
        let mut speech_text = judgment.speech.clone();
        if !speech_text.is_empty() && judgment.distance > 0.0 {
            let whole_meters = (judgment.distance as i64).to_string();
            if !speech_text.contains(&whole_meters) {
                speech_text = format!(
                    "{} {} away.",
                    speech_text,
                    format_distance(judgment.distance)
                );
            }
        }

        let request = SpeechRequest {
            priority: judgment.priority,
            subject: &judgment.subject,
            direction: &judgment.direction,
            category: &judgment.category,
            distance: judgment.distance,
            text: &speech_text,
        };
        let (speak, reason) = self.state.gate.should_speak_at(&request, now);
        if speak && !speech_text.is_empty() {
            self.state.gate.record_speech_at(&request, now);
            self.sink.send(ClientMessage::speak(speech_text)).await;
        }

        let stable = self.state.tracker.ingest_at(&judgment.objects, now);
        let objects: Vec<ObjectView> = if stable.is_empty() {
            judgment.objects.iter().take(5).map(ObjectView::from).collect()
        } else {
            stable.iter().map(ObjectView::from).collect()
        };

        self.mailbox.note_processed();
        let ms = started.elapsed().as_millis() as u64;

        self.sink
            .send(ClientMessage::Result {
                priority: judgment.priority,
                distance: judgment.distance,
                direction: judgment.direction.clone(),
                target_detected: judgment.target_detected,
                current_goal: self.state.current_goal.clone(),
                social_cues: judgment.social_cues,
                environment: judgment.environment,
                objects,
                scene: judgment.scene_description,
                ms,
                stats: self.mailbox.stats(),
            })
            .await;

        debug!(session = %self.state.id, spoke = speak, gate = %reason, ms, "navigation frame handled");
        Ok(())
    }

    /// Micro-navigation: high-speed hand guidance toward a small target.
    async fn handle_micro_frame(&mut self, frame: FramePayload) -> anyhow::Result<()> {
        let Some(target) = self.state.micro_target.clone() else {
            return Ok(());
        };
        if frame.image.is_empty() {
            return Ok(());
        }
        let started = Instant::now();

        let guidance = match self.gateway.micro_guidance(&frame.image, &target).await {
            Ok(guidance) => guidance,
            Err(GatewayError::EmptyResponse) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        self.mailbox.note_processed();
        let ms = started.elapsed().as_millis() as u64;

        self.sink
            .send(ClientMessage::MicroResult {
                x: guidance.x,
                y: guidance.y,
                action: guidance.action,
                guidance_speech: guidance.guidance_speech,
                ms,
            })
            .await;
        Ok(())
    }

    /// Task guidance: verify the current step against the frame, advance on
    /// a positive verdict, or pass coaching text through the speech gate.
    async fn handle_task_frame(&mut self, frame: FramePayload) -> anyhow::Result<()> {
        if !self.state.task.active || self.state.task.plan.is_empty() {
            self.state.mode = Mode::Nav;
            return Ok(());
        }

        if self.state.task.is_complete() {
            self.sink
                .send(ClientMessage::speak("Task already completed."))
                .await;
            self.state.task = TaskState::default();
            self.state.mode = Mode::Nav;
            return Ok(());
        }

        let idx = self.state.task.current_step_index;
        let instruction = self.state.task.plan[idx].instruction.clone();
        let started = Instant::now();

        let verdict = match self.gateway.task_guidance(&frame.image, &instruction).await {
            Ok(verdict) => verdict,
            Err(GatewayError::EmptyResponse) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        if verdict.step_completed {
            match self.state.task.advance() {
                ControlOutcome::Completed => {
                    self.sink
                        .send(ClientMessage::speak("Task completed! Great job."))
                        .await;
                    self.state.mode = Mode::Nav;
                }
                ControlOutcome::Advanced { next_instruction } => {
                    self.sink
                        .send(ClientMessage::speak(format!(
                            "Step done. Next: {}",
                            next_instruction
                        )))
                        .await;
                }
                _ => {}
            }
        } else if !verdict.speech.is_empty() {
            // Coaching text competes like any medium-priority announcement,
            // so repeated guidance still debounces.
            let now = Instant::now();
            let request = SpeechRequest {
                priority: Priority::Medium,
                subject: "task",
                direction: "guidance",
                category: "task",
                distance: 1.0,
                text: &verdict.speech,
            };
            let (speak, _) = self.state.gate.should_speak_at(&request, now);
            if speak {
                self.state.gate.record_speech_at(&request, now);
                self.sink
                    .send(ClientMessage::speak(verdict.speech.clone()))
                    .await;
            }
        }

        self.board
            .sync_at(&self.state.task, None, Instant::now());
        self.mailbox.note_processed();
        let ms = started.elapsed().as_millis() as u64;

        self.sink
            .send(ClientMessage::TaskUpdate {
                plan: self.state.task.plan.clone(),
                current_step_index: self.state.task.current_step_index,
                visual_feedback: Some(verdict.visual_feedback),
                restored: None,
                ms: Some(ms),
            })
            .await;
        Ok(())
    }

    /// Voice inquiry: classify intent from audio + still frame, apply the
    /// matching transition, answer with the handler's override text when it
    /// produced one.
    async fn process_inquiry(&mut self, req: InquiryRequest) -> anyhow::Result<()> {
        if req.image_b64.is_empty() || req.audio_b64.is_empty() {
            return Ok(());
        }
        let started = Instant::now();
        info!(session = %self.state.id, "processing user inquiry");

        let image = decode_data_url(&req.image_b64);
        let audio = decode_data_url(&req.audio_b64);

        let task_context = if self.state.task.active {
            let idx = self.state.task.current_step_index;
            let total = self.state.task.plan.len();
            let instruction = self
                .state
                .task
                .current_step()
                .map(|s| s.instruction.as_str())
                .unwrap_or("Complete");
            format!("ACTIVE TASK: Step {}/{} - '{}'", idx + 1, total, instruction)
        } else {
            "No active task".to_string()
        };

        let result = match self
            .gateway
            .classify_intent(&image, &audio, &self.memory.history_context(), &task_context)
            .await
        {
            Ok(result) => result,
            Err(GatewayError::EmptyResponse) => return Ok(()),
            Err(e) => return Err(e.into()),
        };

        let intent = VoiceIntent::parse(&result.intent);
        let mut speech_text = if result.speech.is_empty() {
            "I didn't catch that.".to_string()
        } else {
            result.speech.clone()
        };

        // Single handler invocation; its override text wins when present.
        if let Some(override_text) = self.apply_intent(intent, &result).await {
            speech_text = override_text;
        }

        let ms = started.elapsed().as_millis() as u64;
        self.sink
            .send(ClientMessage::InquiryResult {
                thinking: result.thinking.clone(),
                current_goal: self.state.current_goal.clone(),
                mode: self.state.mode,
                task_active: self.state.task.active,
                ms,
            })
            .await;
        self.sink.send(ClientMessage::speak(speech_text)).await;

        info!(session = %self.state.id, intent = %result.intent, ms, "inquiry handled");
        Ok(())
    }

    /// Execute intent side effects. Returns text that overrides the
    /// classifier's own speech.
    async fn apply_intent(&mut self, intent: VoiceIntent, result: &IntentResult) -> Option<String> {
        match intent {
            VoiceIntent::MicroNav => {
                let target = result.target.clone()?;
                self.state.mode = Mode::Micro;
                self.state.micro_target = Some(target.clone());
                Some(format!("Guiding you to the {}. Hold steady.", target))
            }
            VoiceIntent::Search => {
                self.state.mode = Mode::Nav;
                let goal = result.search_target.clone().or_else(|| result.goal.clone())?;
                self.state.current_goal = Some(goal.clone());
                info!(session = %self.state.id, goal = %goal, "search goal set");
                Some(format!("Okay, searching for {}.", goal))
            }
            VoiceIntent::Stop => {
                self.state.mode = Mode::Nav;
                self.state.current_goal = None;
                self.state.micro_target = None;
                self.state.task = TaskState::default();
                self.board.deactivate();
                Some("Stopping all tasks and searches.".to_string())
            }
            VoiceIntent::Tag => {
                let name = result.tag_name.as_deref()?;
                let description = result.scene_description.as_deref()?;
                self.memory.add_location(name, description);
                Some(format!("Tagged location as {}.", name))
            }
            VoiceIntent::Task => Some(self.start_task(result.task_name.as_deref()).await),
            _ if intent.is_task_control() => Some(self.control_task(intent).await),
            _ => None,
        }
    }

    /// Generate a plan for a physical task and activate it.
    async fn start_task(&mut self, task_name: Option<&str>) -> String {
        let Some(name) = task_name.filter(|n| !n.is_empty()) else {
            return "I didn't hear a task name.".to_string();
        };
        info!(session = %self.state.id, task = %name, "planning task");

        let memory_context = format!(
            "{}\nLocations: {}",
            self.memory.history_context(),
            self.memory.location_summary()
        );

        match self.gateway.plan_task(name, &memory_context).await {
            Ok(plan) if !plan.is_empty() => {
                self.state.task = TaskState::begin(plan.clone());
                self.state.mode = Mode::Task;
                self.board
                    .sync_at(&self.state.task, Some(name), Instant::now());

                self.sink
                    .send(ClientMessage::TaskUpdate {
                        plan: plan.clone(),
                        current_step_index: 0,
                        visual_feedback: None,
                        restored: None,
                        ms: None,
                    })
                    .await;

                format!(
                    "Plan generated for {}. First step: {}",
                    name, plan[0].instruction
                )
            }
            Ok(_) => "I couldn't generate a valid plan.".to_string(),
            Err(e) => {
                error!(session = %self.state.id, task = %name, error = %e, "task planning failed");
                "Sorry, I failed to create a plan.".to_string()
            }
        }
    }

    /// Voice navigation within an active task (skip, back, repeat, status).
    async fn control_task(&mut self, intent: VoiceIntent) -> String {
        if !self.state.task.active || self.state.task.plan.is_empty() {
            return "No active task to control.".to_string();
        }

        let control = match intent {
            VoiceIntent::TaskSkip => TaskControl::Skip,
            VoiceIntent::TaskDone => TaskControl::Done,
            VoiceIntent::TaskPrevious => TaskControl::Previous,
            VoiceIntent::TaskRepeat => TaskControl::Repeat,
            VoiceIntent::TaskStatus => TaskControl::Status,
            _ => TaskControl::Unknown,
        };

        let outcome = self.state.task.apply_control(control);
        let response = match &outcome {
            ControlOutcome::Advanced { next_instruction } => {
                format!("Done. Next: {}", next_instruction)
            }
            ControlOutcome::Completed => {
                self.state.mode = Mode::Nav;
                "Task completed.".to_string()
            }
            ControlOutcome::SteppedBack { instruction } => format!("Back to: {}", instruction),
            ControlOutcome::AtStart => "Already at start.".to_string(),
            ControlOutcome::CurrentStep { instruction } => {
                format!("Current step: {}", instruction)
            }
            ControlOutcome::Progress { current, total } => {
                format!("Step {} of {}.", current, total)
            }
            ControlOutcome::Unknown => "Unknown task command.".to_string(),
        };

        self.board.sync_at(&self.state.task, None, Instant::now());
        self.sink
            .send(ClientMessage::TaskUpdate {
                plan: self.state.task.plan.clone(),
                current_step_index: self.state.task.current_step_index,
                visual_feedback: None,
                restored: None,
                ms: None,
            })
            .await;

        response
    }
}

/// Decode a `data:<mime>;base64,<payload>` string (or bare base64). Failures
/// degrade to an empty payload; the gateway call still proceeds and its
/// failure path handles the rest.
fn decode_data_url(payload: &str) -> Vec<u8> {
    let encoded = payload.split_once(',').map(|(_, rest)| rest).unwrap_or(payload);
    match BASE64.decode(encoded.trim()) {
        Ok(bytes) => bytes,
        Err(e) => {
            error!(error = %e, "base64 payload decode failed");
            Vec::new()
        }
    }
}
