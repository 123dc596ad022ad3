use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;
use uuid::Uuid;

use crate::speech::SpeechGate;
use crate::task::TaskState;
use crate::tracking::ObjectTracker;

/// Short-term object memory retention window.
const MEMORY_RETENTION: Duration = Duration::from_secs(30);
/// Rolling scene-description buffer depth.
const SCENE_BUFFER_CAP: usize = 5;
/// How many scene descriptions feed the temporal context line.
const TEMPORAL_CONTEXT_DEPTH: usize = 3;

/// Session processing mode, selecting the frame handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Nav,
    Micro,
    Task,
}

/// One object remembered short-term for prompt context.
#[derive(Debug, Clone)]
pub struct ObjectSighting {
    pub direction: String,
    pub distance: f64,
    pub category: String,
    pub seen_at: Instant,
}

/// Aggregate root for one connection's state. Created on connect, destroyed
/// on disconnect; its durable-relevant subset (the task state) is flushed to
/// the task board before destruction.
///
/// Tracker and speech gate are constructed here, up front, alongside the
/// rest of the session.
#[derive(Debug)]
pub struct SessionState {
    pub id: Uuid,
    pub mode: Mode,
    pub current_goal: Option<String>,
    pub micro_target: Option<String>,
    pub task: TaskState,
    pub tracker: ObjectTracker,
    pub gate: SpeechGate,
    scene_buffer: VecDeque<String>,
    object_memory: HashMap<String, ObjectSighting>,
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            mode: Mode::Nav,
            current_goal: None,
            micro_target: None,
            task: TaskState::default(),
            tracker: ObjectTracker::new(),
            gate: SpeechGate::new(),
            scene_buffer: VecDeque::new(),
            object_memory: HashMap::new(),
        }
    }

    pub fn push_scene(&mut self, description: String) {
        self.scene_buffer.push_back(description);
        while self.scene_buffer.len() > SCENE_BUFFER_CAP {
            self.scene_buffer.pop_front();
        }
    }

    /// Last few scene descriptions joined for the prompt, newest last.
    pub fn temporal_context(&self) -> String {
        if self.scene_buffer.is_empty() {
            return "None".to_string();
        }
        let start = self.scene_buffer.len().saturating_sub(TEMPORAL_CONTEXT_DEPTH);
        self.scene_buffer
            .iter()
            .skip(start)
            .cloned()
            .collect::<Vec<_>>()
            .join(" | ")
    }

    /// Record a sighting and prune entries past the retention window.
    pub fn remember_object_at(
        &mut self,
        subject: &str,
        direction: &str,
        distance: f64,
        category: &str,
        now: Instant,
    ) {
        self.object_memory.insert(
            subject.to_lowercase(),
            ObjectSighting {
                direction: direction.to_string(),
                distance,
                category: category.to_string(),
                seen_at: now,
            },
        );
        self.prune_memory_at(now);
    }

    pub fn prune_memory_at(&mut self, now: Instant) {
        self.object_memory
            .retain(|_, entry| now.saturating_duration_since(entry.seen_at) < MEMORY_RETENTION);
    }

    /// Natural-language summary of recently seen objects for the prompt.
    pub fn memory_context_at(&self, now: Instant) -> String {
        if self.object_memory.is_empty() {
            return "No objects in memory.".to_string();
        }
        let parts: Vec<String> = self
            .object_memory
            .iter()
            .map(|(name, entry)| {
                let age = now.saturating_duration_since(entry.seen_at).as_secs();
                format!(
                    "{} ({}, {:.1}m, {}s ago)",
                    name, entry.direction, entry.distance, age
                )
            })
            .collect();
        format!("Objects in memory: {}", parts.join(", "))
    }

    pub fn remembered_objects(&self) -> usize {
        self.object_memory.len()
    }
}
