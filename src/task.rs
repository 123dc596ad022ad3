use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Durable task progress expires after this much inactivity.
const TASK_FRESHNESS: Duration = Duration::from_secs(300);

/// A single step in a generated task plan. Wire shape from the planner;
/// every field defaults so a sparse plan entry still loads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStep {
    #[serde(default)]
    pub step_id: u32,
    #[serde(default)]
    pub instruction: String,
    #[serde(default)]
    pub items: Vec<String>,
    #[serde(default)]
    pub completed: bool,
}

/// Voice-driven task control commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskControl {
    Skip,
    Done,
    Previous,
    Repeat,
    Status,
    Unknown,
}

/// Result of applying a control command, for the caller to phrase and act on.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlOutcome {
    /// Step marked complete; the plan continues at `next_instruction`.
    Advanced { next_instruction: String },
    /// Step marked complete and it was the last one; task is deactivated.
    Completed,
    SteppedBack { instruction: String },
    AtStart,
    CurrentStep { instruction: String },
    Progress { current: usize, total: usize },
    Unknown,
}

/// Per-session execution state of an interactive task.
///
/// Invariant: `0 <= current_step_index <= plan.len()`; index == len means
/// the task is logically complete.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TaskState {
    pub active: bool,
    pub plan: Vec<TaskStep>,
    pub current_step_index: usize,
    pub waiting_for_user: bool,
}

impl TaskState {
    pub fn begin(plan: Vec<TaskStep>) -> Self {
        Self {
            active: true,
            plan,
            current_step_index: 0,
            waiting_for_user: false,
        }
    }

    pub fn current_step(&self) -> Option<&TaskStep> {
        if self.active {
            self.plan.get(self.current_step_index)
        } else {
            None
        }
    }

    pub fn is_complete(&self) -> bool {
        self.current_step_index >= self.plan.len()
    }

    /// Mark the current step complete and advance. Deactivates on the last
    /// step. Caller is responsible for the session-level mode change.
    pub fn advance(&mut self) -> ControlOutcome {
        if let Some(step) = self.plan.get_mut(self.current_step_index) {
            step.completed = true;
        }
        self.current_step_index += 1;

        if self.is_complete() {
            self.active = false;
            ControlOutcome::Completed
        } else {
            ControlOutcome::Advanced {
                next_instruction: self.plan[self.current_step_index].instruction.clone(),
            }
        }
    }

    /// Apply a voice control command. Assumes an active, non-empty plan.
    pub fn apply_control(&mut self, control: TaskControl) -> ControlOutcome {
        match control {
            TaskControl::Skip | TaskControl::Done => self.advance(),
            TaskControl::Previous => {
                if self.current_step_index == 0 {
                    ControlOutcome::AtStart
                } else {
                    self.current_step_index -= 1;
                    let step = &mut self.plan[self.current_step_index];
                    step.completed = false;
                    ControlOutcome::SteppedBack {
                        instruction: step.instruction.clone(),
                    }
                }
            }
            TaskControl::Repeat => match self.current_step() {
                Some(step) => ControlOutcome::CurrentStep {
                    instruction: step.instruction.clone(),
                },
                None => ControlOutcome::Unknown,
            },
            TaskControl::Status => ControlOutcome::Progress {
                current: self.current_step_index + 1,
                total: self.plan.len(),
            },
            TaskControl::Unknown => ControlOutcome::Unknown,
        }
    }
}

/// Durable task snapshot shared across sessions for the process lifetime.
#[derive(Debug, Clone, Default)]
pub struct GlobalTaskState {
    pub active: bool,
    pub plan: Vec<TaskStep>,
    pub current_step_index: usize,
    pub task_name: String,
    pub last_updated: Option<Instant>,
}

impl GlobalTaskState {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        self.active
            && self
                .last_updated
                .is_some_and(|at| now.saturating_duration_since(at) < TASK_FRESHNESS)
    }
}

/// Externally-injected store for [`GlobalTaskState`].
///
/// Single-writer-at-a-time with coarse, infrequent writes; last write wins.
/// Sessions mirror every task mutation here so a reconnecting session can
/// resume within the freshness window.
#[derive(Debug, Default)]
pub struct TaskBoard {
    inner: Mutex<GlobalTaskState>,
}

impl TaskBoard {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, GlobalTaskState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mirror a session's task state. `task_name` is only replaced when given.
    pub fn sync_at(&self, task: &TaskState, task_name: Option<&str>, now: Instant) {
        let mut state = self.lock();
        state.active = task.active;
        state.plan = task.plan.clone();
        state.current_step_index = task.current_step_index;
        if let Some(name) = task_name {
            state.task_name = name.to_string();
        }
        state.last_updated = Some(now);
    }

    pub fn deactivate(&self) {
        self.lock().active = false;
    }

    /// Hand the stored task to a new session if it is still valid
    /// (active and updated within the freshness window).
    pub fn adopt_at(&self, now: Instant) -> Option<(TaskState, String)> {
        let state = self.lock();
        if !state.is_fresh_at(now) {
            return None;
        }
        Some((
            TaskState {
                active: state.active,
                plan: state.plan.clone(),
                current_step_index: state.current_step_index,
                waiting_for_user: false,
            },
            state.task_name.clone(),
        ))
    }

    pub fn snapshot(&self) -> GlobalTaskState {
        self.lock().clone()
    }
}
