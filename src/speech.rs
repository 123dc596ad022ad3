use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Announcement priority. Ordering: critical=4, high=3, medium=2, low=1, info=0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Critical,
    High,
    Medium,
    #[default]
    Low,
    #[serde(other)]
    Info,
}

impl Priority {
    pub fn rank(self) -> u8 {
        match self {
            Priority::Critical => 4,
            Priority::High => 3,
            Priority::Medium => 2,
            Priority::Low => 1,
            Priority::Info => 0,
        }
    }

    /// Minimum interval between repetitions of the same announcement context.
    pub fn repeat_cooldown(self) -> Duration {
        match self {
            Priority::Critical => Duration::from_secs(1),
            Priority::High => Duration::from_secs(2),
            Priority::Medium | Priority::Info => Duration::from_secs(4),
            Priority::Low => Duration::from_secs(8),
        }
    }
}

/// Non-critical speech of any kind is spaced at least this far apart.
const GLOBAL_COOLDOWN: Duration = Duration::from_secs(3);
/// A subject is not re-announced in a fresh context within this window.
const SUBJECT_COOLDOWN: Duration = Duration::from_secs(10);
/// Subject announcement stamps older than this are pruned on record.
const SUBJECT_RETENTION: Duration = Duration::from_secs(60);
/// Bounded log of recently spoken lines.
const RECENT_SPEECH_CAP: usize = 5;

/// Descriptive adjectives stripped when normalizing a subject, so that
/// "large grey door" and "door" share one announcement identity.
const DESCRIPTIVE_ADJECTIVES: &[&str] = &[
    "grey", "gray", "white", "black", "brown", "red", "blue", "green", "open", "closed", "small",
    "large", "big", "little", "tiny", "huge", "old", "new", "patterned", "textured", "wooden",
    "metal",
];

/// Normalized `subject|direction|category` identity for "the same announcement".
pub fn semantic_key(subject: &str, direction: &str, category: &str) -> String {
    let normalized = subject.to_lowercase();
    let normalized = normalized.trim();

    let filtered: Vec<&str> = normalized
        .split_whitespace()
        .filter(|w| !DESCRIPTIVE_ADJECTIVES.contains(w))
        .collect();

    // If stripping emptied the subject, fall back to the un-stripped form.
    let core = if filtered.is_empty() {
        normalized.to_string()
    } else {
        filtered.join(" ")
    };

    format!("{}|{}|{}", core, direction, category)
}

/// Spoken distance phrasing: "50 centimeters", "2.1 meters", "12 meters".
pub fn format_distance(meters: f64) -> String {
    if meters < 1.0 {
        format!("{} centimeters", (meters * 100.0) as i64)
    } else if meters < 10.0 {
        format!("{:.1} meters", meters)
    } else {
        format!("{} meters", meters as i64)
    }
}

/// Estimated playback duration: ~150 wpm (2.5 words/sec) plus a fixed buffer.
pub fn estimate_speech_duration(text: &str) -> Duration {
    let words = text.split_whitespace().count();
    Duration::from_secs_f64(words as f64 / 2.5 + 0.5)
}

/// One candidate announcement presented to the gate.
#[derive(Debug, Clone)]
pub struct SpeechRequest<'a> {
    pub priority: Priority,
    pub subject: &'a str,
    pub direction: &'a str,
    pub category: &'a str,
    pub distance: f64,
    pub text: &'a str,
}

/// Why the gate decided the way it did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateReason {
    CriticalAlert,
    PriorityEscalation,
    SpeechInProgress,
    DistanceClosed,
    IntervalPassed,
    SameContextCooldown { remaining_secs: u64 },
    GlobalCooldown,
    SubjectRecentlyAnnounced,
    NewContext,
}

impl fmt::Display for GateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateReason::CriticalAlert => write!(f, "critical_alert"),
            GateReason::PriorityEscalation => write!(f, "priority_escalation"),
            GateReason::SpeechInProgress => write!(f, "speech_in_progress"),
            GateReason::DistanceClosed => write!(f, "distance_closed"),
            GateReason::IntervalPassed => write!(f, "interval_passed"),
            GateReason::SameContextCooldown { remaining_secs } => {
                write!(f, "same_context_cooldown ({}s left)", remaining_secs)
            }
            GateReason::GlobalCooldown => write!(f, "global_cooldown"),
            GateReason::SubjectRecentlyAnnounced => write!(f, "subject_recently_announced"),
            GateReason::NewContext => write!(f, "new_context"),
        }
    }
}

/// Decides whether a candidate announcement is vocalized, suppressing
/// repetition while letting critical alerts through unconditionally.
///
/// Time is passed in explicitly so decisions are reproducible; production
/// callers pass `Instant::now()`.
#[derive(Debug)]
pub struct SpeechGate {
    speech_end: Option<Instant>,
    last_semantic_key: String,
    last_speech_at: Option<Instant>,
    last_distance: f64,
    last_priority: Priority,
    announced_subjects: HashMap<String, Instant>,
    recent_speeches: VecDeque<String>,
}

impl Default for SpeechGate {
    fn default() -> Self {
        Self::new()
    }
}

impl SpeechGate {
    pub fn new() -> Self {
        Self {
            speech_end: None,
            last_semantic_key: String::new(),
            last_speech_at: None,
            last_distance: 999.0,
            last_priority: Priority::Low,
            announced_subjects: HashMap::new(),
            recent_speeches: VecDeque::new(),
        }
    }

    pub fn is_speaking_at(&self, now: Instant) -> bool {
        self.speech_end.is_some_and(|end| now < end)
    }

    /// Decision order:
    /// 1. critical always speaks, interrupting in-progress speech
    /// 2. while speaking, only a priority escalation that also closed >0.3m
    /// 3. same semantic key: closed >0.5m, or the priority cooldown elapsed
    /// 4. new context: 3s global cooldown, 10s per-subject cooldown
    pub fn should_speak_at(&self, req: &SpeechRequest<'_>, now: Instant) -> (bool, GateReason) {
        if req.priority == Priority::Critical {
            return (true, GateReason::CriticalAlert);
        }

        if self.is_speaking_at(now) {
            let escalated = req.priority.rank() > self.last_priority.rank();
            if escalated && req.distance < self.last_distance - 0.3 {
                return (true, GateReason::PriorityEscalation);
            }
            return (false, GateReason::SpeechInProgress);
        }

        let key = semantic_key(req.subject, req.direction, req.category);
        if !self.last_semantic_key.is_empty() && key == self.last_semantic_key {
            return self.check_same_context(req, now);
        }

        self.check_new_context(req.subject, now)
    }

    fn check_same_context(&self, req: &SpeechRequest<'_>, now: Instant) -> (bool, GateReason) {
        if self.last_distance - req.distance > 0.5 {
            return (true, GateReason::DistanceClosed);
        }

        let cooldown = req.priority.repeat_cooldown();
        if let Some(last) = self.last_speech_at {
            let elapsed = now.saturating_duration_since(last);
            if elapsed < cooldown {
                let remaining_secs = (cooldown - elapsed).as_secs();
                return (false, GateReason::SameContextCooldown { remaining_secs });
            }
        }

        (true, GateReason::IntervalPassed)
    }

    fn check_new_context(&self, subject: &str, now: Instant) -> (bool, GateReason) {
        if let Some(last) = self.last_speech_at {
            if now.saturating_duration_since(last) < GLOBAL_COOLDOWN {
                return (false, GateReason::GlobalCooldown);
            }
        }

        if let Some(stamp) = self.announced_subjects.get(&subject.to_lowercase()) {
            if now.saturating_duration_since(*stamp) < SUBJECT_COOLDOWN {
                return (false, GateReason::SubjectRecentlyAnnounced);
            }
        }

        (true, GateReason::NewContext)
    }

    /// Mutates gate state after a positive decision was acted on.
    pub fn record_speech_at(&mut self, req: &SpeechRequest<'_>, now: Instant) {
        self.speech_end = Some(now + estimate_speech_duration(req.text));
        self.last_semantic_key = semantic_key(req.subject, req.direction, req.category);
        self.last_speech_at = Some(now);
        self.last_distance = req.distance;
        self.last_priority = req.priority;
        self.announced_subjects.insert(req.subject.to_lowercase(), now);

        self.recent_speeches.push_back(req.text.to_string());
        if self.recent_speeches.len() > RECENT_SPEECH_CAP {
            self.recent_speeches.pop_front();
        }

        self.announced_subjects
            .retain(|_, stamp| now.saturating_duration_since(*stamp) < SUBJECT_RETENTION);
    }

    pub fn recent_speeches(&self) -> impl Iterator<Item = &str> {
        self.recent_speeches.iter().map(String::as_str)
    }
}
