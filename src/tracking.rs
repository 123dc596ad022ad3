use std::collections::HashMap;
use std::time::{Duration, Instant};

use crate::gateway::Detection;

const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 75.0;
const DEFAULT_PERSISTENCE_FRAMES: u32 = 2;
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2);

/// EMA weights for distance smoothing: 70% retained, 30% new observation.
const SMOOTHING_RETAIN: f64 = 0.7;
const SMOOTHING_NEW: f64 = 0.3;

/// A detection correlated across frames, with smoothed spatial data.
#[derive(Debug, Clone)]
pub struct TrackedObject {
    pub name: String,
    pub category: String,
    pub confidence: f64,

    /// Latest single-frame values.
    pub raw_distance: f64,
    pub raw_direction: String,

    /// Smoothed values for stable UI/audio output.
    pub distance: f64,
    pub direction: String,

    pub last_seen: Instant,
    pub frames_detected: u32,
    pub is_stable: bool,
}

impl TrackedObject {
    fn observe(&mut self, distance: f64, direction: &str, confidence: f64, now: Instant) {
        self.last_seen = now;
        self.frames_detected += 1;

        self.raw_distance = distance;
        self.raw_direction = direction.to_string();
        self.confidence = confidence;

        // Low-pass filter on distance; direction is categorical and replaced.
        self.distance = self.distance * SMOOTHING_RETAIN + distance * SMOOTHING_NEW;
        self.direction = direction.to_string();
    }
}

/// Deduplicates and smooths per-object detections frame to frame, exposing
/// only objects confirmed across consecutive ingests.
///
/// Objects are keyed by lowercased name, so distinct real-world objects of
/// the same name collapse into one entry. That is a deliberate semantic
/// grouping, not a defect.
#[derive(Debug)]
pub struct ObjectTracker {
    tracked: HashMap<String, TrackedObject>,
    confidence_threshold: f64,
    persistence_frames: u32,
    timeout: Duration,
}

impl Default for ObjectTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ObjectTracker {
    pub fn new() -> Self {
        Self::with_settings(
            DEFAULT_CONFIDENCE_THRESHOLD,
            DEFAULT_PERSISTENCE_FRAMES,
            DEFAULT_TIMEOUT,
        )
    }

    pub fn with_settings(confidence_threshold: f64, persistence_frames: u32, timeout: Duration) -> Self {
        Self {
            tracked: HashMap::new(),
            confidence_threshold,
            persistence_frames,
            timeout,
        }
    }

    /// Ingest one frame's raw detections and return the current stable set.
    ///
    /// Entries unseen for `timeout` are pruned first, so a vanished object
    /// restarts its stability count when it reappears. Detections with an
    /// empty name or confidence below threshold neither create nor update
    /// entries.
    pub fn ingest_at(&mut self, detections: &[Detection], now: Instant) -> Vec<TrackedObject> {
        let timeout = self.timeout;
        self.tracked
            .retain(|_, obj| now.saturating_duration_since(obj.last_seen) < timeout);

        for det in detections {
            if det.name.is_empty() || det.confidence_score < self.confidence_threshold {
                continue;
            }

            let key = det.name.to_lowercase();
            match self.tracked.get_mut(&key) {
                Some(obj) => {
                    obj.observe(det.distance, &det.direction, det.confidence_score, now);
                    if obj.frames_detected >= self.persistence_frames {
                        obj.is_stable = true;
                    }
                }
                None => {
                    self.tracked.insert(
                        key,
                        TrackedObject {
                            name: det.name.clone(),
                            category: det.category.clone(),
                            confidence: det.confidence_score,
                            raw_distance: det.distance,
                            raw_direction: det.direction.clone(),
                            distance: det.distance,
                            direction: det.direction.clone(),
                            last_seen: now,
                            frames_detected: 1,
                            is_stable: false,
                        },
                    );
                }
            }
        }

        self.tracked
            .values()
            .filter(|obj| obj.is_stable)
            .cloned()
            .collect()
    }

    /// The single most important stable object: currently the closest.
    pub fn primary_target<'a>(stable: &'a [TrackedObject]) -> Option<&'a TrackedObject> {
        stable.iter().min_by(|a, b| a.distance.total_cmp(&b.distance))
    }

    pub fn len(&self) -> usize {
        self.tracked.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracked.is_empty()
    }
}
