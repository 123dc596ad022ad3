use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info};

/// Same-object sightings inside this window are collapsed into one entry.
const DEDUPE_WINDOW_SECS: i64 = 10;
/// History is capped; oldest entries drop first.
const HISTORY_CAP: usize = 1000;
/// How many history entries feed the prompt context.
const CONTEXT_ENTRIES: usize = 50;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationEntry {
    pub description: String,
    pub tagged_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub object: String,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub scene: String,
    pub seen_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct MemoryData {
    #[serde(default)]
    locations: BTreeMap<String, LocationEntry>,
    #[serde(default)]
    history: Vec<HistoryEntry>,
}

/// Long-term store of tagged locations and object sighting history,
/// persisted to a JSON file so memory survives restarts.
///
/// Writes are coarse and user-action-driven; the internal mutex gives the
/// single-writer-at-a-time contract.
#[derive(Debug)]
pub struct MemoryStore {
    path: PathBuf,
    data: Mutex<MemoryData>,
}

impl MemoryStore {
    /// Open the store at `path`. A missing or corrupt file starts empty;
    /// corruption is logged, never fatal.
    pub fn open(path: &Path) -> Self {
        let data = match std::fs::read_to_string(path) {
            Ok(raw) => match serde_json::from_str(&raw) {
                Ok(data) => data,
                Err(e) => {
                    error!(path = %path.display(), error = %e, "memory file is corrupt, starting empty");
                    MemoryData::default()
                }
            },
            Err(_) => MemoryData::default(),
        };
        Self {
            path: path.to_path_buf(),
            data: Mutex::new(data),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryData> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn save(&self, data: &MemoryData) {
        let result: Result<(), MemoryError> = (|| {
            let json = serde_json::to_string_pretty(data)?;
            std::fs::write(&self.path, json)?;
            Ok(())
        })();
        if let Err(e) = result {
            error!(path = %self.path.display(), error = %e, "failed to persist memory");
        }
    }

    /// Tag the current spot with a name and a visual description.
    pub fn add_location(&self, name: &str, description: &str) {
        let mut data = self.lock();
        data.locations.insert(
            name.to_string(),
            LocationEntry {
                description: description.to_string(),
                tagged_at: Utc::now(),
            },
        );
        self.save(&data);
        info!(location = name, "location tagged");
    }

    pub fn get_locations(&self) -> BTreeMap<String, LocationEntry> {
        self.lock().locations.clone()
    }

    /// Prompt-ready one-line summary of all tagged locations.
    pub fn location_summary(&self) -> String {
        let data = self.lock();
        if data.locations.is_empty() {
            return "No tagged locations yet.".to_string();
        }
        data.locations
            .iter()
            .map(|(name, entry)| format!("'{}': {}", name, entry.description))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Log an object sighting. Repeats of the same object within 10s are
    /// dropped, as are placeholder names.
    pub fn log_object(&self, object: &str, location_tag: Option<&str>, scene: &str) {
        if object.is_empty() || matches!(object.to_lowercase().as_str(), "none" | "unknown" | "null") {
            return;
        }

        let now = Utc::now();
        let mut data = self.lock();

        if let Some(last) = data.history.last() {
            if last.object == object && (now - last.seen_at).num_seconds() < DEDUPE_WINDOW_SECS {
                return;
            }
        }

        data.history.push(HistoryEntry {
            object: object.to_string(),
            location: location_tag.map(str::to_string),
            scene: scene.to_string(),
            seen_at: now,
        });

        if data.history.len() > HISTORY_CAP {
            let excess = data.history.len() - HISTORY_CAP;
            data.history.drain(..excess);
        }

        self.save(&data);
    }

    /// Recent sighting history formatted chronologically for the model
    /// context window.
    pub fn history_context(&self) -> String {
        let data = self.lock();
        if data.history.is_empty() {
            return "No object history recorded.".to_string();
        }

        let start = data.history.len().saturating_sub(CONTEXT_ENTRIES);
        data.history[start..]
            .iter()
            .map(|h| {
                let stamp = h.seen_at.with_timezone(&Local).format("%H:%M");
                let loc = h
                    .location
                    .as_deref()
                    .map(|l| format!(" at '{}'", l))
                    .unwrap_or_default();
                format!("[{}] Saw {}{} ({})", stamp, h.object, loc, h.scene)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn history_len(&self) -> usize {
        self.lock().history.len()
    }
}
