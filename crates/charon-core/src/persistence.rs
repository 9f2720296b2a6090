//! Local persistence of the conversation transcript
//!
//! Storage is a plain key-value round trip. `JsonFileStore` keeps one file per
//! key under the data directory; `MemoryStore` keeps everything in a shared
//! map and is what tests and ephemeral sessions use.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use tracing::debug;

use crate::state::Message;

/// Key the transcript is stored under.
pub const TRANSCRIPT_KEY: &str = "charon-chat-history";

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&self, key: &str, value: &str) -> Result<()>;
    fn remove(&self, key: &str) -> Result<()>;
}

/// One `<key>.json` file per key inside `dir`
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        Ok(Some(raw))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("failed creating {}", self.dir.display()))?;
        let path = self.path_for(key);
        // Write then rename so a crash never leaves half a transcript behind.
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, value).with_context(|| format!("failed writing {}", tmp.display()))?;
        fs::rename(&tmp, &path).with_context(|| format!("failed replacing {}", path.display()))?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed removing {}", path.display()))?;
        }
        Ok(())
    }
}

/// Shared in-memory map. Clones see the same entries.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().map_err(|_| anyhow!("memory store poisoned"))?;
        entries.remove(key);
        Ok(())
    }
}

/// Serializes the transcript into a single keyed record
pub struct TranscriptStore {
    backend: Box<dyn KeyValueStore>,
}

impl TranscriptStore {
    pub fn new(backend: impl KeyValueStore + 'static) -> Self {
        Self {
            backend: Box::new(backend),
        }
    }

    /// Returns the stored transcript, or `None` when there is nothing usable.
    ///
    /// Absent records, unreadable files, invalid JSON, empty sequences and
    /// sequences with duplicate ids all count as "no prior session".
    pub fn load(&self) -> Option<Vec<Message>> {
        let raw = match self.backend.get(TRANSCRIPT_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                debug!(error = %e, "persisted transcript unreadable");
                return None;
            }
        };

        let messages: Vec<Message> = match serde_json::from_str(&raw) {
            Ok(messages) => messages,
            Err(e) => {
                debug!(error = %e, "persisted transcript malformed");
                return None;
            }
        };

        if messages.is_empty() {
            return None;
        }

        let mut seen = HashSet::new();
        if !messages.iter().all(|m| seen.insert(m.id.as_str())) {
            debug!("persisted transcript has duplicate message ids");
            return None;
        }

        Some(messages)
    }

    pub fn save(&self, messages: &[Message]) -> Result<()> {
        let raw = serde_json::to_string(messages)?;
        self.backend.set(TRANSCRIPT_KEY, &raw)
    }

    pub fn clear(&self) -> Result<()> {
        self.backend.remove(TRANSCRIPT_KEY)
    }
}
