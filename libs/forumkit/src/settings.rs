//! Process-wide board settings store.
//!
//! Shared by every request, keyed by board id. Entries are immutable
//! `Arc<BoardSettings>` snapshots; writers replace whole entries.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to load settings for board {board_id}")]
    Load {
        board_id: i64,
        #[source]
        source: anyhow::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardSettings {
    pub board_id: i64,
    pub name: String,
    pub theme: String,
    pub language: String,
    pub allow_bbcode: bool,
    /// Free-form settings not modelled as fields.
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Default for BoardSettings {
    fn default() -> Self {
        Self {
            board_id: 1,
            name: "Forum".to_string(),
            theme: "default".to_string(),
            language: "en".to_string(),
            allow_bbcode: true,
            extra: BTreeMap::new(),
        }
    }
}

/// Backing source consulted on a cache miss.
pub trait BoardSettingsLoader: Send + Sync {
    fn load(&self, board_id: i64) -> anyhow::Result<BoardSettings>;
}

/// Loader that returns defaults stamped with the requested board id.
#[derive(Debug, Default)]
pub struct DefaultSettingsLoader;

impl BoardSettingsLoader for DefaultSettingsLoader {
    fn load(&self, board_id: i64) -> anyhow::Result<BoardSettings> {
        Ok(BoardSettings {
            board_id,
            ..BoardSettings::default()
        })
    }
}

pub struct BoardSettingsStore {
    entries: DashMap<i64, Arc<BoardSettings>>,
    loader: Arc<dyn BoardSettingsLoader>,
}

impl std::fmt::Debug for BoardSettingsStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardSettingsStore")
            .field("cached_boards", &self.entries.len())
            .finish()
    }
}

impl Default for BoardSettingsStore {
    fn default() -> Self {
        Self::new(Arc::new(DefaultSettingsLoader))
    }
}

impl BoardSettingsStore {
    pub fn new(loader: Arc<dyn BoardSettingsLoader>) -> Self {
        Self {
            entries: DashMap::new(),
            loader,
        }
    }

    /// Cached settings for `board_id`, loading them on a miss.
    ///
    /// Two concurrent misses may both load; the first insert wins and both
    /// callers get that entry.
    pub fn get(&self, board_id: i64) -> Result<Arc<BoardSettings>, SettingsError> {
        if let Some(hit) = self.entries.get(&board_id) {
            return Ok(hit.value().clone());
        }
        let loaded = self
            .loader
            .load(board_id)
            .map_err(|source| SettingsError::Load { board_id, source })?;
        tracing::debug!(board_id, "board settings loaded");
        Ok(self
            .entries
            .entry(board_id)
            .or_insert_with(|| Arc::new(loaded))
            .value()
            .clone())
    }

    /// Store `settings` for `board_id`, or drop the cached entry when `None`.
    pub fn set(&self, board_id: i64, settings: Option<BoardSettings>) {
        match settings {
            Some(s) => {
                self.entries.insert(board_id, Arc::new(s));
            }
            None => self.invalidate(board_id),
        }
    }

    pub fn invalidate(&self, board_id: i64) {
        if self.entries.remove(&board_id).is_some() {
            tracing::debug!(board_id, "board settings invalidated");
        }
    }

    pub fn invalidate_all(&self) {
        self.entries.clear();
    }

    pub fn is_cached(&self, board_id: i64) -> bool {
        self.entries.contains_key(&board_id)
    }
}
