// SPDX-License-Identifier: Apache-2.0
//! Session metadata store: custom titles and archive/star flags, the one
//! piece of session state that does not live inside a transcript file and
//! so needs its own persistence. Keyed by session id, written atomically
//! with a write-temp-then-rename pattern so a crash mid-write can never
//! leave a truncated file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use corral_core::model::SessionSummary;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Entry {
    #[serde(default)]
    custom_title: Option<String>,
    #[serde(default)]
    archived: bool,
    #[serde(default)]
    starred: bool,
}

impl Entry {
    fn is_default(&self) -> bool {
        self.custom_title.is_none() && !self.archived && !self.starred
    }
}

pub struct SessionMetadataStore {
    entries: Mutex<HashMap<String, Entry>>,
    path: Option<PathBuf>,
}

impl SessionMetadataStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            path: None,
        }
    }

    pub fn persisted_at(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub fn load_from_disk(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let loaded: HashMap<String, Entry> = serde_json::from_slice(&bytes).unwrap_or_default();
        *self.entries.lock().unwrap() = loaded;
        Ok(())
    }

    /// Overlay stored custom title/archive/star state onto a freshly scanned
    /// summary. Called after `SessionIndex::list_sessions`, since the index
    /// itself has no notion of this out-of-band state.
    pub fn apply(&self, summary: &mut SessionSummary) {
        let entries = self.entries.lock().unwrap();
        if let Some(entry) = entries.get(&summary.id) {
            summary.custom_title = entry.custom_title.clone();
            summary.archived = entry.archived;
            summary.starred = entry.starred;
        }
    }

    pub fn set_custom_title(&self, session_id: &str, title: Option<String>) -> std::io::Result<()> {
        self.mutate(session_id, |e| e.custom_title = title)
    }

    pub fn set_archived(&self, session_id: &str, archived: bool) -> std::io::Result<()> {
        self.mutate(session_id, |e| e.archived = archived)
    }

    pub fn set_starred(&self, session_id: &str, starred: bool) -> std::io::Result<()> {
        self.mutate(session_id, |e| e.starred = starred)
    }

    fn mutate(&self, session_id: &str, f: impl FnOnce(&mut Entry)) -> std::io::Result<()> {
        {
            let mut entries = self.entries.lock().unwrap();
            let entry = entries.entry(session_id.to_string()).or_default();
            f(entry);
            if entry.is_default() {
                entries.remove(session_id);
            }
        }
        self.flush()
    }

    fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let entries = self.entries.lock().unwrap();
        let bytes = serde_json::to_vec_pretty(&*entries).unwrap();
        drop(entries);
        write_atomic(path, &bytes)
    }
}

impl Default for SessionMetadataStore {
    fn default() -> Self {
        Self::new()
    }
}

fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    std::fs::write(&tmp_path, data)?;
    std::fs::rename(&tmp_path, path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn applied_metadata_overrides_freshly_scanned_summary() {
        let store = SessionMetadataStore::new();
        store.set_custom_title("s1", Some("Renamed".to_string())).unwrap();
        store.set_starred("s1", true).unwrap();

        let mut summary = blank_summary("s1");
        store.apply(&mut summary);
        assert_eq!(summary.custom_title.as_deref(), Some("Renamed"));
        assert!(summary.starred);
        assert!(!summary.archived);
    }

    #[test]
    fn clearing_every_field_removes_the_entry() {
        let store = SessionMetadataStore::new();
        store.set_archived("s1", true).unwrap();
        store.set_archived("s1", false).unwrap();
        assert!(store.entries.lock().unwrap().get("s1").is_none());
    }

    #[test]
    fn persists_across_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session-metadata.json");

        let store = SessionMetadataStore::new().persisted_at(path.clone());
        store.set_custom_title("s1", Some("Title".to_string())).unwrap();

        let reloaded = SessionMetadataStore::new().persisted_at(path);
        reloaded.load_from_disk().unwrap();
        let mut summary = blank_summary("s1");
        reloaded.apply(&mut summary);
        assert_eq!(summary.custom_title.as_deref(), Some("Title"));
    }

    fn blank_summary(id: &str) -> SessionSummary {
        SessionSummary {
            id: id.to_string(),
            project_id: corral_core::model::ProjectId("p1".into()),
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            message_count: 0,
            auto_title: "untitled".to_string(),
            custom_title: None,
            archived: false,
            starred: false,
            context_usage: None,
            agent_family: "claude".to_string(),
            model_id: None,
        }
    }
}
