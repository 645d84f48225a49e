// SPDX-License-Identifier: Apache-2.0
//! Session Index — process-wide cache keyed by session id. Re-validates by
//! (mtime, size) rather than content hashing; eviction is strictly
//! file-driven and nothing is persisted across restarts.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

use corral_core::model::{ProjectId, SessionSummary};

use crate::reader::{FileFingerprint, SessionReader};
use crate::transcript::AgentFamily;

struct CacheEntry {
    fingerprint: FileFingerprint,
    summary: SessionSummary,
}

/// Keyed by session id — session ids are unique within a fleet.
pub struct SessionIndex {
    cache: Mutex<HashMap<String, CacheEntry>>,
}

impl Default for SessionIndex {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionIndex {
    pub fn new() -> Self {
        Self {
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Re-derives the summary list for a project, reusing cached entries
    /// whose (mtime, size) fingerprint hasn't drifted. Entries for files
    /// that disappeared are evicted.
    pub fn list_sessions(
        &self,
        project_dir: &Path,
        project_id: &ProjectId,
        family: AgentFamily,
    ) -> Vec<SessionSummary> {
        let candidate_ids: Vec<String> = std::fs::read_dir(project_dir)
            .map(|rd| {
                rd.filter_map(|e| e.ok())
                    .filter_map(|e| {
                        let path = e.path();
                        if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                            return None;
                        }
                        let stem = path.file_stem()?.to_str()?.to_string();
                        (!family.is_subsidiary_file(&stem)).then_some(stem)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let mut cache = self.cache.lock().unwrap();
        cache.retain(|id, _| candidate_ids.contains(id));

        let mut summaries = Vec::with_capacity(candidate_ids.len());
        for id in candidate_ids {
            let cached_fp = cache.get(&id).map(|e| e.fingerprint);
            match SessionReader::get_session_summary_if_changed(&id, project_dir, project_id, family, cached_fp) {
                Ok(Some(summary)) => {
                    if let Ok(fp) = file_fingerprint(project_dir, &id) {
                        cache.insert(
                            id,
                            CacheEntry {
                                fingerprint: fp,
                                summary: summary.clone(),
                            },
                        );
                    }
                    summaries.push(summary);
                }
                Ok(None) => {
                    if let Some(entry) = cache.get(&id) {
                        summaries.push(entry.summary.clone());
                    }
                }
                Err(_) => {
                    cache.remove(&id);
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// Number of currently cached entries — exposed for tests asserting the
    /// "no re-parse on unchanged files" invariant.
    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap().len()
    }
}

fn file_fingerprint(project_dir: &Path, id: &str) -> std::io::Result<FileFingerprint> {
    let meta = std::fs::metadata(project_dir.join(format!("{id}.jsonl")))?;
    Ok(FileFingerprint {
        mtime: meta.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH),
        size: meta.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_line(dir: &Path, id: &str, line: &str) {
        let mut f = std::fs::File::create(dir.join(format!("{id}.jsonl"))).unwrap();
        writeln!(f, "{line}").unwrap();
    }

    #[test]
    fn unchanged_file_is_served_from_cache_without_reparse() {
        let dir = tempfile::tempdir().unwrap();
        write_line(
            dir.path(),
            "s1",
            r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hi"}}"#,
        );
        let index = SessionIndex::new();
        let project_id = ProjectId("p1".into());

        let first = index.list_sessions(dir.path(), &project_id, AgentFamily::Claude);
        assert_eq!(first.len(), 1);
        assert_eq!(index.cached_len(), 1);

        // Second call with no on-disk changes must still return the summary,
        // served from the cache.
        let second = index.list_sessions(dir.path(), &project_id, AgentFamily::Claude);
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id, first[0].id);
    }

    #[test]
    fn vanished_file_is_evicted_on_next_scan() {
        let dir = tempfile::tempdir().unwrap();
        write_line(
            dir.path(),
            "s1",
            r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hi"}}"#,
        );
        let index = SessionIndex::new();
        let project_id = ProjectId("p1".into());
        index.list_sessions(dir.path(), &project_id, AgentFamily::Claude);
        assert_eq!(index.cached_len(), 1);

        std::fs::remove_file(dir.path().join("s1.jsonl")).unwrap();
        let after = index.list_sessions(dir.path(), &project_id, AgentFamily::Claude);
        assert!(after.is_empty());
        assert_eq!(index.cached_len(), 0);
    }
}
