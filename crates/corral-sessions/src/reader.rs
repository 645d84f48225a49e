// SPDX-License-Identifier: Apache-2.0
//! Session Reader — parses one session's transcript file into the
//! normalized message view: active-branch extraction, orphaned tool-use
//! detection, and summary derivation.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use corral_core::model::{truncate_title, ContextUsage, Message, MessageKind, ProjectId, SessionSummary};

use crate::error::TranscriptError;
use crate::transcript::{self, AgentFamily, RawEntry};

/// A normalized message view for one session, sliced to the active branch.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: String,
    pub project_id: ProjectId,
    pub messages: Vec<Message>,
    /// `tool_use` ids on the active branch with no matching `tool_result`,
    /// flagged for UI rather than dropped.
    pub orphaned_tool_use_ids: Vec<String>,
}

/// (mtime, size) fingerprint used for cheap on-disk change detection (spec
/// §4.3 `getSessionSummaryIfChanged`, §4.4 Session Index).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileFingerprint {
    pub mtime: SystemTime,
    pub size: u64,
}

pub struct SessionReader;

impl SessionReader {
    /// `listSessions(projectId)` — sorted by `updatedAt` descending; skips
    /// empty/metadata-only transcripts and family subsidiary files.
    pub fn list_sessions(
        project_dir: &Path,
        project_id: &ProjectId,
        family: AgentFamily,
    ) -> Vec<SessionSummary> {
        let mut summaries: Vec<SessionSummary> = session_files(project_dir, family)
            .into_iter()
            .filter_map(|(id, path)| Self::summarize_file(&id, project_id, family, &path).ok().flatten())
            .collect();
        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        summaries
    }

    /// `getSessionSummary(id, projectId)`.
    pub fn get_session_summary(
        id: &str,
        project_dir: &Path,
        project_id: &ProjectId,
        family: AgentFamily,
    ) -> Result<Option<SessionSummary>, TranscriptError> {
        let path = session_file_path(project_dir, family, id);
        Self::summarize_file(id, project_id, family, &path)
    }

    /// `getSessionSummaryIfChanged(id, projectId, cachedMtime, cachedSize)`
    /// — `None` when the fingerprint matches; the Session Index uses this to
    /// avoid re-parsing unchanged files.
    pub fn get_session_summary_if_changed(
        id: &str,
        project_dir: &Path,
        project_id: &ProjectId,
        family: AgentFamily,
        cached: Option<FileFingerprint>,
    ) -> Result<Option<SessionSummary>, TranscriptError> {
        let path = session_file_path(project_dir, family, id);
        let fp = fingerprint(&path)?;
        if Some(fp) == cached {
            return Ok(None);
        }
        Self::summarize_file(id, project_id, family, &path)
    }

    /// `getSession(id, projectId, afterMessageId?)` — builds the parent DAG,
    /// keeps only the active branch, computes orphaned tool-use ids, and
    /// preserves unknown fields verbatim.
    pub fn get_session(
        id: &str,
        project_dir: &Path,
        project_id: &ProjectId,
        family: AgentFamily,
        after_message_id: Option<&str>,
        compute_orphans: bool,
    ) -> Result<Option<Session>, TranscriptError> {
        let path = session_file_path(project_dir, family, id);
        if !path.is_file() {
            return Ok(None);
        }
        let entries = transcript::read_entries(&path)?;
        let messages: Vec<Message> = entries.iter().filter_map(transcript::to_message).collect();
        let active = active_branch(messages);

        let orphaned_tool_use_ids = if compute_orphans {
            orphaned_tool_uses(&active)
        } else {
            Vec::new()
        };

        let sliced = match after_message_id {
            Some(after_id) => slice_after(active, after_id),
            None => active,
        };

        Ok(Some(Session {
            id: id.to_string(),
            project_id: project_id.clone(),
            messages: sliced,
            orphaned_tool_use_ids,
        }))
    }

    /// `getAgentMappings()` — `(toolUseId, agentId)` pairs for families that
    /// store sub-agents as separate sidecar files; other families return
    /// empty.
    pub fn get_agent_mappings(project_dir: &Path, family: AgentFamily) -> Vec<(String, String)> {
        if family != AgentFamily::Claude {
            return Vec::new();
        }
        let mut mappings = Vec::new();
        for (id, path) in session_files(project_dir, family) {
            if let Ok(entries) = transcript::read_entries(&path) {
                for entry in entries {
                    if let (Some(tool_use_id), Some(agent_id)) = (
                        entry.uuid.clone().filter(|_| entry.agent_id.is_some()),
                        entry.agent_id.clone(),
                    ) {
                        let _ = &id;
                        mappings.push((tool_use_id, agent_id));
                    }
                }
            }
        }
        mappings
    }

    /// `getAgentSession(agentId)` — resolves a sub-agent sidecar transcript;
    /// `None` for families with no sidecar convention.
    pub fn get_agent_session(
        project_dir: &Path,
        family: AgentFamily,
        agent_id: &str,
    ) -> Option<PathBuf> {
        if family != AgentFamily::Claude {
            return None;
        }
        let path = project_dir.join(format!("agent-{agent_id}.jsonl"));
        path.is_file().then_some(path)
    }

    fn summarize_file(
        id: &str,
        project_id: &ProjectId,
        family: AgentFamily,
        path: &Path,
    ) -> Result<Option<SessionSummary>, TranscriptError> {
        if !path.is_file() {
            return Ok(None);
        }
        let entries = transcript::read_entries(path)?;
        if entries.is_empty() {
            return Ok(None);
        }
        let messages: Vec<Message> = entries.iter().filter_map(transcript::to_message).collect();
        if messages.is_empty() {
            // metadata-only transcript (e.g. just a `summary` bookkeeping line)
            return Ok(None);
        }

        let auto_title = messages
            .iter()
            .find(|m| m.kind == MessageKind::User)
            .and_then(|m| m.as_text())
            .map(truncate_title)
            .unwrap_or_default();

        let created_at = birth_time(path).unwrap_or_else(Utc::now);
        let updated_at = mtime_as_datetime(path).unwrap_or(created_at);

        let model_id = messages
            .iter()
            .find(|m| m.kind == MessageKind::Assistant)
            .and_then(|m| m.extra.get("model"))
            .and_then(|v| v.as_str())
            .map(String::from)
            .or_else(|| entries.iter().find_map(|e| e.message.as_ref()?.model.clone()));

        let context_usage = entries
            .iter()
            .rev()
            .find_map(|e| {
                let msg = e.message.as_ref()?;
                if msg.role.as_deref() != Some("assistant") {
                    return None;
                }
                let usage = msg.usage.as_ref()?;
                let used = usage.input_tokens.unwrap_or(0)
                    + usage.cache_read_input_tokens.unwrap_or(0)
                    + usage.cache_creation_input_tokens.unwrap_or(0);
                let model = msg.model.clone().or_else(|| model_id.clone())?;
                let window = transcript::window_size_for_model(&model);
                let percent = ((used as f64 / window as f64) * 100.0).round() as u8;
                Some(ContextUsage {
                    input_tokens: used,
                    percent,
                })
            });

        Ok(Some(SessionSummary {
            id: id.to_string(),
            project_id: project_id.clone(),
            created_at,
            updated_at,
            message_count: messages.len(),
            auto_title,
            custom_title: None,
            archived: false,
            starred: false,
            context_usage,
            agent_family: family.as_str().to_string(),
            model_id,
        }))
    }
}

fn session_files(project_dir: &Path, family: AgentFamily) -> Vec<(String, PathBuf)> {
    let Ok(read_dir) = std::fs::read_dir(project_dir) else {
        return Vec::new();
    };
    read_dir
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            let path = e.path();
            if path.extension().and_then(|s| s.to_str()) != Some("jsonl") {
                return None;
            }
            let stem = path.file_stem()?.to_str()?.to_string();
            if family.is_subsidiary_file(&stem) {
                return None;
            }
            Some((stem, path))
        })
        .collect()
}

fn session_file_path(project_dir: &Path, _family: AgentFamily, id: &str) -> PathBuf {
    project_dir.join(format!("{id}.jsonl"))
}

fn fingerprint(path: &Path) -> Result<FileFingerprint, TranscriptError> {
    let meta = std::fs::metadata(path).map_err(|source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(FileFingerprint {
        mtime: meta.modified().unwrap_or(SystemTime::UNIX_EPOCH),
        size: meta.len(),
    })
}

fn birth_time(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    let t = meta.created().or_else(|_| meta.modified()).ok()?;
    Some(DateTime::<Utc>::from(t))
}

fn mtime_as_datetime(path: &Path) -> Option<DateTime<Utc>> {
    let meta = std::fs::metadata(path).ok()?;
    let t = meta.modified().ok()?;
    Some(DateTime::<Utc>::from(t))
}

/// The active branch: the longest descendant chain from the root,
/// following the last-writer-wins child at each fork. Represented as
/// `Vec<Message>` + index-by-id rather than owned pointers over the
/// message DAG.
fn active_branch(messages: Vec<Message>) -> Vec<Message> {
    if messages.is_empty() {
        return messages;
    }
    let known_ids: HashSet<&str> = messages.iter().map(|m| m.id.as_str()).collect();

    // Last-writer-wins: for each parent, remember only the most recently
    // appended child (file order == write order). `None` is the synthetic
    // "no parent" key shared by every root candidate.
    let mut last_child: HashMap<Option<String>, usize> = HashMap::new();
    for (i, m) in messages.iter().enumerate() {
        let parent = m
            .parent_id
            .clone()
            .filter(|p| known_ids.contains(p.as_str()));
        last_child.insert(parent, i);
    }

    let root_idx = messages
        .iter()
        .position(|m| {
            m.parent_id
                .as_deref()
                .map(|p| !known_ids.contains(p))
                .unwrap_or(true)
        })
        .unwrap_or(0);

    let mut chain = vec![root_idx];
    let mut current_id = messages[root_idx].id.clone();
    // Walk forward following the last-writer-wins child at each fork; stop
    // when no child was ever recorded for the current tail.
    while let Some(&next) = last_child.get(&Some(current_id.clone())) {
        if chain.last() == Some(&next) {
            break;
        }
        chain.push(next);
        current_id = messages[next].id.clone();
    }

    let keep: HashSet<usize> = chain.into_iter().collect();
    messages
        .into_iter()
        .enumerate()
        .filter(|(i, _)| keep.contains(i))
        .map(|(_, m)| m)
        .collect()
}

fn orphaned_tool_uses(active: &[Message]) -> Vec<String> {
    let mut used: Vec<String> = Vec::new();
    let mut resolved: HashSet<String> = HashSet::new();
    for m in active {
        for id in m.tool_use_ids() {
            used.push(id.to_string());
        }
        for id in m.tool_result_refs() {
            resolved.insert(id.to_string());
        }
    }
    used.into_iter().filter(|id| !resolved.contains(id)).collect()
}

fn slice_after(messages: Vec<Message>, after_id: &str) -> Vec<Message> {
    match messages.iter().position(|m| m.id == after_id) {
        Some(idx) => messages.into_iter().skip(idx + 1).collect(),
        None => messages,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_transcript(dir: &Path, id: &str, lines: &[&str]) -> PathBuf {
        let path = dir.join(format!("{id}.jsonl"));
        let mut f = std::fs::File::create(&path).unwrap();
        for line in lines {
            writeln!(f, "{line}").unwrap();
        }
        path
    }

    #[test]
    fn list_sessions_skips_empty_and_subsidiary_files() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(
            dir.path(),
            "s1",
            &[r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hello"}}"#],
        );
        write_transcript(dir.path(), "s2-empty", &[]);
        write_transcript(
            dir.path(),
            "agent-sub1",
            &[r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hi"}}"#],
        );

        let project_id = ProjectId("p1".into());
        let summaries = SessionReader::list_sessions(dir.path(), &project_id, AgentFamily::Claude);
        assert_eq!(summaries.len(), 1);
        assert_eq!(summaries[0].id, "s1");
    }

    #[test]
    fn title_is_derived_from_first_user_message_and_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let long = "x".repeat(200);
        write_transcript(
            dir.path(),
            "s1",
            &[&format!(
                r#"{{"type":"user","uuid":"m1","message":{{"role":"user","content":"{long}"}}}}"#
            )],
        );
        let project_id = ProjectId("p1".into());
        let summary = SessionReader::get_session_summary("s1", dir.path(), &project_id, AgentFamily::Claude)
            .unwrap()
            .unwrap();
        assert!(summary.auto_title.ends_with("..."));
        assert!(summary.auto_title.chars().count() <= 120);
    }

    #[test]
    fn active_branch_follows_last_writer_wins_fork() {
        let messages = vec![
            Message {
                id: "root".into(),
                kind: MessageKind::User,
                content: None,
                parent_id: None,
                timestamp: None,
                extra: Default::default(),
            },
            Message {
                id: "a".into(),
                kind: MessageKind::Assistant,
                content: None,
                parent_id: Some("root".into()),
                timestamp: None,
                extra: Default::default(),
            },
            Message {
                id: "b-rewind".into(),
                kind: MessageKind::Assistant,
                content: None,
                parent_id: Some("root".into()),
                timestamp: None,
                extra: Default::default(),
            },
        ];
        let active = active_branch(messages);
        let ids: Vec<&str> = active.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["root", "b-rewind"]);
    }

    #[test]
    fn orphaned_tool_use_is_flagged_not_dropped() {
        let messages = vec![Message {
            id: "m1".into(),
            kind: MessageKind::Assistant,
            content: Some(corral_core::model::MessageContent::Blocks(vec![
                corral_core::model::ContentBlock::ToolUse {
                    id: "tool1".into(),
                    name: "Bash".into(),
                    input: serde_json::json!({}),
                },
            ])),
            parent_id: None,
            timestamp: None,
            extra: Default::default(),
        }];
        let orphans = orphaned_tool_uses(&messages);
        assert_eq!(orphans, vec!["tool1".to_string()]);
    }

    #[test]
    fn summary_if_changed_returns_none_when_fingerprint_matches() {
        let dir = tempfile::tempdir().unwrap();
        write_transcript(
            dir.path(),
            "s1",
            &[r#"{"type":"user","uuid":"m1","message":{"role":"user","content":"hi"}}"#],
        );
        let project_id = ProjectId("p1".into());
        let path = dir.path().join("s1.jsonl");
        let fp = fingerprint(&path).unwrap();
        let result = SessionReader::get_session_summary_if_changed(
            "s1",
            dir.path(),
            &project_id,
            AgentFamily::Claude,
            Some(fp),
        )
        .unwrap();
        assert!(result.is_none());
    }
}
