// SPDX-License-Identifier: Apache-2.0
//! Per-family transcript shapes — directory layout varies by agent family.
//! The core only needs enough structure to recover `cwd`, per-message
//! `timestamp`/`uuid`/parent pointer and content blocks; everything else is
//! passed through verbatim in [`corral_core::model::Message::extra`].

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{Map, Value};

use corral_core::model::{ContentBlock, Message, MessageContent, MessageKind};

use crate::error::TranscriptError;

/// A class of agent sharing a transcript format and adapter (spec GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AgentFamily {
    Claude,
    Codex,
    Acp,
}

impl AgentFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentFamily::Claude => "claude",
            AgentFamily::Codex => "codex",
            AgentFamily::Acp => "acp",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "claude" => Some(AgentFamily::Claude),
            "codex" => Some(AgentFamily::Codex),
            "acp" => Some(AgentFamily::Acp),
            _ => None,
        }
    }

    pub fn all() -> [AgentFamily; 3] {
        [AgentFamily::Claude, AgentFamily::Codex, AgentFamily::Acp]
    }

    /// Platform-default transcript root, overridable per spec's
    /// `FamilyConfig::transcript_root`.
    pub fn default_transcript_root(&self) -> PathBuf {
        let home = dirs::home_dir().unwrap_or_else(|| PathBuf::from("."));
        match self {
            AgentFamily::Claude => home.join(".claude").join("projects"),
            AgentFamily::Codex => home.join(".codex").join("sessions"),
            AgentFamily::Acp => home.join(".config").join("acp").join("sessions"),
        }
    }

    /// Only the Claude family encodes a project's absolute path lossily into
    /// its directory name (path separators substituted, not reversible when
    /// the original path itself contains the substitute character) — spec
    /// §4.3/§4.5's "one family whose project directory name is a lossy
    /// hash". The others name the directory with a reversible encoding
    /// (`corral_core::model::ProjectId::from_path`'s base64url scheme).
    pub fn hashes_directory_names(&self) -> bool {
        matches!(self, AgentFamily::Claude)
    }

    /// Encode an absolute path the way this family names its on-disk project
    /// directory.
    pub fn encode_dir_name(&self, path: &Path) -> String {
        if self.hashes_directory_names() {
            lossy_hash_dir_name(path)
        } else {
            corral_core::model::ProjectId::from_path(path).0
        }
    }

    /// Sub-agent sidecar files (named `agent-*`) must not be listed as
    /// top-level sessions.
    pub fn is_subsidiary_file(&self, file_stem: &str) -> bool {
        file_stem.starts_with("agent-")
    }
}

/// Path-separator substitution used by the Claude family: `/` → `-`. Lossy
/// because a path containing a literal `-` is indistinguishable from one
/// whose `/` was substituted — recoverable only by reading a transcript's
/// `cwd` field.
fn lossy_hash_dir_name(path: &Path) -> String {
    path.to_string_lossy().replace('/', "-")
}

// ── Raw on-disk JSONL record ──────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub struct RawUsage {
    #[serde(default)]
    pub input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub cache_creation_input_tokens: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawMessage {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub content: Option<Value>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub usage: Option<RawUsage>,
}

/// One line of a transcript file. Unknown top-level fields are preserved
/// via `extra` as a dynamic pass-through.
#[derive(Debug, Clone, Deserialize)]
pub struct RawEntry {
    #[serde(rename = "type", default)]
    pub entry_type: Option<String>,
    #[serde(default)]
    pub uuid: Option<String>,
    #[serde(default, rename = "parentUuid")]
    pub parent_uuid: Option<String>,
    #[serde(default, rename = "sessionId")]
    pub session_id: Option<String>,
    #[serde(default)]
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub cwd: Option<String>,
    #[serde(default)]
    pub message: Option<RawMessage>,
    /// Sidecar sub-agent linkage: set on `tool_use` entries the sub-agent
    /// transcript was spawned for.
    #[serde(default, rename = "agentId")]
    pub agent_id: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Read and parse every JSONL line of a transcript file. Trailing unparsable
/// lines (the file may still be mid-write by the owning agent) are skipped
/// with a `warn!` rather than failing the whole read; a file with zero
/// parsable lines is reported as malformed.
pub fn read_entries(path: &Path) -> Result<Vec<RawEntry>, TranscriptError> {
    let text = std::fs::read_to_string(path).map_err(|source| TranscriptError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let mut entries = Vec::new();
    let mut last_err = None;
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RawEntry>(line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::debug!(path = %path.display(), %err, "skipping unparsable transcript line");
                last_err = Some(err);
            }
        }
    }

    if entries.is_empty() {
        if let Some(source) = last_err {
            return Err(TranscriptError::Malformed {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    Ok(entries)
}

/// Recover the working directory recorded in a transcript, used as the
/// fallback path for the Claude family's lossy directory-name hash (spec
/// §4.3, §4.5).
pub fn extract_cwd(path: &Path) -> Option<PathBuf> {
    let entries = read_entries(path).ok()?;
    entries.iter().find_map(|e| e.cwd.as_ref().map(PathBuf::from))
}

/// IDE-metadata blocks that must be ignored when deriving a title from the
/// first user message.
const IDE_METADATA_PREFIXES: &[&str] = &["<ide_opened_file>", "<ide_diagnostics>"];

fn is_ide_metadata(text: &str) -> bool {
    let trimmed = text.trim_start();
    IDE_METADATA_PREFIXES.iter().any(|p| trimmed.starts_with(p))
}

/// Convert one raw entry into a normalized [`Message`], if it carries an
/// actual conversational message (system bookkeeping lines like
/// `"type":"summary"` do not).
pub fn to_message(entry: &RawEntry) -> Option<Message> {
    let raw_msg = entry.message.as_ref()?;
    let kind = match (entry.entry_type.as_deref(), raw_msg.role.as_deref()) {
        (_, Some("user")) => MessageKind::User,
        (_, Some("assistant")) => MessageKind::Assistant,
        (_, Some("system")) => MessageKind::System,
        (_, Some("tool")) => MessageKind::ToolResult,
        (Some("result"), _) => MessageKind::Result,
        (Some("error"), _) => MessageKind::Error,
        _ => return None,
    };

    let content = raw_msg.content.as_ref().map(parse_content);

    let id = entry
        .uuid
        .clone()
        .unwrap_or_else(|| format!("idx-{:x}", fxhash(entry)));

    Some(Message {
        id,
        kind,
        content,
        parent_id: entry.parent_uuid.clone(),
        timestamp: entry.timestamp,
        extra: entry.extra.clone(),
    })
}

/// Cheap, stable fallback id for entries with no `uuid`: the agent's uuid,
/// else an index-derived fallback. Not cryptographic — collisions are
/// acceptable within one malformed line.
fn fxhash(entry: &RawEntry) -> u64 {
    use std::hash::{Hash, Hasher};
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    entry.timestamp.hash(&mut hasher);
    entry.parent_uuid.hash(&mut hasher);
    hasher.finish()
}

fn parse_content(value: &Value) -> MessageContent {
    match value {
        Value::String(s) => MessageContent::Text(s.clone()),
        Value::Array(items) => {
            let blocks = items.iter().filter_map(parse_block).collect();
            MessageContent::Blocks(blocks)
        }
        other => MessageContent::Text(other.to_string()),
    }
}

fn parse_block(value: &Value) -> Option<ContentBlock> {
    let obj = value.as_object()?;
    match obj.get("type").and_then(Value::as_str)? {
        "text" => {
            let text = obj.get("text").and_then(Value::as_str)?.to_string();
            if is_ide_metadata(&text) {
                return None;
            }
            Some(ContentBlock::Text { text })
        }
        "thinking" => Some(ContentBlock::Thinking {
            text: obj.get("thinking").and_then(Value::as_str).unwrap_or_default().to_string(),
            signature: obj.get("signature").and_then(Value::as_str).map(String::from),
        }),
        "tool_use" => Some(ContentBlock::ToolUse {
            id: obj.get("id").and_then(Value::as_str)?.to_string(),
            name: obj.get("name").and_then(Value::as_str).unwrap_or_default().to_string(),
            input: obj.get("input").cloned().unwrap_or(Value::Null),
        }),
        "tool_result" => Some(ContentBlock::ToolResult {
            tool_use_id: obj.get("tool_use_id").and_then(Value::as_str)?.to_string(),
            content: obj.get("content").and_then(Value::as_str).map(String::from),
            is_error: obj.get("is_error").and_then(Value::as_bool),
        }),
        _ => None,
    }
}

/// Context-window usage for known model ids, looked up by model id. Unknown
/// models fall back to a conservative default rather than failing the
/// percentage computation.
pub fn window_size_for_model(model_id: &str) -> u64 {
    const KNOWN: &[(&str, u64)] = &[
        ("claude-opus-4", 200_000),
        ("claude-sonnet-4", 200_000),
        ("claude-haiku-4", 200_000),
        ("gpt-4o", 128_000),
        ("gpt-4.1", 1_000_000),
        ("o3", 200_000),
        ("gemini-2.5-pro", 1_000_000),
    ];
    KNOWN
        .iter()
        .find(|(prefix, _)| model_id.starts_with(prefix))
        .map(|(_, window)| *window)
        .unwrap_or(200_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claude_dir_name_is_lossy_substitution() {
        let path = Path::new("/home/dev/my-project");
        let encoded = AgentFamily::Claude.encode_dir_name(path);
        assert_eq!(encoded, "-home-dev-my-project");
    }

    #[test]
    fn codex_dir_name_is_reversible_base64url() {
        let path = Path::new("/home/dev/proj");
        let encoded = AgentFamily::Codex.encode_dir_name(path);
        assert_eq!(encoded, corral_core::model::ProjectId::from_path(path).0);
    }

    #[test]
    fn ide_metadata_text_block_is_dropped() {
        let block = parse_block(&serde_json::json!({
            "type": "text",
            "text": "<ide_opened_file>foo.rs</ide_opened_file>"
        }));
        assert!(block.is_none());
    }

    #[test]
    fn tool_use_and_tool_result_blocks_parse() {
        let use_block = parse_block(&serde_json::json!({
            "type": "tool_use", "id": "t1", "name": "Read", "input": {"path": "a.rs"}
        }))
        .unwrap();
        assert!(matches!(use_block, ContentBlock::ToolUse { .. }));

        let result_block = parse_block(&serde_json::json!({
            "type": "tool_result", "tool_use_id": "t1", "content": "ok"
        }))
        .unwrap();
        assert!(matches!(result_block, ContentBlock::ToolResult { .. }));
    }

    #[test]
    fn window_size_falls_back_for_unknown_model() {
        assert_eq!(window_size_for_model("some-future-model"), 200_000);
        assert_eq!(window_size_for_model("gpt-4o-mini"), 128_000);
    }
}
