// SPDX-License-Identifier: Apache-2.0
//! The shared in-memory data model: projects, sessions, the normalized
//! message DAG, process/permission state and the frames an agent adapter
//! hands up to a [`crate::process::Process`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Project ───────────────────────────────────────────────────────────────────

/// Stable, URL-safe id derived from a project's canonical path. Opaque to
/// clients; id ↔ path is bijective within one fleet.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProjectId(pub String);

impl ProjectId {
    /// Derive the id from a canonical absolute path.
    pub fn from_path(path: &Path) -> Self {
        use base64::Engine;
        let encoded = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(path.to_string_lossy().as_bytes());
        ProjectId(encoded)
    }
}

impl std::fmt::Display for ProjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub path: PathBuf,
    pub display_name: String,
    pub session_count: usize,
    pub last_activity: Option<DateTime<Utc>>,
    pub agent_family: Option<String>,
    /// `true` when discovered from on-disk transcripts, `false` when the
    /// directory exists but no agent has written a transcript for it yet.
    pub discovered: bool,
}

// ── Ownership ─────────────────────────────────────────────────────────────────

/// Which party is currently writing a session's transcript.
#[derive(Debug, Clone)]
pub enum Ownership {
    /// A live `Process` in this supervisor drives the session.
    Owned { process_id: uuid::Uuid },
    /// Another local tool appears to be writing the transcript (soft signal,
    /// decays after `decays_at` with no further mtime drift).
    External { decays_at: Instant },
    None,
}

impl Ownership {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ownership::Owned { .. } => "self",
            Ownership::External { .. } => "external",
            Ownership::None => "none",
        }
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextUsage {
    pub input_tokens: u64,
    /// `round(100 * used / window_size)`.
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSummary {
    pub id: String,
    pub project_id: ProjectId,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub message_count: usize,
    pub auto_title: String,
    pub custom_title: Option<String>,
    #[serde(default)]
    pub archived: bool,
    #[serde(default)]
    pub starred: bool,
    pub context_usage: Option<ContextUsage>,
    pub agent_family: String,
    pub model_id: Option<String>,
}

/// Truncate a title to at most 120 chars: either the trimmed input
/// verbatim, or 117 chars + `"..."`.
pub fn truncate_title(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.chars().count() <= 120 {
        return trimmed.to_string();
    }
    let truncated: String = trimmed.chars().take(117).collect();
    format!("{truncated}...")
}

// ── Normalized message ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    User,
    Assistant,
    System,
    ToolResult,
    Result,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    Thinking {
        text: String,
        signature: Option<String>,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: Option<String>,
        #[serde(default)]
        is_error: Option<bool>,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<ContentBlock>),
}

/// A normalized transcript record. `extra` preserves every agent-specific
/// field the core does not understand verbatim, as a dynamic pass-through.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: Option<MessageContent>,
    pub parent_id: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    #[serde(default)]
    pub extra: serde_json::Map<String, Value>,
}

impl Message {
    /// `tool_use` blocks present, in order, for active-branch orphan detection.
    pub fn tool_use_ids(&self) -> Vec<&str> {
        match &self.content {
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolUse { id, .. } => Some(id.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// `tool_use_id`s referenced by `tool_result` blocks in this message.
    pub fn tool_result_refs(&self) -> Vec<&str> {
        match &self.content {
            Some(MessageContent::Blocks(blocks)) => blocks
                .iter()
                .filter_map(|b| match b {
                    ContentBlock::ToolResult { tool_use_id, .. } => Some(tool_use_id.as_str()),
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.content {
            Some(MessageContent::Text(t)) => Some(t.as_str()),
            Some(MessageContent::Blocks(blocks)) => blocks.iter().find_map(|b| match b {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            }),
            None => None,
        }
    }
}

// ── Permission mode ───────────────────────────────────────────────────────────

/// Totally ordered tool-approval policy: `BypassPermissions` is the most
/// permissive, `Plan` the least. Declared least-to-most so the derived
/// `Ord` matches that ordering directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Plan,
    Default,
    AcceptEdits,
    BypassPermissions,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::Default
    }
}

// ── Pending input request ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingInputRequest {
    pub id: String,
    pub tool_name: String,
    pub input: Value,
    pub prompt: Option<String>,
}

// ── Process state ─────────────────────────────────────────────────────────────

/// Why an adapter stream ended: a typed termination signal instead of
/// pattern-matching a free-form error string.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterExit {
    /// The stream yielded a final `result` frame and ended normally.
    Completed,
    /// The stream yielded an `error` frame, then ended.
    Errored { message: String },
    /// The stream ended (iterator exhaustion / EOF) with no explicit frame —
    /// e.g. the child process exited unexpectedly.
    AdapterClosed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStateKind {
    Spawning,
    InTurn,
    Idle,
    WaitingInput,
    Hold,
    Terminated,
}

// ── Adapter stream frames (agent → core) ──────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamFrame {
    Init {
        session_id: String,
        cwd: PathBuf,
    },
    Message {
        message: Message,
    },
    Result {
        session_id: String,
    },
    Error {
        session_id: String,
        error: String,
    },
    SessionIdChanged {
        old_session_id: String,
        new_session_id: String,
    },
    LoginFlow {
        info: Value,
    },
}

// ── Process-level fan-out events ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessEvent {
    Message { message: Message },
    StateChange { state: ProcessStateKind },
    ModeChange { mode: PermissionMode, version: u64 },
    SessionIdChanged { old_session_id: String, new_session_id: String },
    PendingInput { request: PendingInputRequest },
    Error { message: String },
    Terminated { reason: AdapterExit },
    Complete,
}

/// Declared read-only tools — auto-allowed under every mode regardless of
/// the active permission mode.
pub const READ_ONLY_TOOLS: &[&str] = &[
    "Read", "Glob", "Grep", "LSP", "WebFetch", "WebSearch", "Task", "TaskOutput",
];

/// Parsed summary returned by [`crate::supervisor::Supervisor`] listing
/// queries, and also used for the transport's `SessionList`-style replies.
#[derive(Debug, Clone)]
pub struct ProcessSnapshot {
    pub process_id: uuid::Uuid,
    pub project_id: ProjectId,
    pub session_id: String,
    pub state: ProcessStateKind,
    pub mode: PermissionMode,
    pub mode_version: u64,
}

pub type ExtraFields = HashMap<String, Value>;
