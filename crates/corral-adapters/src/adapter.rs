// SPDX-License-Identifier: Apache-2.0
//! Agent Adapter contract — a family-specific shim presenting one contract:
//! `start_session(opts) -> {stream, input, abort}`, binding a `Process`'s
//! frame stream to an arbitrary subprocess instead of an in-process model
//! call.

use tokio::sync::{mpsc, oneshot};

use corral_core::model::PermissionMode;
use corral_core::process::FrameStream;

use crate::error::AdapterError;

/// Options recognized by every family.
#[derive(Debug, Clone)]
pub struct StartOptions {
    /// Required absolute working directory for the spawned subprocess.
    pub cwd: std::path::PathBuf,
    /// Family-specific model id; `None` selects the family's default.
    pub model: Option<String>,
    /// If present, the adapter must attach to an existing transcript rather
    /// than starting a fresh one.
    pub resume_session_id: Option<String>,
    pub permission_mode: PermissionMode,
    /// Optional first user input, queued before the subprocess's stdout is
    /// read so it is the first thing the agent sees.
    pub initial_message: Option<String>,
}

/// What `start_session` hands back to the orchestrator that wires it to a
/// [`corral_core::process::Process`]. `input_tx` is the sending half of the
/// Message Queue; the orchestrator forwards popped queue entries into it as
/// the process receives `queue_message` calls.
pub struct AdapterSession {
    pub stream: FrameStream,
    pub input_tx: mpsc::UnboundedSender<String>,
    /// Handed to `Process::spawn`; the adapter itself holds the matching
    /// receiver in its subprocess-driving task and uses it to kill the
    /// child cooperatively on `abort()`.
    pub abort_tx: oneshot::Sender<()>,
    /// Placeholder session id to register the Process under until an `init`
    /// or `session-id-changed` frame supplies the real one. For families
    /// where the id is known up front this is already the real id.
    pub placeholder_session_id: String,
}

#[async_trait::async_trait]
pub trait AgentAdapter: Send + Sync {
    /// The family name this adapter answers to in the registry
    /// (`"claude"`, `"codex"`, `"acp"`, ...).
    fn family(&self) -> &'static str;

    async fn start_session(&self, opts: StartOptions) -> Result<AdapterSession, AdapterError>;
}
