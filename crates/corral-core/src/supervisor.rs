// SPDX-License-Identifier: Apache-2.0
//! Supervisor — the process registry: a `HashMap<Uuid, Process>` keyed
//! lookup kept separate from the `Process` driver itself, since a process
//! here is multi-session-id-aware across its lifetime (the placeholder id
//! is replaced once the real one arrives).

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use tracing::info;

use crate::event_bus::{ActivityEvent, EventBus};
use crate::model::{Ownership, ProjectId};
use crate::process::Process;

struct Registry {
    /// session id → process. Placeholder ids are keys until replaced.
    by_session: HashMap<String, Process>,
    by_project: HashMap<ProjectId, Vec<String>>,
    /// Ownership attribution for session ids with no locally-owned Process —
    /// a soft signal that decays without further mtime drift, rather than an
    /// unconditional claim.
    external: HashMap<String, Instant>,
}

/// How long an `external` attribution survives without renewed mtime drift
/// before decaying to `none`.
const EXTERNAL_OWNERSHIP_TTL: Duration = Duration::from_secs(30);

pub struct Supervisor {
    registry: Mutex<Registry>,
    event_bus: EventBus,
}

impl Supervisor {
    pub fn new(event_bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            registry: Mutex::new(Registry {
                by_session: HashMap::new(),
                by_project: HashMap::new(),
                external: HashMap::new(),
            }),
            event_bus,
        })
    }

    pub async fn get_process_for_session(&self, session_id: &str) -> Option<Process> {
        self.registry.lock().await.by_session.get(session_id).cloned()
    }

    pub async fn get_processes_by_project(&self, project_id: &ProjectId) -> Vec<Process> {
        let registry = self.registry.lock().await;
        let Some(ids) = registry.by_project.get(project_id) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| registry.by_session.get(id).cloned())
            .collect()
    }

    /// Register a freshly spawned process, keyed by its current (possibly
    /// placeholder) session id. Starting a session whose id currently shows
    /// `external` proceeds and clears the stale attribution immediately.
    pub async fn register(&self, project_id: ProjectId, session_id: String, process: Process) {
        let process_id = process.process_id();
        let mut registry = self.registry.lock().await;
        registry.external.remove(&session_id);
        registry.by_session.insert(session_id.clone(), process);
        registry
            .by_project
            .entry(project_id.clone())
            .or_default()
            .push(session_id.clone());
        drop(registry);

        info!(%session_id, %process_id, "process registered");
        self.event_bus.publish(ActivityEvent::SessionActive {
            session_id,
            project_id,
        });
    }

    /// Rekey a registered process when its placeholder session id is
    /// replaced by the real one (driven by the Process's own
    /// `session-id-changed` event, observed by the caller that owns the
    /// Process's subscription).
    pub async fn rekey(&self, project_id: &ProjectId, old_session_id: &str, new_session_id: String) {
        let mut registry = self.registry.lock().await;
        if let Some(process) = registry.by_session.remove(old_session_id) {
            registry.external.remove(&new_session_id);
            registry
                .by_session
                .insert(new_session_id.clone(), process);
            if let Some(ids) = registry.by_project.get_mut(project_id) {
                if let Some(slot) = ids.iter_mut().find(|id| id.as_str() == old_session_id) {
                    *slot = new_session_id;
                }
            }
        }
    }

    /// Unregister on a Process's `terminated` event; emits activity.
    pub async fn unregister(&self, project_id: &ProjectId, session_id: &str) {
        let mut registry = self.registry.lock().await;
        registry.by_session.remove(session_id);
        if let Some(ids) = registry.by_project.get_mut(project_id) {
            ids.retain(|id| id != session_id);
        }
        drop(registry);
        info!(%session_id, "process unregistered");
    }

    /// Observe transcript directories for file mtime changes newer than the
    /// last poll; for transcripts without a locally-owned Process, mark
    /// ownership `external` with the TTL above. `touched_session_ids` is
    /// supplied by the caller (corral-sessions' transcript scan); this
    /// method only applies attribution, it does not walk the filesystem.
    pub async fn update_external_trackers(&self, touched_session_ids: &[String]) {
        let now = Instant::now();
        let mut registry = self.registry.lock().await;
        for session_id in touched_session_ids {
            if !registry.by_session.contains_key(session_id) {
                registry
                    .external
                    .insert(session_id.clone(), now + EXTERNAL_OWNERSHIP_TTL);
            }
        }
        registry.external.retain(|_, decays_at| *decays_at > now);
    }

    pub async fn ownership(&self, session_id: &str) -> Ownership {
        let registry = self.registry.lock().await;
        if let Some(process) = registry.by_session.get(session_id) {
            return Ownership::Owned {
                process_id: process.process_id(),
            };
        }
        match registry.external.get(session_id) {
            Some(decays_at) if *decays_at > Instant::now() => Ownership::External {
                decays_at: *decays_at,
            },
            _ => Ownership::None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tokio::sync::oneshot;

    fn dummy_process() -> Process {
        let frames: crate::process::FrameStream = Box::pin(futures::stream::pending());
        let (abort_tx, _abort_rx) = oneshot::channel();
        Process::spawn(
            ProjectId("p1".into()),
            "placeholder".into(),
            crate::model::PermissionMode::Default,
            8,
            frames,
            abort_tx,
        )
    }

    #[tokio::test]
    async fn register_and_lookup_by_session_and_project() {
        let sup = Supervisor::new(EventBus::new());
        let project_id = ProjectId("p1".into());
        sup.register(project_id.clone(), "s1".into(), dummy_process()).await;

        assert!(sup.get_process_for_session("s1").await.is_some());
        assert_eq!(sup.get_processes_by_project(&project_id).await.len(), 1);
    }

    #[tokio::test]
    async fn rekey_moves_process_to_new_session_id() {
        let sup = Supervisor::new(EventBus::new());
        let project_id = ProjectId("p1".into());
        sup.register(project_id.clone(), "placeholder".into(), dummy_process()).await;
        sup.rekey(&project_id, "placeholder", "real-id".into()).await;

        assert!(sup.get_process_for_session("placeholder").await.is_none());
        assert!(sup.get_process_for_session("real-id").await.is_some());
    }

    #[tokio::test]
    async fn external_attribution_decays_after_ttl() {
        let sup = Supervisor::new(EventBus::new());
        sup.update_external_trackers(&["orphan".to_string()]).await;
        assert!(matches!(sup.ownership("orphan").await, Ownership::External { .. }));

        // Simulate TTL expiry by directly manipulating the stored deadline.
        {
            let mut registry = sup.registry.lock().await;
            registry.external.insert("orphan".to_string(), Instant::now() - Duration::from_secs(1));
        }
        assert!(matches!(sup.ownership("orphan").await, Ownership::None));
    }

    #[tokio::test]
    async fn registering_a_session_clears_prior_external_attribution() {
        let sup = Supervisor::new(EventBus::new());
        sup.update_external_trackers(&["s1".to_string()]).await;
        assert!(matches!(sup.ownership("s1").await, Ownership::External { .. }));

        sup.register(ProjectId("p1".into()), "s1".into(), dummy_process()).await;
        assert!(matches!(sup.ownership("s1").await, Ownership::Owned { .. }));
    }

    #[allow(dead_code)]
    fn _unused(_: PathBuf) {}
}
