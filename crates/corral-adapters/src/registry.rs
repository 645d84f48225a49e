// SPDX-License-Identifier: Apache-2.0
//! Adapter registry — maps a family name to a boxed adapter, constructed
//! once at startup via repeated `register()` calls.

use std::collections::HashMap;
use std::sync::Arc;

use crate::adapter::AgentAdapter;
use crate::error::AdapterError;

#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Arc<dyn AgentAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, adapter: Arc<dyn AgentAdapter>) {
        self.adapters.insert(adapter.family().to_string(), adapter);
    }

    pub fn get(&self, family: &str) -> Result<Arc<dyn AgentAdapter>, AdapterError> {
        self.adapters
            .get(family)
            .cloned()
            .ok_or_else(|| AdapterError::UnknownFamily(family.to_string()))
    }

    pub fn families(&self) -> Vec<&str> {
        self.adapters.keys().map(|s| s.as_str()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{AdapterSession, StartOptions};
    use corral_core::process::FrameStream;

    struct StubAdapter(&'static str);

    #[async_trait::async_trait]
    impl AgentAdapter for StubAdapter {
        fn family(&self) -> &'static str {
            self.0
        }

        async fn start_session(&self, _opts: StartOptions) -> Result<AdapterSession, AdapterError> {
            let stream: FrameStream = Box::pin(futures::stream::pending());
            let (input_tx, _input_rx) = tokio::sync::mpsc::unbounded_channel();
            let (abort_tx, _abort_rx) = tokio::sync::oneshot::channel();
            Ok(AdapterSession {
                stream,
                input_tx,
                abort_tx,
                placeholder_session_id: "placeholder".into(),
            })
        }
    }

    #[test]
    fn lookup_by_family_name() {
        let mut registry = AdapterRegistry::new();
        registry.register(Arc::new(StubAdapter("claude")));
        registry.register(Arc::new(StubAdapter("codex")));

        assert!(registry.get("claude").is_ok());
        assert!(registry.get("codex").is_ok());
        assert!(matches!(registry.get("unknown"), Err(AdapterError::UnknownFamily(_))));
    }
}
