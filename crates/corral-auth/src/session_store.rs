// SPDX-License-Identifier: Apache-2.0
//! Resumable-session store: `sessionId -> {username, sessionKey, ...}` with
//! TTL expiry and per-user invalidation. In-memory map guarded by a single
//! `tokio::sync::Mutex`, mirroring the single-writer-task discipline used by
//! `corral-core::process::Process` elsewhere in the workspace, plus an
//! optional on-disk mirror written with a write-temp-then-rename pattern so
//! a crash mid-write can never leave a truncated file behind.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

const DEFAULT_TTL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct SessionEntry {
    username: String,
    session_key: [u8; 32],
    last_connected_at: Instant,
    browser_profile_id: Option<String>,
    user_agent: Option<String>,
    origin: Option<String>,
}

/// Serializable mirror of [`SessionEntry`] for the on-disk snapshot. Instants
/// aren't serializable, so persisted entries carry a Unix-epoch timestamp
/// instead and are treated as fresh (full TTL) on load — losing sub-process
/// precision on `last_connected_at` across a restart is an accepted tradeoff.
#[derive(Debug, Serialize, Deserialize)]
struct PersistedEntry {
    session_id: String,
    username: String,
    #[serde(with = "hex_key")]
    session_key: [u8; 32],
    browser_profile_id: Option<String>,
    user_agent: Option<String>,
    origin: Option<String>,
}

pub struct SessionStore {
    entries: Mutex<HashMap<String, SessionEntry>>,
    ttl: Duration,
    path: Option<PathBuf>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl: DEFAULT_TTL,
            path: None,
        }
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            ttl,
            path: None,
        }
    }

    /// Persist session entries to `path` after every mutation, so a client
    /// can resume across server restarts within the TTL window.
    pub fn persisted_at(mut self, path: PathBuf) -> Self {
        self.path = Some(path);
        self
    }

    pub async fn load_from_disk(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        if !path.exists() {
            return Ok(());
        }
        let bytes = std::fs::read(path)?;
        let persisted: Vec<PersistedEntry> = serde_json::from_slice(&bytes).unwrap_or_default();
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        for entry in persisted {
            entries.insert(
                entry.session_id,
                SessionEntry {
                    username: entry.username,
                    session_key: entry.session_key,
                    last_connected_at: now,
                    browser_profile_id: entry.browser_profile_id,
                    user_agent: entry.user_agent,
                    origin: entry.origin,
                },
            );
        }
        Ok(())
    }

    /// Create a new resumable session for `username`, returning its id.
    pub async fn create(&self, username: &str, session_key: [u8; 32]) -> String {
        self.create_with_metadata(username, session_key, None, None, None).await
    }

    pub async fn create_with_metadata(
        &self,
        username: &str,
        session_key: [u8; 32],
        browser_profile_id: Option<String>,
        user_agent: Option<String>,
        origin: Option<String>,
    ) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut entries = self.entries.lock().await;
        entries.insert(
            session_id.clone(),
            SessionEntry {
                username: username.to_string(),
                session_key,
                last_connected_at: Instant::now(),
                browser_profile_id,
                user_agent,
                origin,
            },
        );
        drop(entries);
        let _ = self.flush().await;
        session_id
    }

    /// Verify a resume `proof`: an HMAC-SHA256 over the session id keyed by
    /// the stored session key, hex-encoded. Rejects expired or unknown
    /// sessions and identity mismatches without leaking which case applied.
    pub async fn verify_resume(&self, username: &str, session_id: &str, proof: &str) -> Option<()> {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut entries = self.entries.lock().await;
        let entry = entries.get(session_id)?;
        if entry.username != username {
            return None;
        }
        if entry.last_connected_at.elapsed() > self.ttl {
            entries.remove(session_id);
            return None;
        }

        let mut mac = Hmac::<Sha256>::new_from_slice(&entry.session_key).ok()?;
        mac.update(session_id.as_bytes());
        let expected = hex::encode(mac.finalize().into_bytes());
        if !constant_time_eq(expected.as_bytes(), proof.as_bytes()) {
            return None;
        }

        entries.get_mut(session_id).unwrap().last_connected_at = Instant::now();
        Some(())
    }

    pub async fn session_key(&self, session_id: &str) -> Option<[u8; 32]> {
        let entries = self.entries.lock().await;
        let entry = entries.get(session_id)?;
        if entry.last_connected_at.elapsed() > self.ttl {
            return None;
        }
        Some(entry.session_key)
    }

    /// Invalidate every active session for `username` (e.g. on password
    /// change or explicit sign-out-everywhere).
    pub async fn invalidate_user_sessions(&self, username: &str) {
        let mut entries = self.entries.lock().await;
        entries.retain(|_, entry| entry.username != username);
        drop(entries);
        let _ = self.flush().await;
    }

    pub async fn invalidate(&self, session_id: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(session_id);
        drop(entries);
        let _ = self.flush().await;
    }

    pub async fn prune_expired(&self) {
        let mut entries = self.entries.lock().await;
        let ttl = self.ttl;
        entries.retain(|_, entry| entry.last_connected_at.elapsed() <= ttl);
        drop(entries);
        let _ = self.flush().await;
    }

    async fn flush(&self) -> std::io::Result<()> {
        let Some(path) = &self.path else { return Ok(()) };
        let entries = self.entries.lock().await;
        let persisted: Vec<PersistedEntry> = entries
            .iter()
            .map(|(id, entry)| PersistedEntry {
                session_id: id.clone(),
                username: entry.username.clone(),
                session_key: entry.session_key,
                browser_profile_id: entry.browser_profile_id.clone(),
                user_agent: entry.user_agent.clone(),
                origin: entry.origin.clone(),
            })
            .collect();
        drop(entries);
        write_atomic(path, &serde_json::to_vec_pretty(&persisted).unwrap())
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    use subtle::ConstantTimeEq;
    a.len() == b.len() && a.ct_eq(b).into()
}

/// Write-temp-then-rename for crash-safe durability, with 0o600 permissions
/// since the file contains session keys.
fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        #[cfg(unix)]
        {
            use std::io::Write;
            use std::os::unix::fs::OpenOptionsExt;
            let mut f = std::fs::OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(0o600)
                .open(&tmp_path)?;
            f.write_all(data)?;
        }
        #[cfg(not(unix))]
        {
            std::fs::write(&tmp_path, data)?;
        }
    }
    std::fs::rename(&tmp_path, path)
}

mod hex_key {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8; 32], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; 32], D::Error> {
        let s = String::deserialize(d)?;
        let bytes = hex::decode(&s).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|_| D::Error::custom("session key must be 32 bytes"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn created_session_resumes_with_valid_proof() {
        let store = SessionStore::new();
        let key = [7u8; 32];
        let session_id = store.create("alice", key).await;

        let proof = resume_proof(&key, &session_id);
        assert!(store.verify_resume("alice", &session_id, &proof).await.is_some());
    }

    #[tokio::test]
    async fn resume_fails_for_wrong_username() {
        let store = SessionStore::new();
        let key = [1u8; 32];
        let session_id = store.create("alice", key).await;
        let proof = resume_proof(&key, &session_id);
        assert!(store.verify_resume("bob", &session_id, &proof).await.is_none());
    }

    #[tokio::test]
    async fn resume_fails_for_wrong_proof() {
        let store = SessionStore::new();
        let key = [1u8; 32];
        let session_id = store.create("alice", key).await;
        assert!(store.verify_resume("alice", &session_id, "deadbeef").await.is_none());
    }

    #[tokio::test]
    async fn invalidate_user_sessions_removes_all_of_that_users_entries() {
        let store = SessionStore::new();
        let sid1 = store.create("alice", [1u8; 32]).await;
        let sid2 = store.create("alice", [2u8; 32]).await;
        let sid3 = store.create("bob", [3u8; 32]).await;

        store.invalidate_user_sessions("alice").await;

        assert!(store.session_key(&sid1).await.is_none());
        assert!(store.session_key(&sid2).await.is_none());
        assert!(store.session_key(&sid3).await.is_some());
    }

    #[tokio::test]
    async fn expired_session_is_rejected() {
        let store = SessionStore::with_ttl(Duration::from_millis(1));
        let key = [9u8; 32];
        let session_id = store.create("alice", key).await;
        tokio::time::sleep(Duration::from_millis(20)).await;
        let proof = resume_proof(&key, &session_id);
        assert!(store.verify_resume("alice", &session_id, &proof).await.is_none());
    }

    fn resume_proof(key: &[u8; 32], session_id: &str) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;
        let mut mac = Hmac::<Sha256>::new_from_slice(key).unwrap();
        mac.update(session_id.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}
