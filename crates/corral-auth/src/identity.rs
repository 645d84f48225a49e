// SPDX-License-Identifier: Apache-2.0
//! On-disk SRP identity (`remote-access.json`): username, salt, and
//! verifier, written with a hash-at-rest, 0600-file, atomic-write pattern.
//! The verifier is itself already a one-way derivative of the password, not
//! the password itself.

use std::io::Write;
use std::path::Path;

use rand_core::{OsRng, RngCore};
use serde::{Deserialize, Serialize};

use crate::error::AuthError;
use crate::srp_core::{compute_verifier, SRP_SALT_LEN};

/// Persisted identity record for one local user. The verifier is a one-way
/// function of the password; this file never contains the password itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityRecord {
    pub username: String,
    #[serde(with = "hex_bytes")]
    pub salt: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub verifier: Vec<u8>,
}

impl IdentityRecord {
    /// Derive a fresh salt and verifier from a password, shown/typed once at
    /// setup time and never persisted.
    pub fn derive(username: &str, password: &str) -> Self {
        let mut salt = vec![0u8; SRP_SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let verifier = compute_verifier(username, password, &salt);
        IdentityRecord {
            username: username.to_string(),
            salt,
            verifier,
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), AuthError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_vec_pretty(self)
            .map_err(|e| AuthError::Internal(format!("serializing identity record: {e}")))?;
        write_secret_file(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self, AuthError> {
        let text = std::fs::read(path)?;
        serde_json::from_slice(&text)
            .map_err(|e| AuthError::Internal(format!("parsing identity record {}: {e}", path.display())))
    }
}

/// Write `data` to `path` with mode 0o600 on Unix, since this file holds
/// secret material.
fn write_secret_file(path: &Path, data: &[u8]) -> Result<(), AuthError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        let mut f = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;
        f.write_all(data)?;
    }
    #[cfg(not(unix))]
    {
        std::fs::write(path, data)?;
    }
    Ok(())
}

mod hex_bytes {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &[u8], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(v))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(d)?;
        hex::decode(&s).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote-access.json");
        let record = IdentityRecord::derive("alice", "correct horse battery staple");
        record.save(&path).unwrap();

        let loaded = IdentityRecord::load(&path).unwrap();
        assert_eq!(loaded.username, "alice");
        assert_eq!(loaded.verifier, record.verifier);
    }

    #[test]
    fn different_passwords_derive_different_verifiers() {
        let a = IdentityRecord::derive("alice", "password-one");
        let b = IdentityRecord::derive("alice", "password-two");
        assert_ne!(a.verifier, b.verifier);
    }

    #[cfg(unix)]
    #[test]
    fn saved_file_has_owner_only_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("remote-access.json");
        IdentityRecord::derive("alice", "pw").save(&path).unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }
}
