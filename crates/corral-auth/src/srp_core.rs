// SPDX-License-Identifier: Apache-2.0
//! Thin wrapper around the `srp` crate's SRP-6a implementation, isolated to
//! one module so the rest of the handshake state machine never touches
//! group-parameter or digest-generic plumbing directly. Uses the well-known
//! 2048-bit group with SHA-256.

use hkdf::Hkdf;
use sha2::Sha256;
use srp::client::{SrpClient, SrpClientVerifier};
use srp::groups::G_2048;
use srp::server::{SrpServer, SrpServerVerifier, UserRecord};

use crate::error::AuthError;

pub const SRP_SALT_LEN: usize = 16;
/// Size of the SRP private ephemeral value `a`/`b`, in bytes.
const EPHEMERAL_LEN: usize = 64;
/// Size of the derived transport session key (secretbox key).
const SESSION_KEY_LEN: usize = 32;

pub fn compute_verifier(username: &str, password: &str, salt: &[u8]) -> Vec<u8> {
    let client = SrpClient::<Sha256>::new(&G_2048);
    client.compute_verifier(username.as_bytes(), password.as_bytes(), salt)
}

pub fn random_ephemeral() -> Vec<u8> {
    use rand_core::{OsRng, RngCore};
    let mut bytes = vec![0u8; EPHEMERAL_LEN];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// Server-side step 2: given the stored (salt, verifier) for a username and
/// the server's private ephemeral `b`, compute the public ephemeral `B` to
/// send back in the `challenge` message.
pub fn server_public_ephemeral(verifier: &[u8], b: &[u8]) -> Vec<u8> {
    let server = SrpServer::<Sha256>::new(&G_2048);
    server.compute_public_ephemeral(b, verifier)
}

/// Server-side step 3: process the client's `proof` message (`A`, `M1`).
/// Returns a verifier object used to check `M1` and derive `M2` plus the
/// shared raw SRP key.
pub struct ServerHandshake {
    inner: SrpServerVerifier<Sha256>,
}

pub fn server_process_proof(
    b: &[u8],
    verifier: &[u8],
    username: &str,
    a_pub: &[u8],
) -> Result<ServerHandshake, AuthError> {
    let server = SrpServer::<Sha256>::new(&G_2048);
    let user = UserRecord {
        username: username.as_bytes(),
        salt: &[],
        verifier,
    };
    let handshake = server
        .process_reply(b, user.verifier, a_pub)
        .map_err(|_| AuthError::InvalidProof)?;
    Ok(ServerHandshake { inner: handshake })
}

impl ServerHandshake {
    /// Verify the client's `M1`; on success returns `M2` to send in `verify`.
    pub fn verify_client_and_make_proof(&self, m1: &[u8]) -> Result<Vec<u8>, AuthError> {
        self.inner
            .verify_client(m1)
            .map(|m2| m2.to_vec())
            .map_err(|_| AuthError::InvalidProof)
    }

    pub fn raw_key(&self) -> &[u8] {
        self.inner.key()
    }
}

/// Client-side: given username/password/salt/B, compute A (caller already
/// has it from the ephemeral) and the proof verifier carrying M1/M2/key.
pub struct ClientHandshake {
    inner: SrpClientVerifier<Sha256>,
}

pub fn client_process_challenge(
    a: &[u8],
    username: &str,
    password: &str,
    salt: &[u8],
    b_pub: &[u8],
) -> Result<ClientHandshake, AuthError> {
    let client = SrpClient::<Sha256>::new(&G_2048);
    let verifier = client
        .process_reply(a, username.as_bytes(), password.as_bytes(), salt, b_pub)
        .map_err(|_| AuthError::InvalidProof)?;
    Ok(ClientHandshake { inner: verifier })
}

impl ClientHandshake {
    pub fn proof(&self) -> Vec<u8> {
        self.inner.proof().to_vec()
    }

    pub fn verify_server(&self, m2: &[u8]) -> Result<(), AuthError> {
        self.inner.verify_server(m2).map_err(|_| AuthError::InvalidProof)
    }

    pub fn raw_key(&self) -> &[u8] {
        self.inner.key()
    }
}

pub fn client_public_ephemeral(a: &[u8]) -> Vec<u8> {
    let client = SrpClient::<Sha256>::new(&G_2048);
    client.compute_public_ephemeral(a)
}

/// Derive the 32-byte transport session key from the raw SRP shared secret
/// via HKDF-SHA-256.
pub fn derive_session_key(raw_srp_key: &[u8]) -> [u8; SESSION_KEY_LEN] {
    let hk = Hkdf::<Sha256>::new(None, raw_srp_key);
    let mut okm = [0u8; SESSION_KEY_LEN];
    hk.expand(b"corral-transport-session-key", &mut okm)
        .expect("HKDF output length is valid for SHA-256");
    okm
}
