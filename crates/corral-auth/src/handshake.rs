// SPDX-License-Identifier: Apache-2.0
//! Server-side SRP handshake state machine and wire message shapes, using
//! the same tagged-union message style (`#[serde(tag = "type")]`) as the
//! rest of the transport's wire messages.

use serde::{Deserialize, Serialize};

use crate::error::{AuthError, AuthErrorCode};
use crate::identity::IdentityRecord;
use crate::session_store::SessionStore;
use crate::srp_core;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientAuthMessage {
    Hello {
        identity: String,
        #[serde(rename = "A")]
        a_pub_hex: String,
        browser_profile_id: Option<String>,
        origin_metadata: Option<serde_json::Value>,
    },
    Proof {
        #[serde(rename = "A")]
        a_pub_hex: String,
        #[serde(rename = "M1")]
        m1_hex: String,
    },
    Resume {
        identity: String,
        session_id: String,
        proof: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerAuthMessage {
    Challenge {
        salt: String,
        #[serde(rename = "B")]
        b_pub_hex: String,
    },
    Verify {
        #[serde(rename = "M2")]
        m2_hex: String,
        session_id: Option<String>,
    },
    Resumed {
        session_id: String,
    },
    Invalid {
        reason: String,
    },
    Error {
        code: AuthErrorCode,
        message: String,
    },
}

/// SRP is strictly sequential per connection; this tracks which message the
/// connection expects next and rejects anything else with `server_error`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    AwaitingHello,
    AwaitingProof,
    Done,
}

pub struct ServerHandshakeSession {
    phase: Phase,
    identity: Option<String>,
    b_private: Option<Vec<u8>>,
}

impl Default for ServerHandshakeSession {
    fn default() -> Self {
        Self {
            phase: Phase::AwaitingHello,
            identity: None,
            b_private: None,
        }
    }
}

pub struct HandshakeOutcome {
    pub reply: ServerAuthMessage,
    /// Present only once `verify` succeeds — the derived transport key.
    pub session_key: Option<[u8; 32]>,
}

impl ServerHandshakeSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn handle(
        &mut self,
        msg: ClientAuthMessage,
        lookup: &dyn Fn(&str) -> Option<IdentityRecord>,
        sessions: &SessionStore,
    ) -> Result<HandshakeOutcome, AuthError> {
        match (self.phase, msg) {
            (Phase::AwaitingHello, ClientAuthMessage::Hello { identity, .. }) => {
                let Some(record) = lookup(&identity) else {
                    return Ok(HandshakeOutcome {
                        reply: ServerAuthMessage::Error {
                            code: AuthErrorCode::InvalidIdentity,
                            message: format!("unknown identity: {identity}"),
                        },
                        session_key: None,
                    });
                };

                let b_private = srp_core::random_ephemeral();
                let b_pub = srp_core::server_public_ephemeral(&record.verifier, &b_private);

                self.identity = Some(identity);
                self.b_private = Some(b_private);
                self.phase = Phase::AwaitingProof;

                Ok(HandshakeOutcome {
                    reply: ServerAuthMessage::Challenge {
                        salt: hex::encode(&record.salt),
                        b_pub_hex: hex::encode(b_pub),
                    },
                    session_key: None,
                })
            }
            (
                Phase::AwaitingProof,
                ClientAuthMessage::Proof {
                    a_pub_hex,
                    m1_hex,
                },
            ) => {
                let identity = self.identity.clone().ok_or_else(|| AuthError::Internal("proof before hello".into()))?;
                let record = lookup(&identity).ok_or_else(|| AuthError::UnknownIdentity(identity.clone()))?;
                let b_private = self.b_private.clone().ok_or_else(|| AuthError::Internal("missing server ephemeral".into()))?;
                let a_pub = hex::decode(&a_pub_hex).map_err(|_| AuthError::InvalidProof)?;
                let m1 = hex::decode(&m1_hex).map_err(|_| AuthError::InvalidProof)?;

                let handshake = srp_core::server_process_proof(&b_private, &record.verifier, &identity, &a_pub)?;
                let m2 = handshake.verify_client_and_make_proof(&m1)?;
                let session_key = srp_core::derive_session_key(handshake.raw_key());

                let session_id = sessions.create(&identity, session_key).await;
                self.phase = Phase::Done;

                Ok(HandshakeOutcome {
                    reply: ServerAuthMessage::Verify {
                        m2_hex: hex::encode(m2),
                        session_id: Some(session_id),
                    },
                    session_key: Some(session_key),
                })
            }
            (phase, msg) => Err(AuthError::OutOfOrder {
                expected: expected_name(phase),
                got: message_name(&msg),
            }),
        }
    }

    /// Resume path bypasses the full handshake: the session store is
    /// consulted directly for a match on `(identity, sessionId)` and a
    /// caller-supplied `proof` (an HMAC over the stored session key — the
    /// exact proof scheme is an implementation detail of the client/server
    /// pairing).
    pub async fn resume(
        identity: &str,
        session_id: &str,
        proof: &str,
        sessions: &SessionStore,
    ) -> Result<ServerAuthMessage, AuthError> {
        match sessions.verify_resume(identity, session_id, proof).await {
            Some(()) => Ok(ServerAuthMessage::Resumed {
                session_id: session_id.to_string(),
            }),
            None => Ok(ServerAuthMessage::Invalid {
                reason: "session not found or proof mismatch".to_string(),
            }),
        }
    }
}

fn expected_name(phase: Phase) -> &'static str {
    match phase {
        Phase::AwaitingHello => "hello",
        Phase::AwaitingProof => "proof",
        Phase::Done => "none",
    }
}

fn message_name(msg: &ClientAuthMessage) -> &'static str {
    match msg {
        ClientAuthMessage::Hello { .. } => "hello",
        ClientAuthMessage::Proof { .. } => "proof",
        ClientAuthMessage::Resume { .. } => "resume",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::srp_core::{client_process_challenge, client_public_ephemeral, random_ephemeral};

    fn identity_store() -> (IdentityRecord, impl Fn(&str) -> Option<IdentityRecord>) {
        let record = IdentityRecord::derive("alice", "hunter2");
        let record_for_closure = record.clone();
        (record, move |name: &str| {
            (name == "alice").then(|| record_for_closure.clone())
        })
    }

    #[tokio::test]
    async fn full_handshake_succeeds_with_correct_password() {
        let (_, lookup) = identity_store();
        let sessions = SessionStore::new();
        let mut server = ServerHandshakeSession::new();

        let a_priv = random_ephemeral();
        let a_pub = client_public_ephemeral(&a_priv);

        let hello_reply = server
            .handle(
                ClientAuthMessage::Hello {
                    identity: "alice".into(),
                    a_pub_hex: hex::encode(&a_pub),
                    browser_profile_id: None,
                    origin_metadata: None,
                },
                &lookup,
                &sessions,
            )
            .await
            .unwrap();

        let ServerAuthMessage::Challenge { salt, b_pub_hex } = hello_reply.reply else {
            panic!("expected challenge");
        };
        let salt = hex::decode(salt).unwrap();
        let b_pub = hex::decode(b_pub_hex).unwrap();

        let client = client_process_challenge(&a_priv, "alice", "hunter2", &salt, &b_pub).unwrap();
        let m1 = client.proof();

        let proof_reply = server
            .handle(
                ClientAuthMessage::Proof {
                    a_pub_hex: hex::encode(&a_pub),
                    m1_hex: hex::encode(&m1),
                },
                &lookup,
                &sessions,
            )
            .await
            .unwrap();

        let ServerAuthMessage::Verify { m2_hex, session_id } = proof_reply.reply else {
            panic!("expected verify");
        };
        assert!(session_id.is_some());
        let m2 = hex::decode(m2_hex).unwrap();
        assert!(client.verify_server(&m2).is_ok());
        assert!(proof_reply.session_key.is_some());
    }

    #[tokio::test]
    async fn wrong_password_fails_proof_verification() {
        let (_, lookup) = identity_store();
        let sessions = SessionStore::new();
        let mut server = ServerHandshakeSession::new();

        let a_priv = random_ephemeral();
        let a_pub = client_public_ephemeral(&a_priv);

        let hello_reply = server
            .handle(
                ClientAuthMessage::Hello {
                    identity: "alice".into(),
                    a_pub_hex: hex::encode(&a_pub),
                    browser_profile_id: None,
                    origin_metadata: None,
                },
                &lookup,
                &sessions,
            )
            .await
            .unwrap();
        let ServerAuthMessage::Challenge { salt, b_pub_hex } = hello_reply.reply else {
            panic!("expected challenge");
        };
        let salt = hex::decode(salt).unwrap();
        let b_pub = hex::decode(b_pub_hex).unwrap();

        let client = client_process_challenge(&a_priv, "alice", "wrong-password", &salt, &b_pub).unwrap();
        let m1 = client.proof();

        let result = server
            .handle(
                ClientAuthMessage::Proof {
                    a_pub_hex: hex::encode(&a_pub),
                    m1_hex: hex::encode(&m1),
                },
                &lookup,
                &sessions,
            )
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn out_of_order_proof_before_hello_is_rejected() {
        let (_, lookup) = identity_store();
        let sessions = SessionStore::new();
        let mut server = ServerHandshakeSession::new();

        let result = server
            .handle(
                ClientAuthMessage::Proof {
                    a_pub_hex: "00".into(),
                    m1_hex: "00".into(),
                },
                &lookup,
                &sessions,
            )
            .await;
        assert!(matches!(result, Err(AuthError::OutOfOrder { .. })));
    }

    #[tokio::test]
    async fn unknown_identity_returns_invalid_identity_error() {
        let (_, lookup) = identity_store();
        let sessions = SessionStore::new();
        let mut server = ServerHandshakeSession::new();

        let outcome = server
            .handle(
                ClientAuthMessage::Hello {
                    identity: "bob".into(),
                    a_pub_hex: "00".into(),
                    browser_profile_id: None,
                    origin_metadata: None,
                },
                &lookup,
                &sessions,
            )
            .await
            .unwrap();

        assert!(matches!(
            outcome.reply,
            ServerAuthMessage::Error { code: AuthErrorCode::InvalidIdentity, .. }
        ));
    }
}
