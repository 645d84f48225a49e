// SPDX-License-Identifier: Apache-2.0
//! Binary envelope framing over the session key.
//!
//! `[1 byte version=0x01][24 byte nonce][ciphertext]`, where the ciphertext
//! decrypts (NaCl secretbox / xsalsa20-poly1305) to `[1 byte inner
//! format][inner payload]`. A legacy unencrypted variant (`[1 byte
//! format]` + payload, no envelope) is kept for clients that never
//! establish a session key.

use crypto_secretbox::aead::{Aead, KeyInit};
use crypto_secretbox::{Key, Nonce, XSalsa20Poly1305};
use rand_core::{OsRng, RngCore};

use crate::error::TransportError;

pub const ENVELOPE_VERSION: u8 = 0x01;
const VERSION_LEN: usize = 1;
const NONCE_LEN: usize = 24;
const MIN_ENVELOPE_LEN: usize = VERSION_LEN + NONCE_LEN + 16 + 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InnerFormat {
    Json = 0x01,
    UploadChunk = 0x02,
    GzipJson = 0x03,
}

impl InnerFormat {
    fn from_byte(b: u8) -> Result<Self, TransportError> {
        match b {
            0x01 => Ok(InnerFormat::Json),
            0x02 => Ok(InnerFormat::UploadChunk),
            0x03 => Ok(InnerFormat::GzipJson),
            other => Err(TransportError::UnknownInnerFormat(other)),
        }
    }
}

pub struct DecodedEnvelope {
    pub format: InnerFormat,
    pub payload: Vec<u8>,
}

/// Encrypt `inner_format || payload` into a versioned envelope under `key`.
pub fn encrypt(key: &[u8; 32], format: InnerFormat, payload: &[u8]) -> Vec<u8> {
    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let mut plaintext = Vec::with_capacity(1 + payload.len());
    plaintext.push(format as u8);
    plaintext.extend_from_slice(payload);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_ref())
        .expect("secretbox encryption does not fail for bounded plaintexts");

    let mut envelope = Vec::with_capacity(VERSION_LEN + NONCE_LEN + ciphertext.len());
    envelope.push(ENVELOPE_VERSION);
    envelope.extend_from_slice(&nonce_bytes);
    envelope.extend_from_slice(&ciphertext);
    envelope
}

/// Decrypt and validate a binary envelope: total length >= 42, version
/// byte strictly 0x01, known inner format byte.
pub fn decrypt(key: &[u8; 32], frame: &[u8]) -> Result<DecodedEnvelope, TransportError> {
    if frame.len() < MIN_ENVELOPE_LEN {
        return Err(TransportError::EnvelopeTooShort);
    }
    let version = frame[0];
    if version != ENVELOPE_VERSION {
        return Err(TransportError::UnknownVersion(version));
    }

    let nonce = Nonce::from_slice(&frame[VERSION_LEN..VERSION_LEN + NONCE_LEN]);
    let ciphertext = &frame[VERSION_LEN + NONCE_LEN..];

    let cipher = XSalsa20Poly1305::new(Key::from_slice(key));
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| TransportError::DecryptionFailed)?;

    let format_byte = *plaintext.first().ok_or(TransportError::EnvelopeTooShort)?;
    let format = InnerFormat::from_byte(format_byte)?;
    Ok(DecodedEnvelope {
        format,
        payload: plaintext[1..].to_vec(),
    })
}

/// Build the legacy unencrypted frame: `[1 byte format] + payload`, used
/// before a session key exists or for clients that opt out of encryption.
pub fn encode_legacy(format: InnerFormat, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(1 + payload.len());
    out.push(format as u8);
    out.extend_from_slice(payload);
    out
}

pub fn decode_legacy(frame: &[u8]) -> Result<DecodedEnvelope, TransportError> {
    let format_byte = *frame.first().ok_or(TransportError::EnvelopeTooShort)?;
    let format = InnerFormat::from_byte(format_byte)?;
    Ok(DecodedEnvelope {
        format,
        payload: frame[1..].to_vec(),
    })
}

/// Gzip-compress a JSON payload for the `0x03` inner format.
pub fn gzip_compress(json: &[u8]) -> Vec<u8> {
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(json)
        .expect("writing to an in-memory encoder cannot fail");
    encoder.finish().expect("finishing an in-memory encoder cannot fail")
}

pub fn gzip_decompress(bytes: &[u8]) -> Result<Vec<u8>, TransportError> {
    use flate2::read::GzDecoder;
    use std::io::Read;

    let mut decoder = GzDecoder::new(bytes);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| TransportError::GzipInflate(e.to_string()))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key() -> [u8; 32] {
        [42u8; 32]
    }

    #[test]
    fn json_round_trips_through_an_encrypted_envelope() {
        let payload = br#"{"hello":"world"}"#;
        let envelope = encrypt(&key(), InnerFormat::Json, payload);
        let decoded = decrypt(&key(), &envelope).unwrap();
        assert_eq!(decoded.format, InnerFormat::Json);
        assert_eq!(decoded.payload, payload);
    }

    #[test]
    fn wrong_key_fails_decryption() {
        let envelope = encrypt(&key(), InnerFormat::Json, b"{}");
        let wrong_key = [7u8; 32];
        assert!(matches!(
            decrypt(&wrong_key, &envelope),
            Err(TransportError::DecryptionFailed)
        ));
    }

    #[test]
    fn too_short_frame_is_rejected() {
        assert!(matches!(
            decrypt(&key(), &[0x01, 0x02, 0x03]),
            Err(TransportError::EnvelopeTooShort)
        ));
    }

    #[test]
    fn unknown_version_is_rejected_with_close_code() {
        let mut envelope = encrypt(&key(), InnerFormat::Json, b"{}");
        envelope[0] = 0x09;
        let err = decrypt(&key(), &envelope).unwrap_err();
        assert!(matches!(err, TransportError::UnknownVersion(0x09)));
        assert_eq!(err.close_code(), Some(crate::error::close_code::UNKNOWN_VERSION));
    }

    #[test]
    fn legacy_frame_round_trips_without_an_envelope() {
        let frame = encode_legacy(InnerFormat::Json, b"{}");
        let decoded = decode_legacy(&frame).unwrap();
        assert_eq!(decoded.format, InnerFormat::Json);
        assert_eq!(decoded.payload, b"{}");
    }

    #[test]
    fn gzip_json_round_trips() {
        let payload = br#"{"a":1,"b":2,"c":[1,2,3,4,5]}"#;
        let compressed = gzip_compress(payload);
        let restored = gzip_decompress(&compressed).unwrap();
        assert_eq!(restored, payload);
    }
}
