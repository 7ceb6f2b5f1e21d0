//! secp256k1 signatures over mined payloads.
//!
//! Signing is deterministic (RFC 6979) over the SHA-256 of the payload, so a
//! key and payload always produce the same signature. Keys and signatures
//! travel as hex: compressed 33-byte public keys, 32-byte secret keys and
//! compact 64-byte signatures.

use crate::error::SignatureError;
use crate::sha256;
use once_cell::sync::Lazy;
use secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};

static SECP256K1_CONTEXT: Lazy<Secp256k1<All>> = Lazy::new(Secp256k1::new);

#[derive(Debug, Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    public_key: PublicKey,
}

impl KeyPair {
    pub fn generate() -> Self {
        let (secret_key, public_key) =
            SECP256K1_CONTEXT.generate_keypair(&mut secp256k1::rand::thread_rng());
        Self {
            secret_key,
            public_key,
        }
    }

    pub fn from_secret_hex(secret_hex: &str) -> Result<Self, SignatureError> {
        let bytes = hex::decode(secret_hex)
            .map_err(|e| SignatureError::MalformedSecretKey(e.to_string()))?;
        let secret_key = SecretKey::from_slice(&bytes)
            .map_err(|e| SignatureError::MalformedSecretKey(e.to_string()))?;
        let public_key = PublicKey::from_secret_key(&SECP256K1_CONTEXT, &secret_key);
        Ok(Self {
            secret_key,
            public_key,
        })
    }

    pub fn secret_key_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Compact signature over `payload`, hex encoded.
    pub fn sign(&self, payload: &[u8]) -> String {
        let signature = SECP256K1_CONTEXT.sign_ecdsa(&message_for(payload), &self.secret_key);
        hex::encode(signature.serialize_compact())
    }

    pub fn verify(&self, payload: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
        verify_with_key(&self.public_key, payload, signature_hex)
    }
}

fn message_for(payload: &[u8]) -> Message {
    Message::from_digest(sha256(payload))
}

/// Check `signature_hex` over `payload` against a hex public key. Malformed
/// inputs and a signature that does not match are reported as different
/// errors.
pub fn verify(public_key_hex: &str, payload: &[u8], signature_hex: &str) -> Result<(), SignatureError> {
    let key_bytes = hex::decode(public_key_hex)
        .map_err(|e| SignatureError::MalformedPublicKey(e.to_string()))?;
    let public_key = PublicKey::from_slice(&key_bytes)
        .map_err(|e| SignatureError::MalformedPublicKey(e.to_string()))?;
    verify_with_key(&public_key, payload, signature_hex)
}

fn verify_with_key(
    public_key: &PublicKey,
    payload: &[u8],
    signature_hex: &str,
) -> Result<(), SignatureError> {
    let sig_bytes = hex::decode(signature_hex)
        .map_err(|e| SignatureError::MalformedSignature(e.to_string()))?;
    let signature = Signature::from_compact(&sig_bytes)
        .map_err(|e| SignatureError::MalformedSignature(e.to_string()))?;
    SECP256K1_CONTEXT
        .verify_ecdsa(&message_for(payload), &signature, public_key)
        .map_err(|_| SignatureError::InvalidSignature)
}
