//! Thin, deterministic facade over ECDSA P-256 / SHA-256 sign, verify, and
//! SPKI/PKCS8 PEM import/export.
//!
//! This is the crate's one trusted black box (§4.1 of `SPEC_FULL.md`): the
//! rest of the system is tested against it, never around it. Keeping it this
//! small is what lets [`crate::owid`] be exercised with a fixed, deterministic
//! signature in unit tests without pulling in randomness anywhere else.

use p256::ecdsa::signature::{Signer as _, Verifier as _};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::spki::{DecodePublicKey, EncodePublicKey};
use p256::pkcs8::{DecodePrivateKey, EncodePrivateKey, LineEnding};
use p256::{PublicKey, SecretKey};
use rand_core::OsRng;

use crate::error::{OwidError, Result};

/// A materialized P-256 key, either half of an ECDSA keypair.
///
/// `Key` (in `key.rs`) caches one of these lazily; `Crypto` never caches
/// anything itself.
#[derive(Clone)]
pub enum CryptoKey {
    Public(VerifyingKey),
    Private(SigningKey),
}

impl CryptoKey {
    /// Generates a fresh P-256 keypair. Both halves are exportable to PEM.
    pub fn generate() -> (CryptoKey, CryptoKey) {
        let signing_key = SigningKey::random(&mut OsRng);
        let verifying_key = *signing_key.verifying_key();
        (CryptoKey::Private(signing_key), CryptoKey::Public(verifying_key))
    }

    /// Signs `message`, producing a raw 64-byte `r||s` signature. Fails
    /// [`OwidError::KeyMisuse`] if this key is a public key.
    pub fn sign(&self, message: &[u8]) -> Result<[u8; 64]> {
        match self {
            CryptoKey::Private(sk) => {
                let sig: Signature = sk.sign(message);
                let bytes = sig.to_bytes();
                let mut out = [0u8; 64];
                out.copy_from_slice(&bytes);
                Ok(out)
            }
            CryptoKey::Public(_) => Err(OwidError::KeyMisuse("sign requires a private key")),
        }
    }

    /// Verifies `signature` over `message`. Fails [`OwidError::KeyMisuse`]
    /// if this key is a private key; returns `Ok(false)` (never an error)
    /// for an otherwise-well-formed signature that simply doesn't match.
    pub fn verify(&self, signature: &[u8; 64], message: &[u8]) -> Result<bool> {
        match self {
            CryptoKey::Public(vk) => {
                let sig = Signature::from_slice(signature)
                    .map_err(|e| OwidError::Crypto(e.to_string()))?;
                Ok(vk.verify(message, &sig).is_ok())
            }
            CryptoKey::Private(_) => Err(OwidError::KeyMisuse("verify requires a public key")),
        }
    }

    /// Exports this key as a standard 64-column SPKI (public) or PKCS8
    /// (private) PEM document.
    pub fn export_pem(&self) -> Result<String> {
        match self {
            CryptoKey::Public(vk) => {
                let public_key = PublicKey::from(vk);
                public_key
                    .to_public_key_pem(LineEnding::LF)
                    .map_err(|e| OwidError::Crypto(e.to_string()))
            }
            CryptoKey::Private(sk) => {
                let secret_key = SecretKey::from(sk.clone());
                secret_key
                    .to_pkcs8_pem(LineEnding::LF)
                    .map(|zeroizing| zeroizing.to_string())
                    .map_err(|e| OwidError::Crypto(e.to_string()))
            }
        }
    }

    /// Imports a PEM document, selecting public vs. private mode from the
    /// `BEGIN ... KEY` marker alone, as the spec requires.
    pub fn import_pem(pem: &str) -> Result<CryptoKey> {
        let trimmed = pem.trim();
        if trimmed.contains("BEGIN PUBLIC KEY") {
            let public_key = PublicKey::from_public_key_pem(trimmed)
                .map_err(|e| OwidError::InvalidPem(e.to_string()))?;
            Ok(CryptoKey::Public(VerifyingKey::from(public_key)))
        } else if trimmed.contains("BEGIN PRIVATE KEY") {
            let secret_key = SecretKey::from_pkcs8_pem(trimmed)
                .map_err(|e| OwidError::InvalidPem(e.to_string()))?;
            Ok(CryptoKey::Private(SigningKey::from(secret_key)))
        } else {
            Err(OwidError::InvalidPem(
                "PEM document has neither a PUBLIC KEY nor a PRIVATE KEY marker".to_string(),
            ))
        }
    }

    pub fn is_private(&self) -> bool {
        matches!(self, CryptoKey::Private(_))
    }
}
