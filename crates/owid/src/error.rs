//! Aggregated error type for this crate

use crate::signer::SignerKey;

pub(crate) type Result<T> = std::result::Result<T, OwidError>;

/// Fatal errors that can occur while building, signing, verifying, decoding
/// or caching an [`crate::owid::Owid`].
///
/// Non-fatal verification outcomes (signature mismatch, no time-eligible
/// key, unknown signer) are never represented here — they are ordinary
/// [`crate::owid::VerifiedStatus`] values returned from the relevant
/// `verify_with_*` call.
#[derive(thiserror::Error, Debug)]
pub enum OwidError {
    #[error("byte value {0} is out of range for a single byte")]
    OutOfRange(u32),

    #[error("cannot write an empty string")]
    EmptyString,

    #[error("string or array exceeds the 16-bit count prefix (len {0})")]
    TooLong(usize),

    #[error("signature must be exactly 64 bytes, got {0}")]
    BadSignatureLength(usize),

    #[error("attempted to read past the end of the buffer")]
    Truncated,

    #[error("unsupported OWID version {0}, only version 1 is defined")]
    UnsupportedVersion(u8),

    #[error("OWID has no target set")]
    NoTarget,

    #[error("OWID has no domain set")]
    NoDomain,

    #[error("signer {0:?} has no private keys to sign with")]
    NoPrivateKey(SignerKey),

    #[error("key does not support the requested operation: {0}")]
    KeyMisuse(&'static str),

    #[error("signer domain {signer_domain:?} does not match OWID domain {owid_domain:?}")]
    DomainMismatch {
        signer_domain: String,
        owid_domain: String,
    },

    #[error("fetching signer for {0:?} failed: {1}")]
    SignerFetchFailed(SignerKey, String),

    #[error("operation cancelled after deadline elapsed")]
    Cancelled,

    #[error("PEM key material was malformed: {0}")]
    InvalidPem(String),

    #[error("cryptographic operation failed: {0}")]
    Crypto(String),

    #[error(transparent)]
    Base64(#[from] base64::DecodeError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
