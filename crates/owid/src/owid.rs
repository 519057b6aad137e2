//! The canonical message builder, signer, verifier, serializer, and status
//! reporter for a single OWID.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::SignerCache;
use crate::crypto::CryptoKey;
use crate::error::{OwidError, Result};
use crate::io::{b64, Reader, Writer};
use crate::key::Key;
use crate::signer::{Signer, SignerKey};
use crate::target::Target;
use crate::time;

/// Tolerance absorbed when selecting a time-eligible public key: a key is
/// eligible if `owid.timestamp >= key.created_date - time_tolerance()`.
fn time_tolerance() -> chrono::Duration {
    chrono::Duration::milliseconds(3_600_000)
}

/// Terminal (and transient) outcomes of a verification attempt.
///
/// `NotStarted` is the initial state of a freshly constructed, unsigned
/// OWID. `Processing` is set the instant any `verify_with_*` call begins and
/// is never observable by a caller awaiting that same call — it exists so
/// mid-flight state is well-defined if a caller inspects `status()` from
/// another task while a verification is in progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedStatus {
    NotStarted,
    Processing,
    Valid,
    NotValid,
    SignerNotFound,
    KeyNotFound,
    Exception,
}

impl std::fmt::Display for VerifiedStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            VerifiedStatus::NotStarted => "not-started",
            VerifiedStatus::Processing => "processing",
            VerifiedStatus::Valid => "valid",
            VerifiedStatus::NotValid => "not-valid",
            VerifiedStatus::SignerNotFound => "signer-not-found",
            VerifiedStatus::KeyNotFound => "key-not-found",
            VerifiedStatus::Exception => "exception",
        };
        f.write_str(s)
    }
}

/// JSON wire form: `{version, domain, timestamp, signature}`, with
/// `signature` as base64 of the raw 64 bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct OwidDto {
    version: u8,
    domain: String,
    timestamp: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    signature: Option<String>,
}

/// A portable, cryptographically attested identifier binding `target`'s
/// canonical bytes to a signer domain, a timestamp, and a format version.
///
/// `Owid` is generic over its target so the compiler — not a runtime check —
/// enforces that the bytes contributed at sign time are the same value
/// contributed at verify time (§3's "target's contributed bytes at sign time
/// equal ... at verify time" invariant). Use [`crate::target::AnyTarget`] as
/// `T` for heterogeneous collections.
#[derive(Debug)]
pub struct Owid<T: Target> {
    target: T,
    version: u8,
    domain: String,
    timestamp: u32,
    signature: Option<[u8; 64]>,
    status: VerifiedStatus,
    signer: Option<Arc<Signer>>,
}

impl<T: Target> Owid<T> {
    /// Constructs an unsigned OWID bound to `target`.
    pub fn new(target: T) -> Self {
        Self {
            target,
            version: 0,
            domain: String::new(),
            timestamp: 0,
            signature: None,
            status: VerifiedStatus::NotStarted,
            signer: None,
        }
    }

    /// Reconstructs an OWID from its byte form (§4.5), binding it to
    /// `target`. Fails [`OwidError::UnsupportedVersion`] if the version byte
    /// isn't `1`.
    pub fn from_bytes(target: T, bytes: &[u8]) -> Result<Self> {
        let mut reader = Reader::new(bytes);
        let version = reader.read_byte()?;
        if version != 1 {
            return Err(OwidError::UnsupportedVersion(version));
        }
        let domain = reader.read_string()?;
        let timestamp = reader.read_date()?;
        let signature = reader.read_signature()?;
        Ok(Self {
            target,
            version,
            domain,
            timestamp,
            signature: Some(signature),
            status: VerifiedStatus::NotStarted,
            signer: None,
        })
    }

    /// Serializes this OWID's byte form (§4.5). The target's bytes are not
    /// included — they're serialized by whatever structure owns the target.
    /// Fails if the OWID hasn't been signed yet.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let signature = self.signature.ok_or(OwidError::BadSignatureLength(0))?;
        let mut writer = Writer::new();
        writer.write_byte(self.version as u32)?;
        writer.write_string(&self.domain)?;
        writer.write_date(self.timestamp);
        writer.write_signature(&signature)?;
        Ok(writer.into_bytes())
    }

    /// Reconstructs an OWID from its JSON form (§4.5/§6).
    pub fn from_json(target: T, json: &str) -> Result<Self> {
        let dto: OwidDto = serde_json::from_str(json)?;
        if dto.version != 1 {
            return Err(OwidError::UnsupportedVersion(dto.version));
        }
        let signature = match dto.signature {
            Some(s) => {
                let bytes = b64::decode(&s)?;
                if bytes.len() != 64 {
                    return Err(OwidError::BadSignatureLength(bytes.len()));
                }
                let mut sig = [0u8; 64];
                sig.copy_from_slice(&bytes);
                Some(sig)
            }
            None => None,
        };
        Ok(Self {
            target,
            version: dto.version,
            domain: dto.domain,
            timestamp: dto.timestamp,
            signature,
            status: VerifiedStatus::NotStarted,
            signer: None,
        })
    }

    pub fn to_json(&self) -> Result<String> {
        let dto = OwidDto {
            version: self.version,
            domain: self.domain.clone(),
            timestamp: self.timestamp,
            signature: self.signature.map(|s| b64::encode(&s)),
        };
        Ok(serde_json::to_string(&dto)?)
    }

    pub fn target(&self) -> &T {
        &self.target
    }

    pub fn version(&self) -> u8 {
        self.version
    }

    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Mutable access to `domain`, for callers assembling an OWID field by
    /// field before signing (and for tampering it afterward, in tests of
    /// §8 property 2).
    pub fn domain_mut(&mut self) -> &mut String {
        &mut self.domain
    }

    pub fn timestamp(&self) -> u32 {
        self.timestamp
    }

    pub fn timestamp_mut(&mut self) -> &mut u32 {
        &mut self.timestamp
    }

    /// Mutable access to the raw signature bytes, for tampering tests (§8
    /// property 4/6). Ordinary callers should use `sign_with_*`.
    pub fn signature_mut(&mut self) -> &mut Option<[u8; 64]> {
        &mut self.signature
    }

    pub fn signature(&self) -> Option<&[u8; 64]> {
        self.signature.as_ref()
    }

    pub fn signature_base64(&self) -> Option<String> {
        self.signature.map(|s| b64::encode(&s))
    }

    /// True iff the signature is present (and, by construction, exactly 64
    /// bytes — the only length a `[u8; 64]` can ever hold).
    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }

    pub fn status(&self) -> VerifiedStatus {
        self.status
    }

    /// The signer recorded by the most recent `verify_with_signer` or
    /// `verify_with_service` call, if any. `verify_with_crypto` and
    /// `verify_with_public_key(s)` never set this.
    pub fn signer(&self) -> Option<&Arc<Signer>> {
        self.signer.as_ref()
    }

    fn assemble_message(&self) -> Result<Vec<u8>> {
        if self.domain.is_empty() {
            return Err(OwidError::NoDomain);
        }
        let mut writer = Writer::new();
        self.target.add_owid_data(&mut writer)?;
        writer.write_byte(self.version as u32)?;
        writer.write_string(&self.domain)?;
        writer.write_date(self.timestamp);
        Ok(writer.into_bytes())
    }

    fn fail(&mut self, err: OwidError) -> Result<VerifiedStatus> {
        tracing::warn!(domain = %self.domain, error = %err, "owid verification raised an exception");
        self.status = VerifiedStatus::Exception;
        self.signer = None;
        Err(err)
    }

    // -- signing --------------------------------------------------------

    /// Signs with an already-materialized private key: sets `version <- 1`,
    /// `timestamp <- now`, assembles the message (§4.4), signs, and stores
    /// the 64-byte signature.
    pub fn sign_with_crypto_key(&mut self, key: &CryptoKey) -> Result<()> {
        if !key.is_private() {
            return Err(OwidError::KeyMisuse("signing requires a private key"));
        }
        if self.domain.is_empty() {
            return Err(OwidError::NoDomain);
        }
        self.version = 1;
        self.timestamp = time::now_in_minutes();
        let message = self.assemble_message()?;
        self.signature = Some(key.sign(&message)?);
        tracing::debug!(domain = %self.domain, timestamp = self.timestamp, "signed owid");
        Ok(())
    }

    pub fn sign_with_pem_key(&mut self, pem: &str) -> Result<()> {
        let key = CryptoKey::import_pem(pem)?;
        self.sign_with_crypto_key(&key)
    }

    /// Signs using the newest private key of `signer` (ties broken by list
    /// order, first wins), setting `domain <- signer.domain` first.
    pub fn sign_with_signer(&mut self, signer: &Signer) -> Result<()> {
        let key = signer.newest_private_key()?;
        let crypto_key = key.crypto_key()?.clone();
        self.domain = signer.domain.clone();
        self.sign_with_crypto_key(&crypto_key)?;
        self.signer = Some(Arc::new(signer.clone()));
        Ok(())
    }

    // -- verifying --------------------------------------------------------

    /// Reassembles the signed message and calls the crypto primitive
    /// directly. Never sets the recorded signer.
    pub fn verify_with_crypto(&mut self, key: &CryptoKey) -> Result<VerifiedStatus> {
        self.status = VerifiedStatus::Processing;
        self.signer = None;

        let message = match self.assemble_message() {
            Ok(m) => m,
            Err(e) => return self.fail(e),
        };
        let signature = match self.signature {
            Some(s) => s,
            None => return self.fail(OwidError::BadSignatureLength(0)),
        };

        match key.verify(&signature, &message) {
            Ok(true) => {
                self.status = VerifiedStatus::Valid;
                Ok(VerifiedStatus::Valid)
            }
            Ok(false) => {
                self.status = VerifiedStatus::NotValid;
                Ok(VerifiedStatus::NotValid)
            }
            Err(e) => self.fail(e),
        }
    }

    /// Materializes `key`'s crypto key (lazily, cached on the `Key`) then
    /// delegates to [`Owid::verify_with_crypto`].
    pub fn verify_with_public_key(&mut self, key: &Key) -> Result<VerifiedStatus> {
        self.status = VerifiedStatus::Processing;
        self.signer = None;
        match key.crypto_key() {
            Ok(crypto_key) => self.verify_with_crypto(crypto_key),
            Err(e) => self.fail(e),
        }
    }

    /// Selects the first key in `keys` whose adjusted creation time (created
    /// minus a fixed tolerance) is at or before this OWID's timestamp, and
    /// verifies against that key only — it never falls through to a later
    /// key if the chosen one fails to verify (§9, §8 property 6).
    ///
    /// Returns [`VerifiedStatus::KeyNotFound`], not an error, if no key in
    /// the list is time-eligible.
    pub fn verify_with_public_keys(&mut self, keys: &[Key]) -> Result<VerifiedStatus> {
        self.status = VerifiedStatus::Processing;
        self.signer = None;

        let owid_instant = time::from_minutes(self.timestamp);
        let selected = keys.iter().find(|key| key.created_date() - time_tolerance() <= owid_instant);

        match selected {
            None => {
                self.status = VerifiedStatus::KeyNotFound;
                Ok(VerifiedStatus::KeyNotFound)
            }
            Some(key) => self.verify_with_public_key(key),
        }
    }

    /// Requires `signer.domain == self.domain` (else fatal
    /// [`OwidError::DomainMismatch`]); delegates to
    /// [`Owid::verify_with_public_keys`]. Records `signer` when the
    /// delegate actually evaluated a key (`Valid` or `NotValid`) — not on
    /// `KeyNotFound`, which never consulted the signer's keys at all.
    pub fn verify_with_signer(&mut self, signer: &Signer) -> Result<VerifiedStatus> {
        if signer.domain != self.domain {
            return self.fail(OwidError::DomainMismatch {
                signer_domain: signer.domain.clone(),
                owid_domain: self.domain.clone(),
            });
        }
        let status = self.verify_with_public_keys(&signer.public_keys)?;
        if matches!(status, VerifiedStatus::Valid | VerifiedStatus::NotValid) {
            self.signer = Some(Arc::new(signer.clone()));
        }
        Ok(status)
    }

    /// Resolves a signer via `cache` and delegates to
    /// [`Owid::verify_with_signer`]. Returns
    /// [`VerifiedStatus::SignerNotFound`], not an error, if the cache has no
    /// signer for this OWID's `(version, domain)`.
    pub async fn verify_with_service<C: SignerCache + ?Sized>(
        &mut self,
        cache: &C,
    ) -> Result<VerifiedStatus> {
        self.status = VerifiedStatus::Processing;
        self.signer = None;

        let key = SignerKey::new(self.version, self.domain.clone());
        match cache.get(&key).await? {
            None => {
                self.status = VerifiedStatus::SignerNotFound;
                Ok(VerifiedStatus::SignerNotFound)
            }
            Some(signer) => self.verify_with_signer(&signer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target::StringTarget;
    use chrono::Utc;

    fn signed_owid() -> (Owid<StringTarget>, CryptoKey, CryptoKey) {
        let (sk, pk) = CryptoKey::generate();
        let mut owid = Owid::new(StringTarget::new("example test"));
        *owid.domain_mut() = "example.test".to_string();
        owid.sign_with_crypto_key(&sk).unwrap();
        (owid, sk, pk)
    }

    // property 1: sign/verify round trip
    #[test]
    fn sign_verify_round_trip() {
        let (mut owid, _, pk) = signed_owid();
        assert_eq!(owid.verify_with_crypto(&pk).unwrap(), VerifiedStatus::Valid);
        assert_eq!(owid.status(), VerifiedStatus::Valid);
    }

    // property 2: domain tampering
    #[test]
    fn domain_tampering_invalidates_signature() {
        let (mut owid, _, pk) = signed_owid();
        *owid.domain_mut() = "attacker.test".to_string();
        assert_eq!(owid.verify_with_crypto(&pk).unwrap(), VerifiedStatus::NotValid);
    }

    // property 3: timestamp tampering
    #[test]
    fn timestamp_tampering_invalidates_signature() {
        let (mut owid, _, pk) = signed_owid();
        *owid.timestamp_mut() += 1;
        assert_eq!(owid.verify_with_crypto(&pk).unwrap(), VerifiedStatus::NotValid);
    }

    // property 4: payload tampering
    #[test]
    fn payload_tampering_invalidates_signature() {
        let (sk, pk) = CryptoKey::generate();
        let mut owid = Owid::new(StringTarget::new("original"));
        *owid.domain_mut() = "example.test".to_string();
        owid.sign_with_crypto_key(&sk).unwrap();

        let mut tampered = Owid::new(StringTarget::new("tampered"));
        *tampered.domain_mut() = owid.domain().to_string();
        *tampered.timestamp_mut() = owid.timestamp();
        *tampered.signature_mut() = owid.signature().copied();

        assert_eq!(tampered.verify_with_crypto(&pk).unwrap(), VerifiedStatus::NotValid);
    }

    // property 5: wrong-capability key
    #[test]
    fn verifying_with_private_key_is_exception() {
        let (mut owid, sk, _) = signed_owid();
        let err = owid.verify_with_crypto(&sk).unwrap_err();
        assert!(matches!(err, OwidError::KeyMisuse(_)));
        assert_eq!(owid.status(), VerifiedStatus::Exception);
    }

    // property 6 / S5: key selection picks first eligible key, doesn't fall through
    #[test]
    fn key_selection_picks_first_eligible_and_does_not_fall_through() {
        let (good_sk, good_pk) = CryptoKey::generate();
        let (_, other_pk) = CryptoKey::generate();

        let mut owid = Owid::new(StringTarget::new("s5"));
        *owid.domain_mut() = "example.test".to_string();
        owid.sign_with_crypto_key(&good_sk).unwrap();
        let t = time::from_minutes(owid.timestamp());

        let keys = vec![
            Key::from_crypto_key(good_pk.clone(), t - chrono::Duration::milliseconds(1)).unwrap(),
            Key::from_crypto_key(other_pk, t + chrono::Duration::milliseconds(1)).unwrap(),
            Key::from_crypto_key(good_pk, t + chrono::Duration::milliseconds(2)).unwrap(),
        ];

        assert_eq!(owid.verify_with_public_keys(&keys).unwrap(), VerifiedStatus::Valid);
    }

    // S4: only a future key present -> no time-eligible candidate
    #[test]
    fn only_future_key_is_key_not_found() {
        let (sk, pk) = CryptoKey::generate();
        let mut owid = Owid::new(StringTarget::new("s4"));
        *owid.domain_mut() = "example.test".to_string();
        owid.sign_with_crypto_key(&sk).unwrap();

        let t = time::from_minutes(owid.timestamp());
        let future_key = Key::from_crypto_key(pk, t + chrono::Duration::hours(2)).unwrap();

        assert_eq!(owid.verify_with_public_keys(&[future_key]).unwrap(), VerifiedStatus::KeyNotFound);
        assert_eq!(owid.status(), VerifiedStatus::KeyNotFound);
    }

    // property 7: version rejection
    #[test]
    fn decoding_unknown_version_fails() {
        let mut bytes = vec![2u8];
        bytes.extend_from_slice(b"example.test\0");
        bytes.extend_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 64]);
        let err = Owid::from_bytes(StringTarget::new("x"), &bytes).unwrap_err();
        assert!(matches!(err, OwidError::UnsupportedVersion(2)));
    }

    // property 8: codec round trip
    #[test]
    fn byte_form_round_trips() {
        let (owid, _, _) = signed_owid();
        let bytes = owid.to_bytes().unwrap();
        let restored = Owid::from_bytes(StringTarget::new("example test"), &bytes).unwrap();
        assert_eq!(restored.version(), owid.version());
        assert_eq!(restored.domain(), owid.domain());
        assert_eq!(restored.timestamp(), owid.timestamp());
        assert_eq!(restored.signature(), owid.signature());
    }

    #[test]
    fn json_form_round_trips() {
        let (owid, _, _) = signed_owid();
        let json = owid.to_json().unwrap();
        let restored = Owid::from_json(StringTarget::new("example test"), &json).unwrap();
        assert_eq!(restored.domain(), owid.domain());
        assert_eq!(restored.signature(), owid.signature());
    }

    // S6: corruption
    #[test]
    fn flipping_a_signature_byte_invalidates() {
        let (mut owid, _, pk) = signed_owid();
        owid.signature_mut().as_mut().unwrap()[0] ^= 0xFF;
        assert_eq!(owid.verify_with_crypto(&pk).unwrap(), VerifiedStatus::NotValid);
    }

    // S7: domain mismatch against a signer
    #[test]
    fn verify_with_signer_domain_mismatch_is_fatal() {
        let (sk, pk) = CryptoKey::generate();
        let mut owid = Owid::new(StringTarget::new("s7"));
        *owid.domain_mut() = "example.test".to_string();
        owid.sign_with_crypto_key(&sk).unwrap();

        let signer = Signer {
            version: 1,
            domain: "other.test".to_string(),
            name: String::new(),
            email: String::new(),
            terms_url: String::new(),
            public_keys: vec![Key::from_crypto_key(pk, Utc::now()).unwrap()],
            private_keys: vec![],
        };

        let err = owid.verify_with_signer(&signer).unwrap_err();
        assert!(matches!(err, OwidError::DomainMismatch { .. }));
        assert_eq!(owid.status(), VerifiedStatus::Exception);
    }

    #[test]
    fn sign_with_signer_uses_newest_key_and_records_domain() {
        let (sk, pk) = CryptoKey::generate();
        let signer = Signer {
            version: 1,
            domain: "example.test".to_string(),
            name: "Example".to_string(),
            email: "owner@example.test".to_string(),
            terms_url: String::new(),
            public_keys: vec![Key::from_crypto_key(pk.clone(), Utc::now()).unwrap()],
            private_keys: vec![Key::from_crypto_key(sk, Utc::now()).unwrap()],
        };

        let mut owid = Owid::new(StringTarget::new("sign-with-signer"));
        owid.sign_with_signer(&signer).unwrap();
        assert_eq!(owid.domain(), "example.test");
        assert_eq!(owid.verify_with_crypto(&pk).unwrap(), VerifiedStatus::Valid);
    }
}
