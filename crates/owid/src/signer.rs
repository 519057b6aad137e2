//! Immutable bundle describing a signer: version, domain, human metadata,
//! ordered public keys, and optional private keys.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{OwidError, Result};
use crate::key::Key;

/// The structural `(version, domain)` identity of a [`Signer`], and the
/// lookup key for [`crate::cache::SignerCache`].
///
/// Deliberately an owned, structurally-`Eq`/`Hash` value rather than a
/// pointer or object reference — the source this crate is grounded on keyed
/// its cache by object identity, which meant a freshly constructed lookup
/// key with identical fields would miss a cached entry. A `HashMap<SignerKey,
/// _>` cannot make that mistake.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SignerKey {
    pub version: u8,
    pub domain: String,
}

impl SignerKey {
    pub fn new(version: u8, domain: impl Into<String>) -> Self {
        Self { version, domain: domain.into() }
    }
}

impl std::fmt::Display for SignerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}|{}", self.version, self.domain)
    }
}

/// Wire shape of a single public or private key entry in the signer JSON
/// endpoint response (§6).
#[derive(Debug, Clone, Serialize, Deserialize)]
struct KeyRecord {
    pem: String,
    created: DateTime<Utc>,
}

/// A domain-identified entity holding an ordered history of keypairs.
///
/// `public_keys` must be non-empty for verification to be possible;
/// `private_keys` is only required for signing and is never populated by
/// the HTTP signer endpoint — only ever set up locally.
#[derive(Debug, Clone)]
pub struct Signer {
    pub version: u8,
    pub domain: String,
    pub name: String,
    pub email: String,
    pub terms_url: String,
    pub public_keys: Vec<Key>,
    pub private_keys: Vec<Key>,
}

impl Signer {
    pub fn key(&self) -> SignerKey {
        SignerKey::new(self.version, self.domain.clone())
    }

    /// The newest private key by `created_date`, ties broken by list order
    /// (first wins) — used by [`crate::owid::Owid::sign_with_signer`].
    pub fn newest_private_key(&self) -> Result<&Key> {
        self.private_keys
            .iter()
            .enumerate()
            .max_by_key(|(i, k)| (k.created_date(), std::cmp::Reverse(*i)))
            .map(|(_, k)| k)
            .ok_or_else(|| OwidError::NoPrivateKey(self.key()))
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let dto: SignerDto = serde_json::from_str(json)?;
        Ok(dto.into())
    }

    pub fn to_json(&self) -> Result<String> {
        let dto = SignerDto::from(self);
        Ok(serde_json::to_string(&dto)?)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SignerDto {
    version: u8,
    domain: String,
    name: String,
    email: String,
    #[serde(rename = "termsURL")]
    terms_url: String,
    #[serde(rename = "publicKeys")]
    public_keys: Vec<KeyRecord>,
    #[serde(rename = "privateKeys", default, skip_serializing_if = "Vec::is_empty")]
    private_keys: Vec<KeyRecord>,
}

impl From<SignerDto> for Signer {
    fn from(dto: SignerDto) -> Self {
        Self {
            version: dto.version,
            domain: dto.domain,
            name: dto.name,
            email: dto.email,
            terms_url: dto.terms_url,
            public_keys: dto.public_keys.into_iter().map(|r| Key::new(r.pem, r.created)).collect(),
            private_keys: dto.private_keys.into_iter().map(|r| Key::new(r.pem, r.created)).collect(),
        }
    }
}

impl From<&Signer> for SignerDto {
    fn from(signer: &Signer) -> Self {
        Self {
            version: signer.version,
            domain: signer.domain.clone(),
            name: signer.name.clone(),
            email: signer.email.clone(),
            terms_url: signer.terms_url.clone(),
            public_keys: signer
                .public_keys
                .iter()
                .map(|k| KeyRecord { pem: k.pem().to_string(), created: k.created_date() })
                .collect(),
            private_keys: signer
                .private_keys
                .iter()
                .map(|k| KeyRecord { pem: k.pem().to_string(), created: k.created_date() })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::CryptoKey;

    fn sample_signer() -> Signer {
        let (sk, pk) = CryptoKey::generate();
        Signer {
            version: 1,
            domain: "example.test".to_string(),
            name: "Example".to_string(),
            email: "owner@example.test".to_string(),
            terms_url: "https://example.test/terms".to_string(),
            public_keys: vec![Key::from_crypto_key(pk, Utc::now()).unwrap()],
            private_keys: vec![Key::from_crypto_key(sk, Utc::now()).unwrap()],
        }
    }

    #[test]
    fn signer_key_formats_as_composite_string() {
        let key = SignerKey::new(1, "example.test");
        assert_eq!(key.to_string(), "v1|example.test");
    }

    #[test]
    fn newest_private_key_prefers_later_created_date() {
        let (sk1, _) = CryptoKey::generate();
        let (sk2, _) = CryptoKey::generate();
        let mut signer = sample_signer();
        let t0 = Utc::now();
        signer.private_keys =
            vec![Key::from_crypto_key(sk1, t0).unwrap(), Key::from_crypto_key(sk2, t0 + chrono::Duration::seconds(5)).unwrap()];
        let newest = signer.newest_private_key().unwrap();
        assert_eq!(newest.created_date(), t0 + chrono::Duration::seconds(5));
    }

    #[test]
    fn no_private_keys_is_fatal() {
        let mut signer = sample_signer();
        signer.private_keys.clear();
        assert!(matches!(signer.newest_private_key(), Err(OwidError::NoPrivateKey(_))));
    }

    #[test]
    fn json_round_trip() {
        let signer = sample_signer();
        let json = signer.to_json().unwrap();
        let parsed = Signer::from_json(&json).unwrap();
        assert_eq!(parsed.domain, signer.domain);
        assert_eq!(parsed.public_keys.len(), signer.public_keys.len());
    }
}
