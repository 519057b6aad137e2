//! Key material: a PEM-encoded key plus its creation time, with a lazily
//! materialized crypto key cached alongside it.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};

use crate::crypto::CryptoKey;
use crate::error::Result;

/// A PEM-encoded public or private key, tagged with the wall-clock instant
/// it was created (used by [`crate::owid::Owid::verify_with_public_keys`]
/// for time-windowed key selection).
///
/// The materialized [`CryptoKey`] is an optimization, not state: `Key` is
/// immutable once built, so the cache can never go stale. A new `pem`
/// requires a new `Key`, never a mutation of an existing one.
pub struct Key {
    pem: String,
    created_date: DateTime<Utc>,
    materialized: OnceLock<CryptoKey>,
}

impl Key {
    pub fn new(pem: impl Into<String>, created_date: DateTime<Utc>) -> Self {
        Self { pem: pem.into(), created_date, materialized: OnceLock::new() }
    }

    /// Wraps an already-materialized key, so callers that generated a
    /// keypair in-process don't pay for a PEM round trip just to use it.
    pub fn from_crypto_key(key: CryptoKey, created_date: DateTime<Utc>) -> Result<Self> {
        let pem = key.export_pem()?;
        let cell = OnceLock::new();
        let _ = cell.set(key);
        Ok(Self { pem, created_date, materialized: cell })
    }

    pub fn pem(&self) -> &str {
        &self.pem
    }

    pub fn created_date(&self) -> DateTime<Utc> {
        self.created_date
    }

    /// Returns the materialized crypto key, importing it from PEM on first
    /// use and caching the result for the lifetime of this `Key`.
    pub fn crypto_key(&self) -> Result<&CryptoKey> {
        if let Some(key) = self.materialized.get() {
            return Ok(key);
        }
        let key = CryptoKey::import_pem(&self.pem)?;
        // Benign race: PEM -> CryptoKey is deterministic, so if another
        // thread wins the `set` first we just use its (identical) value.
        let _ = self.materialized.set(key);
        Ok(self.materialized.get().expect("just set or set by a racing thread"))
    }
}

impl Clone for Key {
    fn clone(&self) -> Self {
        // The materialized cache is intentionally not carried over; it will
        // be rebuilt lazily and deterministically on first use.
        Self { pem: self.pem.clone(), created_date: self.created_date, materialized: OnceLock::new() }
    }
}

impl std::fmt::Debug for Key {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Key")
            .field("created_date", &self.created_date)
            .field("materialized", &self.materialized.get().is_some())
            .finish_non_exhaustive()
    }
}
