//! Resolves a [`SignerKey`] to a [`Signer`] over HTTP, with an in-memory
//! fixture cache for tests and concurrent-request coalescing so a burst of
//! verifications against the same signer only issues one fetch.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::{OwidError, Result};
use crate::signer::{Signer, SignerKey};

/// Resolves signers for [`crate::owid::Owid::verify_with_service`].
///
/// Implementations are expected to be safe to share behind an `&` across
/// concurrent verifications — both provided implementations are.
#[async_trait]
pub trait SignerCache: Send + Sync {
    /// Looks up the signer for `key`. `Ok(None)` means "no such signer", a
    /// perfectly ordinary outcome the caller turns into
    /// [`crate::owid::VerifiedStatus::SignerNotFound`] — it is not an error.
    async fn get(&self, key: &SignerKey) -> Result<Option<Arc<Signer>>>;
}

/// A fixed, in-memory signer directory — for tests and for embedding a small
/// set of trusted signers without a network round trip.
#[derive(Debug, Default)]
pub struct MapSignerCache {
    entries: HashMap<SignerKey, Arc<Signer>>,
    delay: Option<Duration>,
}

impl MapSignerCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a synthetic latency to every `get`, for exercising timeout and
    /// coalescing behavior without a real network.
    pub fn with_delay(delay: Duration) -> Self {
        Self { entries: HashMap::new(), delay: Some(delay) }
    }

    pub fn insert(&mut self, signer: Signer) {
        self.entries.insert(signer.key(), Arc::new(signer));
    }
}

#[async_trait]
impl SignerCache for MapSignerCache {
    async fn get(&self, key: &SignerKey) -> Result<Option<Arc<Signer>>> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.entries.get(key).cloned())
    }
}

type CoalescedFetch = Shared<BoxFuture<'static, std::result::Result<Option<Arc<Signer>>, Arc<OwidError>>>>;

/// Resolves signers from `GET {scheme}://{domain}/owid/api/v{version}/signer`
/// (§6), JSON-decoded into a [`Signer`].
///
/// Results are cached indefinitely for the life of this `HttpSignerCache` —
/// a `get` that previously resolved to `Some(signer)` never issues another
/// request for that key. A `None` (signer not registered) result is never
/// cached, so the next `get` for that key retries the fetch.
///
/// Concurrent `get` calls for the same key additionally share one in-flight
/// HTTP request — a second caller arriving while the first is still awaiting
/// the response attaches to the same future rather than issuing a second
/// request.
pub struct HttpSignerCache {
    client: reqwest::Client,
    scheme: String,
    resolved: Mutex<HashMap<SignerKey, Arc<Signer>>>,
    in_flight: Mutex<HashMap<SignerKey, CoalescedFetch>>,
}

impl HttpSignerCache {
    pub fn new() -> Self {
        Self::with_scheme("https")
    }

    /// Builds a cache that talks to `scheme://` instead of `https://` — used
    /// by tests pointed at a local mock server.
    pub fn with_scheme(scheme: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            scheme: scheme.into(),
            resolved: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    async fn fetch(
        client: reqwest::Client,
        scheme: String,
        key: SignerKey,
    ) -> std::result::Result<Option<Arc<Signer>>, Arc<OwidError>> {
        let url = format!("{scheme}://{}/owid/api/v{}/signer", key.domain, key.version);
        tracing::debug!(%url, "fetching signer");
        let response = client
            .get(&url)
            .send()
            .await
            .map_err(|e| Arc::new(OwidError::SignerFetchFailed(key.clone(), e.to_string())))?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            tracing::debug!(%key, "no signer registered for key");
            return Ok(None);
        }
        if !response.status().is_success() {
            let status = response.status();
            tracing::warn!(%key, %status, "signer fetch returned a non-success status");
            return Err(Arc::new(OwidError::SignerFetchFailed(key.clone(), format!("http status {status}"))));
        }

        let body = response
            .text()
            .await
            .map_err(|e| Arc::new(OwidError::SignerFetchFailed(key.clone(), e.to_string())))?;
        let signer = Signer::from_json(&body).map_err(Arc::new)?;
        Ok(Some(Arc::new(signer)))
    }
}

impl Default for HttpSignerCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SignerCache for HttpSignerCache {
    async fn get(&self, key: &SignerKey) -> Result<Option<Arc<Signer>>> {
        if let Some(signer) = self.resolved.lock().await.get(key) {
            return Ok(Some(signer.clone()));
        }

        let shared = {
            let mut in_flight = self.in_flight.lock().await;
            if let Some(existing) = in_flight.get(key) {
                existing.clone()
            } else {
                let fut = Self::fetch(self.client.clone(), self.scheme.clone(), key.clone()).boxed().shared();
                in_flight.insert(key.clone(), fut.clone());
                fut
            }
        };

        let result = shared.await;
        self.in_flight.lock().await.remove(key);
        let signer = result.map_err(|arc_err| OwidError::SignerFetchFailed(key.clone(), arc_err.to_string()))?;
        if let Some(signer) = &signer {
            self.resolved.lock().await.insert(key.clone(), signer.clone());
        }
        Ok(signer)
    }
}

/// Races `fut` against `timeout`, turning an elapsed deadline into
/// [`OwidError::Cancelled`]. Never leaves a partial write behind: a timed-out
/// caller simply stops waiting, while any in-flight fetch it was coalesced
/// with keeps running for whoever else is still attached to it.
pub async fn with_timeout<F>(timeout: Duration, fut: F) -> Result<F::Output>
where
    F: Future,
{
    tokio::time::timeout(timeout, fut).await.map_err(|_| OwidError::Cancelled)
}
