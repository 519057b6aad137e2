//! End-to-end coverage of signer resolution over HTTP: cache hit, cache
//! miss, and verifying an OWID through a resolved signer (S2/S3 of
//! `SPEC_FULL.md` §8).

use chrono::Utc;
use owid::{CryptoKey, HttpSignerCache, Key, Owid, Signer, SignerCache, SignerKey, StringTarget, VerifiedStatus};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn signer_json(domain: &str, public_pem: &str) -> String {
    format!(
        r#"{{"version":1,"domain":"{domain}","name":"Example","email":"owner@{domain}","termsURL":"","publicKeys":[{{"pem":{:?},"created":"{}"}}]}}"#,
        public_pem,
        Utc::now().to_rfc3339(),
    )
}

#[tokio::test]
async fn resolves_signer_and_verifies_an_owid() {
    let (sk, pk) = CryptoKey::generate();
    let pem = pk.export_pem().unwrap();

    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/owid/api/v1/signer"))
        .respond_with(ResponseTemplate::new(200).set_body_string(signer_json(&server.address().to_string(), &pem)))
        .mount(&server)
        .await;

    let mut owid = Owid::new(StringTarget::new("integration test payload"));
    *owid.domain_mut() = server.address().to_string();
    owid.sign_with_crypto_key(&sk).unwrap();

    let cache = HttpSignerCache::with_scheme("http");
    let status = owid.verify_with_service(&cache).await.unwrap();

    assert_eq!(status, VerifiedStatus::Valid);
    assert_eq!(owid.signer().unwrap().domain, server.address().to_string());
}

#[tokio::test]
async fn unknown_signer_domain_is_signer_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/owid/api/v1/signer"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let (sk, _) = CryptoKey::generate();
    let mut owid = Owid::new(StringTarget::new("unresolvable"));
    *owid.domain_mut() = server.address().to_string();
    owid.sign_with_crypto_key(&sk).unwrap();

    let cache = HttpSignerCache::with_scheme("http");
    let status = owid.verify_with_service(&cache).await.unwrap();

    assert_eq!(status, VerifiedStatus::SignerNotFound);
    assert!(owid.signer().is_none());
}

#[tokio::test]
async fn map_cache_round_trip_through_verify_with_service() {
    let (sk, pk) = CryptoKey::generate();
    let mut cache = owid::MapSignerCache::new();
    cache.insert(Signer {
        version: 1,
        domain: "example.test".to_string(),
        name: "Example".to_string(),
        email: "owner@example.test".to_string(),
        terms_url: String::new(),
        public_keys: vec![Key::from_crypto_key(pk, Utc::now()).unwrap()],
        private_keys: vec![],
    });

    let mut owid = Owid::new(StringTarget::new("map-cache"));
    *owid.domain_mut() = "example.test".to_string();
    owid.sign_with_crypto_key(&sk).unwrap();

    assert_eq!(owid.verify_with_service(&cache).await.unwrap(), VerifiedStatus::Valid);

    let miss_key = SignerKey::new(1, "nowhere.test");
    assert!(cache.get(&miss_key).await.unwrap().is_none());
}
