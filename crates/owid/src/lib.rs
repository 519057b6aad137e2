//! Open Web Id: a portable, cryptographically attested identifier.
//!
//! An OWID binds a target's canonical bytes to a signer domain and a
//! timestamp under an ECDSA P-256 / SHA-256 signature (§4 of
//! `SPEC_FULL.md`). This crate covers the byte and JSON codecs, the crypto
//! facade, signer descriptors, the sign/verify state machine, and an HTTP
//! signer-resolution cache with request coalescing.
//!
//! Start at [`Owid`]. Pair it with a [`Target`] implementation for whatever
//! you're attesting, and a [`Signer`] (or a [`SignerCache`] for remote
//! resolution) holding the keys that sign and verify it.

pub mod cache;
pub mod config;
pub mod crypto;
pub mod error;
pub mod io;
pub mod key;
pub mod owid;
pub mod signer;
pub mod target;
pub mod time;

pub use cache::{HttpSignerCache, MapSignerCache, SignerCache};
pub use config::OwidConfig;
pub use crypto::CryptoKey;
pub use error::OwidError;
pub use key::Key;
pub use owid::{Owid, VerifiedStatus};
pub use signer::{Signer, SignerKey};
pub use target::{AnyTarget, StringTarget, Target};
