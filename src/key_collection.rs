//! A keyring resolving signers by key identifier.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, trace, warn};

use crate::algorithms::{Algorithm, JWTAlgorithm};
use crate::claims::JWTPayload;
use crate::common::VerificationOptions;
use crate::error::*;
use crate::jwk::{JWK, JWKS};
use crate::jwt_header::JWTHeader;
use crate::token::Token;

enum Entry {
    Signer(Arc<Algorithm>),
    /// Materialized on first use. The cached signer is only reused for the
    /// algorithm it was built for.
    JWK {
        jwk: JWK,
        cached: Option<Arc<Algorithm>>,
    },
}

impl Entry {
    fn signer(&mut self, alg: Option<&str>) -> Result<Arc<Algorithm>, Error> {
        match self {
            Entry::Signer(signer) => Ok(signer.clone()),
            Entry::JWK { jwk, cached } => {
                let wanted = alg.or(jwk.algorithm.as_deref());
                if let Some(signer) = cached {
                    if wanted.map_or(true, |wanted| wanted == signer.name()) {
                        return Ok(signer.clone());
                    }
                    debug!(
                        kid = ?jwk.key_id,
                        cached = signer.name(),
                        alg = ?wanted,
                        "rebuilding JWK signer for a different algorithm"
                    );
                }
                let signer = Arc::new(jwk.materialize(alg)?);
                debug!(kid = ?jwk.key_id, alg = signer.name(), "materialized JWK");
                *cached = Some(signer.clone());
                Ok(signer)
            }
        }
    }
}

/// An entry shared between its key identifier and the default slot, so that
/// both see the same materialized signer. Only locked while the keyring lock
/// is held.
type Slot = Arc<Mutex<Entry>>;

struct DefaultKey {
    key_id: Option<String>,
    slot: Slot,
}

#[derive(Default)]
struct Keyring {
    storage: HashMap<String, Slot>,
    default: Option<DefaultKey>,
}

impl Keyring {
    fn insert(&mut self, key_id: String, slot: Slot) {
        if self.storage.insert(key_id.clone(), slot).is_some() {
            warn!(kid = %key_id, "overwriting existing key");
        }
    }

    fn set_default(&mut self, key_id: Option<String>, slot: Slot) {
        self.default = Some(DefaultKey { key_id, slot });
    }
}

/// A set of signers and JWKs indexed by key identifier, with an optional
/// default key.
///
/// All operations take `&self` and are serialized by an internal lock, so a
/// collection can be shared between threads behind an `Arc`.
pub struct JWTKeyCollection {
    keys: Mutex<Keyring>,
    options: VerificationOptions,
}

impl Default for JWTKeyCollection {
    fn default() -> Self {
        Self::new()
    }
}

impl JWTKeyCollection {
    pub fn new() -> Self {
        Self::with_options(VerificationOptions::default())
    }

    pub fn with_options(options: VerificationOptions) -> Self {
        JWTKeyCollection {
            keys: Mutex::new(Keyring::default()),
            options,
        }
    }

    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    /// Add a concrete signer.
    ///
    /// With a key identifier, the signer is stored under it, and also becomes
    /// the default if there is none yet. Without one, it replaces the default.
    pub fn add_signer(&self, signer: impl Into<Algorithm>, key_id: Option<&str>) -> &Self {
        let slot = Arc::new(Mutex::new(Entry::Signer(Arc::new(signer.into()))));
        let mut keys = self.keys.lock();
        match key_id {
            Some(key_id) => {
                keys.insert(key_id.to_string(), slot.clone());
                if keys.default.is_none() {
                    keys.set_default(Some(key_id.to_string()), slot);
                }
            }
            None => {
                if keys.default.is_some() {
                    warn!("overwriting the default key");
                }
                keys.set_default(None, slot);
            }
        }
        self
    }

    /// Add a JWK, materialized lazily.
    ///
    /// The key must have a `kid`. It becomes the default if there is none yet
    /// and `is_default` is unset, or if `is_default` is `Some(true)`.
    pub fn add_jwk(&self, jwk: JWK, is_default: Option<bool>) -> Result<&Self, Error> {
        let key_id = jwk
            .key_id
            .clone()
            .ok_or_else(|| JWTError::InvalidJWK("Missing KID".into()))?;
        let slot = Arc::new(Mutex::new(Entry::JWK { jwk, cached: None }));
        let mut keys = self.keys.lock();
        keys.insert(key_id.clone(), slot.clone());
        match (keys.default.is_some(), is_default) {
            (false, None) | (_, Some(true)) => keys.set_default(Some(key_id), slot),
            _ => {}
        }
        Ok(self)
    }

    pub fn add_jwk_json(&self, json: &str, is_default: Option<bool>) -> Result<&Self, Error> {
        self.add_jwk(JWK::from_json(json)?, is_default)
    }

    /// Add every key of a set. A key without a `kid` fails the whole call,
    /// but keys before it stay added.
    pub fn add_jwks(&self, jwks: &JWKS) -> Result<&Self, Error> {
        for jwk in &jwks.keys {
            self.add_jwk(jwk.clone(), None)?;
        }
        Ok(self)
    }

    pub fn add_jwks_json(&self, json: &str) -> Result<&Self, Error> {
        self.add_jwks(&JWKS::from_json(json)?)
    }

    /// Stored key identifiers, sorted.
    pub fn key_ids(&self) -> Vec<String> {
        let mut key_ids: Vec<String> = self.keys.lock().storage.keys().cloned().collect();
        key_ids.sort();
        key_ids
    }

    /// Resolve the signer for `key_id`, falling back to the default key.
    ///
    /// `alg` selects the algorithm of a JWK entry, overriding the JWK's own.
    pub fn signer(&self, key_id: Option<&str>, alg: Option<&str>) -> Result<Arc<Algorithm>, Error> {
        Ok(self.resolve(key_id, alg)?.1)
    }

    fn resolve(
        &self,
        key_id: Option<&str>,
        alg: Option<&str>,
    ) -> Result<(Option<String>, Arc<Algorithm>), Error> {
        let keys = self.keys.lock();
        if let Some(key_id) = key_id {
            if let Some(slot) = keys.storage.get(key_id) {
                return Ok((Some(key_id.to_string()), slot.lock().signer(alg)?));
            }
        }
        match keys.default.as_ref() {
            Some(default) => Ok((default.key_id.clone(), default.slot.lock().signer(alg)?)),
            None => match key_id {
                Some(key_id) => bail!(JWTError::UnknownKID(key_id.to_string())),
                None => bail!(JWTError::NoKeyProvided),
            },
        }
    }

    /// Sign a payload.
    ///
    /// The key is the one named by `key_id`, else by the `kid` of `header`,
    /// else the default key. The header's `kid` is replaced with the
    /// identifier of the key that was used.
    pub fn sign<P: Serialize>(
        &self,
        payload: &P,
        key_id: Option<&str>,
        header: Option<JWTHeader>,
    ) -> Result<String, Error> {
        let mut header = header.unwrap_or_default();
        let requested = key_id.map(str::to_string).or_else(|| header.key_id.take());
        let (resolved, signer) = self.resolve(requested.as_deref(), None)?;
        header.key_id = resolved;
        Token::build(header, payload, signer.as_ref())
    }

    /// Verify a token with the key named by its `kid`, or the default key.
    pub fn verify<P: JWTPayload>(&self, token: &str) -> Result<P, Error> {
        self.verify_with(token, false)
    }

    /// Like [`verify`](Self::verify), but if that fails, try every other
    /// stored key in turn. The first error is returned when none succeeds.
    pub fn verify_iterating_keys<P: JWTPayload>(&self, token: &str) -> Result<P, Error> {
        self.verify_with(token, true)
    }

    fn verify_with<P: JWTPayload>(&self, token: &str, iterating_keys: bool) -> Result<P, Error> {
        let parsed = Token::parse(token, &self.options)?;
        let alg = Some(parsed.header.algorithm.as_str());
        let mut tried = parsed.header.key_id.clone();
        let err = match self.resolve(parsed.header.key_id.as_deref(), alg) {
            Ok((resolved, signer)) => {
                tried = resolved;
                match Token::verify(&parsed, signer.as_ref(), &self.options) {
                    Ok(payload) => return Ok(payload),
                    Err(err) => err,
                }
            }
            Err(err) => err,
        };
        if !iterating_keys {
            return Err(err);
        }
        for key_id in self.key_ids() {
            if tried.as_deref() == Some(key_id.as_str()) {
                continue;
            }
            debug!(kid = %key_id, "trying another key");
            let attempt = self
                .resolve(Some(&key_id), alg)
                .and_then(|(_, signer)| Token::verify(&parsed, signer.as_ref(), &self.options));
            match attempt {
                Ok(payload) => return Ok(payload),
                Err(e) => trace!(kid = %key_id, error = %e, "key didn't verify the token"),
            }
        }
        Err(err)
    }

    /// Decode the payload without verifying anything.
    ///
    /// The result must not be trusted.
    pub fn unverified<P: JWTPayload>(&self, token: &str) -> Result<P, Error> {
        Token::parse(token, &self.options)?.payload(&self.options)
    }
}
