//! Verification of tokens that carry their signing key as an `x5c`
//! certificate chain.

pub mod chain;
pub mod policy;

#[cfg(test)]
mod test_vectors;

use std::fmt;

use coarsetime::{Clock, UnixTimeStamp};
use ct_codecs::{Base64, Decoder};
use tracing::debug;
use x509_cert::der::{Decode, Encode};
use x509_cert::Certificate;

use self::policy::PathPolicy;
use crate::algorithms::{ECDSACurve, ECDSAKey};
use crate::claims::JWTPayload;
use crate::common::VerificationOptions;
use crate::error::*;
use crate::token::Token;

/// The only algorithm accepted for `x5c` tokens.
pub const X5C_ALGORITHM: &str = "ES256";

/// Verifies ES256 tokens against a fixed set of trusted root certificates.
///
/// The chain is validated at the instant returned by the payload's
/// `signed_date()` when it has one, then at `artificial_time`, then at the
/// current time.
pub struct X5CVerifier {
    roots: Vec<Certificate>,
    policies: Vec<Box<dyn PathPolicy>>,
    options: VerificationOptions,
}

impl fmt::Debug for X5CVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policies: Vec<&str> = self.policies.iter().map(|policy| policy.name()).collect();
        f.debug_struct("X5CVerifier")
            .field("roots", &self.roots.len())
            .field("policies", &policies)
            .finish()
    }
}

impl X5CVerifier {
    pub fn new(roots: Vec<Certificate>) -> Result<Self, Error> {
        Self::with_options(roots, VerificationOptions::default())
    }

    pub fn with_options(
        roots: Vec<Certificate>,
        options: VerificationOptions,
    ) -> Result<Self, Error> {
        ensure!(
            !roots.is_empty(),
            JWTError::InvalidX5CChain("no trusted root certificates".into())
        );
        Ok(X5CVerifier {
            roots,
            policies: policy::default_policies(),
            options,
        })
    }

    /// Trusted roots from one or more concatenated PEM certificates.
    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let roots = Certificate::load_pem_chain(pem.as_bytes())
            .map_err(|e| JWTError::InvalidX5CChain(format!("invalid root certificate: {}", e)))?;
        Self::new(roots)
    }

    /// Trusted roots from DER-encoded certificates.
    pub fn from_der<D: AsRef<[u8]>>(roots: &[D]) -> Result<Self, Error> {
        let roots = roots
            .iter()
            .map(|der| parse_certificate(der.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(roots)
    }

    /// Append a check run after the built-in ones.
    pub fn with_policy(mut self, policy: Box<dyn PathPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn options(&self) -> &VerificationOptions {
        &self.options
    }

    /// Validate `chain` (leaf first, trusted root optional) at `at`.
    ///
    /// Every candidate path is tried; when none passes, the violations found
    /// on all of them are reported together.
    pub fn verify_chain(&self, chain: &[Certificate], at: UnixTimeStamp) -> Result<(), Error> {
        let (leaf, intermediates) = chain
            .split_first()
            .ok_or(JWTError::MissingX5CHeader)?;
        let paths = chain::candidate_paths(leaf, intermediates, &self.roots).map_err(|reason| {
            debug!(%reason, "x5c chain rejected");
            JWTError::InvalidX5CChain(reason)
        })?;
        if paths.is_empty() {
            let reason = format!(
                "no path from [{}] to a trusted root",
                leaf.tbs_certificate.subject
            );
            debug!(%reason, "x5c chain rejected");
            bail!(JWTError::InvalidX5CChain(reason));
        }
        let mut violations = Vec::with_capacity(paths.len());
        for path in &paths {
            match policy::evaluate(&self.policies, path, at) {
                Ok(()) => return Ok(()),
                Err(violation) => violations.push(violation),
            }
        }
        let reason = violations.join("; ");
        debug!(%reason, paths = paths.len(), "x5c chain rejected");
        bail!(JWTError::InvalidX5CChain(reason))
    }

    /// Verify a token signed by the leaf of its `x5c` chain.
    pub fn verify_jws<Payload: JWTPayload>(&self, token: &str) -> Result<Payload, Error> {
        let parsed = Token::parse(token, &self.options)?;
        ensure!(
            parsed.header.algorithm == X5C_ALGORITHM,
            JWTError::InvalidX5CChain(format!(
                "unsupported algorithm [{}]",
                parsed.header.algorithm
            ))
        );
        let encoded = match parsed.header.certificate_chain.as_deref() {
            Some(encoded) if !encoded.is_empty() => encoded,
            _ => bail!(JWTError::MissingX5CHeader),
        };
        let chain = encoded
            .iter()
            .map(|cert| {
                Base64::decode_to_vec(cert, None)
                    .map_err(|_| {
                        Error::from(JWTError::InvalidX5CChain(
                            "certificate is not valid base64".into(),
                        ))
                    })
                    .and_then(|der| parse_certificate(&der))
            })
            .collect::<Result<Vec<_>, Error>>()?;

        let at = parsed
            .payload::<Payload>(&self.options)
            .ok()
            .and_then(|payload| payload.signed_date())
            .or(self.options.artificial_time)
            .unwrap_or_else(Clock::now_since_epoch);
        self.verify_chain(&chain, at)?;

        let spki = chain[0]
            .tbs_certificate
            .subject_public_key_info
            .to_der()
            .map_err(|e| JWTError::InvalidX5CChain(format!("leaf public key: {}", e)))?;
        let key = ECDSAKey::from_public_key_der(ECDSACurve::P256, &spki)?;
        Token::verify(&parsed, &key, &self.options)
    }
}

fn parse_certificate(der: &[u8]) -> Result<Certificate, Error> {
    Certificate::from_der(der)
        .map_err(|e| JWTError::InvalidX5CChain(format!("invalid certificate: {}", e)).into())
}
