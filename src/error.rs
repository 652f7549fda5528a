#[allow(unused)]
pub use anyhow::{anyhow, bail, ensure, Error};

#[derive(Debug, thiserror::Error)]
pub enum JWTError {
    #[error("Internal error: [{0}]")]
    InternalError(String),
    #[error("Malformed token: {0}")]
    MalformedToken(String),
    #[error("Signature didn't verify")]
    SignatureVerificationFailed,
    #[error("Claim [{claim}] failed verification: {reason}")]
    ClaimVerificationFailure { claim: String, reason: String },
    #[error("No key provided, and no default key is set")]
    NoKeyProvided,
    #[error("Unknown key identifier: [{0}]")]
    UnknownKID(String),
    #[error("Missing key identifier in header")]
    MissingKIDHeader,
    #[error("JWT key identifier mismatch")]
    KeyIdentifierMismatch,
    #[error("JWT algorithm mismatch")]
    AlgorithmMismatch,
    #[error("Invalid JWK: {0}")]
    InvalidJWK(String),
    #[error("Key initialization failure: {0}")]
    KeyInitializationFailure(String),
    #[error("Key size too small")]
    KeySizeTooSmall,
    #[error("Invalid x5c chain: {0}")]
    InvalidX5CChain(String),
    #[error("Missing x5c header")]
    MissingX5CHeader,
    #[error("Signing algorithm failure: {0}")]
    SigningAlgorithmFailure(String),
    #[error("Private key required")]
    PrivateKeyRequired,
    #[error("Invalid compression: {0}")]
    InvalidCompression(String),
    #[error("Curve not supported: [{0}]")]
    CurveNotSupported(String),
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid key pair")]
    InvalidKeyPair,
    #[error("JWT header too large")]
    HeaderTooLarge,
    #[error("Token is too long")]
    TokenTooLong,
    #[error("Decompressed payload is too large")]
    PayloadTooLarge,
}

impl From<&str> for JWTError {
    fn from(e: &str) -> JWTError {
        JWTError::InternalError(e.into())
    }
}

impl JWTError {
    pub(crate) fn malformed(reason: impl ToString) -> JWTError {
        JWTError::MalformedToken(reason.to_string())
    }

    pub(crate) fn claim(claim: &str, reason: impl ToString) -> JWTError {
        JWTError::ClaimVerificationFailure {
            claim: claim.to_string(),
            reason: reason.to_string(),
        }
    }
}
