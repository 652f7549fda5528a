mod ecdsa;
mod eddsa;
mod hmac;
mod mldsa;
mod rsa;
pub mod rsa_primes;

use std::fmt;

pub use self::ecdsa::*;
pub use self::eddsa::*;
pub use self::hmac::*;
pub use self::mldsa::*;
pub use self::rsa::*;

use crate::error::*;
use crate::jwk::JWK;

/// A signing algorithm bound to its key material.
pub trait JWTAlgorithm: Send + Sync {
    /// The registered `alg` value.
    fn name(&self) -> &'static str;

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error>;

    /// Returns `Ok(false)` on a mismatch; errors are reserved for signatures
    /// with an invalid shape.
    ///
    /// The default recomputes the signature and compares it in constant time,
    /// which is only correct for deterministic algorithms.
    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        let expected = self.sign(plaintext)?;
        Ok(ct_codecs::verify(&expected, signature))
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum HashFunction {
    SHA256,
    SHA384,
    SHA512,
}

impl HashFunction {
    pub(crate) fn hash(self, data: &[u8]) -> Vec<u8> {
        match self {
            HashFunction::SHA256 => hmac_sha256::Hash::hash(data).to_vec(),
            HashFunction::SHA384 => hmac_sha512::sha384::Hash::hash(data).to_vec(),
            HashFunction::SHA512 => hmac_sha512::Hash::hash(data).to_vec(),
        }
    }

    pub(crate) fn message_digest(self) -> boring::hash::MessageDigest {
        match self {
            HashFunction::SHA256 => boring::hash::MessageDigest::sha256(),
            HashFunction::SHA384 => boring::hash::MessageDigest::sha384(),
            HashFunction::SHA512 => boring::hash::MessageDigest::sha512(),
        }
    }
}

/// Every supported algorithm.
#[derive(Clone)]
pub enum Algorithm {
    HMAC(HMACKey),
    ECDSA(ECDSAKey),
    EdDSA(EdDSAKey),
    RSA(RSAKey),
    MLDSA(MLDSAKey),
}

impl Algorithm {
    fn inner(&self) -> &dyn JWTAlgorithm {
        match self {
            Algorithm::HMAC(key) => key,
            Algorithm::ECDSA(key) => key,
            Algorithm::EdDSA(key) => key,
            Algorithm::RSA(key) => key,
            Algorithm::MLDSA(key) => key,
        }
    }

    /// Whether this key can sign, and not only verify.
    pub fn can_sign(&self) -> bool {
        match self {
            Algorithm::HMAC(_) => true,
            Algorithm::ECDSA(key) => key.is_private(),
            Algorithm::EdDSA(key) => key.is_private(),
            Algorithm::RSA(key) => key.is_private(),
            Algorithm::MLDSA(key) => key.is_private(),
        }
    }

    /// The public half of the key as a JWK, for key types that have one.
    pub fn public_jwk(&self) -> Option<Result<JWK, Error>> {
        match self {
            Algorithm::ECDSA(key) => Some(key.public_jwk()),
            Algorithm::EdDSA(key) => Some(Ok(key.public_jwk())),
            Algorithm::RSA(key) => Some(key.public_jwk()),
            Algorithm::HMAC(_) | Algorithm::MLDSA(_) => None,
        }
    }
}

impl JWTAlgorithm for Algorithm {
    fn name(&self) -> &'static str {
        self.inner().name()
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        self.inner().sign(plaintext)
    }

    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        self.inner().verify(signature, plaintext)
    }
}

impl fmt::Debug for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Algorithm")
            .field("alg", &self.name())
            .field("can_sign", &self.can_sign())
            .finish()
    }
}

impl From<HMACKey> for Algorithm {
    fn from(key: HMACKey) -> Self {
        Algorithm::HMAC(key)
    }
}

impl From<ECDSAKey> for Algorithm {
    fn from(key: ECDSAKey) -> Self {
        Algorithm::ECDSA(key)
    }
}

impl From<EdDSAKey> for Algorithm {
    fn from(key: EdDSAKey) -> Self {
        Algorithm::EdDSA(key)
    }
}

impl From<RSAKey> for Algorithm {
    fn from(key: RSAKey) -> Self {
        Algorithm::RSA(key)
    }
}

impl From<MLDSAKey> for Algorithm {
    fn from(key: MLDSAKey) -> Self {
        Algorithm::MLDSA(key)
    }
}

#[test]
fn generic_verify_rejects_length_mismatch() {
    let key = HMACKey::from_bytes(b"secret", HashFunction::SHA256);
    let tag = key.sign(b"data").unwrap();
    assert!(key.verify(&tag, b"data").unwrap());
    assert!(!key.verify(&tag[..31], b"data").unwrap());
    let mut longer = tag.clone();
    longer.push(0);
    assert!(!key.verify(&longer, b"data").unwrap());
}
