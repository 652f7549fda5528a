use ct_codecs::{Base64UrlSafeNoPadding, Encoder};
use p256::ecdsa::signature::hazmat::{PrehashSigner as _, PrehashVerifier as _};
use p256::elliptic_curve::sec1::ToEncodedPoint as _;
use p256::pkcs8::{DecodePrivateKey, DecodePublicKey};

use super::{HashFunction, JWTAlgorithm};
use crate::error::*;
use crate::jwk::{KeyType, JWK};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ECDSACurve {
    P256,
    P384,
    P521,
}

impl ECDSACurve {
    /// Width of each of the `r` and `s` components of a raw signature, which
    /// is also the width of a field element.
    pub fn component_len(self) -> usize {
        match self {
            ECDSACurve::P256 => 32,
            ECDSACurve::P384 => 48,
            ECDSACurve::P521 => 66,
        }
    }

    /// The JWK `crv` name
    pub fn jwk_name(self) -> &'static str {
        match self {
            ECDSACurve::P256 => "P-256",
            ECDSACurve::P384 => "P-384",
            ECDSACurve::P521 => "P-521",
        }
    }

    pub fn from_jwk_name(crv: &str) -> Result<Self, Error> {
        match crv {
            "P-256" => Ok(ECDSACurve::P256),
            "P-384" => Ok(ECDSACurve::P384),
            "P-521" => Ok(ECDSACurve::P521),
            _ => bail!(JWTError::CurveNotSupported(crv.to_string())),
        }
    }

    /// The JWS `alg` name
    pub fn alg_name(self) -> &'static str {
        match self {
            ECDSACurve::P256 => "ES256",
            ECDSACurve::P384 => "ES384",
            ECDSACurve::P521 => "ES512",
        }
    }

    pub fn from_alg_name(alg: &str) -> Option<Self> {
        match alg {
            "ES256" => Some(ECDSACurve::P256),
            "ES384" => Some(ECDSACurve::P384),
            "ES512" => Some(ECDSACurve::P521),
            _ => None,
        }
    }

    fn hash_function(self) -> HashFunction {
        match self {
            ECDSACurve::P256 => HashFunction::SHA256,
            ECDSACurve::P384 => HashFunction::SHA384,
            ECDSACurve::P521 => HashFunction::SHA512,
        }
    }
}

#[derive(Clone)]
enum CurveKey {
    P256 {
        public: p256::ecdsa::VerifyingKey,
        secret: Option<p256::ecdsa::SigningKey>,
    },
    P384 {
        public: p384::ecdsa::VerifyingKey,
        secret: Option<p384::ecdsa::SigningKey>,
    },
    P521 {
        public: p521::ecdsa::VerifyingKey,
        secret: Option<p521::ecdsa::SigningKey>,
    },
}

/// An ECDSA key for ES256, ES384 or ES512, public-only or with its secret
/// scalar.
#[derive(Clone)]
pub struct ECDSAKey {
    curve: ECDSACurve,
    key: CurveKey,
    public_sec1: Vec<u8>,
}

impl ECDSAKey {
    /// Generate a new key pair.
    pub fn generate(curve: ECDSACurve) -> Result<Self, Error> {
        let mut rng = rand::thread_rng();
        let secret = match curve {
            ECDSACurve::P256 => p256::SecretKey::random(&mut rng).to_bytes().to_vec(),
            ECDSACurve::P384 => p384::SecretKey::random(&mut rng).to_bytes().to_vec(),
            ECDSACurve::P521 => p521::SecretKey::random(&mut rng).to_bytes().to_vec(),
        };
        Self::from_private_bytes(curve, &secret)
    }

    /// Load a public key from its SEC1 encoding (compressed or not).
    pub fn from_public_bytes(curve: ECDSACurve, sec1: &[u8]) -> Result<Self, Error> {
        let public_sec1 = match curve {
            ECDSACurve::P256 => p256::PublicKey::from_sec1_bytes(sec1)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P384 => p384::PublicKey::from_sec1_bytes(sec1)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P521 => p521::PublicKey::from_sec1_bytes(sec1)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
        }
        .map_err(|_| JWTError::InvalidPublicKey)?;
        let key = match curve {
            ECDSACurve::P256 => CurveKey::P256 {
                public: p256::ecdsa::VerifyingKey::from_sec1_bytes(&public_sec1)
                    .map_err(|_| JWTError::InvalidPublicKey)?,
                secret: None,
            },
            ECDSACurve::P384 => CurveKey::P384 {
                public: p384::ecdsa::VerifyingKey::from_sec1_bytes(&public_sec1)
                    .map_err(|_| JWTError::InvalidPublicKey)?,
                secret: None,
            },
            ECDSACurve::P521 => CurveKey::P521 {
                public: p521::ecdsa::VerifyingKey::from_sec1_bytes(&public_sec1)
                    .map_err(|_| JWTError::InvalidPublicKey)?,
                secret: None,
            },
        };
        Ok(ECDSAKey {
            curve,
            key,
            public_sec1,
        })
    }

    /// Load a key pair from the big-endian secret scalar.
    pub fn from_private_bytes(curve: ECDSACurve, d: &[u8]) -> Result<Self, Error> {
        let public_sec1 = match curve {
            ECDSACurve::P256 => p256::SecretKey::from_slice(d)
                .map(|sk| sk.public_key().to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P384 => p384::SecretKey::from_slice(d)
                .map(|sk| sk.public_key().to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P521 => p521::SecretKey::from_slice(d)
                .map(|sk| sk.public_key().to_encoded_point(false).as_bytes().to_vec()),
        }
        .map_err(|_| JWTError::InvalidKeyPair)?;
        let mut key = Self::from_public_bytes(curve, &public_sec1)?;
        key.key = match key.key {
            CurveKey::P256 { public, .. } => CurveKey::P256 {
                public,
                secret: Some(
                    p256::ecdsa::SigningKey::from_slice(d).map_err(|_| JWTError::InvalidKeyPair)?,
                ),
            },
            CurveKey::P384 { public, .. } => CurveKey::P384 {
                public,
                secret: Some(
                    p384::ecdsa::SigningKey::from_slice(d).map_err(|_| JWTError::InvalidKeyPair)?,
                ),
            },
            CurveKey::P521 { public, .. } => CurveKey::P521 {
                public,
                secret: Some(
                    p521::ecdsa::SigningKey::from_slice(d).map_err(|_| JWTError::InvalidKeyPair)?,
                ),
            },
        };
        Ok(key)
    }

    /// Load a key from JWK-style affine coordinates, and optionally the
    /// secret scalar, which must match them.
    ///
    /// Coordinates shorter than the field width are left-padded.
    pub fn from_coordinates(
        curve: ECDSACurve,
        x: &[u8],
        y: &[u8],
        d: Option<&[u8]>,
    ) -> Result<Self, Error> {
        let len = curve.component_len();
        ensure!(x.len() <= len && y.len() <= len, JWTError::InvalidPublicKey);
        let mut sec1 = vec![0u8; 1 + 2 * len];
        sec1[0] = 0x04;
        sec1[1 + len - x.len()..1 + len].copy_from_slice(x);
        sec1[1 + 2 * len - y.len()..].copy_from_slice(y);
        match d {
            None => Self::from_public_bytes(curve, &sec1),
            Some(d) => {
                let key = Self::from_private_bytes(curve, d)?;
                ensure!(key.public_sec1 == sec1, JWTError::InvalidKeyPair);
                Ok(key)
            }
        }
    }

    /// Load a key pair from PKCS#8 or SEC1 PEM.
    pub fn from_pem(curve: ECDSACurve, pem: &str) -> Result<Self, Error> {
        let pem = pem.trim();
        let d = match curve {
            ECDSACurve::P256 => p256::SecretKey::from_pkcs8_pem(pem)
                .or_else(|_| p256::SecretKey::from_sec1_pem(pem))
                .map(|sk| sk.to_bytes().to_vec()),
            ECDSACurve::P384 => p384::SecretKey::from_pkcs8_pem(pem)
                .or_else(|_| p384::SecretKey::from_sec1_pem(pem))
                .map(|sk| sk.to_bytes().to_vec()),
            ECDSACurve::P521 => p521::SecretKey::from_pkcs8_pem(pem)
                .or_else(|_| p521::SecretKey::from_sec1_pem(pem))
                .map(|sk| sk.to_bytes().to_vec()),
        }
        .map_err(|_| JWTError::InvalidKeyPair)?;
        Self::from_private_bytes(curve, &d)
    }

    /// Load a public key from a DER-encoded SubjectPublicKeyInfo.
    pub fn from_public_key_der(curve: ECDSACurve, der: &[u8]) -> Result<Self, Error> {
        let sec1 = match curve {
            ECDSACurve::P256 => p256::PublicKey::from_public_key_der(der)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P384 => p384::PublicKey::from_public_key_der(der)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P521 => p521::PublicKey::from_public_key_der(der)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
        }
        .map_err(|_| JWTError::InvalidPublicKey)?;
        Self::from_public_bytes(curve, &sec1)
    }

    /// Load a public key from a PEM-encoded SubjectPublicKeyInfo.
    pub fn from_public_key_pem(curve: ECDSACurve, pem: &str) -> Result<Self, Error> {
        let pem = pem.trim();
        let sec1 = match curve {
            ECDSACurve::P256 => p256::PublicKey::from_public_key_pem(pem)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P384 => p384::PublicKey::from_public_key_pem(pem)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
            ECDSACurve::P521 => p521::PublicKey::from_public_key_pem(pem)
                .map(|pk| pk.to_encoded_point(false).as_bytes().to_vec()),
        }
        .map_err(|_| JWTError::InvalidPublicKey)?;
        Self::from_public_bytes(curve, &sec1)
    }

    pub fn curve(&self) -> ECDSACurve {
        self.curve
    }

    pub fn is_private(&self) -> bool {
        match &self.key {
            CurveKey::P256 { secret, .. } => secret.is_some(),
            CurveKey::P384 { secret, .. } => secret.is_some(),
            CurveKey::P521 { secret, .. } => secret.is_some(),
        }
    }

    /// Uncompressed SEC1 encoding of the public key.
    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_sec1
    }

    /// A verify-only copy of this key.
    pub fn public_key(&self) -> Result<Self, Error> {
        Self::from_public_bytes(self.curve, &self.public_sec1)
    }

    pub fn public_jwk(&self) -> Result<JWK, Error> {
        let len = self.curve.component_len();
        let x = &self.public_sec1[1..1 + len];
        let y = &self.public_sec1[1 + len..];
        Ok(JWK {
            algorithm: Some(self.name().to_string()),
            curve: Some(self.curve.jwk_name().to_string()),
            x: Some(Base64UrlSafeNoPadding::encode_to_string(x)?),
            y: Some(Base64UrlSafeNoPadding::encode_to_string(y)?),
            ..JWK::new(KeyType::EC)
        })
    }
}

impl JWTAlgorithm for ECDSAKey {
    fn name(&self) -> &'static str {
        self.curve.alg_name()
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let digest = self.curve.hash_function().hash(plaintext);
        let failure = |e: p256::ecdsa::Error| JWTError::SigningAlgorithmFailure(e.to_string());
        let signature = match &self.key {
            CurveKey::P256 { secret, .. } => {
                let secret = secret.as_ref().ok_or(JWTError::PrivateKeyRequired)?;
                let signature: p256::ecdsa::Signature =
                    secret.sign_prehash(&digest).map_err(failure)?;
                signature.to_bytes().to_vec()
            }
            CurveKey::P384 { secret, .. } => {
                let secret = secret.as_ref().ok_or(JWTError::PrivateKeyRequired)?;
                let signature: p384::ecdsa::Signature =
                    secret.sign_prehash(&digest).map_err(failure)?;
                signature.to_bytes().to_vec()
            }
            CurveKey::P521 { secret, .. } => {
                let secret = secret.as_ref().ok_or(JWTError::PrivateKeyRequired)?;
                let signature: p521::ecdsa::Signature =
                    secret.sign_prehash(&digest).map_err(failure)?;
                signature.to_bytes().to_vec()
            }
        };
        Ok(signature)
    }

    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        ensure!(
            signature.len() == 2 * self.curve.component_len(),
            JWTError::malformed(format!(
                "{} signatures must be {} bytes long",
                self.name(),
                2 * self.curve.component_len()
            ))
        );
        let digest = self.curve.hash_function().hash(plaintext);
        // Out-of-range scalars are a mismatch, not a shape error
        let valid = match &self.key {
            CurveKey::P256 { public, .. } => p256::ecdsa::Signature::from_slice(signature)
                .map(|signature| public.verify_prehash(&digest, &signature).is_ok()),
            CurveKey::P384 { public, .. } => p384::ecdsa::Signature::from_slice(signature)
                .map(|signature| public.verify_prehash(&digest, &signature).is_ok()),
            CurveKey::P521 { public, .. } => p521::ecdsa::Signature::from_slice(signature)
                .map(|signature| public.verify_prehash(&digest, &signature).is_ok()),
        };
        Ok(valid.unwrap_or(false))
    }
}

#[test]
fn ecdsa_signatures_have_fixed_width() {
    for curve in [ECDSACurve::P256, ECDSACurve::P384, ECDSACurve::P521] {
        let key = ECDSAKey::generate(curve).unwrap();
        let signature = key.sign(b"payload").unwrap();
        assert_eq!(signature.len(), 2 * curve.component_len());

        let public = key.public_key().unwrap();
        assert!(!public.is_private());
        assert!(public.verify(&signature, b"payload").unwrap());
        assert!(!public.verify(&signature, b"other").unwrap());
        assert!(public.verify(&signature[1..], b"payload").is_err());
        assert!(matches!(
            public.sign(b"payload").unwrap_err().downcast_ref::<JWTError>(),
            Some(JWTError::PrivateKeyRequired)
        ));
    }
}

#[test]
fn ecdsa_coordinates_must_match_secret() {
    let key = ECDSAKey::generate(ECDSACurve::P256).unwrap();
    let other = ECDSAKey::generate(ECDSACurve::P256).unwrap();
    let x = &key.public_key_bytes()[1..33];
    let y = &key.public_key_bytes()[33..];
    let d = match &other.key {
        CurveKey::P256 {
            secret: Some(secret),
            ..
        } => secret.to_bytes().to_vec(),
        _ => unreachable!(),
    };
    assert!(ECDSAKey::from_coordinates(ECDSACurve::P256, x, y, None).is_ok());
    assert!(ECDSAKey::from_coordinates(ECDSACurve::P256, x, y, Some(&d)).is_err());
}
