use pqcrypto_traits::sign::{DetachedSignature as _, PublicKey as _, SecretKey as _};
use zeroize::Zeroize;

use super::JWTAlgorithm;
use crate::error::*;

/// ML-DSA (FIPS 204) parameter sets.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum MLDSAVariant {
    MLDSA65,
    MLDSA87,
}

/// An ML-DSA key, public-only or with its secret key.
///
/// Keys are kept in their serialized form and parsed for each operation.
#[derive(Clone)]
pub struct MLDSAKey {
    variant: MLDSAVariant,
    public_key: Vec<u8>,
    secret_key: Option<Vec<u8>>,
}

impl Drop for MLDSAKey {
    fn drop(&mut self) {
        if let Some(secret_key) = self.secret_key.as_mut() {
            secret_key.zeroize();
        }
    }
}

impl MLDSAKey {
    pub fn generate(variant: MLDSAVariant) -> Self {
        let (public_key, secret_key) = match variant {
            MLDSAVariant::MLDSA65 => {
                let (pk, sk) = pqcrypto_mldsa::mldsa65::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
            MLDSAVariant::MLDSA87 => {
                let (pk, sk) = pqcrypto_mldsa::mldsa87::keypair();
                (pk.as_bytes().to_vec(), sk.as_bytes().to_vec())
            }
        };
        MLDSAKey {
            variant,
            public_key,
            secret_key: Some(secret_key),
        }
    }

    pub fn from_public_bytes(variant: MLDSAVariant, public_key: &[u8]) -> Result<Self, Error> {
        let valid = match variant {
            MLDSAVariant::MLDSA65 => pqcrypto_mldsa::mldsa65::PublicKey::from_bytes(public_key).is_ok(),
            MLDSAVariant::MLDSA87 => pqcrypto_mldsa::mldsa87::PublicKey::from_bytes(public_key).is_ok(),
        };
        ensure!(valid, JWTError::InvalidPublicKey);
        Ok(MLDSAKey {
            variant,
            public_key: public_key.to_vec(),
            secret_key: None,
        })
    }

    pub fn from_bytes(
        variant: MLDSAVariant,
        public_key: &[u8],
        secret_key: &[u8],
    ) -> Result<Self, Error> {
        let mut key = Self::from_public_bytes(variant, public_key)?;
        let valid = match variant {
            MLDSAVariant::MLDSA65 => pqcrypto_mldsa::mldsa65::SecretKey::from_bytes(secret_key).is_ok(),
            MLDSAVariant::MLDSA87 => pqcrypto_mldsa::mldsa87::SecretKey::from_bytes(secret_key).is_ok(),
        };
        ensure!(valid, JWTError::InvalidKeyPair);
        key.secret_key = Some(secret_key.to_vec());
        // the secret key must sign for the public key it came with
        const PAIR_CHECK: &[u8] = b"ml-dsa key pair check";
        let signature = key.sign(PAIR_CHECK)?;
        ensure!(key.verify(&signature, PAIR_CHECK)?, JWTError::InvalidKeyPair);
        Ok(key)
    }

    pub fn variant(&self) -> MLDSAVariant {
        self.variant
    }

    pub fn is_private(&self) -> bool {
        self.secret_key.is_some()
    }

    pub fn public_key_bytes(&self) -> &[u8] {
        &self.public_key
    }
}

impl JWTAlgorithm for MLDSAKey {
    fn name(&self) -> &'static str {
        match self.variant {
            MLDSAVariant::MLDSA65 => "ML-DSA-65",
            MLDSAVariant::MLDSA87 => "ML-DSA-87",
        }
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let secret_key = self
            .secret_key
            .as_deref()
            .ok_or(JWTError::PrivateKeyRequired)?;
        let failure = |_| JWTError::SigningAlgorithmFailure("invalid ML-DSA secret key".into());
        let signature = match self.variant {
            MLDSAVariant::MLDSA65 => {
                let sk = pqcrypto_mldsa::mldsa65::SecretKey::from_bytes(secret_key).map_err(failure)?;
                pqcrypto_mldsa::mldsa65::detached_sign(plaintext, &sk)
                    .as_bytes()
                    .to_vec()
            }
            MLDSAVariant::MLDSA87 => {
                let sk = pqcrypto_mldsa::mldsa87::SecretKey::from_bytes(secret_key).map_err(failure)?;
                pqcrypto_mldsa::mldsa87::detached_sign(plaintext, &sk)
                    .as_bytes()
                    .to_vec()
            }
        };
        Ok(signature)
    }

    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        let malformed = |_| JWTError::malformed(format!("invalid {} signature length", self.name()));
        let valid = match self.variant {
            MLDSAVariant::MLDSA65 => {
                use pqcrypto_mldsa::mldsa65::{verify_detached_signature, DetachedSignature, PublicKey};
                let pk = PublicKey::from_bytes(&self.public_key)
                    .map_err(|_| JWTError::InvalidPublicKey)?;
                let sig = DetachedSignature::from_bytes(signature).map_err(malformed)?;
                verify_detached_signature(&sig, plaintext, &pk).is_ok()
            }
            MLDSAVariant::MLDSA87 => {
                use pqcrypto_mldsa::mldsa87::{verify_detached_signature, DetachedSignature, PublicKey};
                let pk = PublicKey::from_bytes(&self.public_key)
                    .map_err(|_| JWTError::InvalidPublicKey)?;
                let sig = DetachedSignature::from_bytes(signature).map_err(malformed)?;
                verify_detached_signature(&sig, plaintext, &pk).is_ok()
            }
        };
        Ok(valid)
    }
}

#[test]
fn mldsa_sign_and_verify() {
    for (variant, name) in [
        (MLDSAVariant::MLDSA65, "ML-DSA-65"),
        (MLDSAVariant::MLDSA87, "ML-DSA-87"),
    ] {
        let key = MLDSAKey::generate(variant);
        assert_eq!(key.name(), name);
        let signature = key.sign(b"payload").unwrap();
        let public = MLDSAKey::from_public_bytes(variant, key.public_key_bytes()).unwrap();
        assert!(public.verify(&signature, b"payload").unwrap());
        assert!(!public.verify(&signature, b"Payload").unwrap());
        assert!(public.verify(&signature[1..], b"payload").is_err());
        assert!(public.sign(b"payload").is_err());
    }
}

#[test]
fn mldsa_mismatched_key_pair() {
    let a = MLDSAKey::generate(MLDSAVariant::MLDSA65);
    let b = MLDSAKey::generate(MLDSAVariant::MLDSA65);
    let secret_of = |key: &MLDSAKey| key.secret_key.clone().unwrap();

    let rebuilt =
        MLDSAKey::from_bytes(MLDSAVariant::MLDSA65, a.public_key_bytes(), &secret_of(&a)).unwrap();
    assert!(rebuilt.is_private());

    let err = MLDSAKey::from_bytes(MLDSAVariant::MLDSA65, a.public_key_bytes(), &secret_of(&b))
        .err()
        .unwrap();
    assert!(matches!(err.downcast_ref::<JWTError>(), Some(JWTError::InvalidKeyPair)));
}
