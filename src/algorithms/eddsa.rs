use ct_codecs::{Base64UrlSafeNoPadding, Encoder};

use super::JWTAlgorithm;
use crate::error::*;
use crate::jwk::{KeyType, JWK};

/// An Ed25519 key (`EdDSA`), public-only or with its secret key.
#[derive(Clone)]
pub struct EdDSAKey {
    pk: ed25519_compact::PublicKey,
    sk: Option<ed25519_compact::SecretKey>,
}

impl EdDSAKey {
    pub fn generate() -> Self {
        let kp = ed25519_compact::KeyPair::from_seed(ed25519_compact::Seed::generate());
        EdDSAKey {
            pk: kp.pk,
            sk: Some(kp.sk),
        }
    }

    /// Load a key pair from its 32-byte seed (the JWK `d` parameter).
    pub fn from_seed(seed: &[u8]) -> Result<Self, Error> {
        let seed = ed25519_compact::Seed::from_slice(seed).map_err(|_| JWTError::InvalidKeyPair)?;
        let kp = ed25519_compact::KeyPair::from_seed(seed);
        Ok(EdDSAKey {
            pk: kp.pk,
            sk: Some(kp.sk),
        })
    }

    pub fn from_public_bytes(raw: &[u8]) -> Result<Self, Error> {
        let pk =
            ed25519_compact::PublicKey::from_slice(raw).map_err(|_| JWTError::InvalidPublicKey)?;
        Ok(EdDSAKey { pk, sk: None })
    }

    pub fn from_pem(pem: &str) -> Result<Self, Error> {
        let kp = match ed25519_compact::KeyPair::from_pem(pem) {
            Ok(kp) => kp,
            Err(_) => ed25519_compact::KeyPair::from_seed(
                ed25519_compact::SecretKey::from_pem(pem)
                    .map_err(|_| JWTError::InvalidKeyPair)?
                    .seed(),
            ),
        };
        Ok(EdDSAKey {
            pk: kp.pk,
            sk: Some(kp.sk),
        })
    }

    pub fn from_public_key_pem(pem: &str) -> Result<Self, Error> {
        let pk = ed25519_compact::PublicKey::from_pem(pem).map_err(|_| JWTError::InvalidPublicKey)?;
        Ok(EdDSAKey { pk, sk: None })
    }

    pub fn is_private(&self) -> bool {
        self.sk.is_some()
    }

    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.pk.as_ref().to_vec()
    }

    pub fn public_key(&self) -> Self {
        EdDSAKey {
            pk: self.pk,
            sk: None,
        }
    }

    pub fn public_jwk(&self) -> JWK {
        JWK {
            algorithm: Some("EdDSA".to_string()),
            curve: Some("Ed25519".to_string()),
            x: Base64UrlSafeNoPadding::encode_to_string(self.pk.as_ref()).ok(),
            ..JWK::new(KeyType::OKP)
        }
    }
}

impl JWTAlgorithm for EdDSAKey {
    fn name(&self) -> &'static str {
        "EdDSA"
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let sk = self.sk.as_ref().ok_or(JWTError::PrivateKeyRequired)?;
        let noise = ed25519_compact::Noise::generate();
        Ok(sk.sign(plaintext, Some(noise)).to_vec())
    }

    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        let signature = ed25519_compact::Signature::from_slice(signature)
            .map_err(|_| JWTError::malformed("EdDSA signatures must be 64 bytes long"))?;
        Ok(self.pk.verify(plaintext, &signature).is_ok())
    }
}

#[test]
fn eddsa_seed_roundtrip() {
    let key = EdDSAKey::generate();
    let signature = key.sign(b"payload").unwrap();
    let public = EdDSAKey::from_public_bytes(&key.public_key_bytes()).unwrap();
    assert!(public.verify(&signature, b"payload").unwrap());
    assert!(!public.verify(&signature, b"Payload").unwrap());
    assert!(public.sign(b"payload").is_err());
    assert!(EdDSAKey::from_seed(&[0u8; 31]).is_err());
}
