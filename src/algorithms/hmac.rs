use hmac_sha512::sha384 as hmac_sha384;
use rand::RngCore;
use zeroize::Zeroize;

use super::{HashFunction, JWTAlgorithm};
use crate::error::*;

/// A symmetric key for HS256, HS384 or HS512.
#[derive(Clone)]
pub struct HMACKey {
    raw_key: Vec<u8>,
    hash_function: HashFunction,
}

impl Drop for HMACKey {
    fn drop(&mut self) {
        self.raw_key.zeroize();
    }
}

impl HMACKey {
    /// Create a HMAC key from a byte slice.
    pub fn from_bytes(raw_key: &[u8], hash_function: HashFunction) -> Self {
        HMACKey {
            raw_key: raw_key.to_vec(),
            hash_function,
        }
    }

    /// Convert the HMAC key to a byte slice.
    pub fn to_bytes(&self) -> Vec<u8> {
        self.raw_key.clone()
    }

    /// Generate a random HMAC key, as long as the digest.
    pub fn generate(hash_function: HashFunction) -> Self {
        let len = match hash_function {
            HashFunction::SHA256 => 32,
            HashFunction::SHA384 => 48,
            HashFunction::SHA512 => 64,
        };
        let mut raw_key = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut raw_key);
        HMACKey {
            raw_key,
            hash_function,
        }
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }
}

impl AsRef<[u8]> for HMACKey {
    /// Get the raw key, as a byte slice
    fn as_ref(&self) -> &[u8] {
        &self.raw_key
    }
}

impl JWTAlgorithm for HMACKey {
    fn name(&self) -> &'static str {
        match self.hash_function {
            HashFunction::SHA256 => "HS256",
            HashFunction::SHA384 => "HS384",
            HashFunction::SHA512 => "HS512",
        }
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let tag = match self.hash_function {
            HashFunction::SHA256 => hmac_sha256::HMAC::mac(plaintext, &self.raw_key).to_vec(),
            HashFunction::SHA384 => hmac_sha384::HMAC::mac(plaintext, &self.raw_key).to_vec(),
            HashFunction::SHA512 => hmac_sha512::HMAC::mac(plaintext, &self.raw_key).to_vec(),
        };
        Ok(tag)
    }
}

#[test]
fn hmac_names_and_tag_lengths() {
    for (hash_function, name, len) in [
        (HashFunction::SHA256, "HS256", 32),
        (HashFunction::SHA384, "HS384", 48),
        (HashFunction::SHA512, "HS512", 64),
    ] {
        let key = HMACKey::generate(hash_function);
        assert_eq!(key.name(), name);
        assert_eq!(key.as_ref().len(), len);
        let tag = key.sign(b"payload").unwrap();
        assert_eq!(tag.len(), len);
        assert!(key.verify(&tag, b"payload").unwrap());
        assert!(!key.verify(&tag, b"payloaD").unwrap());
    }
}
