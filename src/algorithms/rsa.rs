use boring::bn::{BigNum, BigNumRef};
use boring::error::ErrorStack;
use boring::pkey::{HasPublic, PKey, Private, Public};
use boring::rsa::{Padding, Rsa};
use boring::sign::{RsaPssSaltlen, Signer, Verifier};
use ct_codecs::{Base64UrlSafeNoPadding, Encoder};
use rand::{CryptoRng, RngCore};

use super::rsa_primes::{crt_parameters, recover_prime_factors, CRTParameters};
use super::{HashFunction, JWTAlgorithm};
use crate::error::*;
use crate::jwk::{KeyType, JWK};

/// Smallest accepted modulus.
pub const MIN_RSA_MODULUS_BITS: i32 = 2048;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RSAPadding {
    /// RSASSA-PKCS1-v1_5 (`RSxxx`)
    PKCS1,
    /// RSASSA-PSS with MGF1 and a salt as long as the digest (`PSxxx`)
    PSS,
}

impl RSAPadding {
    fn boring(self) -> Padding {
        match self {
            RSAPadding::PKCS1 => Padding::PKCS1,
            RSAPadding::PSS => Padding::PKCS1_PSS,
        }
    }
}

/// The padding and digest selected by an `RSxxx` or `PSxxx` name.
pub fn rsa_parameters_for_alg(alg: &str) -> Option<(RSAPadding, HashFunction)> {
    match alg {
        "RS256" => Some((RSAPadding::PKCS1, HashFunction::SHA256)),
        "RS384" => Some((RSAPadding::PKCS1, HashFunction::SHA384)),
        "RS512" => Some((RSAPadding::PKCS1, HashFunction::SHA512)),
        "PS256" => Some((RSAPadding::PSS, HashFunction::SHA256)),
        "PS384" => Some((RSAPadding::PSS, HashFunction::SHA384)),
        "PS512" => Some((RSAPadding::PSS, HashFunction::SHA512)),
        _ => None,
    }
}

fn signing_failure(e: ErrorStack) -> JWTError {
    JWTError::SigningAlgorithmFailure(e.to_string())
}

#[derive(Clone, Debug)]
enum RSAKeyMaterial {
    Public(Rsa<Public>),
    Private(Rsa<Private>),
}

/// An RSA key bound to a padding scheme and a digest.
#[derive(Clone, Debug)]
pub struct RSAKey {
    key: RSAKeyMaterial,
    padding: RSAPadding,
    hash_function: HashFunction,
}

impl RSAKey {
    fn new(
        key: RSAKeyMaterial,
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let modulus_bits = match &key {
            RSAKeyMaterial::Public(rsa) => rsa.n().num_bits(),
            RSAKeyMaterial::Private(rsa) => rsa.n().num_bits(),
        };
        ensure!(
            modulus_bits >= MIN_RSA_MODULUS_BITS,
            JWTError::KeySizeTooSmall
        );
        Ok(RSAKey {
            key,
            padding,
            hash_function,
        })
    }

    fn from_private(
        rsa: Rsa<Private>,
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        if !(rsa.check_key()?) {
            bail!(JWTError::InvalidKeyPair);
        }
        Self::new(RSAKeyMaterial::Private(rsa), padding, hash_function)
    }

    pub fn generate(
        modulus_bits: u32,
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        match modulus_bits {
            2048 | 3072 | 4096 => {}
            bits if bits < 2048 => bail!(JWTError::KeySizeTooSmall),
            _ => bail!(JWTError::KeyInitializationFailure("unsupported modulus size".into())),
        };
        let rsa = Rsa::<Private>::generate(modulus_bits)?;
        Self::new(RSAKeyMaterial::Private(rsa), padding, hash_function)
    }

    /// Load a PKCS#1 or PKCS#8 private key.
    pub fn from_pem(pem: &str, padding: RSAPadding, hash_function: HashFunction) -> Result<Self, Error> {
        let pem = pem.trim();
        let rsa = Rsa::<Private>::private_key_from_pem(pem.as_bytes())?;
        Self::from_private(rsa, padding, hash_function)
    }

    pub fn from_der(der: &[u8], padding: RSAPadding, hash_function: HashFunction) -> Result<Self, Error> {
        let rsa = Rsa::<Private>::private_key_from_der(der)?;
        Self::from_private(rsa, padding, hash_function)
    }

    pub fn from_public_key_pem(
        pem: &str,
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let pem = pem.trim();
        let rsa = Rsa::<Public>::public_key_from_pem(pem.as_bytes())
            .or_else(|_| Rsa::<Public>::public_key_from_pem_pkcs1(pem.as_bytes()))
            .map_err(|_| JWTError::InvalidPublicKey)?;
        Self::new(RSAKeyMaterial::Public(rsa), padding, hash_function)
    }

    pub fn from_public_key_der(
        der: &[u8],
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let rsa = Rsa::<Public>::public_key_from_der(der)
            .or_else(|_| Rsa::<Public>::public_key_from_der_pkcs1(der))
            .map_err(|_| JWTError::InvalidPublicKey)?;
        Self::new(RSAKeyMaterial::Public(rsa), padding, hash_function)
    }

    /// Public key from the big-endian modulus and exponent.
    pub fn from_components(
        n: &[u8],
        e: &[u8],
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let rsa = Rsa::<Public>::from_public_components(BigNum::from_slice(n)?, BigNum::from_slice(e)?)
            .map_err(|_| JWTError::InvalidPublicKey)?;
        Self::new(RSAKeyMaterial::Public(rsa), padding, hash_function)
    }

    /// Private key from `(n, e, d)` alone; the prime factors are recovered
    /// using `rng`.
    pub fn from_private_components<R: RngCore + CryptoRng>(
        n: &[u8],
        e: &[u8],
        d: &[u8],
        padding: RSAPadding,
        hash_function: HashFunction,
        rng: &mut R,
    ) -> Result<Self, Error> {
        let (n, e, d) = (BigNum::from_slice(n)?, BigNum::from_slice(e)?, BigNum::from_slice(d)?);
        ensure!(
            n.num_bits() >= MIN_RSA_MODULUS_BITS,
            JWTError::KeySizeTooSmall
        );
        let (p, q) = recover_prime_factors(&n, &e, &d, rng)?;
        let crt = crt_parameters(p, q, &d)?;
        Self::from_crt(n, e, d, crt, padding, hash_function)
    }

    /// Private key from `(n, e, d)` and known prime factors.
    pub fn from_private_components_with_primes(
        n: &[u8],
        e: &[u8],
        d: &[u8],
        p: &[u8],
        q: &[u8],
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let d = BigNum::from_slice(d)?;
        let crt = crt_parameters(BigNum::from_slice(p)?, BigNum::from_slice(q)?, &d)?;
        Self::from_crt(
            BigNum::from_slice(n)?,
            BigNum::from_slice(e)?,
            d,
            crt,
            padding,
            hash_function,
        )
    }

    fn from_crt(
        n: BigNum,
        e: BigNum,
        d: BigNum,
        crt: CRTParameters,
        padding: RSAPadding,
        hash_function: HashFunction,
    ) -> Result<Self, Error> {
        let CRTParameters { p, q, dp, dq, qi } = crt;
        let rsa = Rsa::<Private>::from_private_components(n, e, d, p, q, dp, dq, qi)
            .map_err(|e| JWTError::KeyInitializationFailure(e.to_string()))?;
        Self::from_private(rsa, padding, hash_function)
    }

    pub fn is_private(&self) -> bool {
        matches!(self.key, RSAKeyMaterial::Private(_))
    }

    fn n(&self) -> &BigNumRef {
        match &self.key {
            RSAKeyMaterial::Public(rsa) => rsa.n(),
            RSAKeyMaterial::Private(rsa) => rsa.n(),
        }
    }

    fn e(&self) -> &BigNumRef {
        match &self.key {
            RSAKeyMaterial::Public(rsa) => rsa.e(),
            RSAKeyMaterial::Private(rsa) => rsa.e(),
        }
    }

    pub fn modulus_bits(&self) -> usize {
        self.n().num_bits() as usize
    }

    pub fn padding(&self) -> RSAPadding {
        self.padding
    }

    pub fn hash_function(&self) -> HashFunction {
        self.hash_function
    }

    /// DER-encoded PKCS#1 private key.
    pub fn to_der(&self) -> Result<Vec<u8>, Error> {
        match &self.key {
            RSAKeyMaterial::Private(rsa) => Ok(rsa.private_key_to_der()?),
            RSAKeyMaterial::Public(_) => bail!(JWTError::PrivateKeyRequired),
        }
    }

    pub fn public_key(&self) -> Result<Self, Error> {
        let rsa = Rsa::<Public>::from_public_components(self.n().to_owned()?, self.e().to_owned()?)?;
        Self::new(RSAKeyMaterial::Public(rsa), self.padding, self.hash_function)
    }

    pub fn public_jwk(&self) -> Result<JWK, Error> {
        Ok(JWK {
            algorithm: Some(self.name().to_string()),
            n: Some(Base64UrlSafeNoPadding::encode_to_string(self.n().to_vec())?),
            e: Some(Base64UrlSafeNoPadding::encode_to_string(self.e().to_vec())?),
            ..JWK::new(KeyType::RSA)
        })
    }

    fn verify_with<T: HasPublic>(
        &self,
        rsa: &Rsa<T>,
        signature: &[u8],
        plaintext: &[u8],
    ) -> Result<bool, Error> {
        ensure!(
            signature.len() == rsa.size() as usize,
            JWTError::malformed("RSA signature length doesn't match the modulus")
        );
        let pkey = PKey::from_rsa(rsa.clone())?;
        let mut verifier = Verifier::new(self.hash_function.message_digest(), &pkey)?;
        verifier.set_rsa_padding(self.padding.boring())?;
        if self.padding == RSAPadding::PSS {
            verifier.set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)?;
        }
        verifier.update(plaintext)?;
        Ok(verifier.verify(signature).unwrap_or(false))
    }
}

impl JWTAlgorithm for RSAKey {
    fn name(&self) -> &'static str {
        match (self.padding, self.hash_function) {
            (RSAPadding::PKCS1, HashFunction::SHA256) => "RS256",
            (RSAPadding::PKCS1, HashFunction::SHA384) => "RS384",
            (RSAPadding::PKCS1, HashFunction::SHA512) => "RS512",
            (RSAPadding::PSS, HashFunction::SHA256) => "PS256",
            (RSAPadding::PSS, HashFunction::SHA384) => "PS384",
            (RSAPadding::PSS, HashFunction::SHA512) => "PS512",
        }
    }

    fn sign(&self, plaintext: &[u8]) -> Result<Vec<u8>, Error> {
        let rsa = match &self.key {
            RSAKeyMaterial::Private(rsa) => rsa,
            RSAKeyMaterial::Public(_) => bail!(JWTError::PrivateKeyRequired),
        };
        let pkey = PKey::from_rsa(rsa.clone()).map_err(signing_failure)?;
        let mut signer =
            Signer::new(self.hash_function.message_digest(), &pkey).map_err(signing_failure)?;
        signer
            .set_rsa_padding(self.padding.boring())
            .map_err(signing_failure)?;
        if self.padding == RSAPadding::PSS {
            signer
                .set_rsa_pss_saltlen(RsaPssSaltlen::DIGEST_LENGTH)
                .map_err(signing_failure)?;
        }
        signer.update(plaintext).map_err(signing_failure)?;
        Ok(signer.sign_to_vec().map_err(signing_failure)?)
    }

    fn verify(&self, signature: &[u8], plaintext: &[u8]) -> Result<bool, Error> {
        match &self.key {
            RSAKeyMaterial::Public(rsa) => self.verify_with(rsa, signature, plaintext),
            RSAKeyMaterial::Private(rsa) => self.verify_with(rsa, signature, plaintext),
        }
    }
}

#[cfg(test)]
mod tests {
    use rand::{rngs::StdRng, SeedableRng};

    use super::*;

    #[test]
    fn rebuilt_key_signs_like_the_generated_one() {
        let generated = RSAKey::generate(2048, RSAPadding::PKCS1, HashFunction::SHA256).unwrap();
        let rsa = match &generated.key {
            RSAKeyMaterial::Private(rsa) => rsa.clone(),
            RSAKeyMaterial::Public(_) => unreachable!(),
        };
        let rebuilt = RSAKey::from_private_components(
            &rsa.n().to_vec(),
            &rsa.e().to_vec(),
            &rsa.d().to_vec(),
            RSAPadding::PKCS1,
            HashFunction::SHA256,
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap();
        assert!(rebuilt.is_private());

        let message = b"a fixed message";
        let expected = generated.sign(message).unwrap();
        assert_eq!(rebuilt.sign(message).unwrap(), expected);
        let public = generated.public_key().unwrap();
        assert!(public.verify(&rebuilt.sign(message).unwrap(), message).unwrap());
    }

    #[test]
    fn generate_rejects_other_modulus_sizes() {
        let error = |bits| {
            RSAKey::generate(bits, RSAPadding::PKCS1, HashFunction::SHA256)
                .err()
                .unwrap()
                .downcast::<JWTError>()
                .unwrap()
        };
        assert!(matches!(error(1024), JWTError::KeySizeTooSmall));
        assert!(matches!(
            error(8192),
            JWTError::KeyInitializationFailure(reason) if reason == "unsupported modulus size"
        ));
        assert!(matches!(error(2049), JWTError::KeyInitializationFailure(_)));
    }

    #[test]
    fn pss_signatures_verify() {
        let key = RSAKey::generate(2048, RSAPadding::PSS, HashFunction::SHA384).unwrap();
        assert_eq!(key.name(), "PS384");
        let signature = key.sign(b"payload").unwrap();
        let public = key.public_key().unwrap();
        assert!(public.verify(&signature, b"payload").unwrap());
        assert!(!public.verify(&signature, b"Payload").unwrap());
        assert!(public.verify(&signature[1..], b"payload").is_err());
        assert!(matches!(
            public.sign(b"payload").unwrap_err().downcast_ref::<JWTError>(),
            Some(JWTError::PrivateKeyRequired)
        ));
    }

    #[test]
    fn small_moduli_are_rejected() {
        let rsa = Rsa::<Private>::generate(1024).unwrap();
        let res = RSAKey::from_components(
            &rsa.n().to_vec(),
            &rsa.e().to_vec(),
            RSAPadding::PKCS1,
            HashFunction::SHA256,
        );
        assert!(matches!(
            res.unwrap_err().downcast_ref::<JWTError>(),
            Some(JWTError::KeySizeTooSmall)
        ));
    }
}
