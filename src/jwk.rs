//! JSON Web Keys ([RFC 7517]) and key sets, and their conversion into
//! [`Algorithm`] instances.
//!
//! [RFC 7517]: https://www.rfc-editor.org/rfc/rfc7517

use ct_codecs::{Base64UrlSafeNoPadding, Decoder};
use serde::{Deserialize, Serialize};

use crate::algorithms::*;
use crate::error::*;

/// The `kty` parameter.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyType {
    RSA,
    EC,
    OKP,
}

impl KeyType {
    pub fn as_str(self) -> &'static str {
        match self {
            KeyType::RSA => "RSA",
            KeyType::EC => "EC",
            KeyType::OKP => "OKP",
        }
    }
}

/// A single JSON Web Key.
///
/// Binary parameters are kept in their base64url form and decoded when the
/// key is materialized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JWK {
    #[serde(rename = "kty")]
    pub key_type: KeyType,

    #[serde(rename = "use", default, skip_serializing_if = "Option::is_none")]
    pub public_key_use: Option<String>,

    #[serde(rename = "key_ops", default, skip_serializing_if = "Option::is_none")]
    pub key_operations: Option<Vec<String>>,

    #[serde(rename = "alg", default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,

    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5u: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5c: Option<Vec<String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x5t: Option<String>,

    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    pub x5t_s256: Option<String>,

    // RSA
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub n: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub e: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub d: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub p: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub q: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dq: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qi: Option<String>,

    // EC and OKP
    #[serde(rename = "crv", default, skip_serializing_if = "Option::is_none")]
    pub curve: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<String>,
}

fn required<'a>(value: &'a Option<String>, name: &str) -> Result<&'a str, Error> {
    value
        .as_deref()
        .ok_or_else(|| JWTError::InvalidJWK(format!("missing parameter [{}]", name)).into())
}

fn decode(value: &str, name: &str) -> Result<Vec<u8>, Error> {
    Base64UrlSafeNoPadding::decode_to_vec(value, None)
        .map_err(|_| JWTError::InvalidJWK(format!("parameter [{}] is not valid base64url", name)).into())
}

fn decode_required(value: &Option<String>, name: &str) -> Result<Vec<u8>, Error> {
    decode(required(value, name)?, name)
}

fn decode_optional(value: &Option<String>, name: &str) -> Result<Option<Vec<u8>>, Error> {
    value.as_deref().map(|v| decode(v, name)).transpose()
}

impl JWK {
    /// An empty key of the given type.
    pub fn new(key_type: KeyType) -> Self {
        JWK {
            key_type,
            public_key_use: None,
            key_operations: None,
            algorithm: None,
            key_id: None,
            x5u: None,
            x5c: None,
            x5t: None,
            x5t_s256: None,
            n: None,
            e: None,
            d: None,
            p: None,
            q: None,
            dp: None,
            dq: None,
            qi: None,
            curve: None,
            x: None,
            y: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| JWTError::InvalidJWK(e.to_string()).into())
    }

    pub fn with_key_id(mut self, key_id: impl ToString) -> Self {
        self.key_id = Some(key_id.to_string());
        self
    }

    pub fn with_algorithm(mut self, algorithm: impl ToString) -> Self {
        self.algorithm = Some(algorithm.to_string());
        self
    }

    /// Whether the key carries private material.
    pub fn is_private(&self) -> bool {
        self.d.is_some()
    }

    /// Build a signer from this key.
    ///
    /// `alg_hint` takes priority over the key's own `alg` parameter.
    pub fn materialize(&self, alg_hint: Option<&str>) -> Result<Algorithm, Error> {
        let alg = alg_hint.or(self.algorithm.as_deref());
        match self.key_type {
            KeyType::RSA => self.materialize_rsa(alg),
            KeyType::EC => self.materialize_ec(alg),
            KeyType::OKP => self.materialize_okp(alg),
        }
    }

    fn materialize_rsa(&self, alg: Option<&str>) -> Result<Algorithm, Error> {
        let alg = alg.ok_or_else(|| JWTError::InvalidJWK("no algorithm for RSA key".into()))?;
        let (padding, hash_function) = rsa_parameters_for_alg(alg)
            .ok_or_else(|| JWTError::InvalidJWK(format!("unsupported RSA algorithm [{}]", alg)))?;
        let n = decode_required(&self.n, "n")?;
        let e = decode_required(&self.e, "e")?;
        let key = match decode_optional(&self.d, "d")? {
            None => RSAKey::from_components(&n, &e, padding, hash_function)?,
            Some(d) => match (
                decode_optional(&self.p, "p")?,
                decode_optional(&self.q, "q")?,
            ) {
                (Some(p), Some(q)) => RSAKey::from_private_components_with_primes(
                    &n,
                    &e,
                    &d,
                    &p,
                    &q,
                    padding,
                    hash_function,
                )?,
                _ => RSAKey::from_private_components(
                    &n,
                    &e,
                    &d,
                    padding,
                    hash_function,
                    &mut rand::thread_rng(),
                )?,
            },
        };
        Ok(key.into())
    }

    fn materialize_ec(&self, alg: Option<&str>) -> Result<Algorithm, Error> {
        let from_alg = match alg {
            None => None,
            Some(alg) => Some(ECDSACurve::from_alg_name(alg).ok_or_else(|| {
                JWTError::InvalidJWK(format!("unsupported EC algorithm [{}]", alg))
            })?),
        };
        let curve = match (self.curve.as_deref(), from_alg) {
            (Some(crv), from_alg) => {
                let curve = ECDSACurve::from_jwk_name(crv)?;
                if let Some(from_alg) = from_alg {
                    ensure!(
                        curve == from_alg,
                        JWTError::InvalidJWK(format!(
                            "curve [{}] cannot be used with [{}]",
                            crv,
                            from_alg.alg_name()
                        ))
                    );
                }
                curve
            }
            (None, Some(from_alg)) => from_alg,
            (None, None) => bail!(JWTError::InvalidJWK("no curve for EC key".into())),
        };
        let x = decode_required(&self.x, "x")?;
        let y = decode_required(&self.y, "y")?;
        let d = decode_optional(&self.d, "d")?;
        Ok(ECDSAKey::from_coordinates(curve, &x, &y, d.as_deref())?.into())
    }

    fn materialize_okp(&self, alg: Option<&str>) -> Result<Algorithm, Error> {
        let crv = required(&self.curve, "crv")?;
        ensure!(crv == "Ed25519", JWTError::CurveNotSupported(crv.to_string()));
        if let Some(alg) = alg {
            ensure!(
                alg == "EdDSA",
                JWTError::InvalidJWK(format!("unsupported OKP algorithm [{}]", alg))
            );
        }
        let x = decode_required(&self.x, "x")?;
        let key = match decode_optional(&self.d, "d")? {
            None => EdDSAKey::from_public_bytes(&x)?,
            Some(d) => {
                let key = EdDSAKey::from_seed(&d)?;
                ensure!(key.public_key_bytes() == x, JWTError::InvalidKeyPair);
                key
            }
        };
        Ok(key.into())
    }
}

/// A JSON Web Key Set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JWKS {
    pub keys: Vec<JWK>,
}

impl JWKS {
    pub fn from_json(json: &str) -> Result<Self, Error> {
        serde_json::from_str(json).map_err(|e| JWTError::InvalidJWK(e.to_string()).into())
    }

    /// The first key with this identifier and type.
    ///
    /// Keys of different types are allowed to share an identifier.
    pub fn find(&self, key_id: &str, key_type: KeyType) -> Option<&JWK> {
        self.keys
            .iter()
            .find(|jwk| jwk.key_type == key_type && jwk.key_id.as_deref() == Some(key_id))
    }

    /// Every key with this identifier.
    pub fn find_all(&self, key_id: &str) -> Vec<&JWK> {
        self.keys
            .iter()
            .filter(|jwk| jwk.key_id.as_deref() == Some(key_id))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use ct_codecs::Encoder;

    use super::*;

    fn jwk_error(res: Result<Algorithm, Error>) -> JWTError {
        match res {
            Ok(_) => panic!("expected an error"),
            Err(e) => e.downcast::<JWTError>().unwrap(),
        }
    }

    #[test]
    fn parses_registered_parameters() {
        let jwk = JWK::from_json(
            r#"{"kty":"EC","crv":"P-256","kid":"k","use":"sig","key_ops":["verify"],
                "x5t#S256":"abc","x":"AA","y":"AA"}"#,
        )
        .unwrap();
        assert_eq!(jwk.key_type, KeyType::EC);
        assert_eq!(jwk.public_key_use.as_deref(), Some("sig"));
        assert_eq!(jwk.key_operations, Some(vec!["verify".to_string()]));
        assert_eq!(jwk.x5t_s256.as_deref(), Some("abc"));

        let json = serde_json::to_value(&jwk).unwrap();
        assert_eq!(json["kty"], "EC");
        assert!(json.get("n").is_none());

        assert!(JWK::from_json(r#"{"kty":"oct","k":"AA"}"#).is_err());
    }

    #[test]
    fn ec_public_jwk_roundtrip() {
        for curve in [ECDSACurve::P256, ECDSACurve::P384, ECDSACurve::P521] {
            let key = ECDSAKey::generate(curve).unwrap();
            let signature = key.sign(b"data").unwrap();
            let jwk = key.public_jwk().unwrap();
            assert_eq!(jwk.curve.as_deref(), Some(curve.jwk_name()));

            let public = jwk.materialize(None).unwrap();
            assert!(!public.can_sign());
            assert_eq!(public.name(), curve.alg_name());
            assert!(public.verify(&signature, b"data").unwrap());
        }
    }

    #[test]
    fn ec_curve_comes_from_algorithm_when_absent() {
        let key = ECDSAKey::generate(ECDSACurve::P384).unwrap();
        let mut jwk = key.public_jwk().unwrap();
        jwk.curve = None;
        assert_eq!(jwk.materialize(Some("ES384")).unwrap().name(), "ES384");

        jwk.algorithm = None;
        assert!(matches!(
            jwk_error(jwk.materialize(None)),
            JWTError::InvalidJWK(_)
        ));
    }

    #[test]
    fn ec_curve_and_algorithm_must_agree() {
        let jwk = ECDSAKey::generate(ECDSACurve::P256)
            .unwrap()
            .public_jwk()
            .unwrap();
        assert!(matches!(
            jwk_error(jwk.materialize(Some("ES512"))),
            JWTError::InvalidJWK(_)
        ));
        assert!(matches!(
            jwk_error(jwk.materialize(Some("RS256"))),
            JWTError::InvalidJWK(_)
        ));
    }

    #[test]
    fn ec_private_scalar_must_match() {
        let key = ECDSAKey::generate(ECDSACurve::P256).unwrap();
        let mut jwk = key.public_jwk().unwrap();
        jwk.d = Some(Base64UrlSafeNoPadding::encode_to_string([7u8; 32]).unwrap());
        assert!(matches!(
            jwk_error(jwk.materialize(None)),
            JWTError::InvalidKeyPair
        ));
    }

    #[test]
    fn okp_keys() {
        let key = EdDSAKey::generate();
        let jwk = key.public_jwk();
        let signature = key.sign(b"data").unwrap();
        let public = jwk.materialize(None).unwrap();
        assert_eq!(public.name(), "EdDSA");
        assert!(public.verify(&signature, b"data").unwrap());

        let mut x448 = jwk.clone();
        x448.curve = Some("Ed448".to_string());
        assert!(matches!(
            jwk_error(x448.materialize(None)),
            JWTError::CurveNotSupported(_)
        ));

        let mut wrong_seed = jwk;
        wrong_seed.d = Some(Base64UrlSafeNoPadding::encode_to_string([1u8; 32]).unwrap());
        assert!(matches!(
            jwk_error(wrong_seed.materialize(None)),
            JWTError::InvalidKeyPair
        ));
    }

    #[test]
    fn okp_private_key_from_seed() {
        let seed = [42u8; 32];
        let key = EdDSAKey::from_seed(&seed).unwrap();
        let mut jwk = key.public_jwk();
        jwk.d = Some(Base64UrlSafeNoPadding::encode_to_string(seed).unwrap());
        let signer = jwk.materialize(Some("EdDSA")).unwrap();
        assert!(signer.can_sign());
        let signature = signer.sign(b"data").unwrap();
        assert!(key.verify(&signature, b"data").unwrap());
    }

    #[test]
    fn rsa_needs_an_algorithm() {
        let key = RSAKey::generate(2048, RSAPadding::PKCS1, HashFunction::SHA256).unwrap();
        let mut jwk = key.public_jwk().unwrap();
        jwk.algorithm = None;
        assert!(matches!(
            jwk_error(jwk.materialize(None)),
            JWTError::InvalidJWK(_)
        ));
        assert!(matches!(
            jwk_error(jwk.materialize(Some("ES256"))),
            JWTError::InvalidJWK(_)
        ));
        let pss = jwk.materialize(Some("PS384")).unwrap();
        assert_eq!(pss.name(), "PS384");
    }

    #[test]
    fn rsa_private_key_without_primes() {
        let key = RSAKey::generate(2048, RSAPadding::PKCS1, HashFunction::SHA256).unwrap();
        let signature = key.sign(b"data").unwrap();
        let der = key.to_der().unwrap();
        let rsa = boring::rsa::Rsa::private_key_from_der(&der).unwrap();
        let encode = |bn: &boring::bn::BigNumRef| {
            Some(Base64UrlSafeNoPadding::encode_to_string(bn.to_vec()).unwrap())
        };
        let jwk = JWK {
            d: encode(rsa.d()),
            ..key.public_jwk().unwrap()
        };
        assert!(jwk.p.is_none());

        let rebuilt = jwk.materialize(None).unwrap();
        assert!(rebuilt.can_sign());
        // PKCS#1 v1.5 is deterministic
        assert_eq!(rebuilt.sign(b"data").unwrap(), signature);
    }

    #[test]
    fn jwks_duplicate_kid() {
        let jwks = JWKS::from_json(
            r#"{"keys":[
                {"kty":"RSA","kid":"k","alg":"RS256","n":"AQAB","e":"AQAB"},
                {"kty":"EC","kid":"k","crv":"P-256","x":"AA","y":"AA"},
                {"kty":"OKP","kid":"other","crv":"Ed25519","x":"AA"}
            ]}"#,
        )
        .unwrap();
        let all = jwks.find_all("k");
        assert_eq!(all.len(), 2);
        let ec = jwks.find("k", KeyType::EC).unwrap();
        assert_eq!(ec.key_type, KeyType::EC);
        assert_eq!(ec.curve.as_deref(), Some("P-256"));
        assert!(jwks.find("k", KeyType::OKP).is_none());
        assert!(jwks.find_all("missing").is_empty());
    }
}
