//! Checks applied to a candidate certification path.
//!
//! Each policy sees the whole path, leaf first and trust anchor last, and
//! reports a violation as a human-readable reason.

use coarsetime::UnixTimeStamp;
use p256::ecdsa::signature::hazmat::PrehashVerifier as _;
use x509_cert::der::asn1::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::pkix::{BasicConstraints, KeyUsage};
use x509_cert::Certificate;

use crate::algorithms::HashFunction;

const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");
const ECDSA_WITH_SHA384: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.3");
const ECDSA_WITH_SHA512: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.4");
const SHA256_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.11");
const SHA384_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.12");
const SHA512_WITH_RSA: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.13");
const ED25519: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.101.112");

const EC_PUBLIC_KEY: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.2.1");
const SECP256R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.3.1.7");
const SECP384R1: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.132.0.34");

const BASIC_CONSTRAINTS: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const KEY_USAGE: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.15");

/// Extensions this module understands well enough to accept when critical.
const RECOGNIZED_EXTENSIONS: [ObjectIdentifier; 6] = [
    BASIC_CONSTRAINTS,
    KEY_USAGE,
    // extendedKeyUsage
    ObjectIdentifier::new_unwrap("2.5.29.37"),
    // subjectAltName
    ObjectIdentifier::new_unwrap("2.5.29.17"),
    // subjectKeyIdentifier
    ObjectIdentifier::new_unwrap("2.5.29.14"),
    // authorityKeyIdentifier
    ObjectIdentifier::new_unwrap("2.5.29.35"),
];

/// A single predicate over a certification path.
pub trait PathPolicy: Send + Sync {
    fn name(&self) -> &'static str;

    fn check(&self, path: &[&Certificate], at: UnixTimeStamp) -> Result<(), String>;
}

/// Every certificate must be valid at the validation instant.
pub struct ValidAt;

/// Every certificate must carry a valid signature from the next one; the
/// anchor's own signature is not checked.
pub struct SignatureChain;

/// Intermediates must be CAs and honour `pathLenConstraint`.
pub struct IssuersAreCAs;

/// Issuers with a keyUsage extension must allow certificate signing.
pub struct KeyCertSign;

/// Critical extensions must be understood.
pub struct NoUnknownCriticalExtensions;

/// The policies applied to every candidate path, in order.
pub fn default_policies() -> Vec<Box<dyn PathPolicy>> {
    vec![
        Box::new(ValidAt),
        Box::new(SignatureChain),
        Box::new(IssuersAreCAs),
        Box::new(KeyCertSign),
        Box::new(NoUnknownCriticalExtensions),
    ]
}

/// Run `policies` in order, stopping at the first violation.
pub fn evaluate(
    policies: &[Box<dyn PathPolicy>],
    path: &[&Certificate],
    at: UnixTimeStamp,
) -> Result<(), String> {
    for policy in policies {
        policy
            .check(path, at)
            .map_err(|reason| format!("{}: {}", policy.name(), reason))?;
    }
    Ok(())
}

fn subject(cert: &Certificate) -> String {
    cert.tbs_certificate.subject.to_string()
}

impl PathPolicy for ValidAt {
    fn name(&self) -> &'static str {
        "validity"
    }

    fn check(&self, path: &[&Certificate], at: UnixTimeStamp) -> Result<(), String> {
        let at = at.as_secs();
        for cert in path {
            let validity = &cert.tbs_certificate.validity;
            let not_before = validity.not_before.to_unix_duration().as_secs();
            let not_after = validity.not_after.to_unix_duration().as_secs();
            if at < not_before {
                return Err(format!("[{}] is not valid yet", subject(cert)));
            }
            if at > not_after {
                return Err(format!("[{}] has expired", subject(cert)));
            }
        }
        Ok(())
    }
}

impl PathPolicy for SignatureChain {
    fn name(&self) -> &'static str {
        "signature"
    }

    fn check(&self, path: &[&Certificate], _at: UnixTimeStamp) -> Result<(), String> {
        for pair in path.windows(2) {
            let (cert, issuer) = (pair[0], pair[1]);
            match verify_signature(cert, issuer) {
                Ok(true) => {}
                Ok(false) => {
                    return Err(format!(
                        "[{}] is not signed by [{}]",
                        subject(cert),
                        subject(issuer)
                    ))
                }
                Err(reason) => return Err(format!("[{}]: {}", subject(cert), reason)),
            }
        }
        Ok(())
    }
}

pub(crate) fn verify_signature(cert: &Certificate, issuer: &Certificate) -> Result<bool, String> {
    let tbs = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| format!("cannot encode certificate: {}", e))?;
    let signature = cert
        .signature
        .as_bytes()
        .ok_or("signature has unused bits")?;
    let spki = &issuer.tbs_certificate.subject_public_key_info;
    let public_key = spki
        .subject_public_key
        .as_bytes()
        .ok_or("issuer key has unused bits")?;
    let oid = cert.signature_algorithm.oid;

    let ecdsa_hash = if oid == ECDSA_WITH_SHA256 {
        Some(HashFunction::SHA256)
    } else if oid == ECDSA_WITH_SHA384 {
        Some(HashFunction::SHA384)
    } else if oid == ECDSA_WITH_SHA512 {
        Some(HashFunction::SHA512)
    } else {
        None
    };
    if let Some(hash_function) = ecdsa_hash {
        if spki.algorithm.oid != EC_PUBLIC_KEY {
            return Err("ECDSA signature from a non-EC issuer key".to_string());
        }
        let curve = spki
            .algorithm
            .parameters
            .as_ref()
            .and_then(|params| params.decode_as::<ObjectIdentifier>().ok())
            .ok_or("issuer key has no named curve")?;
        let digest = hash_function.hash(&tbs);
        return if curve == SECP256R1 {
            let key = p256::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| "invalid P-256 issuer key")?;
            let signature = p256::ecdsa::Signature::from_der(signature)
                .map_err(|_| "invalid ECDSA signature encoding")?;
            Ok(key.verify_prehash(&digest, &signature).is_ok())
        } else if curve == SECP384R1 {
            let key = p384::ecdsa::VerifyingKey::from_sec1_bytes(public_key)
                .map_err(|_| "invalid P-384 issuer key")?;
            let signature = p384::ecdsa::Signature::from_der(signature)
                .map_err(|_| "invalid ECDSA signature encoding")?;
            Ok(key.verify_prehash(&digest, &signature).is_ok())
        } else {
            Err(format!("unsupported issuer curve {}", curve))
        };
    }

    let rsa_hash = if oid == SHA256_WITH_RSA {
        Some(HashFunction::SHA256)
    } else if oid == SHA384_WITH_RSA {
        Some(HashFunction::SHA384)
    } else if oid == SHA512_WITH_RSA {
        Some(HashFunction::SHA512)
    } else {
        None
    };
    if let Some(hash_function) = rsa_hash {
        let spki_der = spki
            .to_der()
            .map_err(|e| format!("cannot encode issuer key: {}", e))?;
        let key = boring::pkey::PKey::public_key_from_der(&spki_der)
            .map_err(|_| "invalid RSA issuer key")?;
        let mut verifier = boring::sign::Verifier::new(hash_function.message_digest(), &key)
            .map_err(|e| e.to_string())?;
        verifier.update(&tbs).map_err(|e| e.to_string())?;
        return Ok(verifier.verify(signature).unwrap_or(false));
    }

    if oid == ED25519 {
        let key = ed25519_compact::PublicKey::from_slice(public_key)
            .map_err(|_| "invalid Ed25519 issuer key")?;
        let signature = match ed25519_compact::Signature::from_slice(signature) {
            Ok(signature) => signature,
            Err(_) => return Ok(false),
        };
        return Ok(key.verify(&tbs, &signature).is_ok());
    }

    Err(format!("unsupported signature algorithm {}", oid))
}

fn extension_value<'c>(cert: &'c Certificate, oid: ObjectIdentifier) -> Option<&'c [u8]> {
    cert.tbs_certificate
        .extensions
        .as_ref()?
        .iter()
        .find(|ext| ext.extn_id == oid)
        .map(|ext| ext.extn_value.as_bytes())
}

impl PathPolicy for IssuersAreCAs {
    fn name(&self) -> &'static str {
        "basic constraints"
    }

    fn check(&self, path: &[&Certificate], _at: UnixTimeStamp) -> Result<(), String> {
        if path.len() < 3 {
            return Ok(());
        }
        let intermediates = &path[1..path.len() - 1];
        for (position, cert) in intermediates.iter().enumerate() {
            let constraints = extension_value(cert, BASIC_CONSTRAINTS)
                .ok_or_else(|| format!("[{}] has no basic constraints", subject(cert)))
                .and_then(|der| {
                    BasicConstraints::from_der(der)
                        .map_err(|e| format!("[{}]: {}", subject(cert), e))
                })?;
            if !constraints.ca {
                return Err(format!("[{}] is not a CA", subject(cert)));
            }
            // intermediates between this one and the leaf
            let below = position as u64;
            if let Some(max) = constraints.path_len_constraint {
                if below > u64::from(max) {
                    return Err(format!(
                        "[{}] allows {} intermediates below it, found {}",
                        subject(cert),
                        max,
                        below
                    ));
                }
            }
        }
        Ok(())
    }
}

impl PathPolicy for KeyCertSign {
    fn name(&self) -> &'static str {
        "key usage"
    }

    fn check(&self, path: &[&Certificate], _at: UnixTimeStamp) -> Result<(), String> {
        for issuer in path.iter().skip(1) {
            let der = match extension_value(issuer, KEY_USAGE) {
                Some(der) => der,
                None => continue,
            };
            let usage =
                KeyUsage::from_der(der).map_err(|e| format!("[{}]: {}", subject(issuer), e))?;
            if !usage.key_cert_sign() {
                return Err(format!(
                    "[{}] is not allowed to sign certificates",
                    subject(issuer)
                ));
            }
        }
        Ok(())
    }
}

impl PathPolicy for NoUnknownCriticalExtensions {
    fn name(&self) -> &'static str {
        "critical extensions"
    }

    fn check(&self, path: &[&Certificate], _at: UnixTimeStamp) -> Result<(), String> {
        for cert in path {
            let extensions = match &cert.tbs_certificate.extensions {
                Some(extensions) => extensions,
                None => continue,
            };
            if let Some(ext) = extensions
                .iter()
                .find(|ext| ext.critical && !RECOGNIZED_EXTENSIONS.contains(&ext.extn_id))
            {
                return Err(format!(
                    "[{}] has an unknown critical extension {}",
                    subject(cert),
                    ext.extn_id
                ));
            }
        }
        Ok(())
    }
}
