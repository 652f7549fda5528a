use std::io::{Read, Write};

use ct_codecs::{Base64UrlSafeNoPadding, Decoder, Encoder};
use flate2::{read::DeflateDecoder, write::DeflateEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use crate::algorithms::JWTAlgorithm;
use crate::claims::*;
use crate::common::*;
use crate::error::*;
use crate::jwk::JWK;
use crate::jwt_header::*;

/// Utilities to build, parse and get information about a JWT token
pub struct Token;

/// JWT token information useful before signature verification
#[derive(Debug, Clone, Default)]
pub struct TokenMetadata {
    pub(crate) jwt_header: JWTHeader,
}

impl TokenMetadata {
    /// The JWT algorithm for this token ("alg")
    /// This information should not be trusted: it is unprotected and can be
    /// freely modified by a third party. Clients should ignore it and use
    /// the correct type of key directly.
    pub fn algorithm(&self) -> &str {
        &self.jwt_header.algorithm
    }

    /// The key, or public key identifier for this token ("kid")
    pub fn key_id(&self) -> Option<&str> {
        self.jwt_header.key_id.as_deref()
    }

    /// The signature type for this token ("typ")
    pub fn signature_type(&self) -> Option<&str> {
        self.jwt_header.signature_type.as_deref()
    }

    /// The payload compression for this token ("zip")
    pub fn compression(&self) -> Option<&str> {
        self.jwt_header.compression.as_deref()
    }

    /// The certificate chain for this token ("x5c")
    /// This information should not be trusted: it is unprotected and can be
    /// freely modified by a third party.
    pub fn certificate_chain(&self) -> Option<&[String]> {
        self.jwt_header.certificate_chain.as_deref()
    }

    /// The public key for this token ("jwk")
    /// This information should not be trusted: it is unprotected and can be
    /// freely modified by a third party. At the bare minimum, you should
    /// check that it's in a set of public keys you already trust.
    pub fn public_key(&self) -> Option<&JWK> {
        self.jwt_header.public_key.as_ref()
    }

    /// The complete header, custom fields included
    pub fn header(&self) -> &JWTHeader {
        &self.jwt_header
    }
}

/// A token split into its segments, with the header and signature decoded.
pub(crate) struct ParsedToken<'t> {
    pub(crate) header: JWTHeader,
    pub(crate) signing_input: &'t str,
    pub(crate) signature: Vec<u8>,
    payload_b64: &'t str,
}

impl ParsedToken<'_> {
    pub(crate) fn payload_bytes(&self, options: &VerificationOptions) -> Result<Vec<u8>, Error> {
        let raw = Base64UrlSafeNoPadding::decode_to_vec(self.payload_b64, None)
            .map_err(|_| JWTError::malformed("payload is not valid base64url"))?;
        match self.header.compression.as_deref() {
            None => Ok(raw),
            Some(_) => inflate(&raw, options.max_decompressed_payload_length),
        }
    }

    pub(crate) fn payload<P: DeserializeOwned>(
        &self,
        options: &VerificationOptions,
    ) -> Result<P, Error> {
        let payload = self.payload_bytes(options)?;
        serde_json::from_slice(&payload)
            .map_err(|e| JWTError::malformed(format!("payload: {}", e)).into())
    }
}

fn inflate(compressed: &[u8], max_length: usize) -> Result<Vec<u8>, Error> {
    let mut inflated = Vec::new();
    DeflateDecoder::new(compressed)
        .take(max_length as u64 + 1)
        .read_to_end(&mut inflated)
        .map_err(|e| JWTError::InvalidCompression(e.to_string()))?;
    ensure!(inflated.len() <= max_length, JWTError::PayloadTooLarge);
    Ok(inflated)
}

fn deflate(raw: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(raw)?;
    Ok(encoder.finish()?)
}

fn check_compression(header: &JWTHeader) -> Result<(), Error> {
    match header.compression.as_deref() {
        None | Some(COMPRESSION_DEFLATE) => Ok(()),
        Some(other) => bail!(JWTError::InvalidCompression(format!(
            "unsupported compression [{}]",
            other
        ))),
    }
}

impl Token {
    /// Serialize and sign a token. `alg` is set to the signer's name.
    pub(crate) fn build<Payload: Serialize>(
        mut jwt_header: JWTHeader,
        payload: &Payload,
        signer: &dyn JWTAlgorithm,
    ) -> Result<String, Error> {
        jwt_header.algorithm = signer.name().to_string();
        check_compression(&jwt_header)?;
        let jwt_header_json = serde_json::to_vec(&jwt_header)?;
        let mut payload_json = serde_json::to_vec(payload)?;
        if jwt_header.compression.is_some() {
            payload_json = deflate(&payload_json)?;
        }
        let authenticated = format!(
            "{}.{}",
            Base64UrlSafeNoPadding::encode_to_string(jwt_header_json)?,
            Base64UrlSafeNoPadding::encode_to_string(payload_json)?
        );
        let signature = signer.sign(authenticated.as_bytes())?;
        let mut token = authenticated;
        token.push('.');
        token.push_str(&Base64UrlSafeNoPadding::encode_to_string(signature)?);
        Ok(token)
    }

    pub(crate) fn parse<'t>(
        token: &'t str,
        options: &VerificationOptions,
    ) -> Result<ParsedToken<'t>, Error> {
        if let Some(max_token_length) = options.max_token_length {
            ensure!(token.len() <= max_token_length, JWTError::TokenTooLong);
        }
        let parts: Vec<&str> = token.split('.').collect();
        ensure!(
            parts.len() == 3,
            JWTError::malformed(format!("expected 3 segments, found {}", parts.len()))
        );
        let (jwt_header_b64, payload_b64, signature_b64) = (parts[0], parts[1], parts[2]);
        if let Some(max_header_length) = options.max_header_length {
            ensure!(
                jwt_header_b64.len() <= max_header_length,
                JWTError::HeaderTooLarge
            );
        }
        let jwt_header_json = Base64UrlSafeNoPadding::decode_to_vec(jwt_header_b64, None)
            .map_err(|_| JWTError::malformed("header is not valid base64url"))?;
        let header: JWTHeader = serde_json::from_slice(&jwt_header_json)
            .map_err(|e| JWTError::malformed(format!("header: {}", e)))?;
        check_compression(&header)?;
        let signature = Base64UrlSafeNoPadding::decode_to_vec(signature_b64, None)
            .map_err(|_| JWTError::malformed("signature is not valid base64url"))?;
        Ok(ParsedToken {
            header,
            signing_input: &token[..jwt_header_b64.len() + 1 + payload_b64.len()],
            signature,
            payload_b64,
        })
    }

    /// Check the signature of a parsed token, then decode the payload and run
    /// its claim checks.
    pub(crate) fn verify<Payload: JWTPayload>(
        parsed: &ParsedToken<'_>,
        signer: &dyn JWTAlgorithm,
        options: &VerificationOptions,
    ) -> Result<Payload, Error> {
        ensure!(
            parsed.header.algorithm == signer.name(),
            JWTError::AlgorithmMismatch
        );
        if let Some(required_key_id) = &options.required_key_id {
            match &parsed.header.key_id {
                Some(key_id) => ensure!(key_id == required_key_id, JWTError::KeyIdentifierMismatch),
                None => bail!(JWTError::MissingKIDHeader),
            }
        }
        ensure!(
            signer.verify(&parsed.signature, parsed.signing_input.as_bytes())?,
            JWTError::SignatureVerificationFailed
        );
        let payload: Payload = parsed.payload(options)?;
        payload.verify_claims(options)?;
        Ok(payload)
    }

    /// Decode token information that can be useful prior to signature
    /// verification
    pub fn decode_metadata(token: &str) -> Result<TokenMetadata, Error> {
        let parsed = Self::parse(token, &VerificationOptions::default())?;
        Ok(TokenMetadata {
            jwt_header: parsed.header,
        })
    }

    /// Decode the payload without verifying anything.
    ///
    /// The result must not be trusted.
    pub fn decode_unverified<Payload: DeserializeOwned>(token: &str) -> Result<Payload, Error> {
        let options = VerificationOptions::default();
        Self::parse(token, &options)?.payload(&options)
    }
}

#[cfg(test)]
fn error_of(res: Result<impl Sized, Error>) -> JWTError {
    match res {
        Ok(_) => panic!("expected an error"),
        Err(e) => e.downcast::<JWTError>().unwrap(),
    }
}

#[test]
fn should_reject_wrong_segment_count() {
    let options = VerificationOptions::default();
    for token in ["", "a.b", "a.b.c.d", "eyJhbGciOiJIUzI1NiJ9.e30"] {
        assert!(matches!(
            error_of(Token::parse(token, &options)),
            JWTError::MalformedToken(_)
        ));
    }
}

#[test]
fn should_reject_garbage_segments() {
    let options = VerificationOptions::default();
    assert!(matches!(
        error_of(Token::parse("!!!.e30.AAAA", &options)),
        JWTError::MalformedToken(_)
    ));
    // {"alg": 1}
    assert!(matches!(
        error_of(Token::parse("eyJhbGciOiAxfQ.e30.", &options)),
        JWTError::MalformedToken(_)
    ));
}

#[test]
fn should_roundtrip_deflated_payloads() {
    use crate::prelude::*;

    let key = HMACKey::generate(HashFunction::SHA384);
    let header = JWTHeader::default().with_deflate();
    let payload = serde_json::json!({ "data": "a".repeat(4096) });
    let token = Token::build(header, &payload, &key).unwrap();
    assert!(token.len() < 1024);

    let options = VerificationOptions::default();
    let parsed = Token::parse(&token, &options).unwrap();
    assert_eq!(parsed.header.compression.as_deref(), Some("DEF"));
    let decoded: serde_json::Value = Token::verify(&parsed, &key, &options).unwrap();
    assert_eq!(decoded, payload);

    let options = VerificationOptions {
        max_decompressed_payload_length: 1024,
        ..Default::default()
    };
    assert!(matches!(
        error_of(Token::verify::<serde_json::Value>(&parsed, &key, &options)),
        JWTError::PayloadTooLarge
    ));
}

#[test]
fn should_reject_unknown_compression() {
    use crate::prelude::*;

    let key = HMACKey::generate(HashFunction::SHA256);
    let mut header = JWTHeader::default();
    header.compression = Some("GZIP".to_string());
    assert!(matches!(
        error_of(Token::build(header, &serde_json::json!({}), &key)),
        JWTError::InvalidCompression(_)
    ));

    // {"alg":"HS256","zip":"GZIP"}
    let token = "eyJhbGciOiJIUzI1NiIsInppcCI6IkdaSVAifQ.e30.AAAA";
    assert!(matches!(
        error_of(Token::decode_metadata(token)),
        JWTError::InvalidCompression(_)
    ));
}

#[test]
fn should_check_required_key_id() {
    use crate::prelude::*;

    let key = HMACKey::generate(HashFunction::SHA256);
    let token = Token::build(
        JWTHeader::default().with_key_id("k1"),
        &serde_json::json!({}),
        &key,
    )
    .unwrap();
    let options = VerificationOptions {
        required_key_id: Some("k2".to_string()),
        ..Default::default()
    };
    let parsed = Token::parse(&token, &options).unwrap();
    assert!(matches!(
        error_of(Token::verify::<serde_json::Value>(&parsed, &key, &options)),
        JWTError::KeyIdentifierMismatch
    ));
    assert_eq!(Token::decode_metadata(&token).unwrap().key_id(), Some("k1"));
}
