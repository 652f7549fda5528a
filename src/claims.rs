use std::collections::HashSet;

use coarsetime::{Clock, Duration, UnixTimeStamp};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::common::*;
use crate::error::*;
use crate::serde_additions;

/// A token payload.
///
/// `verify_claims` runs only after the signature has been verified; its error
/// becomes the error of the whole verification.
pub trait JWTPayload: Serialize + DeserializeOwned {
    fn verify_claims(&self, _options: &VerificationOptions) -> Result<(), Error> {
        Ok(())
    }

    /// Instant at which the payload declares it was signed.
    ///
    /// When present, x5c chains are validated at that instant rather than at
    /// the current time.
    fn signed_date(&self) -> Option<UnixTimeStamp> {
        None
    }
}

/// Arbitrary JSON, with no claim checks.
impl JWTPayload for serde_json::Value {}

/// Type representing the fact that no application-defined claims is necessary.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoCustomClaims {}

/// The `aud` claim, which can be a single string or a set.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Audiences {
    AsString(String),
    AsSet(HashSet<String>),
}

impl Audiences {
    pub fn contains(&self, audience: &str) -> bool {
        match self {
            Audiences::AsString(a) => a == audience,
            Audiences::AsSet(set) => set.contains(audience),
        }
    }
}

/// A set of registered JWT claims.
///
/// The `CustomClaims` parameter can be set to `NoCustomClaims` if only standard claims are used,
/// or to a user-defined type that must be `serde`-serializable if custom claims are required.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JWTClaims<CustomClaims> {
    /// Time the claims were created at
    #[serde(
        rename = "iat",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_additions::unix_timestamp"
    )]
    pub issued_at: Option<UnixTimeStamp>,

    /// Time the claims expire at
    #[serde(
        rename = "exp",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_additions::unix_timestamp"
    )]
    pub expires_at: Option<UnixTimeStamp>,

    /// Time the claims will be invalid until
    #[serde(
        rename = "nbf",
        default,
        skip_serializing_if = "Option::is_none",
        with = "self::serde_additions::unix_timestamp"
    )]
    pub invalid_before: Option<UnixTimeStamp>,

    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    #[serde(rename = "sub", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    #[serde(rename = "aud", default, skip_serializing_if = "Option::is_none")]
    pub audiences: Option<Audiences>,

    #[serde(rename = "jti", default, skip_serializing_if = "Option::is_none")]
    pub jwt_id: Option<String>,

    /// Custom (application-defined) claims
    #[serde(flatten)]
    pub custom: CustomClaims,
}

impl<CustomClaims> JWTClaims<CustomClaims> {
    pub(crate) fn validate(&self, options: &VerificationOptions) -> Result<(), Error> {
        let now = options
            .artificial_time
            .unwrap_or_else(Clock::now_since_epoch);
        let time_tolerance = options
            .time_tolerance
            .unwrap_or_else(|| Duration::from_secs(0));

        if let Some(time_issued) = self.issued_at {
            ensure!(
                time_issued <= now + time_tolerance,
                JWTError::claim("iat", "issued in the future")
            );
        }
        if let Some(invalid_before) = self.invalid_before {
            ensure!(
                now + time_tolerance >= invalid_before,
                JWTError::claim("nbf", "token not valid yet")
            );
        }
        if let Some(expires_at) = self.expires_at {
            ensure!(
                now <= expires_at + time_tolerance,
                JWTError::claim("exp", "token has expired")
            );
        }
        Ok(())
    }

    /// Set the token as not being valid until `unix_timestamp`
    pub fn invalid_before(mut self, unix_timestamp: UnixTimeStamp) -> Self {
        self.invalid_before = Some(unix_timestamp);
        self
    }

    /// Set the issuer
    pub fn with_issuer(mut self, issuer: impl ToString) -> Self {
        self.issuer = Some(issuer.to_string());
        self
    }

    /// Set the subject
    pub fn with_subject(mut self, subject: impl ToString) -> Self {
        self.subject = Some(subject.to_string());
        self
    }

    /// Set the audience
    pub fn with_audience(mut self, audience: impl ToString) -> Self {
        self.audiences = Some(Audiences::AsString(audience.to_string()));
        self
    }

    /// Set the JWT identifier
    pub fn with_jwt_id(mut self, jwt_id: impl ToString) -> Self {
        self.jwt_id = Some(jwt_id.to_string());
        self
    }
}

impl<CustomClaims: Serialize + DeserializeOwned> JWTPayload for JWTClaims<CustomClaims> {
    fn verify_claims(&self, options: &VerificationOptions) -> Result<(), Error> {
        self.validate(options)
    }
}

pub struct Claims;

impl Claims {
    /// Create a new set of claims, without custom data, expiring in `valid_for`.
    pub fn create(valid_for: Duration) -> JWTClaims<NoCustomClaims> {
        Self::with_custom_claims(NoCustomClaims {}, valid_for)
    }

    /// Create a new set of claims, with custom data, expiring in `valid_for`.
    pub fn with_custom_claims<CustomClaims: Serialize + DeserializeOwned>(
        custom_claims: CustomClaims,
        valid_for: Duration,
    ) -> JWTClaims<CustomClaims> {
        let now = Clock::now_since_epoch();
        JWTClaims {
            issued_at: Some(now),
            expires_at: Some(now + valid_for),
            invalid_before: Some(now),
            issuer: None,
            subject: None,
            audiences: None,
            jwt_id: None,
            custom: custom_claims,
        }
    }

    /// Claims carrying only an expiration time.
    pub fn expiring_at(expires_at: UnixTimeStamp) -> JWTClaims<NoCustomClaims> {
        JWTClaims {
            issued_at: None,
            expires_at: Some(expires_at),
            invalid_before: None,
            issuer: None,
            subject: None,
            audiences: None,
            jwt_id: None,
            custom: NoCustomClaims {},
        }
    }
}

#[test]
fn expired_claims_are_rejected() {
    let claims = Claims::expiring_at(UnixTimeStamp::from_secs(1000));
    let options = VerificationOptions {
        artificial_time: Some(UnixTimeStamp::from_secs(1000 + DEFAULT_TIME_TOLERANCE_SECS + 1)),
        ..Default::default()
    };
    let err = claims.verify_claims(&options).unwrap_err();
    match err.downcast_ref::<JWTError>() {
        Some(JWTError::ClaimVerificationFailure { claim, .. }) => assert_eq!(claim, "exp"),
        other => panic!("unexpected error: {:?}", other),
    }

    let options = VerificationOptions {
        artificial_time: Some(UnixTimeStamp::from_secs(1000 + DEFAULT_TIME_TOLERANCE_SECS)),
        ..Default::default()
    };
    claims.verify_claims(&options).unwrap();
}

#[test]
fn audience_can_be_a_string_or_a_set() {
    let claims: JWTClaims<NoCustomClaims> =
        serde_json::from_str(r#"{"aud":["a","b"],"exp":2000000000}"#).unwrap();
    assert!(claims.audiences.as_ref().unwrap().contains("b"));
    let claims: JWTClaims<NoCustomClaims> = serde_json::from_str(r#"{"aud":"a"}"#).unwrap();
    assert!(claims.audiences.unwrap().contains("a"));
}
