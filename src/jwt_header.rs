use serde::{Deserialize, Serialize};

use crate::jwk::JWK;

/// Compression tag for raw DEFLATE payloads (`zip` header).
pub const COMPRESSION_DEFLATE: &str = "DEF";

/// A JOSE header.
///
/// `alg` is always overwritten with the name of the signer actually used, and
/// `kid` with the key identifier the signer was resolved under. Unregistered
/// fields are kept in `custom` and survive a decode/encode cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JWTHeader {
    #[serde(rename = "alg")]
    pub algorithm: String,

    #[serde(rename = "typ", default, skip_serializing_if = "Option::is_none")]
    pub signature_type: Option<String>,

    #[serde(rename = "kid", default, skip_serializing_if = "Option::is_none")]
    pub key_id: Option<String>,

    #[serde(rename = "cty", default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    #[serde(rename = "crit", default, skip_serializing_if = "Option::is_none")]
    pub critical: Option<Vec<String>>,

    #[serde(rename = "zip", default, skip_serializing_if = "Option::is_none")]
    pub compression: Option<String>,

    #[serde(rename = "x5c", default, skip_serializing_if = "Option::is_none")]
    pub certificate_chain: Option<Vec<String>>,

    #[serde(rename = "x5u", default, skip_serializing_if = "Option::is_none")]
    pub certificate_url: Option<String>,

    #[serde(rename = "x5t", default, skip_serializing_if = "Option::is_none")]
    pub certificate_sha1_thumbprint: Option<String>,

    #[serde(rename = "x5t#S256", default, skip_serializing_if = "Option::is_none")]
    pub certificate_sha256_thumbprint: Option<String>,

    #[serde(rename = "jku", default, skip_serializing_if = "Option::is_none")]
    pub key_set_url: Option<String>,

    #[serde(rename = "jwk", default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<JWK>,

    #[serde(flatten)]
    pub custom: serde_json::Map<String, serde_json::Value>,
}

impl Default for JWTHeader {
    fn default() -> Self {
        JWTHeader {
            algorithm: "Not set".to_string(),
            signature_type: None,
            key_id: None,
            content_type: None,
            critical: None,
            compression: None,
            certificate_chain: None,
            certificate_url: None,
            certificate_sha1_thumbprint: None,
            certificate_sha256_thumbprint: None,
            key_set_url: None,
            public_key: None,
            custom: serde_json::Map::new(),
        }
    }
}

impl JWTHeader {
    pub fn with_signature_type(mut self, signature_type: impl ToString) -> Self {
        self.signature_type = Some(signature_type.to_string());
        self
    }

    pub fn with_key_id(mut self, key_id: impl ToString) -> Self {
        self.key_id = Some(key_id.to_string());
        self
    }

    pub fn with_content_type(mut self, content_type: impl ToString) -> Self {
        self.content_type = Some(content_type.to_string());
        self
    }

    /// Compress the payload with raw DEFLATE before encoding it.
    pub fn with_deflate(mut self) -> Self {
        self.compression = Some(COMPRESSION_DEFLATE.to_string());
        self
    }

    /// Attach a certificate chain, leaf first, as standard base64 DER entries.
    pub fn with_certificate_chain(mut self, chain: Vec<String>) -> Self {
        self.certificate_chain = Some(chain);
        self
    }

    pub fn with_custom(mut self, name: impl ToString, value: serde_json::Value) -> Self {
        self.custom.insert(name.to_string(), value);
        self
    }
}

#[test]
fn default_header_only_carries_alg() {
    let header = JWTHeader {
        algorithm: "HS256".to_string(),
        ..Default::default()
    };
    assert_eq!(serde_json::to_string(&header).unwrap(), r#"{"alg":"HS256"}"#);
}

#[test]
fn custom_fields_are_preserved() {
    let json = r#"{"alg":"ES256","kid":"k1","x5t#S256":"abc","vendor":{"id":7}}"#;
    let header: JWTHeader = serde_json::from_str(json).unwrap();
    assert_eq!(header.key_id.as_deref(), Some("k1"));
    assert_eq!(header.certificate_sha256_thumbprint.as_deref(), Some("abc"));
    assert_eq!(header.custom["vendor"]["id"], 7);

    let reencoded: JWTHeader =
        serde_json::from_str(&serde_json::to_string(&header).unwrap()).unwrap();
    assert_eq!(reencoded, header);
}
