//! ACS3-HMAC-SHA256 request signing for the Alibaba Cloud RPC API
//!
//! RPC calls carry every parameter in the query string and send an empty
//! body, so the payload hash is always [`EMPTY_BODY_SHA256`].

use std::collections::BTreeMap;

use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::trace;

use crate::constants::{ALIDNS_API_VERSION, EMPTY_BODY_SHA256};
use crate::error::{Error, Result};

type HmacSha256 = Hmac<Sha256>;

/// Signing algorithm name, also the `Authorization` scheme
pub const ALGORITHM: &str = "ACS3-HMAC-SHA256";

/// Headers covered by the signature, sorted and `;`-joined
pub const SIGNED_HEADERS: &str =
    "host;x-acs-action;x-acs-content-sha256;x-acs-date;x-acs-signature-nonce;x-acs-version";

/// Values that vary per request and are covered by the signature
#[derive(Debug, Clone, Copy)]
pub struct SigningInput<'a> {
    /// API host, e.g. `alidns.cn-hangzhou.aliyuncs.com`
    pub host: &'a str,
    /// RPC action name
    pub action: &'a str,
    /// Canonical (sorted, encoded) query string
    pub query: &'a str,
    /// `x-acs-date`, formatted `%Y-%m-%dT%H:%M:%SZ`
    pub timestamp: &'a str,
    /// `x-acs-signature-nonce`
    pub nonce: &'a str,
}

/// Builds the `Authorization` header value for one request
///
/// # Arguments
///
/// * `access_key_id` - Key id placed in the `Credential` field
/// * `access_key_secret` - HMAC key
/// * `input` - Per-request values covered by the signature
///
/// # Returns
///
/// `ACS3-HMAC-SHA256 Credential=<id>,SignedHeaders=<headers>,Signature=<hex>`
pub fn authorization(
    access_key_id: &str,
    access_key_secret: &str,
    input: &SigningInput<'_>,
) -> Result<String> {
    let canonical_headers = format!(
        "host:{}\nx-acs-action:{}\nx-acs-content-sha256:{}\nx-acs-date:{}\nx-acs-signature-nonce:{}\nx-acs-version:{}\n",
        input.host, input.action, EMPTY_BODY_SHA256, input.timestamp, input.nonce, ALIDNS_API_VERSION
    );
    let canonical_request = format!(
        "POST\n/\n{}\n{}\n{}\n{}",
        input.query, canonical_headers, SIGNED_HEADERS, EMPTY_BODY_SHA256
    );
    trace!("Canonical request:\n{}", canonical_request);

    let hashed = hex::encode(Sha256::digest(canonical_request.as_bytes()));
    let string_to_sign = format!("{ALGORITHM}\n{hashed}");

    let signature = hex::encode(hmac_sha256(
        access_key_secret.as_bytes(),
        string_to_sign.as_bytes(),
    )?);

    Ok(format!(
        "{} Credential={},SignedHeaders={},Signature={}",
        ALGORITHM, access_key_id, SIGNED_HEADERS, signature
    ))
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> Result<Vec<u8>> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| Error::config(format!("invalid signing key: {e}")))?;
    mac.update(data);
    Ok(mac.finalize().into_bytes().to_vec())
}

//==============================================================================
// Query string
//==============================================================================

/// Serializes request parameters into the canonical query string
///
/// Nested objects become `a.b` keys and arrays `a.1`, `a.2`; `None` fields are
/// dropped. Keys are sorted and both sides are RFC 3986 encoded.
pub fn canonical_query<T: Serialize>(params: &T) -> Result<String> {
    let value = serde_json::to_value(params)?;
    let mut flat = BTreeMap::new();
    flatten_value("", &value, &mut flat);

    Ok(flat
        .iter()
        .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
        .collect::<Vec<_>>()
        .join("&"))
}

fn flatten_value(prefix: &str, value: &serde_json::Value, out: &mut BTreeMap<String, String>) {
    match value {
        serde_json::Value::Object(map) => {
            for (k, v) in map {
                let key = if prefix.is_empty() {
                    k.clone()
                } else {
                    format!("{prefix}.{k}")
                };
                flatten_value(&key, v, out);
            }
        }
        serde_json::Value::Array(items) => {
            for (i, v) in items.iter().enumerate() {
                flatten_value(&format!("{}.{}", prefix, i + 1), v, out);
            }
        }
        serde_json::Value::String(s) => {
            out.insert(prefix.to_string(), s.clone());
        }
        serde_json::Value::Number(n) => {
            out.insert(prefix.to_string(), n.to_string());
        }
        serde_json::Value::Bool(b) => {
            out.insert(prefix.to_string(), b.to_string());
        }
        serde_json::Value::Null => {}
    }
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const HOST: &str = "alidns.cn-hangzhou.aliyuncs.com";

    fn input<'a>(action: &'a str, query: &'a str) -> SigningInput<'a> {
        SigningInput {
            host: HOST,
            action,
            query,
            timestamp: "2024-01-15T08:00:00Z",
            nonce: "test-nonce-12345",
        }
    }

    fn signature(auth: &str) -> &str {
        auth.split("Signature=").nth(1).expect("Signature= present")
    }

    #[test]
    fn test_authorization_format() {
        let auth = authorization("LTAI5tTestKeyId", "secret", &input("DescribeDomainRecords", ""))
            .unwrap();
        assert!(auth.starts_with("ACS3-HMAC-SHA256 Credential=LTAI5tTestKeyId,"));
        assert!(auth.contains(&format!("SignedHeaders={SIGNED_HEADERS},")));

        let sig = signature(&auth);
        assert_eq!(sig.len(), 64);
        assert!(sig.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_authorization_is_deterministic() {
        let a = authorization("id", "secret", &input("AddDomainRecord", "RR=www")).unwrap();
        let b = authorization("id", "secret", &input("AddDomainRecord", "RR=www")).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_signature_depends_on_secret_action_and_host() {
        let base = authorization("id", "secret-one", &input("AddDomainRecord", "")).unwrap();
        let other_secret = authorization("id", "secret-two", &input("AddDomainRecord", "")).unwrap();
        let other_action = authorization("id", "secret-one", &input("UpdateDomainRecord", "")).unwrap();
        let other_host = authorization(
            "id",
            "secret-one",
            &SigningInput {
                host: "alidns.cn-beijing.aliyuncs.com",
                ..input("AddDomainRecord", "")
            },
        )
        .unwrap();

        assert_ne!(signature(&base), signature(&other_secret));
        assert_ne!(signature(&base), signature(&other_action));
        assert_ne!(signature(&base), signature(&other_host));
    }

    #[test]
    fn test_authorization_snapshot() {
        let auth = authorization(
            "LTAI5tTestKeyId",
            "TestSecretKey123456",
            &input(
                "DescribeDomainRecords",
                "DomainName=example.com&PageNumber=1&PageSize=500",
            ),
        )
        .unwrap();
        assert_eq!(
            signature(&auth),
            "6bf3e0743f8156059d03ed2a3e08e30d034b886ab7479ef8eeee60475f95545a"
        );
    }

    #[test]
    fn test_canonical_query_sorts_and_encodes() {
        #[derive(Serialize)]
        struct Params {
            #[serde(rename = "RR")]
            rr: String,
            #[serde(rename = "DomainName")]
            domain: String,
            #[serde(rename = "Line", skip_serializing_if = "Option::is_none")]
            line: Option<String>,
            #[serde(rename = "TTL")]
            ttl: u32,
        }

        let query = canonical_query(&Params {
            rr: "*.lab".to_string(),
            domain: "example.com".to_string(),
            line: None,
            ttl: 600,
        })
        .unwrap();
        assert_eq!(query, "DomainName=example.com&RR=%2A.lab&TTL=600");
    }

    #[test]
    fn test_canonical_query_encodes_reserved_characters() {
        let query = canonical_query(&json!({"Value": "2001:db8::1", "Note": "a b/c"})).unwrap();
        assert_eq!(query, "Note=a%20b%2Fc&Value=2001%3Adb8%3A%3A1");
    }

    #[test]
    fn test_flatten_nested_and_arrays() {
        let mut out = BTreeMap::new();
        flatten_value("", &json!({"a": {"b": "1"}, "c": [10, 20], "d": null}), &mut out);
        assert_eq!(out.get("a.b").map(String::as_str), Some("1"));
        assert_eq!(out.get("c.1").map(String::as_str), Some("10"));
        assert_eq!(out.get("c.2").map(String::as_str), Some("20"));
        assert!(!out.contains_key("d"));
    }
}
