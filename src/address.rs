//! Current address discovery
//!
//! The address comes from a named interface when one is configured,
//! otherwise from a "what is my IP" HTTP endpoint. Either way the result is
//! a [`ResolvedAddress`] holding at most one address per family.

use std::net::IpAddr;

use reqwest::StatusCode;
use tracing::debug;

use crate::config::{IpFamily, ResolverConfig};
use crate::constants::USER_AGENT;
use crate::error::{Error, Result};
use crate::interface::interface_addresses;
use crate::validation::is_publishable_ipv6;

//==============================================================================
// Types
//==============================================================================

/// Addresses found during one cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// IPv4 address, if one was found
    pub ipv4: Option<String>,
    /// IPv6 address, if one was found
    pub ipv6: Option<String>,
}

impl ResolvedAddress {
    /// Returns the address of the requested family
    pub fn for_family(&self, family: IpFamily) -> Option<&str> {
        match family {
            IpFamily::V4 => self.ipv4.as_deref(),
            IpFamily::V6 => self.ipv6.as_deref(),
        }
    }

    /// True when neither family was found
    pub fn is_empty(&self) -> bool {
        self.ipv4.is_none() && self.ipv6.is_none()
    }

    /// Stores `ip` in its family's slot unless that slot is already taken
    fn insert(&mut self, ip: IpAddr) {
        let slot = match ip {
            IpAddr::V4(_) => &mut self.ipv4,
            IpAddr::V6(_) => &mut self.ipv6,
        };
        if slot.is_none() {
            *slot = Some(ip.to_string());
        }
    }
}

//==============================================================================
// Resolver
//==============================================================================

/// Finds the host's current address
pub struct AddressResolver {
    config: ResolverConfig,
    client: reqwest::Client,
}

impl AddressResolver {
    /// Creates a resolver; the HTTP client uses `config.timeout`
    pub fn new(config: ResolverConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("build HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    /// Resolves the current addresses
    ///
    /// With an interface configured its bound addresses are used and a
    /// missing family is not an error. Otherwise the discovery endpoint is
    /// asked once, without retry.
    pub async fn resolve(&self) -> Result<ResolvedAddress> {
        match &self.config.interface {
            Some(name) => from_interface(name),
            None => self.from_endpoint().await,
        }
    }

    async fn from_endpoint(&self) -> Result<ResolvedAddress> {
        debug!("GET {}", self.config.ip_api);
        let resp = self
            .client
            .get(&self.config.ip_api)
            .send()
            .await
            .map_err(|e| Error::network(format!("address discovery failed: {e}")))?;

        let status = resp.status();
        let body = resp
            .text()
            .await
            .map_err(|e| Error::network(format!("address discovery read failed: {e}")))?;

        if status != StatusCode::OK {
            return Err(Error::upstream(status.as_u16(), body.trim()));
        }

        let mut resolved = ResolvedAddress::default();
        resolved.insert(parse_discovery_body(&body)?);
        Ok(resolved)
    }
}

/// Reads the first usable address of each family from an interface
///
/// IPv6 loopback, link-local, multicast and unspecified addresses are skipped
/// so a `fe80::` address never shadows a global one.
pub fn from_interface(name: &str) -> Result<ResolvedAddress> {
    let mut resolved = ResolvedAddress::default();
    for ip in interface_addresses(name)? {
        let usable = match ip {
            IpAddr::V4(v4) => !v4.is_unspecified(),
            IpAddr::V6(v6) => is_publishable_ipv6(&v6),
        };
        if usable {
            resolved.insert(ip);
        }
    }
    debug!("Interface {} resolved to {:?}", name, resolved);
    Ok(resolved)
}

/// Extracts the address from a discovery response body
///
/// Accepts `{"data":{"ip":"<ip>"}}` or a bare address, surrounding
/// whitespace ignored.
pub fn parse_discovery_body(body: &str) -> Result<IpAddr> {
    let trimmed = body.trim();
    let text = if trimmed.starts_with('{') {
        let value: serde_json::Value = serde_json::from_str(trimmed)?;
        value
            .pointer("/data/ip")
            .and_then(|v| v.as_str())
            .ok_or_else(|| Error::parse("discovery response has no data.ip field"))?
            .trim()
            .to_string()
    } else {
        trimmed.to_string()
    };

    text.parse::<IpAddr>()
        .map_err(|_| Error::parse(format!("not an IP address: '{text}'")))
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    #[test]
    fn test_parse_json_body() {
        let ip = parse_discovery_body(r#"{"data":{"ip":"203.0.113.5"}}"#).unwrap();
        assert_eq!(ip.to_string(), "203.0.113.5");
    }

    #[test]
    fn test_parse_full_ipip_body() {
        let body = r#"{"ret":"ok","data":{"ip":"203.0.113.5","location":["中国","浙江","杭州","","电信"]}}"#;
        assert_eq!(parse_discovery_body(body).unwrap().to_string(), "203.0.113.5");
    }

    #[test]
    fn test_parse_bare_text_body() {
        let ip = parse_discovery_body("203.0.113.5\n").unwrap();
        assert_eq!(ip.to_string(), "203.0.113.5");
    }

    #[test]
    fn test_parse_ipv6_body() {
        let ip = parse_discovery_body("2001:db8::1").unwrap();
        assert!(ip.is_ipv6());
    }

    #[test]
    fn test_parse_malformed_bodies() {
        for body in ["", "hello", "{\"data\":{}}", "{\"data\":{\"ip\":\"nope\"}}", "{broken"] {
            let err = parse_discovery_body(body).unwrap_err();
            assert_eq!(err.kind(), "parse", "body {body:?} should be a parse error");
        }
    }

    #[test]
    fn test_json_and_text_bodies_resolve_identically() {
        let mut from_json = ResolvedAddress::default();
        from_json.insert(parse_discovery_body(r#"{"data":{"ip":"203.0.113.5"}}"#).unwrap());
        let mut from_text = ResolvedAddress::default();
        from_text.insert(parse_discovery_body("203.0.113.5\n").unwrap());

        assert_eq!(from_json, from_text);
        assert_eq!(from_json.for_family(IpFamily::V4), Some("203.0.113.5"));
        assert_eq!(from_json.for_family(IpFamily::V6), None);
    }

    #[test]
    fn test_insert_keeps_first_per_family() {
        let mut resolved = ResolvedAddress::default();
        resolved.insert("203.0.113.5".parse().unwrap());
        resolved.insert("198.51.100.7".parse().unwrap());
        resolved.insert("2001:db8::1".parse().unwrap());

        assert_eq!(resolved.ipv4.as_deref(), Some("203.0.113.5"));
        assert_eq!(resolved.ipv6.as_deref(), Some("2001:db8::1"));
    }

    #[test]
    fn test_unknown_interface_resolves_empty() {
        let resolved = from_interface("alidns-sync-test-none0").unwrap();
        assert!(resolved.is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_loopback_ipv6_is_skipped() {
        let resolved = from_interface("lo").unwrap();
        assert_eq!(resolved.ipv4.as_deref(), Some("127.0.0.1"));
        assert_eq!(resolved.ipv6, None);
    }

    async fn serve_once(status: &'static str, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            let _ = stream.write_all(response.as_bytes()).await;
        });
        format!("http://{addr}/json")
    }

    fn resolver(ip_api: String) -> AddressResolver {
        AddressResolver::new(ResolverConfig {
            interface: None,
            ip_family: IpFamily::V4,
            ip_api,
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_resolve_from_endpoint() {
        let url = serve_once("200 OK", r#"{"ret":"ok","data":{"ip":"203.0.113.5"}}"#).await;
        let resolved = resolver(url).resolve().await.unwrap();
        assert_eq!(resolved.ipv4.as_deref(), Some("203.0.113.5"));
        assert_eq!(resolved.ipv6, None);
    }

    #[tokio::test]
    async fn test_non_200_is_upstream_error() {
        let url = serve_once("503 Service Unavailable", "rate limited").await;
        let err = resolver(url).resolve().await.unwrap_err();
        match err {
            Error::Upstream { status, body } => {
                assert_eq!(status, 503);
                assert_eq!(body, "rate limited");
            }
            other => panic!("expected upstream error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_network_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let err = resolver(format!("http://{addr}/json")).resolve().await.unwrap_err();
        assert_eq!(err.kind(), "network");
    }
}
