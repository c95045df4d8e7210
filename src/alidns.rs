//! Alibaba Cloud DNS API client
//!
//! Implements [`RecordDirectory`] with the `DescribeDomainRecords`,
//! `AddDomainRecord` and `UpdateDomainRecord` RPC actions. Requests are
//! signed with ACS3-HMAC-SHA256 (see [`crate::signer`]).

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use zeroize::Zeroizing;

use crate::config::Credentials;
use crate::constants::{ALIDNS_API_VERSION, EMPTY_BODY_SHA256, USER_AGENT};
use crate::dns_provider::{AddRecordRequest, RecordDirectory, RecordPage, UpdateRecordRequest};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcile::RemoteRecord;
use crate::signer::{self, SigningInput};

//==============================================================================
// Request parameters
//==============================================================================

#[derive(Debug, Serialize)]
struct DescribeDomainRecordsParams<'a> {
    #[serde(rename = "DomainName")]
    domain_name: &'a str,
    #[serde(rename = "PageNumber")]
    page_number: u32,
    #[serde(rename = "PageSize")]
    page_size: u32,
}

#[derive(Debug, Serialize)]
struct AddDomainRecordParams<'a> {
    #[serde(rename = "DomainName")]
    domain_name: &'a str,
    #[serde(rename = "RR")]
    rr: &'a str,
    #[serde(rename = "Type")]
    record_type: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "Priority")]
    priority: u32,
    #[serde(rename = "Line")]
    line: &'a str,
}

#[derive(Debug, Serialize)]
struct UpdateDomainRecordParams<'a> {
    #[serde(rename = "RecordId")]
    record_id: &'a str,
    #[serde(rename = "RR")]
    rr: &'a str,
    #[serde(rename = "Type")]
    record_type: &'a str,
    #[serde(rename = "Value")]
    value: &'a str,
    #[serde(rename = "Lang")]
    lang: &'a str,
    #[serde(rename = "UserClientIp")]
    user_client_ip: &'a str,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "Priority")]
    priority: u32,
    #[serde(rename = "Line")]
    line: &'a str,
}

//==============================================================================
// Responses
//==============================================================================

#[derive(Debug, Deserialize)]
struct DescribeDomainRecordsResponse {
    #[serde(rename = "DomainRecords")]
    domain_records: Option<DomainRecordsWrapper>,
    #[serde(rename = "TotalCount")]
    total_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DomainRecordsWrapper {
    #[serde(rename = "Record")]
    record: Option<Vec<AliyunRecord>>,
}

#[derive(Debug, Deserialize)]
struct AliyunRecord {
    #[serde(rename = "RecordId")]
    record_id: String,
    #[serde(rename = "RR")]
    rr: String,
    #[serde(rename = "Type")]
    record_type: String,
    #[serde(rename = "Value")]
    value: String,
    #[serde(rename = "TTL")]
    ttl: u32,
    #[serde(rename = "Priority")]
    priority: Option<u32>,
    #[serde(rename = "Line")]
    line: Option<String>,
}

impl From<AliyunRecord> for RemoteRecord {
    fn from(r: AliyunRecord) -> Self {
        Self {
            record_id: r.record_id,
            subdomain: r.rr,
            value: r.value,
            record_type: r.record_type.to_ascii_uppercase(),
            ttl: r.ttl,
            priority: r.priority,
            line: r.line,
        }
    }
}

impl From<DescribeDomainRecordsResponse> for RecordPage {
    fn from(resp: DescribeDomainRecordsResponse) -> Self {
        let records = resp
            .domain_records
            .and_then(|w| w.record)
            .unwrap_or_default()
            .into_iter()
            .map(RemoteRecord::from)
            .collect();
        Self {
            records,
            total_count: resp.total_count.unwrap_or(0),
        }
    }
}

#[derive(Debug, Deserialize)]
struct AddDomainRecordResponse {
    #[serde(rename = "RecordId")]
    record_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateDomainRecordResponse {}

/// Turns an error response into [`Error::Upstream`], preferring `Code: Message`
fn upstream_error(status: u16, body: &str) -> Error {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        if let (Some(code), Some(message)) = (
            value.get("Code").and_then(|v| v.as_str()),
            value.get("Message").and_then(|v| v.as_str()),
        ) {
            return Error::upstream(status, format!("{code}: {message}"));
        }
    }
    Error::upstream(status, body.trim())
}

//==============================================================================
// Client
//==============================================================================

/// Signed client for the Alibaba Cloud DNS RPC API
pub struct AlidnsClient {
    client: reqwest::Client,
    access_key_id: Zeroizing<String>,
    access_key_secret: Zeroizing<String>,
    base_url: String,
    host: String,
}

impl fmt::Debug for AlidnsClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlidnsClient")
            .field("base_url", &self.base_url)
            .field("access_key_id", &"***")
            .finish()
    }
}

impl AlidnsClient {
    /// Builds a client for the credentials' region or endpoint
    ///
    /// # Arguments
    ///
    /// * `credentials` - Key pair plus region and optional endpoint override
    /// * `timeout` - Connect and whole-request timeout
    pub fn new(credentials: &Credentials, timeout: Duration) -> Result<Self> {
        let endpoint = match &credentials.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => format!("https://alidns.{}.aliyuncs.com", credentials.region),
        };
        let (base_url, host) = parse_endpoint(&endpoint)?;

        let client = reqwest::Client::builder()
            .connect_timeout(timeout)
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::config(format!("build HTTP client: {e}")))?;

        Ok(Self {
            client,
            access_key_id: credentials.access_key_id.clone(),
            access_key_secret: credentials.access_key_secret.clone(),
            base_url,
            host,
        })
    }

    /// Base URL requests are sent to
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request<T, P>(&self, action: &str, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize,
    {
        let query = signer::canonical_query(params)?;
        let timestamp = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let nonce = uuid::Uuid::new_v4().to_string();

        let authorization = signer::authorization(
            &self.access_key_id,
            &self.access_key_secret,
            &SigningInput {
                host: &self.host,
                action,
                query: &query,
                timestamp: &timestamp,
                nonce: &nonce,
            },
        )?;

        let url = if query.is_empty() {
            format!("{}/", self.base_url)
        } else {
            format!("{}/?{}", self.base_url, query)
        };

        debug!("POST {}/ (Action: {})", self.base_url, action);
        let _timer = metrics::start_api_timer(action);
        let resp = self
            .client
            .post(&url)
            .header("Host", &self.host)
            .header("x-acs-action", action)
            .header("x-acs-version", ALIDNS_API_VERSION)
            .header("x-acs-date", &timestamp)
            .header("x-acs-signature-nonce", &nonce)
            .header("x-acs-content-sha256", EMPTY_BODY_SHA256)
            .header("Authorization", authorization)
            .send()
            .await
            .map_err(|e| Error::network(format!("{action} request failed: {e}")))?;

        let status = resp.status().as_u16();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::network(format!("{action} response read failed: {e}")))?;

        if status >= 400 {
            return Err(upstream_error(status, &text));
        }

        let value: serde_json::Value = serde_json::from_str(&text)
            .map_err(|e| Error::parse(format!("{action} response: {e}")))?;
        if let (Some(code), Some(message)) = (
            value.get("Code").and_then(|v| v.as_str()),
            value.get("Message").and_then(|v| v.as_str()),
        ) {
            return Err(Error::upstream(status, format!("{code}: {message}")));
        }

        serde_json::from_value(value).map_err(|e| Error::parse(format!("{action} response: {e}")))
    }
}

/// Splits an endpoint URL into the base used for requests and the signed host
fn parse_endpoint(endpoint: &str) -> Result<(String, String)> {
    let url = Url::parse(endpoint.trim())
        .map_err(|e| Error::config(format!("invalid endpoint '{endpoint}': {e}")))?;
    let host = url
        .host_str()
        .ok_or_else(|| Error::config(format!("endpoint '{endpoint}' has no host")))?;
    let host = match url.port() {
        Some(port) => format!("{host}:{port}"),
        None => host.to_string(),
    };
    let base_url = format!("{}://{}", url.scheme(), host);
    Ok((base_url, host))
}

#[async_trait]
impl RecordDirectory for AlidnsClient {
    async fn list_page(&self, domain: &str, page: u32, page_size: u32) -> Result<RecordPage> {
        let params = DescribeDomainRecordsParams {
            domain_name: domain,
            page_number: page,
            page_size,
        };
        let resp: DescribeDomainRecordsResponse =
            self.request("DescribeDomainRecords", &params).await?;
        Ok(resp.into())
    }

    async fn add_record(&self, request: &AddRecordRequest) -> Result<String> {
        let params = AddDomainRecordParams {
            domain_name: &request.domain,
            rr: &request.subdomain,
            record_type: &request.record_type,
            value: &request.value,
            ttl: request.ttl,
            priority: request.priority,
            line: &request.line,
        };
        let resp: AddDomainRecordResponse = self.request("AddDomainRecord", &params).await?;
        Ok(resp.record_id)
    }

    async fn update_record(&self, request: &UpdateRecordRequest) -> Result<()> {
        let params = UpdateDomainRecordParams {
            record_id: &request.record_id,
            rr: &request.subdomain,
            record_type: &request.record_type,
            value: &request.value,
            lang: "en",
            user_client_ip: &request.value,
            ttl: request.ttl,
            priority: request.priority,
            line: &request.line,
        };
        let _: UpdateDomainRecordResponse = self.request("UpdateDomainRecord", &params).await?;
        Ok(())
    }
}

//==============================================================================
// Tests
//==============================================================================
