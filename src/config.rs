//! Configuration module for alidns-sync
//!
//! This module reads the TOML config file into typed values. The file is the
//! only state the agent keeps between cycles, so it is re-read at the start of
//! every cycle through [`ConfigStore`].

use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use zeroize::Zeroizing;

use crate::constants::{
    CONFIG_FILE_NAME, DEFAULT_INTERVAL_SECS, DEFAULT_IP_API, DEFAULT_REGION,
    DEFAULT_TIMEOUT_SECS, ENV_ACCESS_KEY_ID, ENV_ACCESS_KEY_SECRET, ENV_REGION,
    MAX_TIMEOUT_SECS, MIN_INTERVAL_SECS, MIN_TIMEOUT_SECS,
};
use crate::error::{Error, Result};
use crate::reconcile::{DesiredRecord, DesiredRecords};
use crate::validation::{normalize_record_type, validate_domain_name, validate_rr, validate_ttl};

//==============================================================================
// Sample
//==============================================================================

/// Sample configuration written by `alidns-sync --init`
pub const SAMPLE_CONFIG: &str = r#"# alidns-sync configuration

[schedule]
# Seconds between reconciliation cycles (minimum 60)
interval = 300
enabled = true
# Read the address from this interface instead of asking the discovery endpoint
# interface = "eth0"
ip_family = "ipv4"
ip_api = "http://myip.ipip.net/json"
timeout = 30
verbose = false
# "text" or "json"
log_format = "text"
# Health and metrics endpoint, 0 disables it
health_port = 0

[auth]
access_key_id = "xxxxxxxxxxxx"
access_key_secret = "xxxxxxxxxxxxxxxxxx"
region = "cn-hangzhou"

[[host]]
rr = "abc"
type = "A"
ttl = 600
priority = 1
line = "default"
domain = "example.com"

[[host]]
rr = "efg"
type = "A"
ttl = 600
priority = 1
line = "default"
domain = "example.com"
"#;

/// Writes [`SAMPLE_CONFIG`] into `dir`, creating the directory if needed
///
/// An existing config file is never overwritten.
///
/// # Returns
///
/// The path of the config file and whether it was written by this call.
pub fn write_sample(dir: &Path) -> Result<(PathBuf, bool)> {
    let path = dir.join(CONFIG_FILE_NAME);
    if path.exists() {
        return Ok((path, false));
    }

    std::fs::create_dir_all(dir)
        .map_err(|e| Error::config(format!("create {}: {}", dir.display(), e)))?;
    std::fs::write(&path, SAMPLE_CONFIG)
        .map_err(|e| Error::config(format!("write {}: {}", path.display(), e)))?;
    Ok((path, true))
}

//==============================================================================
// Types
//==============================================================================

/// Address family whose value is pushed into the records
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpFamily {
    /// Use the resolved IPv4 address
    V4,
    /// Use the resolved IPv6 address
    V6,
}

impl fmt::Display for IpFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("ipv4"),
            Self::V6 => f.write_str("ipv6"),
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Settings for the address resolver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolverConfig {
    /// Interface to read addresses from; the discovery endpoint is used when `None`
    pub interface: Option<String>,
    /// Family whose address becomes the cycle's current IP
    pub ip_family: IpFamily,
    /// Discovery endpoint URL
    pub ip_api: String,
    /// HTTP timeout for the discovery request
    pub timeout: Duration,
}

/// Scheduling and runtime settings from the `[schedule]` section
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Time between two cycles
    pub interval: Duration,
    /// Whether the agent may run at all
    pub enabled: bool,
    /// Address resolver settings
    pub resolver: ResolverConfig,
    /// HTTP timeout for DNS API calls
    pub timeout: Duration,
    /// Enable debug logging
    pub verbose: bool,
    /// Log line format
    pub log_format: LogFormat,
    /// Health endpoint port (0 = disabled)
    pub health_port: u16,
}

impl Schedule {
    /// Fails when the `enabled` flag is off
    pub fn ensure_enabled(&self) -> Result<()> {
        if self.enabled {
            Ok(())
        } else {
            Err(Error::config(
                "agent is not enabled (set `schedule.enabled = true` in the config file)",
            ))
        }
    }
}

/// API credentials from the `[auth]` section
///
/// Secrets are wiped from memory on drop and never printed by `Debug`.
#[derive(Clone)]
pub struct Credentials {
    /// Access key id
    pub access_key_id: Zeroizing<String>,
    /// Access key secret
    pub access_key_secret: Zeroizing<String>,
    /// API region, e.g. `cn-hangzhou`
    pub region: String,
    /// Full endpoint URL overriding `https://alidns.<region>.aliyuncs.com`
    pub endpoint: Option<String>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &"***")
            .field("access_key_secret", &"***")
            .field("region", &self.region)
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

/// A fully loaded configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// `[schedule]` section
    pub schedule: Schedule,
    /// `[auth]` section with environment overrides applied
    pub credentials: Credentials,
    /// `[[host]]` sections grouped by domain
    pub records: DesiredRecords,
}

//==============================================================================
// Store
//==============================================================================

/// Reads typed values out of the config file on every call
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    /// Creates a store reading the given file
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Creates a store reading `config.toml` inside `dir`
    pub fn in_dir(dir: &Path) -> Self {
        Self::new(dir.join(CONFIG_FILE_NAME))
    }

    /// Path of the config file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads and validates the whole file with a single read
    pub fn load(&self) -> Result<Config> {
        let raw = self.read()?;
        Ok(Config {
            schedule: raw.schedule()?,
            credentials: raw.credentials()?,
            records: raw.desired_records()?,
        })
    }

    /// Loads the `[auth]` section
    pub fn load_credentials(&self) -> Result<Credentials> {
        self.read()?.credentials()
    }

    /// Loads every `[[host]]` section grouped by domain
    pub fn load_desired_records(&self) -> Result<DesiredRecords> {
        self.read()?.desired_records()
    }

    /// Loads the `[schedule]` section
    pub fn load_schedule(&self) -> Result<Schedule> {
        self.read()?.schedule()
    }

    fn read(&self) -> Result<RawConfig> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            Error::config(format!("failed to read config {}: {}", self.path.display(), e))
        })?;
        toml::from_str(&content).map_err(|e| {
            Error::config(format!(
                "failed to parse config {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

//==============================================================================
// Raw file structure
//==============================================================================

/// A scalar that may be written as a bool, an integer or a string
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
enum Scalar {
    Bool(bool),
    Int(i64),
    Str(String),
}

impl Scalar {
    fn to_u64(&self, field: &str) -> Result<u64> {
        match self {
            Self::Int(v) => u64::try_from(*v)
                .map_err(|_| Error::config(format!("`{field}` must not be negative, got {v}"))),
            Self::Str(s) => s.trim().parse::<u64>().map_err(|_| {
                Error::config(format!("`{field}` must be a number, got '{s}'"))
            }),
            Self::Bool(b) => Err(Error::config(format!(
                "`{field}` must be a number, got {b}"
            ))),
        }
    }

    fn to_u32(&self, field: &str) -> Result<u32> {
        let value = self.to_u64(field)?;
        u32::try_from(value)
            .map_err(|_| Error::config(format!("`{field}` is out of range, got {value}")))
    }

    fn to_bool(&self, field: &str) -> Result<bool> {
        match self {
            Self::Bool(b) => Ok(*b),
            Self::Int(1) => Ok(true),
            Self::Int(0) => Ok(false),
            Self::Int(v) => Err(Error::config(format!(
                "`{field}` must be a boolean, got {v}"
            ))),
            Self::Str(s) => parse_bool(s)
                .map_err(|_| Error::config(format!("`{field}` must be a boolean, got '{s}'"))),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    schedule: Option<RawSchedule>,
    auth: Option<RawAuth>,
    #[serde(default)]
    host: Vec<RawHost>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSchedule {
    interval: Option<Scalar>,
    enabled: Option<Scalar>,
    interface: Option<String>,
    ip_family: Option<String>,
    ip_api: Option<String>,
    timeout: Option<Scalar>,
    verbose: Option<Scalar>,
    log_format: Option<String>,
    health_port: Option<Scalar>,
}

#[derive(Debug, Default, Deserialize)]
struct RawAuth {
    access_key_id: Option<String>,
    access_key_secret: Option<String>,
    region: Option<String>,
    endpoint: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawHost {
    rr: Option<String>,
    #[serde(rename = "type")]
    record_type: Option<String>,
    ttl: Option<Scalar>,
    priority: Option<Scalar>,
    line: Option<String>,
    domain: Option<String>,
}

impl RawConfig {
    fn schedule(&self) -> Result<Schedule> {
        let empty = RawSchedule::default();
        let raw = self.schedule.as_ref().unwrap_or(&empty);

        let interval = match &raw.interval {
            Some(v) => v.to_u64("schedule.interval")?,
            None => DEFAULT_INTERVAL_SECS,
        };
        if interval < MIN_INTERVAL_SECS {
            return Err(Error::config(format!(
                "schedule.interval must be at least {} seconds, got {}",
                MIN_INTERVAL_SECS, interval
            )));
        }

        let timeout = match &raw.timeout {
            Some(v) => v.to_u64("schedule.timeout")?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        if !(MIN_TIMEOUT_SECS..=MAX_TIMEOUT_SECS).contains(&timeout) {
            return Err(Error::config(format!(
                "schedule.timeout must be between {} and {} seconds, got {}",
                MIN_TIMEOUT_SECS, MAX_TIMEOUT_SECS, timeout
            )));
        }
        let timeout = Duration::from_secs(timeout);

        let enabled = match &raw.enabled {
            Some(v) => v.to_bool("schedule.enabled")?,
            None => false,
        };
        let verbose = match &raw.verbose {
            Some(v) => v.to_bool("schedule.verbose")?,
            None => false,
        };

        let ip_family = match raw.ip_family.as_deref() {
            Some(v) => parse_ip_family(v)?,
            None => IpFamily::V4,
        };
        let log_format = match raw.log_format.as_deref() {
            Some(v) => parse_log_format(v)?,
            None => LogFormat::Text,
        };
        let health_port = match &raw.health_port {
            Some(v) => {
                let port = v.to_u64("schedule.health_port")?;
                u16::try_from(port).map_err(|_| {
                    Error::config(format!("schedule.health_port is out of range, got {port}"))
                })?
            }
            None => 0,
        };

        let interface = raw
            .interface
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        let ip_api = raw
            .ip_api
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_IP_API)
            .to_string();

        Ok(Schedule {
            interval: Duration::from_secs(interval),
            enabled,
            resolver: ResolverConfig {
                interface,
                ip_family,
                ip_api,
                timeout,
            },
            timeout,
            verbose,
            log_format,
            health_port,
        })
    }

    fn credentials(&self) -> Result<Credentials> {
        let empty = RawAuth::default();
        let raw = self.auth.as_ref().unwrap_or(&empty);

        let access_key_id = env_override(ENV_ACCESS_KEY_ID).or_else(|| non_empty(&raw.access_key_id));
        let access_key_secret =
            env_override(ENV_ACCESS_KEY_SECRET).or_else(|| non_empty(&raw.access_key_secret));
        let region = env_override(ENV_REGION)
            .or_else(|| non_empty(&raw.region))
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        if self.auth.is_none() && access_key_id.is_none() && access_key_secret.is_none() {
            return Err(Error::missing("auth"));
        }
        let access_key_id = access_key_id.ok_or_else(|| Error::missing("auth.access_key_id"))?;
        let access_key_secret =
            access_key_secret.ok_or_else(|| Error::missing("auth.access_key_secret"))?;

        if !region
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::config(format!(
                "auth.region must contain only letters, digits and '-', got: {region}"
            )));
        }

        Ok(Credentials {
            access_key_id: Zeroizing::new(access_key_id),
            access_key_secret: Zeroizing::new(access_key_secret),
            region,
            endpoint: non_empty(&raw.endpoint),
        })
    }

    fn desired_records(&self) -> Result<DesiredRecords> {
        if self.host.is_empty() {
            return Err(Error::config("no [[host]] sections configured"));
        }

        let mut records = DesiredRecords::new();
        for (index, host) in self.host.iter().enumerate() {
            let record = host.to_desired(index)?;
            records
                .entry(record.domain.clone())
                .or_insert_with(Vec::new)
                .push(record);
        }
        Ok(records)
    }
}

impl RawHost {
    fn to_desired(&self, index: usize) -> Result<DesiredRecord> {
        let field = |name: &str| format!("host[{index}].{name}");

        let subdomain = self
            .rr
            .as_deref()
            .ok_or_else(|| Error::missing(&field("rr")))?
            .trim()
            .to_ascii_lowercase();
        validate_rr(&subdomain).map_err(|e| prefix(e, &field("rr")))?;

        let record_type = self
            .record_type
            .as_deref()
            .ok_or_else(|| Error::missing(&field("type")))?;
        let record_type = normalize_record_type(record_type).map_err(|e| prefix(e, &field("type")))?;

        let ttl = self
            .ttl
            .as_ref()
            .ok_or_else(|| Error::missing(&field("ttl")))?
            .to_u32(&field("ttl"))?;
        validate_ttl(ttl).map_err(|e| prefix(e, &field("ttl")))?;

        let priority = self
            .priority
            .as_ref()
            .ok_or_else(|| Error::missing(&field("priority")))?
            .to_u32(&field("priority"))?;

        let line = self
            .line
            .as_deref()
            .ok_or_else(|| Error::missing(&field("line")))?
            .trim()
            .to_string();

        let domain = self
            .domain
            .as_deref()
            .ok_or_else(|| Error::missing(&field("domain")))?
            .trim();
        validate_domain_name(domain).map_err(|e| prefix(e, &field("domain")))?;
        let domain = domain.trim_end_matches('.').to_ascii_lowercase();

        Ok(DesiredRecord {
            subdomain,
            record_type,
            ttl,
            priority,
            line,
            domain,
        })
    }
}

//==============================================================================
// Helpers
//==============================================================================

fn prefix(err: Error, field: &str) -> Error {
    match err {
        Error::Config(msg) => Error::Config(format!("{field}: {msg}")),
        other => other,
    }
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn env_override(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Parses a boolean written as a string
///
/// Accepts "1", "true", "yes", "on" and "0", "false", "no", "off" in any case.
fn parse_bool(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(Error::config(
            "expected boolean (true/false/1/0/yes/no/on/off)",
        )),
    }
}

/// Parses an address family name
///
/// Accepts "ipv4"/"v4"/"4" and "ipv6"/"v6"/"6".
pub fn parse_ip_family(value: &str) -> Result<IpFamily> {
    match value.trim().to_ascii_lowercase().as_str() {
        "ipv4" | "v4" | "4" => Ok(IpFamily::V4),
        "ipv6" | "v6" | "6" => Ok(IpFamily::V6),
        _ => Err(Error::config(format!(
            "Invalid ip_family: '{}'. Use: ipv4|ipv6",
            value
        ))),
    }
}

fn parse_log_format(value: &str) -> Result<LogFormat> {
    match value.trim().to_ascii_lowercase().as_str() {
        "text" | "plain" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        _ => Err(Error::config(format!(
            "Invalid log_format: '{}'. Use: text|json",
            value
        ))),
    }
}

//==============================================================================
// Tests
//==============================================================================
