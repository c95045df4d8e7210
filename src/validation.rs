//! Validation utilities for alidns-sync
//!
//! Checks applied to host sections while the config is loaded, plus the
//! address filter used when reading interface addresses.

use std::net::Ipv6Addr;

use crate::constants::{MAX_LABEL_LENGTH, MAX_RECORD_NAME_LENGTH, MAX_TTL};
use crate::error::{Error, Result};

/// Record types the agent can point at an address
const ADDRESS_RECORD_TYPES: &[&str] = &["A", "AAAA"];

/// Validates the host part of a record (the provider's `RR` field)
///
/// # Validation Rules
///
/// - `@` is the zone apex and `*` a wildcard; both are accepted as-is
/// - Otherwise the value is one or more dot-separated labels
/// - Labels are 1-63 characters of letters, digits, `-` and `_`
/// - Labels cannot start or end with a hyphen
/// - A label may be a bare `*` (e.g. `*.home`)
///
/// # Examples
///
/// ```
/// use alidns_sync::validation::validate_rr;
///
/// assert!(validate_rr("@").is_ok());
/// assert!(validate_rr("www").is_ok());
/// assert!(validate_rr("*.lab").is_ok());
/// assert!(validate_rr("_acme-challenge").is_ok());
///
/// assert!(validate_rr("").is_err());
/// assert!(validate_rr("www.").is_err());
/// assert!(validate_rr("-www").is_err());
/// ```
pub fn validate_rr(rr: &str) -> Result<()> {
    let rr = rr.trim();
    if rr.is_empty() {
        return Err(Error::config("rr cannot be empty"));
    }
    if rr == "@" || rr == "*" {
        return Ok(());
    }
    if rr.len() > MAX_RECORD_NAME_LENGTH {
        return Err(Error::config(format!(
            "rr too long (max {} characters, got {})",
            MAX_RECORD_NAME_LENGTH,
            rr.len()
        )));
    }
    validate_labels(rr, "rr")
}

/// Validates a zone name such as `example.com`
///
/// A trailing dot is tolerated. At least two labels are required.
pub fn validate_domain_name(domain: &str) -> Result<()> {
    let trimmed = domain.trim();
    let name = trimmed.strip_suffix('.').unwrap_or(trimmed);
    if name.is_empty() {
        return Err(Error::config("domain cannot be empty"));
    }
    if name.len() > MAX_RECORD_NAME_LENGTH {
        return Err(Error::config(format!(
            "domain too long (max {} characters, got {})",
            MAX_RECORD_NAME_LENGTH,
            name.len()
        )));
    }
    if !name.contains('.') {
        return Err(Error::config(format!(
            "domain must contain at least two labels, got: {}",
            name
        )));
    }
    if name.split('.').any(|label| label == "*") {
        return Err(Error::config("domain cannot contain a wildcard label"));
    }
    validate_labels(name, "domain")
}

/// Validates and normalizes a record type to upper case
///
/// Only address records make sense for a DDNS agent, so anything other than
/// `A` or `AAAA` is rejected.
pub fn normalize_record_type(record_type: &str) -> Result<String> {
    let upper = record_type.trim().to_ascii_uppercase();
    if ADDRESS_RECORD_TYPES.contains(&upper.as_str()) {
        Ok(upper)
    } else {
        Err(Error::config(format!(
            "unsupported record type '{}' (expected A or AAAA)",
            record_type
        )))
    }
}

/// Validates a record TTL
pub fn validate_ttl(ttl: u32) -> Result<()> {
    if ttl == 0 || ttl > MAX_TTL {
        return Err(Error::config(format!(
            "ttl must be between 1 and {}, got {}",
            MAX_TTL, ttl
        )));
    }
    Ok(())
}

fn validate_labels(name: &str, what: &str) -> Result<()> {
    if name.starts_with('.') {
        return Err(Error::config(format!("{what} cannot start with a dot")));
    }
    if name.contains("..") {
        return Err(Error::config(format!("{what} cannot contain consecutive dots")));
    }

    for label in name.split('.') {
        if label.is_empty() {
            return Err(Error::config(format!("{what} contains empty label")));
        }
        if label == "*" {
            continue;
        }
        if label.len() > MAX_LABEL_LENGTH {
            return Err(Error::config(format!(
                "{what} label too long (max {} characters, got {})",
                MAX_LABEL_LENGTH,
                label.len()
            )));
        }
        if label.starts_with('-') || label.ends_with('-') {
            return Err(Error::config(format!(
                "{what} label cannot start or end with hyphen"
            )));
        }
        if let Some(ch) = label
            .chars()
            .find(|ch| !ch.is_alphanumeric() && *ch != '-' && *ch != '_')
        {
            return Err(Error::config(format!(
                "{what} contains invalid character: '{}' (allowed: letters, digits, '-', '_', or wildcard labels)",
                ch
            )));
        }
    }

    Ok(())
}

/// Whether an IPv6 address bound to an interface is worth publishing
///
/// Rejects the unspecified address, loopback, link-local (`fe80::/10`) and
/// multicast (`ff00::/8`). Unique local addresses are accepted for private
/// deployments.
pub fn is_publishable_ipv6(addr: &Ipv6Addr) -> bool {
    if addr.is_unspecified() || addr.is_loopback() {
        return false;
    }

    let segments = addr.segments();
    if segments[0] & 0xffc0 == 0xfe80 {
        return false;
    }
    if segments[0] & 0xff00 == 0xff00 {
        return false;
    }

    true
}
