//! Desired-vs-remote record diff
//!
//! [`reconcile`] is a pure function: it never touches the network and holds no
//! state, so the same inputs always give the same [`Plan`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

//==============================================================================
// Types
//==============================================================================

/// A record the config asks for
///
/// Built from one `[[host]]` section each cycle and discarded afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredRecord {
    /// Host part of the record (`www`, `@`, `*`)
    pub subdomain: String,
    /// Record type, upper-cased (`A`, `AAAA`)
    pub record_type: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Priority from the config
    pub priority: u32,
    /// Routing line; may be empty
    pub line: String,
    /// Zone the record lives in
    pub domain: String,
}

/// Desired records grouped by domain, iterated in domain order
///
/// Duplicate entries are kept and produce duplicate remote calls.
pub type DesiredRecords = BTreeMap<String, Vec<DesiredRecord>>;

/// A record as returned by the DNS provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    /// Provider record id
    pub record_id: String,
    /// Host part of the record
    pub subdomain: String,
    /// Current record value
    pub value: String,
    /// Record type
    pub record_type: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Priority, when the provider reports one
    pub priority: Option<u32>,
    /// Routing line, when the provider reports one
    pub line: Option<String>,
}

/// Remote records of one domain keyed by subdomain
///
/// The record type is not part of the key: a desired `www A` matches a remote
/// `www` of any type and updating it rewrites the type too.
pub type RemoteRecords = BTreeMap<String, RemoteRecord>;

/// Builds a [`RemoteRecords`] map; later records with the same subdomain win
pub fn index_records(records: impl IntoIterator<Item = RemoteRecord>) -> RemoteRecords {
    records
        .into_iter()
        .map(|record| (record.subdomain.clone(), record))
        .collect()
}

/// An existing remote record whose value must change
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToUpdate {
    /// Id of the remote record being replaced
    pub record_id: String,
    /// The desired record
    pub record: DesiredRecord,
    /// New value (the current IP)
    pub value: String,
}

/// A record missing from the remote set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToAdd {
    /// The desired record
    pub record: DesiredRecord,
    /// Value to create it with (the current IP)
    pub value: String,
}

/// The changes one cycle has to apply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    /// Records to update, in desired order
    pub to_update: Vec<ToUpdate>,
    /// Records to add, in desired order
    pub to_add: Vec<ToAdd>,
}

impl Plan {
    /// True when the remote side already matches
    pub fn is_empty(&self) -> bool {
        self.to_update.is_empty() && self.to_add.is_empty()
    }
}

//==============================================================================
// Reconcile
//==============================================================================

/// Computes the updates and additions that bring `remote` in line with `desired`
///
/// # Arguments
///
/// * `desired` - Desired records grouped by domain
/// * `remote` - Remote records per domain; a missing domain counts as empty
/// * `current` - The address every desired record should point at
///
/// # Returns
///
/// A [`Plan`]: a missing subdomain becomes an addition, a differing
/// value becomes an update carrying the remote id, an equal value is skipped.
pub fn reconcile(
    desired: &DesiredRecords,
    remote: &BTreeMap<String, RemoteRecords>,
    current: &str,
) -> Plan {
    let mut plan = Plan::default();

    for (domain, records) in desired {
        let existing = remote.get(domain);
        for record in records {
            match existing.and_then(|set| set.get(&record.subdomain)) {
                Some(found) if found.value == current => {}
                Some(found) => plan.to_update.push(ToUpdate {
                    record_id: found.record_id.clone(),
                    record: record.clone(),
                    value: current.to_string(),
                }),
                None => plan.to_add.push(ToAdd {
                    record: record.clone(),
                    value: current.to_string(),
                }),
            }
        }
    }

    plan
}

//==============================================================================
// Tests
//==============================================================================
