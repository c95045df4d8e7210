//! Record directory abstraction
//!
//! [`RecordDirectory`] is the seam between the reconciliation logic and the
//! DNS provider API. [`crate::alidns::AlidnsClient`] is the production
//! implementation; tests use an in-memory fake. Pagination and the
//! apply-in-order rules live here so they hold for any implementation.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::constants::{ADD_RECORD_PRIORITY, DEFAULT_LINE, LIST_PAGE_SIZE};
use crate::error::Result;
use crate::metrics;
use crate::reconcile::{
    index_records, DesiredRecord, RemoteRecord, RemoteRecords, ToAdd, ToUpdate,
};

//==============================================================================
// Types
//==============================================================================

/// One page of a domain listing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordPage {
    /// Records on this page
    pub records: Vec<RemoteRecord>,
    /// Total number of records in the domain, as reported by the provider
    pub total_count: u64,
}

/// Parameters of a record creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddRecordRequest {
    /// Zone the record is created in
    pub domain: String,
    /// Host part of the record
    pub subdomain: String,
    /// Record type
    pub record_type: String,
    /// Record value
    pub value: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Priority
    pub priority: u32,
    /// Routing line
    pub line: String,
}

/// Parameters of a record update
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateRecordRequest {
    /// Provider record id
    pub record_id: String,
    /// Host part of the record
    pub subdomain: String,
    /// Record type
    pub record_type: String,
    /// New record value
    pub value: String,
    /// Time-to-live in seconds
    pub ttl: u32,
    /// Priority
    pub priority: u32,
    /// Routing line
    pub line: String,
}

//==============================================================================
// Trait
//==============================================================================

/// Remote store of DNS records, addressed by domain
#[async_trait]
pub trait RecordDirectory: Send + Sync {
    /// Fetches one page of a domain's records
    ///
    /// # Arguments
    ///
    /// * `domain` - Zone name
    /// * `page` - Page number, starting at 1
    /// * `page_size` - Records per page
    async fn list_page(&self, domain: &str, page: u32, page_size: u32) -> Result<RecordPage>;

    /// Creates a record and returns its provider id
    async fn add_record(&self, request: &AddRecordRequest) -> Result<String>;

    /// Replaces the fields of an existing record
    async fn update_record(&self, request: &UpdateRecordRequest) -> Result<()>;
}

//==============================================================================
// Operations
//==============================================================================

/// Lists every record of a domain
///
/// Pages of [`LIST_PAGE_SIZE`] are requested from page 1 until
/// `pages * page_size >= total_count`; a domain with no records still costs
/// one request. Any page failure aborts the listing.
pub async fn list_all_records<D>(dir: &D, domain: &str) -> Result<RemoteRecords>
where
    D: RecordDirectory + ?Sized,
{
    let mut records = Vec::new();
    let mut page = 1u32;

    loop {
        let result = dir.list_page(domain, page, LIST_PAGE_SIZE).await?;
        debug!(
            "Listed page {} of {} ({} records, total {})",
            page,
            domain,
            result.records.len(),
            result.total_count
        );
        records.extend(result.records);

        if u64::from(page) * u64::from(LIST_PAGE_SIZE) >= result.total_count {
            break;
        }
        page += 1;
    }

    Ok(index_records(records))
}

/// Routing line to send for `record`; an empty line becomes [`DEFAULT_LINE`]
fn routing_line(record: &DesiredRecord) -> String {
    if record.line.is_empty() {
        DEFAULT_LINE.to_string()
    } else {
        record.line.clone()
    }
}

/// Applies updates one at a time, in order
///
/// An empty line is sent as [`DEFAULT_LINE`], as for [`add`].
///
/// # Returns
///
/// The number of records updated. The first failure is returned as-is;
/// records updated before it stay updated.
pub async fn update<D>(dir: &D, updates: &[ToUpdate]) -> Result<usize>
where
    D: RecordDirectory + ?Sized,
{
    let mut applied = 0;
    for item in updates {
        let record = &item.record;
        let request = UpdateRecordRequest {
            record_id: item.record_id.clone(),
            subdomain: record.subdomain.clone(),
            record_type: record.record_type.clone(),
            value: item.value.clone(),
            ttl: record.ttl,
            priority: record.priority,
            line: routing_line(record),
        };
        dir.update_record(&request).await?;
        info!(
            "updated, RR: {}, Domain: {}, Type: {}, Value: {}, TTL: {}, Priority: {}, Line: {}",
            request.subdomain,
            record.domain,
            request.record_type,
            request.value,
            request.ttl,
            request.priority,
            request.line
        );
        metrics::record_change("update");
        applied += 1;
    }
    Ok(applied)
}

/// Applies additions one at a time, in order
///
/// Every addition is sent with priority [`ADD_RECORD_PRIORITY`] whatever the
/// config says, and an empty line becomes [`DEFAULT_LINE`].
///
/// # Returns
///
/// The number of records created. Same stop-at-first-failure rule as [`update`].
pub async fn add<D>(dir: &D, additions: &[ToAdd]) -> Result<usize>
where
    D: RecordDirectory + ?Sized,
{
    let mut applied = 0;
    for item in additions {
        let record = &item.record;
        let request = AddRecordRequest {
            domain: record.domain.clone(),
            subdomain: record.subdomain.clone(),
            record_type: record.record_type.clone(),
            value: item.value.clone(),
            ttl: record.ttl,
            priority: ADD_RECORD_PRIORITY,
            line: routing_line(record),
        };
        let record_id = dir.add_record(&request).await?;
        info!(
            "added, RR: {}, Domain: {}, Type: {}, Value: {}, TTL: {}, Priority: {}, Line: {}, RecordId: {}",
            request.subdomain,
            request.domain,
            request.record_type,
            request.value,
            request.ttl,
            request.priority,
            request.line,
            record_id
        );
        metrics::record_change("add");
        applied += 1;
    }
    Ok(applied)
}

//==============================================================================
// Tests
//==============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeDirectory {
        records: Vec<RemoteRecord>,
        pages_requested: Mutex<Vec<u32>>,
        fail_on_page: Option<u32>,
        fail_after: Option<usize>,
        adds: Mutex<Vec<AddRecordRequest>>,
        updates: Mutex<Vec<UpdateRecordRequest>>,
    }

    impl FakeDirectory {
        fn with_records(count: usize) -> Self {
            let records = (0..count)
                .map(|i| RemoteRecord {
                    record_id: format!("rec-{i}"),
                    subdomain: format!("host{i}"),
                    value: "9.9.9.9".to_string(),
                    record_type: "A".to_string(),
                    ttl: 600,
                    priority: None,
                    line: Some("default".to_string()),
                })
                .collect();
            Self {
                records,
                ..Self::default()
            }
        }

        fn calls(&self) -> usize {
            self.adds.lock().unwrap().len() + self.updates.lock().unwrap().len()
        }

        fn check_failure(&self) -> Result<()> {
            match self.fail_after {
                Some(limit) if self.calls() >= limit => {
                    Err(Error::upstream(400, "{\"Code\":\"DomainRecordDuplicate\"}"))
                }
                _ => Ok(()),
            }
        }
    }

    #[async_trait]
    impl RecordDirectory for FakeDirectory {
        async fn list_page(&self, _domain: &str, page: u32, page_size: u32) -> Result<RecordPage> {
            self.pages_requested.lock().unwrap().push(page);
            if self.fail_on_page == Some(page) {
                return Err(Error::network("connection reset"));
            }
            let start = ((page - 1) * page_size) as usize;
            let end = (start + page_size as usize).min(self.records.len());
            let records = if start < end {
                self.records[start..end].to_vec()
            } else {
                Vec::new()
            };
            Ok(RecordPage {
                records,
                total_count: self.records.len() as u64,
            })
        }

        async fn add_record(&self, request: &AddRecordRequest) -> Result<String> {
            self.check_failure()?;
            let mut adds = self.adds.lock().unwrap();
            adds.push(request.clone());
            Ok(format!("new-{}", adds.len()))
        }

        async fn update_record(&self, request: &UpdateRecordRequest) -> Result<()> {
            self.check_failure()?;
            self.updates.lock().unwrap().push(request.clone());
            Ok(())
        }
    }

    fn desired(rr: &str, priority: u32, line: &str) -> DesiredRecord {
        DesiredRecord {
            subdomain: rr.to_string(),
            record_type: "A".to_string(),
            ttl: 600,
            priority,
            line: line.to_string(),
            domain: "example.com".to_string(),
        }
    }

    #[tokio::test]
    async fn test_list_all_records_1200_takes_three_pages() {
        let dir = FakeDirectory::with_records(1200);
        let records = list_all_records(&dir, "example.com").await.unwrap();

        assert_eq!(*dir.pages_requested.lock().unwrap(), vec![1, 2, 3]);
        assert_eq!(records.len(), 1200);
        for i in 0..1200 {
            assert!(records.contains_key(&format!("host{i}")));
        }
    }

    #[tokio::test]
    async fn test_list_all_records_exact_page_boundary() {
        let dir = FakeDirectory::with_records(1000);
        let records = list_all_records(&dir, "example.com").await.unwrap();

        assert_eq!(*dir.pages_requested.lock().unwrap(), vec![1, 2]);
        assert_eq!(records.len(), 1000);
    }

    #[tokio::test]
    async fn test_list_all_records_empty_domain_single_request() {
        let dir = FakeDirectory::with_records(0);
        let records = list_all_records(&dir, "example.com").await.unwrap();

        assert_eq!(*dir.pages_requested.lock().unwrap(), vec![1]);
        assert!(records.is_empty());
    }

    #[tokio::test]
    async fn test_list_all_records_page_failure_aborts() {
        let dir = FakeDirectory {
            fail_on_page: Some(2),
            ..FakeDirectory::with_records(1200)
        };
        let err = list_all_records(&dir, "example.com").await.unwrap_err();

        assert_eq!(err.kind(), "network");
        assert_eq!(*dir.pages_requested.lock().unwrap(), vec![1, 2]);
    }

    #[tokio::test]
    async fn test_add_always_sends_priority_one() {
        // AddDomainRecord is sent with priority 1 no matter what the host section asks for
        let dir = FakeDirectory::default();
        let additions = vec![ToAdd {
            record: desired("www", 10, "telecom"),
            value: "1.2.3.4".to_string(),
        }];

        assert_eq!(add(&dir, &additions).await.unwrap(), 1);
        let adds = dir.adds.lock().unwrap();
        assert_eq!(adds[0].priority, 1);
        assert_eq!(adds[0].line, "telecom");
        assert_eq!(adds[0].value, "1.2.3.4");
        assert_eq!(adds[0].domain, "example.com");
    }

    #[tokio::test]
    async fn test_add_defaults_empty_line() {
        let dir = FakeDirectory::default();
        let additions = vec![ToAdd {
            record: desired("www", 1, ""),
            value: "1.2.3.4".to_string(),
        }];

        add(&dir, &additions).await.unwrap();
        assert_eq!(dir.adds.lock().unwrap()[0].line, "default");
    }

    #[tokio::test]
    async fn test_update_keeps_configured_priority() {
        let dir = FakeDirectory::default();
        let updates = vec![ToUpdate {
            record_id: "rec-1".to_string(),
            record: desired("www", 10, "default"),
            value: "1.2.3.4".to_string(),
        }];

        assert_eq!(update(&dir, &updates).await.unwrap(), 1);
        let sent = dir.updates.lock().unwrap();
        assert_eq!(sent[0].record_id, "rec-1");
        assert_eq!(sent[0].priority, 10);
    }

    #[tokio::test]
    async fn test_update_defaults_empty_line() {
        let dir = FakeDirectory::default();
        let updates = vec![ToUpdate {
            record_id: "rec-1".to_string(),
            record: desired("www", 1, ""),
            value: "1.2.3.4".to_string(),
        }];

        update(&dir, &updates).await.unwrap();
        assert_eq!(dir.updates.lock().unwrap()[0].line, "default");
    }

    #[tokio::test]
    async fn test_update_stops_at_first_failure() {
        let dir = FakeDirectory {
            fail_after: Some(2),
            ..FakeDirectory::default()
        };
        let updates: Vec<ToUpdate> = ["a", "b", "c", "d"]
            .iter()
            .map(|rr| ToUpdate {
                record_id: format!("rec-{rr}"),
                record: desired(rr, 1, "default"),
                value: "1.2.3.4".to_string(),
            })
            .collect();

        let err = update(&dir, &updates).await.unwrap_err();
        assert_eq!(err.kind(), "upstream");

        let sent: Vec<String> = dir
            .updates
            .lock()
            .unwrap()
            .iter()
            .map(|u| u.record_id.clone())
            .collect();
        assert_eq!(sent, vec!["rec-a", "rec-b"]);
    }

    #[tokio::test]
    async fn test_empty_batches_make_no_calls() {
        let dir = FakeDirectory::default();
        assert_eq!(add(&dir, &[]).await.unwrap(), 0);
        assert_eq!(update(&dir, &[]).await.unwrap(), 0);
        assert_eq!(dir.calls(), 0);
    }
}
