//! Daemon module for alidns-sync
//!
//! This module contains the interval scheduler and the reconciliation cycle.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, Mutex};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::address::AddressResolver;
use crate::alidns::AlidnsClient;
use crate::config::{ConfigStore, Credentials, Schedule};
use crate::dns_provider::{self, list_all_records, RecordDirectory};
use crate::error::{Error, Result};
use crate::metrics;
use crate::reconcile::{reconcile, DesiredRecords};

//==============================================================================
// State Machine
//==============================================================================

/// Outcome of the most recent cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncState {
    /// No cycle has finished yet
    Unknown,
    /// Last cycle succeeded, contains the address the records point at
    Synced(String),
    /// Last cycle failed, contains the consecutive error count
    Error(u64),
}

/// Counts of changes applied by one cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    /// Records whose value was updated
    pub updated: usize,
    /// Records created
    pub added: usize,
}

/// What a cycle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Records were reconciled against `address`
    Synced {
        /// Address pushed into the records
        address: String,
        /// Changes applied
        report: CycleReport,
    },
    /// The configured family had no address; nothing was pushed
    Skipped,
}

/// Events that steer the scheduler loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Run a cycle now, outside the interval
    SyncNow,
    /// Leave the loop
    Stop,
}

/// Cycle state shared with the health endpoint
///
/// Nothing here feeds back into the next cycle; every cycle starts from the
/// config file and a fresh remote listing.
#[derive(Debug)]
pub struct CycleState {
    /// Current synchronization state
    pub state: SyncState,
    /// Timestamp of the last successful cycle (UTC)
    pub last_sync: Option<DateTime<Utc>>,
    /// Number of consecutive failed cycles
    pub error_count: u64,
    /// Changes applied by the last successful cycle
    pub last_report: Option<CycleReport>,
}

impl Default for CycleState {
    fn default() -> Self {
        Self {
            state: SyncState::Unknown,
            last_sync: None,
            error_count: 0,
            last_report: None,
        }
    }
}

impl CycleState {
    /// Marks a successful cycle
    ///
    /// # Arguments
    ///
    /// * `address` - The address the records now point at
    /// * `report` - Changes applied by the cycle
    pub fn mark_synced(&mut self, address: String, report: CycleReport) {
        self.state = SyncState::Synced(address);
        self.last_sync = Some(Utc::now());
        self.error_count = 0;
        self.last_report = Some(report);
    }

    /// Marks a failed cycle and bumps the error count
    pub fn mark_error(&mut self) {
        self.error_count = self.error_count.saturating_add(1);
        self.state = SyncState::Error(self.error_count);
    }
}

/// Redacts the access key pair from log messages
///
/// This function replaces occurrences of the key id and secret with
/// `***REDACTED***`.
///
/// # Examples
///
/// ```
/// use alidns_sync::daemon::redact_secrets;
///
/// let redacted = redact_secrets("key LTAI123 secret s3cr3t", "LTAI123", "s3cr3t");
/// assert_eq!(redacted, "key ***REDACTED*** secret ***REDACTED***");
/// ```
#[must_use]
pub fn redact_secrets(message: &str, access_key_id: &str, access_key_secret: &str) -> String {
    let mut sanitized = message.to_string();

    if !access_key_secret.is_empty() {
        sanitized = sanitized.replace(access_key_secret, "***REDACTED***");
    }
    if !access_key_id.is_empty() {
        sanitized = sanitized.replace(access_key_id, "***REDACTED***");
    }

    sanitized
}

fn redact_error(err: Error, credentials: &Credentials) -> Error {
    let redact = |msg: String| {
        redact_secrets(
            &msg,
            &credentials.access_key_id,
            &credentials.access_key_secret,
        )
    };
    match err {
        Error::Config(msg) => Error::Config(redact(msg)),
        Error::Network(msg) => Error::Network(redact(msg)),
        Error::Upstream { status, body } => Error::Upstream {
            status,
            body: redact(body),
        },
        Error::Parse(msg) => Error::Parse(redact(msg)),
    }
}

//==============================================================================
// Cycle
//==============================================================================

/// Reconciles every desired record against the directory
///
/// Lists each domain, diffs against `current`, then applies all updates
/// followed by all additions. The first failure ends the cycle; changes
/// already applied are kept.
///
/// # Arguments
///
/// * `dir` - Record directory to read from and write to
/// * `desired` - Desired records grouped by domain
/// * `current` - Address every record should point at
pub async fn sync_records<D>(dir: &D, desired: &DesiredRecords, current: &str) -> Result<CycleReport>
where
    D: RecordDirectory + ?Sized,
{
    let mut remote = BTreeMap::new();
    for domain in desired.keys() {
        let records = list_all_records(dir, domain).await?;
        debug!("{}: {} remote record(s)", domain, records.len());
        remote.insert(domain.clone(), records);
    }

    let plan = reconcile(desired, &remote, current);
    info!(
        "Plan: {} update(s), {} addition(s)",
        plan.to_update.len(),
        plan.to_add.len()
    );

    let updated = dns_provider::update(dir, &plan.to_update).await?;
    let added = dns_provider::add(dir, &plan.to_add).await?;

    Ok(CycleReport { updated, added })
}

//==============================================================================
// Daemon
//==============================================================================

/// Interval-driven reconciliation agent
///
/// Cycles run inline in the scheduler loop, so a slow cycle delays the next
/// tick instead of overlapping it.
pub struct Daemon {
    /// Config file, re-read every cycle
    store: ConfigStore,
    /// Schedule loaded at startup
    schedule: Schedule,
    /// Shared cycle state (read by the health endpoint)
    state: Arc<Mutex<CycleState>>,
}

impl Daemon {
    /// Creates a new daemon instance
    ///
    /// # Arguments
    ///
    /// * `store` - Config file location
    /// * `schedule` - Schedule validated at startup
    pub fn new(store: ConfigStore, schedule: Schedule) -> Self {
        Self {
            store,
            schedule,
            state: Arc::new(Mutex::new(CycleState::default())),
        }
    }

    /// Shared cycle state handle
    pub fn state(&self) -> Arc<Mutex<CycleState>> {
        Arc::clone(&self.state)
    }

    /// Runs the scheduler loop until SIGTERM or SIGINT
    ///
    /// The first cycle starts immediately. Ticks missed while a cycle runs
    /// are skipped. SIGHUP runs an extra cycle right away.
    pub async fn run(&self) -> anyhow::Result<()> {
        info!("Starting alidns-sync daemon");
        info!("Config: {}", self.store.path().display());
        info!("Interval: {}s", self.schedule.interval.as_secs());
        match &self.schedule.resolver.interface {
            Some(name) => info!(
                "Address source: interface {} ({})",
                name, self.schedule.resolver.ip_family
            ),
            None => info!(
                "Address source: {} ({})",
                self.schedule.resolver.ip_api, self.schedule.resolver.ip_family
            ),
        }

        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sighup = signal(SignalKind::hangup())?;

        // Signals that land while a cycle runs stay queued in the channel.
        let (tx, rx) = mpsc::channel(8);
        let forwarder = tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = sigterm.recv() => {
                        info!("SIGTERM received");
                        Control::Stop
                    }
                    _ = sigint.recv() => {
                        info!("SIGINT received");
                        Control::Stop
                    }
                    _ = sighup.recv() => {
                        info!("SIGHUP received: forcing sync");
                        Control::SyncNow
                    }
                };
                if tx.send(event).await.is_err() || event == Control::Stop {
                    break;
                }
            }
        });

        self.run_until_stopped(rx).await;
        forwarder.abort();

        info!("Daemon stopped");
        Ok(())
    }

    /// Drives cycles on the schedule interval until told to stop
    ///
    /// # Arguments
    ///
    /// * `control` - [`Control`] events; a closed channel counts as [`Control::Stop`]
    pub async fn run_until_stopped(&self, mut control: mpsc::Receiver<Control>) {
        let mut ticker = time::interval(self.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                event = control.recv() => match event {
                    Some(Control::SyncNow) => self.tick().await,
                    Some(Control::Stop) | None => break,
                },
                _ = ticker.tick() => {
                    self.tick().await;
                }
            }
        }
    }

    /// Runs one cycle and records its outcome
    async fn tick(&self) {
        let timer = metrics::start_cycle_timer();
        let result = self.run_cycle().await;
        timer.observe_duration();

        let mut state = self.state.lock().await;
        match result {
            Ok(CycleOutcome::Synced { address, report }) => {
                info!(
                    "Cycle done: {} updated, {} added",
                    report.updated, report.added
                );
                state.mark_synced(address, report);
                metrics::record_cycle("synced");
                metrics::set_sync_state(1);
                metrics::set_error_count(0);
                metrics::set_last_sync(Utc::now().timestamp() as f64);
            }
            Ok(CycleOutcome::Skipped) => {
                metrics::record_cycle("skipped");
            }
            Err(e) => {
                error!("Cycle failed: {}", e);
                state.mark_error();
                metrics::record_cycle("failed");
                metrics::record_error(e.kind());
                metrics::set_sync_state(2);
                metrics::set_error_count(state.error_count);
            }
        }
    }

    /// Runs one full reconciliation cycle
    ///
    /// Re-reads the config, resolves the current address, then syncs every
    /// desired record. A config error here aborts only this cycle.
    pub async fn run_cycle(&self) -> Result<CycleOutcome> {
        let config = self.store.load()?;
        let record_count: usize = config.records.values().map(Vec::len).sum();
        info!(
            "Cycle start: {} record(s) across {} domain(s)",
            record_count,
            config.records.len()
        );

        let family = config.schedule.resolver.ip_family;
        let resolver = AddressResolver::new(config.schedule.resolver.clone())?;
        let resolved = resolver.resolve().await?;
        let Some(current) = resolved.for_family(family) else {
            warn!("No {} address found; skipping cycle", family);
            return Ok(CycleOutcome::Skipped);
        };
        let current = current.to_string();
        info!("Current {} address: {}", family, current);

        let client = AlidnsClient::new(&config.credentials, config.schedule.timeout)?;
        let report = sync_records(&client, &config.records, &current)
            .await
            .map_err(|e| redact_error(e, &config.credentials))?;

        Ok(CycleOutcome::Synced {
            address: current,
            report,
        })
    }
}

//==============================================================================
// Tests
//==============================================================================
