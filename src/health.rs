//! Health check endpoint for alidns-sync
//!
//! This module provides a lightweight HTTP endpoint for health checks.
//! `GET /metrics` returns the Prometheus text format; any other request gets
//! the JSON health snapshot.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::{oneshot, Mutex};
use tracing::{error, info};

use crate::daemon::{CycleReport, CycleState, SyncState};
use crate::metrics::gather_metrics;

//==============================================================================
// Types
//==============================================================================

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Overall health status
    pub status: String,
    /// Current sync state
    pub sync_state: String,
    /// Address the records point at after the last successful cycle
    pub address: Option<String>,
    /// Time since last successful cycle (in seconds, or null if never synced)
    pub last_sync_seconds_ago: Option<f64>,
    /// Number of consecutive failed cycles
    pub error_count: u64,
    /// Changes applied by the last successful cycle
    pub last_report: Option<CycleReport>,
    /// Whether the agent is healthy
    pub healthy: bool,
}

/// Health check server
pub struct HealthServer {
    /// Address the listener is bound to
    local_addr: SocketAddr,
    /// Shutdown channel sender
    shutdown_tx: Option<oneshot::Sender<()>>,
}

//==============================================================================
// Implementation
//==============================================================================

impl HealthServer {
    /// Starts the health check server
    pub async fn start(addr: SocketAddr, state: Arc<Mutex<CycleState>>) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        info!("Health check server listening on {}", local_addr);

        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        break;
                    }
                    accept = listener.accept() => {
                        match accept {
                            Ok((mut socket, _peer)) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(async move {
                                    let mut buf = [0u8; 1024];
                                    let n = socket.read(&mut buf).await.unwrap_or(0);

                                    let (content_type, body) = if is_metrics_request(&buf[..n]) {
                                        ("text/plain; version=0.0.4", gather_metrics())
                                    } else {
                                        let snapshot = state.lock().await;
                                        let response = build_response(&snapshot);
                                        let body = match serde_json::to_string(&response) {
                                            Ok(body) => body,
                                            Err(_) => "{\"status\":\"error\"}".to_string(),
                                        };
                                        ("application/json", body)
                                    };

                                    let reply = format!(
                                        "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                                        content_type,
                                        body.len(),
                                        body
                                    );

                                    if let Err(e) = socket.write_all(reply.as_bytes()).await {
                                        error!("Health response write failed: {}", e);
                                    }
                                    let _ = socket.shutdown().await;
                                });
                            }
                            Err(e) => {
                                error!("Health listener accept error: {}", e);
                            }
                        }
                    }
                }
            }
        });

        Ok(Self {
            local_addr,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stops the health check server
    pub async fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

//==============================================================================
// Helpers
//==============================================================================

fn is_metrics_request(head: &[u8]) -> bool {
    let line = head.split(|b| *b == b'\n').next().unwrap_or_default();
    let mut parts = line.split(|b| *b == b' ');
    matches!(
        (parts.next(), parts.next()),
        (Some(b"GET"), Some(b"/metrics"))
    )
}

fn build_response(state: &CycleState) -> HealthResponse {
    let (sync_state, address, healthy) = match &state.state {
        SyncState::Unknown => ("unknown".to_string(), None, false),
        SyncState::Synced(address) => ("synced".to_string(), Some(address.clone()), true),
        SyncState::Error(_) => ("error".to_string(), None, false),
    };

    let last_sync_seconds_ago = state.last_sync.map(|ts| {
        let seconds = (Utc::now() - ts).num_seconds();
        seconds.max(0) as f64
    });

    HealthResponse {
        status: if healthy { "ok".to_string() } else { "degraded".to_string() },
        sync_state,
        address,
        last_sync_seconds_ago,
        error_count: state.error_count,
        last_report: state.last_report,
        healthy,
    }
}

//==============================================================================
// Tests
//==============================================================================
