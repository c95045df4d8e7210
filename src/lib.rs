//! alidns-sync - DDNS agent for Alibaba Cloud DNS
//!
//! Architecture:
//! - Fixed-interval scheduler; cycles never overlap
//! - Each cycle re-reads the config, resolves the current address, lists the
//!   remote records and applies the minimal set of updates and additions
//! - Pure reconciliation step, testable without a network
//! - Uses reqwest for HTTP (rustls)

pub mod address;
pub mod alidns;
pub mod config;
pub mod constants;
pub mod daemon;
pub mod dns_provider;
pub mod error;
pub mod health;
pub mod interface;
pub mod metrics;
pub mod reconcile;
pub mod signer;
pub mod validation;

pub use error::{Error, Result};
