//! # netbench
//!
//! A concurrency-bounded protocol load generator for HTTP/1.1, HTTP/2 and
//! SMTP. netbench issues a bounded or time-bounded stream of requests
//! against a target endpoint, measures per-request latency and actual wire
//! bytes, and reports aggregate throughput, success/failure counts and
//! response-class histograms.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use netbench::models::settings::{HttpSettings, ProtocolSettings, RunSettings};
//! use netbench::runner::Runner;
//! use std::time::Duration;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = RunSettings {
//!         concurrency: 4,
//!         total_requests: 100,
//!         duration: Duration::ZERO,
//!         output: None,
//!         protocol: ProtocolSettings::Http(HttpSettings::for_url("http://127.0.0.1:8989/")),
//!     };
//!
//!     let stats = Runner::from_settings(settings)?.run().await?;
//!     println!("mean latency: {:?}", stats.average_duration);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture Overview
//!
//! ```text
//!                    ┌─────────────────────────────────────┐
//!  RunSettings ────▶ │               Runner                │
//!                    │  gate (semaphore, N permits)        │
//!                    │   │ per-worker                      │
//!                    │   ▼                                 │
//!                    │  ProtocolAdapter ── StatEntry ──▶ StatCollector
//!                    │  (HTTP / SMTP)      (channel)    (single consumer)
//!                    └─────────────────────────────────────┘
//!                          │
//!                          ▼
//!                    TrackedStream (wire-byte accounting)
//! ```
//!
//! Every worker acquires a gate permit, performs one full protocol exchange
//! through the adapter and emits exactly one stat entry. The collector is
//! the only writer of the aggregates; progress snapshots read a consistent
//! view. Connections are wrapped in a byte-tracking stream so reported
//! totals reflect actual wire traffic independent of protocol-library
//! buffering.
//!
//! ## Module Organization
//!
//! - [`models`] - configuration and error types
//! - [`config`] - JSON config loading and validation
//! - [`protocols`] - protocol adapters and the tracked transport
//! - [`collector`] - the statistics pipeline
//! - [`runner`] - the concurrency-bounded driver
//! - [`logs`] - logging setup

pub mod collector;
pub mod config;
pub mod logs;
pub mod models;
pub mod protocols;
pub mod runner;
