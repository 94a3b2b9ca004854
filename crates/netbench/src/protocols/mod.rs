//! Protocol adapters and the byte-tracking transport layer.
//!
//! An adapter knows how to perform one full protocol exchange and emit one
//! stat entry per invocation. Adapters are initialized once (building their
//! reusable request template and wiring the entry sink) and then driven
//! concurrently by the runner.
//!
//! # Module Organization
//!
//! - [`transport`] - byte-accounting connection wrapper
//! - [`http`] - HTTP/1.1 and HTTP/2 adapter
//! - [`smtp`] - SMTP adapter
//! - [`mime`] - MIME composition and EML parsing for SMTP

pub mod http;
pub mod mime;
pub mod smtp;
pub mod transport;

use crate::collector::entry::StatEntry;
use crate::collector::StatCollector;
use crate::models::error::BenchError;
use crate::models::settings::ProtocolSettings;
use tokio::sync::mpsc;

/// The protocol adapters, dispatched as a sealed variant set.
pub enum ProtocolAdapter {
    Http(http::HttpAdapter),
    Smtp(smtp::SmtpAdapter),
}

impl ProtocolAdapter {
    /// Builds the adapter and its matching collector for the configured
    /// protocol.
    pub fn from_settings(settings: ProtocolSettings) -> (Self, StatCollector) {
        match settings {
            ProtocolSettings::Http(http) => (
                ProtocolAdapter::Http(http::HttpAdapter::new(http)),
                StatCollector::for_http(),
            ),
            ProtocolSettings::Smtp(smtp) => (
                ProtocolAdapter::Smtp(smtp::SmtpAdapter::new(smtp)),
                StatCollector::for_smtp(),
            ),
        }
    }

    /// One-shot setup: builds the request template and stores the entry
    /// sink. Must complete before `start_benchmark` is driven.
    pub async fn initialize(&mut self, sink: mpsc::Sender<StatEntry>) -> Result<(), BenchError> {
        match self {
            ProtocolAdapter::Http(adapter) => adapter.initialize(sink).await,
            ProtocolAdapter::Smtp(adapter) => adapter.initialize(sink).await,
        }
    }

    /// Performs one full protocol exchange, emitting exactly one stat entry.
    pub async fn start_benchmark(&self) {
        match self {
            ProtocolAdapter::Http(adapter) => adapter.start_benchmark().await,
            ProtocolAdapter::Smtp(adapter) => adapter.start_benchmark().await,
        }
    }
}
