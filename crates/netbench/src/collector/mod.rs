//! The statistics pipeline: a single-consumer aggregator fed by every
//! concurrent protocol exchange.
//!
//! Adapters push one [`entry::StatEntry`] per completed attempt onto a
//! bounded channel; one consumer task classifies entries into response-class
//! buckets and maintains the global aggregates. Progress snapshots read the
//! same aggregates concurrently, so the whole group of fields sits behind a
//! single lock.
//!
//! # Module Organization
//!
//! - [`entry`] - the per-request measurement record and global aggregates
//! - [`aggregate`] - the shared consume/classify/finalize machinery
//! - [`http`] / [`smtp`] - per-protocol bucket tables and constructors

pub mod aggregate;
pub mod entry;
pub mod http;
pub mod smtp;

use self::aggregate::StatAggregator;
use self::entry::{GlobalStatistic, StatEntry};
use tokio::sync::mpsc;

/// The per-protocol stats collectors, dispatched as a sealed variant set.
pub enum StatCollector {
    Http(StatAggregator),
    Smtp(StatAggregator),
}

impl StatCollector {
    /// A collector using the HTTP response-class buckets.
    pub fn for_http() -> Self {
        StatCollector::Http(http::aggregator())
    }

    /// A collector using the SMTP reply-class buckets.
    pub fn for_smtp() -> Self {
        StatCollector::Smtp(smtp::aggregator())
    }

    fn aggregator(&self) -> &StatAggregator {
        match self {
            StatCollector::Http(agg) => agg,
            StatCollector::Smtp(agg) => agg,
        }
    }

    /// Consumes entries until the channel closes, then finalizes the
    /// aggregates. Must be called exactly once.
    pub async fn consume(&self, rx: mpsc::Receiver<StatEntry>) {
        self.aggregator().consume(rx).await;
    }

    /// Snapshot of the global aggregates.
    pub fn global_stats(&self) -> GlobalStatistic {
        self.aggregator().global_stats()
    }

    /// Snapshot of the response-class histogram.
    pub fn histogram(&self) -> std::collections::HashMap<&'static str, u64> {
        self.aggregator().histogram()
    }

    /// Prints a consistent view of the running aggregates.
    pub fn print_progress(&self) {
        self.aggregator().print_progress();
    }

    /// Arms count-mode progress printing: one progress line every `every`
    /// consumed entries. Zero disables.
    pub fn set_progress_every(&self, every: u64) {
        self.aggregator().set_progress_every(every);
    }
}
