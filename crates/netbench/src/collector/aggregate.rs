use crate::collector::entry::{GlobalStatistic, StatEntry};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

/// Protocol-specific response classification.
///
/// `classify` maps a response code to one of `buckets`; `buckets` also fixes
/// the order used when printing progress.
pub struct Classification {
    /// Protocol name used in progress headings.
    pub name: &'static str,
    /// Bucket labels in display order.
    pub buckets: &'static [&'static str],
    /// Maps a response code to a bucket label.
    pub classify: fn(i32) -> &'static str,
}

/// A bucket counts toward `successful` when it holds informational,
/// success or redirection replies.
fn is_success_bucket(bucket: &str) -> bool {
    matches!(bucket, "1xx" | "2xx" | "3xx")
}

/// Mutable aggregates, grouped under one lock so that progress snapshots
/// observe a consistent view. Per-field atomics would let a snapshot mix
/// totals from different entries.
struct Aggregates {
    global: GlobalStatistic,
    histogram: HashMap<&'static str, u64>,
    sum_duration: Duration,
    consume_start: Option<Instant>,
}

/// Single-consumer statistics aggregator.
///
/// Exactly one task runs [`StatAggregator::consume`]; any task may call
/// [`StatAggregator::print_progress`] or, after the consumer finished,
/// [`StatAggregator::global_stats`].
pub struct StatAggregator {
    classification: Classification,
    state: RwLock<Aggregates>,
    progress_every: AtomicU64,
}

impl StatAggregator {
    pub fn new(classification: Classification) -> Self {
        StatAggregator {
            classification,
            state: RwLock::new(Aggregates {
                global: GlobalStatistic::default(),
                histogram: HashMap::new(),
                sum_duration: Duration::ZERO,
                consume_start: None,
            }),
            progress_every: AtomicU64::new(0),
        }
    }

    pub fn set_progress_every(&self, every: u64) {
        self.progress_every.store(every, Ordering::Relaxed);
    }

    /// Consumes entries until every sender is dropped, then finalizes
    /// `total_duration`, the mean and the throughput.
    pub async fn consume(&self, mut rx: mpsc::Receiver<StatEntry>) {
        let start = Instant::now();
        self.state
            .write()
            .expect("stats lock poisoned")
            .consume_start = Some(start);

        let progress_every = self.progress_every.load(Ordering::Relaxed);
        while let Some(entry) = rx.recv().await {
            let consumed = self.record(entry);
            if progress_every > 0 && consumed % progress_every == 0 {
                self.print_progress();
            }
        }

        let mut state = self.state.write().expect("stats lock poisoned");
        state.global.total_duration = start.elapsed();
        finalize(&mut state);
    }

    /// Applies one entry under a single write critical section; returns the
    /// updated total.
    fn record(&self, entry: StatEntry) -> u64 {
        let mut state = self.state.write().expect("stats lock poisoned");

        state.global.total_requests += 1;
        let bucket = (self.classification.classify)(entry.response_code);
        *state.histogram.entry(bucket).or_insert(0) += 1;
        if is_success_bucket(bucket) {
            state.global.successful += 1;
        } else {
            state.global.failed += 1;
        }

        state.sum_duration += entry.duration;
        let total = state.global.total_requests;
        state.global.average_duration = state.sum_duration / total as u32;

        // Entries carry cumulative adapter-scope byte snapshots; keeping the
        // maximum makes the final value the run total regardless of the
        // order completions were observed in.
        let observed = entry.bytes_read + entry.bytes_written;
        if observed > state.global.total_bytes {
            state.global.total_bytes = observed;
        }

        total
    }

    /// Snapshot of the global aggregates.
    pub fn global_stats(&self) -> GlobalStatistic {
        self.state
            .read()
            .expect("stats lock poisoned")
            .global
            .clone()
    }

    /// Snapshot of the response-class histogram.
    pub fn histogram(&self) -> HashMap<&'static str, u64> {
        self.state
            .read()
            .expect("stats lock poisoned")
            .histogram
            .clone()
    }

    /// Prints per-bucket counts and running totals as one consistent view.
    pub fn print_progress(&self) {
        let state = self.state.read().expect("stats lock poisoned");
        let buckets = self
            .classification
            .buckets
            .iter()
            .map(|label| {
                format!(
                    "{}:{}",
                    label,
                    state.histogram.get(label).copied().unwrap_or(0)
                )
            })
            .collect::<Vec<_>>()
            .join(", ");
        let elapsed = state
            .consume_start
            .map(|s| s.elapsed())
            .unwrap_or(Duration::ZERO);
        println!(
            "{} codes: {}\ncurrent total requests: {}, elapsed: {}, avg duration: {}",
            self.classification.name,
            buckets,
            state.global.total_requests,
            humantime::format_duration(round_to_millis(elapsed)),
            humantime::format_duration(round_to_millis(state.global.average_duration)),
        );
    }
}

fn finalize(state: &mut Aggregates) {
    let total = state.global.total_requests;
    if total > 0 {
        state.global.average_duration = state.sum_duration / total as u32;
    }
    let secs = state.global.total_duration.as_secs_f64();
    if secs > 0.0 {
        let size_in_mb = state.global.total_bytes as f64 / (1u64 << 20) as f64;
        state.global.throughput_mb_per_sec = size_in_mb / secs;
    }
}

/// Millisecond precision keeps humantime output readable.
fn round_to_millis(d: Duration) -> Duration {
    Duration::from_millis(d.as_millis() as u64)
}
