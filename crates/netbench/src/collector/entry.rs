use std::time::Duration;

/// Response code recorded when a transport or protocol-library error does
/// not carry a protocol reply code.
pub const SENTINEL_CODE: i32 = 1000;

/// One measurement record per completed request attempt.
///
/// The byte fields are cumulative snapshots of the adapter-scoped
/// [`crate::protocols::transport::ByteCounters`], read once at emission
/// time; they grow monotonically across the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatEntry {
    /// Protocol reply code (HTTP status or SMTP reply), or
    /// [`SENTINEL_CODE`].
    pub response_code: i32,
    /// Cumulative bytes read off the wire by this adapter.
    pub bytes_read: i64,
    /// Cumulative bytes written to the wire by this adapter.
    pub bytes_written: i64,
    /// Wall-clock latency of this attempt.
    pub duration: Duration,
}

/// Aggregates for a whole run, owned by the consumer task and snapshot by
/// progress readers.
#[derive(Debug, Clone, Default)]
pub struct GlobalStatistic {
    pub total_requests: u64,
    pub successful: u64,
    pub failed: u64,
    /// Wall clock of the consume session, set at finalization.
    pub total_duration: Duration,
    /// Running mean request latency.
    pub average_duration: Duration,
    /// Total bytes transferred (read + written) across the run.
    pub total_bytes: i64,
    /// MiB per second over `total_duration`, set at finalization.
    pub throughput_mb_per_sec: f64,
}

impl GlobalStatistic {
    /// Requests per second over the consume session.
    pub fn requests_per_sec(&self) -> f64 {
        let secs = self.total_duration.as_secs_f64();
        if secs > 0.0 {
            self.total_requests as f64 / secs
        } else {
            0.0
        }
    }
}
