use crate::collector::aggregate::{Classification, StatAggregator};

const BUCKETS: &[&str] = &["1xx", "2xx", "3xx", "4xx", "5xx", "other"];

/// Maps an HTTP status to its class bucket. The sentinel code (and anything
/// else outside 100..=599) lands in `other`.
fn classify(code: i32) -> &'static str {
    match code {
        c if c < 200 => "1xx",
        c if c < 300 => "2xx",
        c if c < 400 => "3xx",
        c if c < 500 => "4xx",
        c if c < 600 => "5xx",
        _ => "other",
    }
}

/// Aggregator configured with the HTTP response-class buckets.
pub fn aggregator() -> StatAggregator {
    StatAggregator::new(Classification {
        name: "HTTP",
        buckets: BUCKETS,
        classify,
    })
}
