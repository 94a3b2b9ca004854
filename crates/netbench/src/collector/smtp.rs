use crate::collector::aggregate::{Classification, StatAggregator};

const BUCKETS: &[&str] = &["2xx", "3xx", "4xx", "5xx", "other"];

/// Maps an SMTP reply code to its class bucket. SMTP has no 1xx class;
/// anything below 300 counts as 2xx, the sentinel lands in `other`.
fn classify(code: i32) -> &'static str {
    match code {
        c if c < 300 => "2xx",
        c if c < 400 => "3xx",
        c if c < 500 => "4xx",
        c if c < 600 => "5xx",
        _ => "other",
    }
}

/// Aggregator configured with the SMTP reply-class buckets.
pub fn aggregator() -> StatAggregator {
    StatAggregator::new(Classification {
        name: "SMTP",
        buckets: BUCKETS,
        classify,
    })
}
