use crate::collector::entry::SENTINEL_CODE;

/// Errors produced while configuring or driving a benchmark run.
///
/// Per-request failures never propagate out of an adapter: they are turned
/// into stat entries carrying either the protocol reply code or the reserved
/// sentinel code. `BenchError` therefore splits into pre-run errors (fatal,
/// reported and aborted) and per-exchange errors (converted via
/// [`BenchError::response_code`]).
#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    /// Invalid or conflicting configuration, rejected before any work starts.
    #[error("invalid configuration: {message}")]
    Config { message: String },

    /// The target URL could not be parsed or is missing required parts.
    #[error("invalid target url '{url}': {message}")]
    InvalidUrl { url: String, message: String },

    /// Transport-level failure: dial, read, write.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// TLS setup or handshake failure.
    #[error("tls error: {message}")]
    Tls { message: String },

    /// Failure inside the HTTP protocol library.
    #[error("http error: {message}")]
    Http { message: String },

    /// A protocol-level reply that carries its own code (HTTP status or
    /// SMTP reply code).
    #[error("protocol reply {code}: {message}")]
    Protocol { code: i32, message: String },

    /// MIME document composition failed; fatal at adapter initialization.
    #[error("failed to compose message: {message}")]
    Compose { message: String },

    /// A request exceeded its configured wall-clock limit.
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
}

impl BenchError {
    /// Maps this error to the response code recorded in a stat entry.
    ///
    /// Protocol replies keep their own code; everything else collapses to
    /// the reserved sentinel.
    pub fn response_code(&self) -> i32 {
        match self {
            BenchError::Protocol { code, .. } => *code,
            _ => SENTINEL_CODE,
        }
    }
}
