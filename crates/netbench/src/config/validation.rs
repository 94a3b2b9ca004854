//! Cross-field validation of a run configuration.
//!
//! All configuration errors are rejected here, before any work starts.
//! Warnings do not fail validation; they flag settings that are legal but
//! probably not what the user wanted.

use crate::models::error::BenchError;
use crate::models::settings::{HttpSettings, ProtocolSettings, RunSettings, SmtpSettings};
use log::warn;

const VALID_METHODS: &[&str] = &["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE"];
const VALID_VERSIONS: &[&str] = &["1", "1.1", "2"];
const VALID_AUTH_METHODS: &[&str] = &["PLAIN", "CRAM"];

/// Outcome of validating a run configuration.
///
/// # Examples
///
/// ```
/// use netbench::config::validation::validate;
/// use netbench::models::settings::{HttpSettings, ProtocolSettings, RunSettings};
/// use std::time::Duration;
///
/// let settings = RunSettings {
///     concurrency: 4,
///     total_requests: 100,
///     duration: Duration::ZERO,
///     output: None,
///     protocol: ProtocolSettings::Http(HttpSettings::for_url("http://127.0.0.1:8989/")),
/// };
/// assert!(validate(&settings).is_valid());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    /// Critical errors that prevent the run from starting.
    pub errors: Vec<String>,
    /// Non-critical issues worth surfacing.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    /// Converts the result into a [`BenchError::Config`] carrying the first
    /// error, logging any warnings.
    pub fn into_result(self) -> Result<(), BenchError> {
        for warning in &self.warnings {
            warn!("{}", warning);
        }
        match self.errors.into_iter().next() {
            None => Ok(()),
            Some(message) => Err(BenchError::Config { message }),
        }
    }
}

/// Validates a complete run configuration.
pub fn validate(settings: &RunSettings) -> ValidationResult {
    let mut result = ValidationResult::default();

    if settings.concurrency == 0 {
        result.add_error("concurrency must be at least 1");
    }

    // Exactly one termination rule may be active.
    let duration_set = !settings.duration.is_zero();
    let count_set = settings.total_requests > 0;
    if duration_set && count_set {
        result.add_error("Cant set both duration(d) and total request(n)");
    } else if !duration_set && !count_set {
        result.add_error("either total requests or duration must be set");
    }

    match &settings.protocol {
        ProtocolSettings::Http(http) => validate_http(http, &mut result),
        ProtocolSettings::Smtp(smtp) => validate_smtp(smtp, &mut result),
    }

    result
}

/// Validates settings and converts failures into a fatal config error.
pub fn ensure_valid(settings: &RunSettings) -> Result<(), BenchError> {
    validate(settings).into_result()
}

fn validate_http(http: &HttpSettings, result: &mut ValidationResult) {
    if !VALID_METHODS.contains(&http.method.as_str()) {
        result.add_error(format!(
            "invalid HTTP method '{}'; valid methods: {}",
            http.method,
            VALID_METHODS.join(", ")
        ));
    }
    if !VALID_VERSIONS.contains(&http.version.as_str()) {
        result.add_error(format!(
            "invalid HTTP version '{}'; valid versions: 1, 1.1, 2",
            http.version
        ));
    }
    if !http.url.starts_with("http://") && !http.url.starts_with("https://") {
        result.add_error(format!(
            "invalid target url '{}': scheme must be http or https",
            http.url
        ));
    }
    if http.timeout == 0 {
        result.add_error("timeout must be at least 1 second");
    }
    if http.body_file.is_some() && !http.body.is_empty() {
        result.add_warning("both body and body_file set; body_file takes precedence");
    }
    let auth = &http.auth;
    if auth.username.is_empty() != auth.password.is_empty() {
        result.add_warning("basic auth needs both username and password; ignoring");
    }
}

fn validate_smtp(smtp: &SmtpSettings, result: &mut ValidationResult) {
    let parts: Vec<&str> = smtp.address.split(':').collect();
    if parts.len() != 2 || parts[0].is_empty() || parts[1].parse::<u16>().is_err() {
        result.add_error(format!(
            "invalid SMTP address '{}': expected <host>:<port>",
            smtp.address
        ));
    }

    if !smtp.auth.method.is_empty() && !VALID_AUTH_METHODS.contains(&smtp.auth.method.as_str()) {
        result.add_error(format!(
            "invalid auth method '{}'; valid auth methods: {}",
            smtp.auth.method,
            VALID_AUTH_METHODS.join(", ")
        ));
    }

    // An EML file supplies its own envelope, superseding the explicit fields.
    if smtp.eml.is_none() {
        if smtp.from.is_empty() {
            result.add_error("SMTP from address is required");
        }
        if smtp.to.is_empty() {
            result.add_error("SMTP to list is required");
        }
        if smtp.subject.is_empty() {
            result.add_error("SMTP subject is required");
        }
    }

    if smtp.body_html.is_none() && smtp.body.is_empty() && smtp.body_file.is_none() {
        result.add_warning("no message body configured; sending an empty body");
    }
}
