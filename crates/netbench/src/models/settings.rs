use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

fn default_concurrency() -> u32 {
    1
}

fn default_method() -> String {
    "GET".to_string()
}

fn default_version() -> String {
    "1".to_string()
}

fn default_http_timeout() -> u64 {
    30
}

fn default_smtp_timeout() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Top-level configuration for one benchmark run.
///
/// Mirrors the JSON config surface: the scheduling fields sit next to
/// exactly one protocol key whose value is the adapter sub-configuration.
///
/// ```json
/// {
///   "concurency": 8,
///   "totalRequest": 1000,
///   "duration": "0s",
///   "http": { "url": "http://127.0.0.1:8989/" }
/// }
/// ```
///
/// Exactly one of `total_requests > 0` or `duration > 0` may be active;
/// [`crate::config::validation::validate`] rejects everything else.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSettings {
    /// Number of concurrent in-flight requests.
    #[serde(default = "default_concurrency", rename = "concurency")]
    pub concurrency: u32,

    /// Total number of requests to send (count mode).
    #[serde(default, rename = "totalRequest")]
    pub total_requests: u64,

    /// Wall-clock run length (duration mode), e.g. `"10s"`, `"1m 30s"`.
    #[serde(default, with = "humantime_serde")]
    pub duration: Duration,

    /// Output sink name. Accepted for config compatibility; the terminal
    /// summary is the only implemented sink.
    #[serde(default)]
    pub output: Option<String>,

    /// The protocol sub-configuration, dispatched on its JSON key.
    #[serde(flatten)]
    pub protocol: ProtocolSettings,
}

/// Per-protocol adapter configuration, selected by JSON key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProtocolSettings {
    #[serde(rename = "http")]
    Http(HttpSettings),
    #[serde(rename = "smtp")]
    Smtp(SmtpSettings),
}

impl ProtocolSettings {
    /// Short protocol name, used in log lines.
    pub fn name(&self) -> &'static str {
        match self {
            ProtocolSettings::Http(_) => "http",
            ProtocolSettings::Smtp(_) => "smtp",
        }
    }
}

/// Credentials shared by the HTTP (basic auth) and SMTP (AUTH) adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// SMTP auth mechanism: `PLAIN`, `CRAM`, or empty for none. Unused by
    /// the HTTP adapter.
    #[serde(default)]
    pub method: String,
}

/// HTTP adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Target URL, `http` or `https` scheme.
    pub url: String,

    /// Request method: GET, HEAD, POST, PUT, PATCH or DELETE.
    #[serde(default = "default_method")]
    pub method: String,

    /// `"1"` / `"1.1"` for HTTP/1.1, `"2"` for HTTP/2.
    #[serde(default = "default_version")]
    pub version: String,

    /// Headers set on every request. A `Host` key (matched
    /// case-insensitively) overrides the request authority instead of being
    /// sent as a regular header.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Inline request body.
    #[serde(default)]
    pub body: String,

    /// Request body file; takes precedence over `body` when both are set.
    #[serde(default)]
    pub body_file: Option<PathBuf>,

    /// Per-request wall-clock timeout in seconds.
    #[serde(default = "default_http_timeout", alias = "Timeout")]
    pub timeout: u64,

    /// When false, every request dials a fresh connection.
    #[serde(default = "default_true", rename = "keep-alive")]
    pub keep_alive: bool,

    /// When false, no `Accept-Encoding` offer is sent.
    #[serde(default)]
    pub compression: bool,

    /// When false, the first response is returned without following 3xx.
    #[serde(default)]
    pub redirect: bool,

    /// HTTP proxy URL.
    #[serde(default)]
    pub proxy: Option<String>,

    /// Basic auth credentials; applied when both username and password are
    /// non-empty.
    #[serde(default)]
    pub auth: AuthSettings,
}

/// SMTP adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Server address in `host:port` form.
    pub address: String,

    /// Issue STARTTLS after the greeting, with certificate verification
    /// disabled.
    #[serde(default)]
    pub tls: bool,

    /// AUTH credentials and mechanism.
    #[serde(default)]
    pub auth: AuthSettings,

    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub to: Vec<String>,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub bcc: Vec<String>,
    #[serde(default)]
    pub subject: String,

    /// Extra message headers.
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Inline plain-text body.
    #[serde(default)]
    pub body: String,

    /// Plain-text body file; takes precedence over `body`.
    #[serde(default)]
    pub body_file: Option<PathBuf>,

    /// HTML body file. Together with a plain source this triggers
    /// `multipart/alternative`.
    #[serde(default)]
    pub body_html: Option<PathBuf>,

    /// Attachment files, each becoming a base64 `multipart/mixed` part.
    #[serde(default)]
    pub attachments: Vec<PathBuf>,

    /// EML file whose parsed envelope supersedes the explicit fields above.
    #[serde(default)]
    pub eml: Option<PathBuf>,

    /// Dial timeout in seconds.
    #[serde(default = "default_smtp_timeout", alias = "Timeout")]
    pub timeout: u64,
}

impl HttpSettings {
    /// A minimal configuration for the given URL, everything else at
    /// defaults.
    pub fn for_url(url: impl Into<String>) -> Self {
        HttpSettings {
            url: url.into(),
            method: default_method(),
            version: default_version(),
            headers: HashMap::new(),
            body: String::new(),
            body_file: None,
            timeout: default_http_timeout(),
            keep_alive: true,
            compression: false,
            redirect: false,
            proxy: None,
            auth: AuthSettings::default(),
        }
    }
}

impl SmtpSettings {
    /// A minimal configuration for the given server address.
    pub fn for_address(address: impl Into<String>) -> Self {
        SmtpSettings {
            address: address.into(),
            tls: false,
            auth: AuthSettings::default(),
            from: String::new(),
            to: Vec::new(),
            cc: Vec::new(),
            bcc: Vec::new(),
            subject: String::new(),
            headers: HashMap::new(),
            body: String::new(),
            body_file: None,
            body_html: None,
            attachments: Vec::new(),
            eml: None,
            timeout: default_smtp_timeout(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_dispatches_on_http_key() {
        let raw = r#"{
            "concurency": 4,
            "totalRequest": 100,
            "http": { "url": "http://127.0.0.1:8989/", "method": "POST" }
        }"#;
        let settings: RunSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.total_requests, 100);
        match settings.protocol {
            ProtocolSettings::Http(http) => {
                assert_eq!(http.method, "POST");
                assert_eq!(http.version, "1");
                assert!(http.keep_alive);
            }
            ProtocolSettings::Smtp(_) => panic!("expected http settings"),
        }
    }

    #[test]
    fn json_dispatches_on_smtp_key() {
        let raw = r#"{
            "duration": "2s",
            "smtp": {
                "address": "127.0.0.1:2525",
                "from": "a@b.c",
                "to": ["d@e.f"],
                "subject": "hi"
            }
        }"#;
        let settings: RunSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.duration, Duration::from_secs(2));
        assert_eq!(settings.protocol.name(), "smtp");
    }

    #[test]
    fn unknown_protocol_key_is_rejected() {
        let raw = r#"{ "concurency": 1, "ldap": { "address": "x" } }"#;
        assert!(serde_json::from_str::<RunSettings>(raw).is_err());
    }

    #[test]
    fn duration_accepts_go_style_strings() {
        let raw = r#"{ "duration": "1m 30s", "http": { "url": "http://x/" } }"#;
        let settings: RunSettings = serde_json::from_str(raw).unwrap();
        assert_eq!(settings.duration, Duration::from_secs(90));
    }
}
