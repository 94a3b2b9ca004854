//! MIME document composition and EML parsing for the SMTP adapter.
//!
//! Composition is a pure function from configuration to a byte buffer. It
//! runs once at adapter initialization so that none of its cost lands in
//! measured latency; every exchange then transmits the precomposed payload.

use crate::models::error::BenchError;
use crate::models::settings::SmtpSettings;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use rand::distributions::Alphanumeric;
use rand::Rng;
use std::fs;
use std::path::Path;

const BASE64_LINE_WIDTH: usize = 76;

/// Envelope and body recovered from an EML file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedEml {
    pub from: String,
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub subject: String,
    pub body: String,
}

/// Composes the MIME document described by `settings`.
///
/// Plain and HTML sources together produce `multipart/alternative`;
/// any attachment switches the envelope to `multipart/mixed` with one
/// base64 part per file. Errors are user-data problems (unreadable body or
/// attachment files) and are fatal at initialization.
pub fn compose(settings: &SmtpSettings) -> Result<Vec<u8>, BenchError> {
    let plain = match &settings.body_file {
        Some(path) => read_text(path)?,
        None => settings.body.clone(),
    };
    let html = settings
        .body_html
        .as_ref()
        .map(|path| read_text(path))
        .transpose()?;

    let multipart_alternative = html.is_some();
    let multipart = multipart_alternative || !settings.attachments.is_empty();
    let boundary = random_boundary();

    let mut out = Vec::new();
    write_header(&mut out, "From", &settings.from);
    write_header(&mut out, "To", &settings.to.join(","));
    write_header(&mut out, "Subject", &settings.subject);
    if !settings.cc.is_empty() {
        write_header(&mut out, "Cc", &settings.cc.join(","));
    }
    if !settings.bcc.is_empty() {
        write_header(&mut out, "Bcc", &settings.bcc.join(","));
    }
    for (key, value) in &settings.headers {
        write_header(&mut out, key, value);
    }
    write_header(&mut out, "MIME-Version", "1.0");

    if multipart {
        let kind = if settings.attachments.is_empty() {
            "multipart/alternative"
        } else {
            "multipart/mixed"
        };
        write_header(
            &mut out,
            "Content-Type",
            &format!("{}; boundary={}", kind, boundary),
        );
        out.extend_from_slice(b"\r\n");
        write_body_part(&mut out, &boundary, "text/plain", plain.as_bytes());
        if let Some(html) = &html {
            write_body_part(&mut out, &boundary, "text/html", html.as_bytes());
        }
        for path in &settings.attachments {
            write_attachment_part(&mut out, &boundary, path)?;
        }
        out.extend_from_slice(format!("--{}--\r\n", boundary).as_bytes());
    } else {
        write_header(&mut out, "Content-Type", "text/plain; charset=UTF-8");
        out.extend_from_slice(b"\r\n");
        out.extend_from_slice(plain.as_bytes());
        out.extend_from_slice(b"\r\n");
    }

    Ok(out)
}

/// Parses the EML file at `path`.
pub fn parse_eml_file(path: &Path) -> Result<ParsedEml, BenchError> {
    parse_eml(&read_text(path)?)
}

/// Parses an RFC 5322 style message: folded headers up to the first blank
/// line, everything after it as the body. Only the envelope headers this
/// tool acts on are extracted.
pub fn parse_eml(raw: &str) -> Result<ParsedEml, BenchError> {
    let mut parsed = ParsedEml::default();
    let mut lines = raw.lines().peekable();

    while let Some(line) = lines.next() {
        if line.is_empty() {
            break;
        }
        let mut value_cont = String::new();
        while let Some(next) = lines.peek() {
            if next.starts_with(' ') || next.starts_with('\t') {
                value_cont.push(' ');
                value_cont.push_str(next.trim_start());
                lines.next();
            } else {
                break;
            }
        }
        let (name, value) = line.split_once(':').ok_or_else(|| BenchError::Compose {
            message: format!("malformed eml header line: '{}'", line),
        })?;
        let value = format!("{}{}", value.trim(), value_cont);
        match name.to_ascii_lowercase().as_str() {
            "from" => parsed.from = value,
            "to" => parsed.to = split_addresses(&value),
            "cc" => parsed.cc = split_addresses(&value),
            "bcc" => parsed.bcc = split_addresses(&value),
            "subject" => parsed.subject = value,
            _ => {}
        }
    }

    parsed.body = lines.collect::<Vec<_>>().join("\r\n");
    Ok(parsed)
}

/// Overwrites the explicit envelope fields with the parsed EML envelope and
/// uses the EML body as the plain body source.
pub fn apply_eml(settings: &mut SmtpSettings, parsed: ParsedEml) {
    settings.from = parsed.from;
    settings.to = parsed.to;
    settings.cc = parsed.cc;
    settings.bcc = parsed.bcc;
    settings.subject = parsed.subject;
    settings.body = parsed.body;
    settings.body_file = None;
}

fn split_addresses(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|addr| addr.trim().to_string())
        .filter(|addr| !addr.is_empty())
        .collect()
}

fn read_text(path: &Path) -> Result<String, BenchError> {
    fs::read_to_string(path).map_err(|e| BenchError::Compose {
        message: format!("cannot read '{}': {}", path.display(), e),
    })
}

fn random_boundary() -> String {
    let tail: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(24)
        .map(char::from)
        .collect();
    format!("nb{}", tail)
}

fn write_header(out: &mut Vec<u8>, name: &str, value: &str) {
    out.extend_from_slice(format!("{}: {}\r\n", name, value).as_bytes());
}

fn write_body_part(out: &mut Vec<u8>, boundary: &str, content_type: &str, content: &[u8]) {
    out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    write_header(out, "Content-Type", &format!("{}; charset=UTF-8", content_type));
    write_header(out, "Content-Transfer-Encoding", "quoted-printable");
    write_header(out, "Content-Disposition", "inline");
    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(content);
    out.extend_from_slice(b"\r\n");
}

fn write_attachment_part(out: &mut Vec<u8>, boundary: &str, path: &Path) -> Result<(), BenchError> {
    let content = fs::read(path).map_err(|e| BenchError::Compose {
        message: format!("cannot read attachment '{}': {}", path.display(), e),
    })?;
    let filename = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "attachment".to_string());
    let content_type = mime_guess::from_path(path).first_or_octet_stream();

    out.extend_from_slice(format!("--{}\r\n", boundary).as_bytes());
    write_header(out, "Content-Type", content_type.essence_str());
    write_header(out, "Content-Transfer-Encoding", "base64");
    write_header(
        out,
        "Content-Disposition",
        &format!("attachment; filename={}", filename),
    );
    out.extend_from_slice(b"\r\n");
    let encoded = BASE64.encode(&content);
    for chunk in encoded.as_bytes().chunks(BASE64_LINE_WIDTH) {
        out.extend_from_slice(chunk);
        out.extend_from_slice(b"\r\n");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_body_is_not_multipart() {
        let mut settings = SmtpSettings::for_address("127.0.0.1:2525");
        settings.from = "a@b.c".to_string();
        settings.to = vec!["d@e.f".to_string()];
        settings.subject = "hello".to_string();
        settings.body = "just text".to_string();

        let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
        assert!(payload.contains("From: a@b.c\r\n"));
        assert!(payload.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
        assert!(!payload.contains("multipart"));
        assert!(payload.contains("just text"));
    }

    #[test]
    fn header_folding_is_unfolded() {
        let parsed = parse_eml(
            "From: a@b.c\nTo: one@x.y,\n two@x.y\nSubject: folded\n\nbody here",
        )
        .unwrap();
        assert_eq!(parsed.to, vec!["one@x.y", "two@x.y"]);
        assert_eq!(parsed.body, "body here");
    }
}
