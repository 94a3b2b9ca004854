//! Tests for MIME composition and EML parsing.

use netbench::protocols::mime::{apply_eml, compose, parse_eml};
use netbench::protocols::smtp::unique_recipients;
use netbench::models::settings::SmtpSettings;
use std::collections::HashSet;
use std::io::Write;
use tempfile::NamedTempFile;

fn base_settings() -> SmtpSettings {
    let mut settings = SmtpSettings::for_address("127.0.0.1:2525");
    settings.from = "sender@example.com".to_string();
    settings.to = vec!["one@example.com".to_string(), "two@example.com".to_string()];
    settings.subject = "benchmark".to_string();
    settings.body = "plain text body".to_string();
    settings
}

fn extract_boundary(payload: &str) -> String {
    let marker = "boundary=";
    let start = payload.find(marker).expect("boundary present") + marker.len();
    payload[start..]
        .chars()
        .take_while(|c| c.is_ascii_alphanumeric())
        .collect()
}

#[test]
fn plain_message_carries_envelope_headers() {
    let payload = String::from_utf8(compose(&base_settings()).unwrap()).unwrap();
    assert!(payload.contains("From: sender@example.com\r\n"));
    assert!(payload.contains("To: one@example.com,two@example.com\r\n"));
    assert!(payload.contains("Subject: benchmark\r\n"));
    assert!(payload.contains("MIME-Version: 1.0\r\n"));
    assert!(payload.contains("plain text body"));
}

#[test]
fn cc_bcc_and_custom_headers_are_included() {
    let mut settings = base_settings();
    settings.cc = vec!["cc@example.com".to_string()];
    settings.bcc = vec!["bcc@example.com".to_string()];
    settings
        .headers
        .insert("X-Campaign".to_string(), "load".to_string());

    let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
    assert!(payload.contains("Cc: cc@example.com\r\n"));
    assert!(payload.contains("Bcc: bcc@example.com\r\n"));
    assert!(payload.contains("X-Campaign: load\r\n"));
}

#[test]
fn plain_plus_html_becomes_multipart_alternative() {
    let mut html = NamedTempFile::new().unwrap();
    html.write_all(b"<h1>hi</h1>").unwrap();

    let mut settings = base_settings();
    settings.body_html = Some(html.path().to_path_buf());

    let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
    assert!(payload.contains("Content-Type: multipart/alternative; boundary="));
    assert!(payload.contains("Content-Type: text/plain; charset=UTF-8\r\n"));
    assert!(payload.contains("Content-Type: text/html; charset=UTF-8\r\n"));
    assert!(payload.contains("<h1>hi</h1>"));

    let boundary = extract_boundary(&payload);
    assert!(payload.contains(&format!("--{}\r\n", boundary)));
    assert!(payload.trim_end().ends_with(&format!("--{}--", boundary)));
}

#[test]
fn attachments_become_base64_mixed_parts() {
    let mut attachment = NamedTempFile::new().unwrap();
    attachment.write_all(b"attachment payload").unwrap();

    let mut settings = base_settings();
    settings.attachments = vec![attachment.path().to_path_buf()];

    let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
    assert!(payload.contains("Content-Type: multipart/mixed; boundary="));
    assert!(payload.contains("Content-Transfer-Encoding: base64\r\n"));
    assert!(payload.contains("Content-Disposition: attachment; filename="));

    use base64::Engine as _;
    let encoded = base64::engine::general_purpose::STANDARD.encode(b"attachment payload");
    assert!(payload.contains(&encoded));
}

#[test]
fn missing_attachment_is_a_compose_error() {
    let mut settings = base_settings();
    settings.attachments = vec!["/nonexistent/file.pdf".into()];
    assert!(compose(&settings).is_err());
}

#[test]
fn body_file_takes_precedence_over_inline_body() {
    let mut body_file = NamedTempFile::new().unwrap();
    body_file.write_all(b"file body wins").unwrap();

    let mut settings = base_settings();
    settings.body_file = Some(body_file.path().to_path_buf());

    let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
    assert!(payload.contains("file body wins"));
    assert!(!payload.contains("plain text body"));
}

#[test]
fn eml_envelope_supersedes_explicit_fields() {
    let eml = "From: eml-sender@example.com\n\
               To: eml-one@example.com, eml-two@example.com\n\
               Cc: eml-cc@example.com\n\
               Subject: from the file\n\
               \n\
               eml body text";
    let parsed = parse_eml(eml).unwrap();

    let mut settings = base_settings();
    apply_eml(&mut settings, parsed);
    assert_eq!(settings.from, "eml-sender@example.com");
    assert_eq!(settings.subject, "from the file");
    assert_eq!(settings.to.len(), 2);
    assert_eq!(settings.cc, vec!["eml-cc@example.com"]);
    assert_eq!(settings.body, "eml body text");
}

// Round-trip: recomposing from parsed fields preserves the recipient union.
#[test]
fn eml_round_trip_preserves_recipient_union() {
    let eml = "From: s@example.com\n\
               To: a@example.com, b@example.com\n\
               Cc: b@example.com, c@example.com\n\
               Bcc: d@example.com\n\
               Subject: round trip\n\
               \n\
               body";
    let parsed = parse_eml(eml).unwrap();
    let expected: HashSet<String> = ["a@example.com", "b@example.com", "c@example.com", "d@example.com"]
        .iter()
        .map(|s| s.to_string())
        .collect();

    let mut settings = SmtpSettings::for_address("127.0.0.1:2525");
    apply_eml(&mut settings, parsed);
    let union: HashSet<String> = unique_recipients(&settings).into_iter().collect();
    assert_eq!(union, expected);

    let payload = String::from_utf8(compose(&settings).unwrap()).unwrap();
    for rcpt in ["a@example.com", "c@example.com"] {
        assert!(payload.contains(rcpt), "missing {} in payload", rcpt);
    }
}
