//! SMTP protocol adapter.
//!
//! Drives the SMTP dialogue directly over a byte-tracked connection:
//! greeting, EHLO, optional STARTTLS (verification disabled), optional AUTH,
//! MAIL FROM, one RCPT TO per unique recipient, DATA, QUIT. The MIME
//! payload is composed once at initialization; the latency timer spans
//! dial through QUIT.

use crate::collector::entry::StatEntry;
use crate::models::error::BenchError;
use crate::models::settings::SmtpSettings;
use crate::protocols::mime;
use crate::protocols::transport::{self, ByteCounters, TrackedStream};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use hmac::{Hmac, Mac};
use log::{debug, error, info, warn};
use md5::Md5;
use rustls::client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier};
use rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use rustls::{ClientConfig, DigitallySignedStruct, SignatureScheme};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::client::TlsStream;
use tokio_rustls::TlsConnector;

type HmacMd5 = Hmac<Md5>;

/// SMTP load adapter. Built from settings, initialized once, then driven
/// concurrently; every `start_benchmark` call performs one full mail
/// transaction and emits exactly one stat entry.
pub struct SmtpAdapter {
    settings: SmtpSettings,
    payload: Vec<u8>,
    recipients: Vec<String>,
    counters: Arc<ByteCounters>,
    tls: Option<TlsConnector>,
    server_name: Option<ServerName<'static>>,
    sink: Option<mpsc::Sender<StatEntry>>,
}

impl SmtpAdapter {
    pub fn new(settings: SmtpSettings) -> Self {
        SmtpAdapter {
            settings,
            payload: Vec::new(),
            recipients: Vec::new(),
            counters: ByteCounters::new(),
            tls: None,
            server_name: None,
            sink: None,
        }
    }

    /// Composes the message, resolves the recipient set and wires the entry
    /// sink. Composition failures are user-data problems and fatal here.
    pub async fn initialize(&mut self, sink: mpsc::Sender<StatEntry>) -> Result<(), BenchError> {
        if let Some(path) = self.settings.eml.clone() {
            let parsed = mime::parse_eml_file(&path)?;
            mime::apply_eml(&mut self.settings, parsed);
        }

        self.payload = mime::compose(&self.settings)?;
        self.recipients = unique_recipients(&self.settings);
        if self.recipients.is_empty() {
            return Err(BenchError::Config {
                message: "no SMTP recipients configured".to_string(),
            });
        }

        if self.settings.tls {
            let host = self
                .settings
                .address
                .split(':')
                .next()
                .unwrap_or_default()
                .to_string();
            self.server_name = Some(ServerName::try_from(host.clone()).map_err(|e| {
                BenchError::Tls {
                    message: format!("invalid tls server name '{}': {}", host, e),
                }
            })?);
            let config = ClientConfig::builder()
                .dangerous()
                .with_custom_certificate_verifier(Arc::new(NoVerification))
                .with_no_client_auth();
            self.tls = Some(TlsConnector::from(Arc::new(config)));
        }

        self.sink = Some(sink);
        info!(
            "running SMTP benchmark against {} ({} recipients)",
            self.settings.address,
            self.recipients.len()
        );
        Ok(())
    }

    /// Performs one mail transaction and unconditionally emits one entry.
    pub async fn start_benchmark(&self) {
        let Some(sink) = &self.sink else {
            error!("SMTP adapter not initialized correctly");
            return;
        };

        let start = Instant::now();
        let code = match self.perform_exchange().await {
            Ok(code) => i32::from(code),
            Err(err) => {
                warn!("smtp transaction failed: {}", err);
                err.response_code()
            }
        };

        let entry = StatEntry {
            response_code: code,
            bytes_read: self.counters.bytes_read(),
            bytes_written: self.counters.bytes_written(),
            duration: start.elapsed(),
        };
        if sink.send(entry).await.is_err() {
            error!("stat channel closed before entry could be delivered");
        }
    }

    async fn perform_exchange(&self) -> Result<u16, BenchError> {
        let dial = transport::dial_tracked(&self.settings.address, self.counters.clone());
        let stream = tokio::time::timeout(Duration::from_secs(self.settings.timeout), dial)
            .await
            .map_err(|_| BenchError::Timeout {
                seconds: self.settings.timeout,
            })??;
        let mut stream = SmtpStream::Plain(BufReader::new(stream));

        expect_class(stream.read_reply().await?, 2)?;
        stream.command("EHLO localhost", 2).await?;

        if let (Some(connector), Some(server_name)) = (&self.tls, &self.server_name) {
            stream.command("STARTTLS", 2).await?;
            stream = stream.upgrade(connector, server_name.clone()).await?;
            stream.command("EHLO localhost", 2).await?;
        }

        self.authenticate(&mut stream).await?;

        stream
            .command(&format!("MAIL FROM:<{}>", self.settings.from), 2)
            .await?;
        for recipient in &self.recipients {
            stream
                .command(&format!("RCPT TO:<{}>", recipient), 2)
                .await?;
        }

        stream.command("DATA", 3).await?;
        stream.write_payload(&self.payload).await?;
        expect_class(stream.read_reply().await?, 2)?;

        // The transaction already succeeded; a broken QUIT is not a failure.
        if let Err(err) = stream.command("QUIT", 2).await {
            debug!("smtp quit failed: {}", err);
        }

        Ok(250)
    }

    async fn authenticate(&self, stream: &mut SmtpStream) -> Result<(), BenchError> {
        let auth = &self.settings.auth;
        match auth.method.as_str() {
            "" => Ok(()),
            "PLAIN" => {
                let token =
                    BASE64.encode(format!("\0{}\0{}", auth.username, auth.password));
                stream.command(&format!("AUTH PLAIN {}", token), 2).await?;
                Ok(())
            }
            "CRAM" => {
                let (_, challenge) = require_class(
                    stream.command_reply("AUTH CRAM-MD5").await?,
                    3,
                )?;
                let decoded =
                    BASE64
                        .decode(challenge.trim())
                        .map_err(|e| BenchError::Protocol {
                            code: 1000,
                            message: format!("invalid CRAM-MD5 challenge: {}", e),
                        })?;
                let mut mac = HmacMd5::new_from_slice(auth.password.as_bytes()).map_err(|e| {
                    BenchError::Config {
                        message: format!("invalid CRAM-MD5 secret: {}", e),
                    }
                })?;
                mac.update(&decoded);
                let digest = mac
                    .finalize()
                    .into_bytes()
                    .iter()
                    .map(|b| format!("{:02x}", b))
                    .collect::<String>();
                let token = BASE64.encode(format!("{} {}", auth.username, digest));
                stream.command(&token, 2).await?;
                Ok(())
            }
            other => Err(BenchError::Config {
                message: format!("invalid auth method '{}'", other),
            }),
        }
    }
}

/// Recipient union `to ∪ cc ∪ bcc`, deduplicated, in first-seen order.
pub fn unique_recipients(settings: &SmtpSettings) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    let mut recipients = Vec::new();
    for list in [&settings.to, &settings.cc, &settings.bcc] {
        for address in list {
            if seen.insert(address.clone()) {
                recipients.push(address.clone());
            }
        }
    }
    recipients
}

/// Connection in either the cleartext or post-STARTTLS state.
enum SmtpStream {
    Plain(BufReader<TrackedStream<TcpStream>>),
    Tls(BufReader<TlsStream<TrackedStream<TcpStream>>>),
}

impl SmtpStream {
    /// Reads one (possibly multi-line) reply and returns its code and the
    /// text of the final line.
    async fn read_reply(&mut self) -> Result<(u16, String), BenchError> {
        match self {
            SmtpStream::Plain(stream) => read_reply_on(stream).await,
            SmtpStream::Tls(stream) => read_reply_on(stream).await,
        }
    }

    async fn write_all(&mut self, data: &[u8]) -> Result<(), BenchError> {
        match self {
            SmtpStream::Plain(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
            SmtpStream::Tls(stream) => {
                stream.write_all(data).await?;
                stream.flush().await?;
            }
        }
        Ok(())
    }

    /// Sends one command line and returns the reply.
    async fn command_reply(&mut self, command: &str) -> Result<(u16, String), BenchError> {
        self.write_all(format!("{}\r\n", command).as_bytes())
            .await?;
        self.read_reply().await
    }

    /// Sends one command line and checks the reply class.
    async fn command(&mut self, command: &str, expected_class: u16) -> Result<u16, BenchError> {
        let reply = self.command_reply(command).await?;
        let (code, _) = require_class(reply, expected_class)?;
        Ok(code)
    }

    /// Transmits the DATA payload with dot-stuffing and the final dot.
    async fn write_payload(&mut self, payload: &[u8]) -> Result<(), BenchError> {
        let mut data = dot_stuff(payload);
        if !data.ends_with(b"\r\n") {
            data.extend_from_slice(b"\r\n");
        }
        data.extend_from_slice(b".\r\n");
        self.write_all(&data).await
    }

    /// Performs the STARTTLS handshake, keeping the byte counters attached.
    async fn upgrade(
        self,
        connector: &TlsConnector,
        server_name: ServerName<'static>,
    ) -> Result<Self, BenchError> {
        match self {
            SmtpStream::Plain(stream) => {
                let tracked = stream.into_inner();
                let tls = connector
                    .connect(server_name, tracked)
                    .await
                    .map_err(|e| BenchError::Tls {
                        message: e.to_string(),
                    })?;
                Ok(SmtpStream::Tls(BufReader::new(tls)))
            }
            SmtpStream::Tls(_) => Ok(self),
        }
    }
}

async fn read_reply_on<S>(stream: &mut S) -> Result<(u16, String), BenchError>
where
    S: AsyncBufRead + Unpin,
{
    loop {
        let mut line = String::new();
        let n = stream.read_line(&mut line).await?;
        if n == 0 {
            return Err(BenchError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "connection closed mid-reply",
            )));
        }
        let line = line.trim_end();
        if line.len() < 3 {
            return Err(BenchError::Protocol {
                code: 1000,
                message: format!("malformed smtp reply: '{}'", line),
            });
        }
        let code: u16 = line[..3].parse().map_err(|_| BenchError::Protocol {
            code: 1000,
            message: format!("malformed smtp reply: '{}'", line),
        })?;
        // "250-..." marks a continued multi-line reply; "250 ..." ends it.
        if line.as_bytes().get(3) == Some(&b'-') {
            continue;
        }
        let text = line.get(4..).unwrap_or("").to_string();
        return Ok((code, text));
    }
}

/// A reply outside the expected class is a protocol error carrying its own
/// code.
fn require_class(
    reply: (u16, String),
    expected_class: u16,
) -> Result<(u16, String), BenchError> {
    let (code, text) = reply;
    if code / 100 == expected_class {
        Ok((code, text))
    } else {
        Err(BenchError::Protocol {
            code: i32::from(code),
            message: text,
        })
    }
}

fn expect_class(reply: (u16, String), expected_class: u16) -> Result<u16, BenchError> {
    let (code, _) = require_class(reply, expected_class)?;
    Ok(code)
}

/// Doubles leading dots so payload lines cannot terminate DATA early.
fn dot_stuff(payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 2);
    let mut at_line_start = true;
    for &byte in payload {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
    }
    out
}

/// Accepts any server certificate. Benchmark targets are dialed with
/// verification disabled, self-signed certificates included.
#[derive(Debug)]
struct NoVerification;

impl ServerCertVerifier for NoVerification {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recipient_union_deduplicates_across_lists() {
        let mut settings = SmtpSettings::for_address("127.0.0.1:2525");
        settings.to = vec!["a@x.y".to_string(), "b@x.y".to_string()];
        settings.cc = vec!["b@x.y".to_string(), "c@x.y".to_string()];
        settings.bcc = vec!["a@x.y".to_string(), "d@x.y".to_string()];
        assert_eq!(
            unique_recipients(&settings),
            vec!["a@x.y", "b@x.y", "c@x.y", "d@x.y"]
        );
    }

    #[test]
    fn dot_stuffing_doubles_leading_dots() {
        let stuffed = dot_stuff(b"one\r\n.two\r\n..three\r\n");
        assert_eq!(&stuffed, b"one\r\n..two\r\n...three\r\n");
    }
}
