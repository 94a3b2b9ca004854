//! HTTP/1.1 and HTTP/2 protocol adapter.
//!
//! Connections are dialed by the adapter itself and handed to hyper one
//! handshake at a time, so the byte-tracking wrapper sits underneath the
//! protocol library and observes actual wire traffic: TLS records, h2
//! frames and all. The request template (method, target, headers, body) is
//! prepared once at initialization; each exchange serializes it, drains the
//! response body and emits exactly one stat entry.

use crate::collector::entry::{StatEntry, SENTINEL_CODE};
use crate::models::error::BenchError;
use crate::models::settings::HttpSettings;
use crate::protocols::transport::{self, ByteCounters, TrackedStream};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use bytes::Bytes;
use http::header::{HeaderMap, HeaderName, HeaderValue, ACCEPT_ENCODING, AUTHORIZATION, HOST, LOCATION};
use http::uri::Authority;
use http::{Method, Request, Response, Uri, Version};
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::client::conn::{http1, http2};
use hyper_util::rt::{TokioExecutor, TokioIo};
use log::{debug, error, info, warn};
use rustls::pki_types::ServerName;
use rustls::{ClientConfig, RootCertStore};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::TlsConnector;

const MAX_REDIRECTS: usize = 10;

/// HTTP load adapter. Built from settings, initialized once, then driven
/// concurrently.
pub struct HttpAdapter {
    settings: HttpSettings,
    template: Option<RequestTemplate>,
    counters: Arc<ByteCounters>,
    pool: Mutex<Vec<HttpConnection>>,
    sink: Option<mpsc::Sender<StatEntry>>,
}

/// Immutable per-run request state, derived from the settings once.
struct RequestTemplate {
    method: Method,
    target: Target,
    headers: HeaderMap,
    body: Bytes,
    /// `Host` header / `:authority` override from the configured headers.
    host_override: Option<Authority>,
    use_h2: bool,
    proxy: Option<ProxyTarget>,
    tls: TlsConnector,
    timeout: Duration,
}

/// One resolvable request target; redirects produce new values.
#[derive(Debug, Clone)]
struct Target {
    uri: Uri,
    host: String,
    port: u16,
    https: bool,
}

#[derive(Debug, Clone)]
struct ProxyTarget {
    addr: String,
}

/// A live protocol handle whose connection task runs in the background.
enum HttpConnection {
    H1(http1::SendRequest<Full<Bytes>>),
    H2(http2::SendRequest<Full<Bytes>>),
}

impl HttpConnection {
    async fn send(
        &mut self,
        req: Request<Full<Bytes>>,
    ) -> Result<Response<Incoming>, hyper::Error> {
        match self {
            HttpConnection::H1(sender) => {
                sender.ready().await?;
                sender.send_request(req).await
            }
            HttpConnection::H2(sender) => {
                sender.ready().await?;
                sender.send_request(req).await
            }
        }
    }
}

impl HttpAdapter {
    pub fn new(settings: HttpSettings) -> Self {
        HttpAdapter {
            settings,
            template: None,
            counters: ByteCounters::new(),
            pool: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Prepares the reusable request template and wires the entry sink.
    /// Body-file problems are user-data errors and fatal here.
    pub async fn initialize(&mut self, sink: mpsc::Sender<StatEntry>) -> Result<(), BenchError> {
        let uri: Uri = self
            .settings
            .url
            .parse()
            .map_err(|e: http::uri::InvalidUri| BenchError::InvalidUrl {
                url: self.settings.url.clone(),
                message: e.to_string(),
            })?;
        let target = Target::from_uri(&uri)?;

        let method =
            Method::from_bytes(self.settings.method.as_bytes()).map_err(|_| BenchError::Config {
                message: format!("invalid HTTP method '{}'", self.settings.method),
            })?;
        let use_h2 = self.settings.version == "2";

        let body = match &self.settings.body_file {
            Some(path) => Bytes::from(tokio::fs::read(path).await.map_err(|e| {
                BenchError::Config {
                    message: format!("cannot read body file '{}': {}", path.display(), e),
                }
            })?),
            None => Bytes::from(self.settings.body.clone()),
        };

        let mut headers = HeaderMap::new();
        let mut host_override = None;
        for (key, value) in &self.settings.headers {
            // A Host entry overrides the request authority instead of being
            // sent as an arbitrary header.
            if key.eq_ignore_ascii_case("host") {
                host_override =
                    Some(
                        value
                            .parse::<Authority>()
                            .map_err(|e| BenchError::Config {
                                message: format!("invalid Host override '{}': {}", value, e),
                            })?,
                    );
                continue;
            }
            let name = HeaderName::from_bytes(key.as_bytes()).map_err(|e| BenchError::Config {
                message: format!("invalid header name '{}': {}", key, e),
            })?;
            let value = HeaderValue::from_str(value).map_err(|e| BenchError::Config {
                message: format!("invalid header value for '{}': {}", key, e),
            })?;
            headers.insert(name, value);
        }

        let auth = &self.settings.auth;
        if !auth.username.is_empty() && !auth.password.is_empty() {
            let token = BASE64.encode(format!("{}:{}", auth.username, auth.password));
            headers.insert(
                AUTHORIZATION,
                HeaderValue::from_str(&format!("Basic {}", token)).map_err(|e| {
                    BenchError::Config {
                        message: format!("invalid basic auth credentials: {}", e),
                    }
                })?,
            );
        }
        if self.settings.compression {
            headers.insert(ACCEPT_ENCODING, HeaderValue::from_static("gzip, deflate"));
        }

        let proxy = match &self.settings.proxy {
            Some(proxy_url) if !proxy_url.is_empty() => Some(ProxyTarget::parse(proxy_url)?),
            _ => None,
        };

        let mut roots = RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        let mut tls_config = ClientConfig::builder()
            .with_root_certificates(roots)
            .with_no_client_auth();
        tls_config.alpn_protocols = if use_h2 {
            vec![b"h2".to_vec()]
        } else {
            vec![b"http/1.1".to_vec()]
        };

        self.template = Some(RequestTemplate {
            method,
            target,
            headers,
            body,
            host_override,
            use_h2,
            proxy,
            tls: TlsConnector::from(Arc::new(tls_config)),
            timeout: Duration::from_secs(self.settings.timeout),
        });
        self.sink = Some(sink);
        info!("running HTTP benchmark for url {}", self.settings.url);
        Ok(())
    }

    /// Performs one full exchange and unconditionally emits one entry.
    pub async fn start_benchmark(&self) {
        let (Some(sink), Some(template)) = (&self.sink, &self.template) else {
            error!("HTTP adapter not initialized correctly");
            return;
        };

        let start = Instant::now();
        let code = match tokio::time::timeout(template.timeout, self.perform_exchange(template))
            .await
        {
            Ok(Ok(status)) => i32::from(status),
            Ok(Err(err)) => {
                warn!("request failed: {}", err);
                err.response_code()
            }
            Err(_) => {
                warn!("request timed out after {:?}", template.timeout);
                SENTINEL_CODE
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

    async fn perform_exchange(&self, template: &RequestTemplate) -> Result<u16, BenchError> {
        let mut target = template.target.clone();
        let mut hops = 0;
        loop {
            let (status, location) = self.send_once(template, &target, hops == 0).await?;
            if should_follow_redirect(&self.settings, status) {
                if let Some(location) = location {
                    if hops >= MAX_REDIRECTS {
                        return Err(BenchError::Http {
                            message: format!("stopped after {} redirects", MAX_REDIRECTS),
                        });
                    }
                    target = resolve_location(&target, &location)?;
                    hops += 1;
                    continue;
                }
            }
            return Ok(status);
        }
    }

    /// One request/response cycle against `target`. Only template-origin
    /// connections are pooled; redirect hops always dial fresh.
    async fn send_once(
        &self,
        template: &RequestTemplate,
        target: &Target,
        origin: bool,
    ) -> Result<(u16, Option<String>), BenchError> {
        let reuse = origin && self.settings.keep_alive;
        let pooled = if reuse {
            self.pool.lock().expect("pool lock poisoned").pop()
        } else {
            None
        };
        let from_pool = pooled.is_some();
        let mut conn = match pooled {
            Some(conn) => conn,
            None => self.connect(template, target).await?,
        };

        let resp = match conn.send(build_request(template, target)?).await {
            Ok(resp) => resp,
            Err(err) if from_pool => {
                // The kept-alive connection went stale; retry on a fresh one.
                debug!("pooled connection failed ({}), redialing", err);
                conn = self.connect(template, target).await?;
                conn.send(build_request(template, target)?)
                    .await
                    .map_err(http_error)?
            }
            Err(err) => return Err(http_error(err)),
        };

        let status = resp.status().as_u16();
        let location = resp
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(String::from);

        let mut body = resp.into_body();
        while let Some(frame) = body.frame().await {
            frame.map_err(http_error)?;
        }

        if reuse {
            self.pool.lock().expect("pool lock poisoned").push(conn);
        }
        Ok((status, location))
    }

    /// Dials (optionally through the proxy), layers TLS where the target
    /// scheme asks for it, and performs the protocol handshake. The byte
    /// counters ride along on every path.
    async fn connect(
        &self,
        template: &RequestTemplate,
        target: &Target,
    ) -> Result<HttpConnection, BenchError> {
        let addr = match &template.proxy {
            Some(proxy) => proxy.addr.clone(),
            None => format!("{}:{}", target.host, target.port),
        };
        let mut stream = transport::dial_tracked(&addr, self.counters.clone()).await?;

        if target.https {
            if template.proxy.is_some() {
                connect_tunnel(&mut stream, &target.host, target.port).await?;
            }
            let server_name =
                ServerName::try_from(target.host.clone()).map_err(|e| BenchError::Tls {
                    message: format!("invalid tls server name '{}': {}", target.host, e),
                })?;
            let tls_stream = template
                .tls
                .connect(server_name, stream)
                .await
                .map_err(|e| BenchError::Tls {
                    message: e.to_string(),
                })?;
            self.handshake(template, TokioIo::new(tls_stream)).await
        } else {
            self.handshake(template, TokioIo::new(stream)).await
        }
    }

    async fn handshake<T>(
        &self,
        template: &RequestTemplate,
        io: T,
    ) -> Result<HttpConnection, BenchError>
    where
        T: hyper::rt::Read + hyper::rt::Write + Unpin + Send + 'static,
    {
        if template.use_h2 {
            let (sender, conn) = http2::handshake(TokioExecutor::new(), io)
                .await
                .map_err(http_error)?;
            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    debug!("h2 connection task ended: {}", err);
                }
            });
            Ok(HttpConnection::H2(sender))
        } else {
            let (sender, conn) = http1::handshake(io).await.map_err(http_error)?;
            tokio::spawn(async move {
                if let Err(err) = conn.await {
                    debug!("h1 connection task ended: {}", err);
                }
            });
            Ok(HttpConnection::H1(sender))
        }
    }
}

impl Target {
    fn from_uri(uri: &Uri) -> Result<Self, BenchError> {
        let https = match uri.scheme_str() {
            Some("http") => false,
            Some("https") => true,
            _ => {
                return Err(BenchError::InvalidUrl {
                    url: uri.to_string(),
                    message: "scheme must be http or https".to_string(),
                })
            }
        };
        let host = uri
            .host()
            .ok_or_else(|| BenchError::InvalidUrl {
                url: uri.to_string(),
                message: "missing host".to_string(),
            })?
            .to_string();
        let port = uri.port_u16().unwrap_or(if https { 443 } else { 80 });
        Ok(Target {
            uri: uri.clone(),
            host,
            port,
            https,
        })
    }
}

impl ProxyTarget {
    fn parse(proxy_url: &str) -> Result<Self, BenchError> {
        let uri: Uri = proxy_url.parse().map_err(|e: http::uri::InvalidUri| {
            BenchError::Config {
                message: format!("unable to set proxy '{}': {}", proxy_url, e),
            }
        })?;
        let host = uri.host().ok_or_else(|| BenchError::Config {
            message: format!("unable to set proxy '{}': missing host", proxy_url),
        })?;
        let port = uri.port_u16().unwrap_or(80);
        Ok(ProxyTarget {
            addr: format!("{}:{}", host, port),
        })
    }
}

fn should_follow_redirect(settings: &HttpSettings, status: u16) -> bool {
    settings.redirect && (300..400).contains(&status)
}

/// Builds one request from the template against `target`.
///
/// HTTP/1.1 requests use origin-form (absolute-form through a cleartext
/// proxy) plus an explicit `Host` header; HTTP/2 requests carry the full
/// target so hyper derives `:scheme`/`:authority`. The configured Host
/// override replaces the authority in both cases.
fn build_request(
    template: &RequestTemplate,
    target: &Target,
) -> Result<Request<Full<Bytes>>, BenchError> {
    let request_uri = if template.use_h2 {
        match &template.host_override {
            Some(authority) => with_authority(&target.uri, authority.clone())?,
            None => target.uri.clone(),
        }
    } else if template.proxy.is_some() && !target.https {
        target.uri.clone()
    } else {
        origin_form(&target.uri)
    };

    let mut builder = Request::builder()
        .method(template.method.clone())
        .uri(request_uri);
    if template.use_h2 {
        builder = builder.version(Version::HTTP_2);
    }
    let mut req = builder
        .body(Full::new(template.body.clone()))
        .map_err(|e| BenchError::Http {
            message: e.to_string(),
        })?;
    *req.headers_mut() = template.headers.clone();

    if !template.use_h2 {
        let host_value = match &template.host_override {
            Some(authority) => HeaderValue::from_str(authority.as_str()),
            None => HeaderValue::from_str(&host_header_value(target)),
        }
        .map_err(|e| BenchError::Http {
            message: format!("invalid host header: {}", e),
        })?;
        req.headers_mut().insert(HOST, host_value);
    }

    Ok(req)
}

fn host_header_value(target: &Target) -> String {
    let default_port = if target.https { 443 } else { 80 };
    if target.port == default_port {
        target.host.clone()
    } else {
        format!("{}:{}", target.host, target.port)
    }
}

fn origin_form(uri: &Uri) -> Uri {
    uri.path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .parse()
        .unwrap_or_else(|_| Uri::from_static("/"))
}

fn with_authority(uri: &Uri, authority: Authority) -> Result<Uri, BenchError> {
    let mut parts = uri.clone().into_parts();
    parts.authority = Some(authority);
    if parts.path_and_query.is_none() {
        parts.path_and_query = Some("/".parse().expect("static path"));
    }
    Uri::from_parts(parts).map_err(|e| BenchError::Http {
        message: format!("invalid authority override: {}", e),
    })
}

/// Resolves a redirect `Location` against the current target.
fn resolve_location(current: &Target, location: &str) -> Result<Target, BenchError> {
    if location.starts_with("http://") || location.starts_with("https://") {
        let uri: Uri = location.parse().map_err(|e: http::uri::InvalidUri| {
            BenchError::Http {
                message: format!("invalid redirect location '{}': {}", location, e),
            }
        })?;
        return Target::from_uri(&uri);
    }

    // Relative reference: keep scheme and authority, swap path and query.
    let mut parts = current.uri.clone().into_parts();
    let path = if location.starts_with('/') {
        location.to_string()
    } else {
        format!("/{}", location)
    };
    parts.path_and_query = Some(path.parse().map_err(|e: http::uri::InvalidUri| {
        BenchError::Http {
            message: format!("invalid redirect location '{}': {}", location, e),
        }
    })?);
    let uri = Uri::from_parts(parts).map_err(|e| BenchError::Http {
        message: format!("invalid redirect location '{}': {}", location, e),
    })?;
    Target::from_uri(&uri)
}

/// Establishes a CONNECT tunnel through the proxy for TLS targets.
async fn connect_tunnel(
    stream: &mut TrackedStream<TcpStream>,
    host: &str,
    port: u16,
) -> Result<(), BenchError> {
    let request = format!(
        "CONNECT {host}:{port} HTTP/1.1\r\nHost: {host}:{port}\r\n\r\n",
        host = host,
        port = port
    );
    stream.write_all(request.as_bytes()).await?;

    let mut head = Vec::new();
    let mut byte = [0u8; 1];
    while !head.ends_with(b"\r\n\r\n") {
        if head.len() > 8192 {
            return Err(BenchError::Http {
                message: "oversized proxy CONNECT response".to_string(),
            });
        }
        let n = stream.read(&mut byte).await?;
        if n == 0 {
            return Err(BenchError::Io(std::io::Error::new(
                std::io::ErrorKind::UnexpectedEof,
                "proxy closed connection during CONNECT",
            )));
        }
        head.push(byte[0]);
    }

    let head = String::from_utf8_lossy(&head);
    let status = head
        .split_whitespace()
        .nth(1)
        .and_then(|s| s.parse::<u16>().ok())
        .ok_or_else(|| BenchError::Http {
            message: format!("malformed proxy CONNECT response: '{}'", head.trim()),
        })?;
    if status != 200 {
        return Err(BenchError::Protocol {
            code: i32::from(status),
            message: format!("proxy refused CONNECT: {}", status),
        });
    }
    Ok(())
}

fn http_error(err: hyper::Error) -> BenchError {
    BenchError::Http {
        message: err.to_string(),
    }
}
