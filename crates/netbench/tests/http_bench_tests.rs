//! End-to-end HTTP benchmark tests against local stub servers.

use netbench::models::settings::{HttpSettings, ProtocolSettings, RunSettings};
use netbench::runner::Runner;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

fn run_settings(concurrency: u32, total: u64, http: HttpSettings) -> RunSettings {
    RunSettings {
        concurrency,
        total_requests: total,
        duration: Duration::ZERO,
        output: None,
        protocol: ProtocolSettings::Http(http),
    }
}

async fn read_request_head(socket: &mut TcpStream) -> Option<Vec<u8>> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    loop {
        let n = socket.read(&mut buf).await.ok()?;
        if n == 0 {
            return None;
        }
        head.extend_from_slice(&buf[..n]);
        if head.windows(4).any(|w| w == b"\r\n\r\n") {
            return Some(head);
        }
    }
}

async fn write_response(socket: &mut TcpStream, status_line: &str, extra: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}Connection: close\r\n\r\n{}",
        status_line,
        body.len(),
        extra,
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
}

/// Serves every request with 200 and a fixed body, one connection per
/// request.
async fn spawn_ok_server(body: &'static str) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if read_request_head(&mut socket).await.is_some() {
                    write_response(&mut socket, "200 OK", "", body).await;
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn count_mode_success_path() {
    let body: &'static str = Box::leak("x".repeat(1000).into_boxed_str());
    let addr = spawn_ok_server(body).await;

    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    let runner = Runner::from_settings(run_settings(4, 20, http)).unwrap();
    let collector = runner.collector_handle();
    let stats = runner.run().await.unwrap();

    assert_eq!(stats.total_requests, 20);
    assert_eq!(stats.successful, 20);
    assert_eq!(stats.failed, 0);
    assert_eq!(collector.histogram()["2xx"], 20);
    // Response bodies alone account for 20kB; heads push the total higher.
    assert!(stats.total_bytes >= 20 * 1000, "bytes: {}", stats.total_bytes);
    assert!(stats.average_duration > Duration::ZERO);
}

#[tokio::test]
async fn host_override_headers_and_basic_auth_are_sent() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let captured = Arc::new(Mutex::new(String::new()));
    {
        let captured = captured.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let captured = captured.clone();
                tokio::spawn(async move {
                    if let Some(head) = read_request_head(&mut socket).await {
                        *captured.lock().unwrap() = String::from_utf8_lossy(&head).into_owned();
                        write_response(&mut socket, "200 OK", "", "ok").await;
                    }
                });
            }
        });
    }

    let mut http = HttpSettings::for_url(format!("http://{}/resource", addr));
    http.keep_alive = false;
    http.headers
        .insert("Host".to_string(), "override.example".to_string());
    http.headers
        .insert("X-Bench".to_string(), "1".to_string());
    http.auth.username = "user".to_string();
    http.auth.password = "pw".to_string();

    let stats = Runner::from_settings(run_settings(1, 1, http))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(stats.successful, 1);

    let head = captured.lock().unwrap().clone();
    assert!(head.starts_with("GET /resource HTTP/1.1\r\n"), "head: {}", head);
    assert!(head.contains("host: override.example\r\n") || head.contains("Host: override.example\r\n"));
    assert!(!head.to_lowercase().contains(&format!("host: {}", addr)));
    assert!(head.to_lowercase().contains("x-bench: 1"));
    // base64("user:pw")
    assert!(head.contains("Basic dXNlcjpwdw=="), "head: {}", head);
}

#[tokio::test]
async fn timed_out_requests_carry_the_sentinel_code() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                let _ = read_request_head(&mut socket).await;
                // Sink the request far past the adapter timeout.
                tokio::time::sleep(Duration::from_secs(5)).await;
            });
        }
    });

    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    http.timeout = 1;
    let runner = Runner::from_settings(run_settings(2, 2, http)).unwrap();
    let collector = runner.collector_handle();
    let stats = runner.run().await.unwrap();

    assert_eq!(stats.total_requests, 2);
    assert_eq!(stats.failed, 2);
    assert_eq!(collector.histogram()["other"], 2);
}

async fn spawn_redirect_server() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        while let Ok((mut socket, _)) = listener.accept().await {
            tokio::spawn(async move {
                if let Some(head) = read_request_head(&mut socket).await {
                    let head = String::from_utf8_lossy(&head).into_owned();
                    if head.starts_with("GET /next ") {
                        write_response(&mut socket, "200 OK", "", "landed").await;
                    } else {
                        write_response(
                            &mut socket,
                            "301 Moved Permanently",
                            "Location: /next\r\n",
                            "",
                        )
                        .await;
                    }
                }
            });
        }
    });
    addr
}

#[tokio::test]
async fn redirects_are_returned_when_following_is_disabled() {
    let addr = spawn_redirect_server().await;
    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    http.redirect = false;

    let runner = Runner::from_settings(run_settings(1, 1, http)).unwrap();
    let collector = runner.collector_handle();
    runner.run().await.unwrap();
    assert_eq!(collector.histogram()["3xx"], 1);
}

#[tokio::test]
async fn redirects_are_followed_when_enabled() {
    let addr = spawn_redirect_server().await;
    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    http.redirect = true;

    let runner = Runner::from_settings(run_settings(1, 1, http)).unwrap();
    let collector = runner.collector_handle();
    let stats = runner.run().await.unwrap();
    assert_eq!(stats.successful, 1);
    assert_eq!(collector.histogram()["2xx"], 1);
}

#[tokio::test]
async fn mixed_responses_split_success_and_failure() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let flip = Arc::new(AtomicUsize::new(0));
    {
        let flip = flip.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let flip = flip.clone();
                tokio::spawn(async move {
                    if read_request_head(&mut socket).await.is_some() {
                        if flip.fetch_add(1, Ordering::Relaxed) % 2 == 0 {
                            write_response(&mut socket, "200 OK", "", "ok").await;
                        } else {
                            write_response(&mut socket, "500 Internal Server Error", "", "boom")
                                .await;
                        }
                    }
                });
            }
        });
    }

    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    let runner = Runner::from_settings(run_settings(2, 10, http)).unwrap();
    let collector = runner.collector_handle();
    let stats = runner.run().await.unwrap();

    assert_eq!(stats.total_requests, 10);
    assert_eq!(stats.successful + stats.failed, stats.total_requests);
    assert!(stats.successful > 0 && stats.failed > 0);
    let histogram = collector.histogram();
    assert_eq!(histogram.values().sum::<u64>(), stats.total_requests);
}

#[tokio::test]
async fn duration_mode_runs_at_least_the_configured_time() {
    let addr = spawn_ok_server("ok").await;
    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;

    let settings = RunSettings {
        concurrency: 2,
        total_requests: 0,
        duration: Duration::from_millis(300),
        output: None,
        protocol: ProtocolSettings::Http(http),
    };
    let runner = Runner::from_settings(settings).unwrap();
    let collector = runner.collector_handle();
    let stats = runner.run().await.unwrap();

    assert!(stats.total_duration >= Duration::from_millis(300));
    assert!(stats.total_requests >= 1);
    assert_eq!(stats.successful + stats.failed, stats.total_requests);
    assert_eq!(
        collector.histogram().values().sum::<u64>(),
        stats.total_requests
    );
}

#[tokio::test]
async fn gate_bounds_in_flight_requests() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let in_flight = Arc::new(AtomicI64::new(0));
    let max_in_flight = Arc::new(AtomicI64::new(0));
    {
        let in_flight = in_flight.clone();
        let max_in_flight = max_in_flight.clone();
        tokio::spawn(async move {
            while let Ok((mut socket, _)) = listener.accept().await {
                let in_flight = in_flight.clone();
                let max_in_flight = max_in_flight.clone();
                tokio::spawn(async move {
                    if read_request_head(&mut socket).await.is_some() {
                        let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                        max_in_flight.fetch_max(now, Ordering::SeqCst);
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        in_flight.fetch_sub(1, Ordering::SeqCst);
                        write_response(&mut socket, "200 OK", "", "ok").await;
                    }
                });
            }
        });
    }

    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = false;
    let stats = Runner::from_settings(run_settings(3, 30, http))
        .unwrap()
        .run()
        .await
        .unwrap();

    assert_eq!(stats.total_requests, 30);
    assert!(
        max_in_flight.load(Ordering::SeqCst) <= 3,
        "observed {} concurrent requests",
        max_in_flight.load(Ordering::SeqCst)
    );
}

#[tokio::test]
async fn stale_keep_alive_connections_are_redialed() {
    // The stub closes every connection after one response; with keep-alive
    // on, later requests pop a dead pooled connection and must recover.
    let addr = spawn_ok_server("ok").await;
    let mut http = HttpSettings::for_url(format!("http://{}/", addr));
    http.keep_alive = true;

    let stats = Runner::from_settings(run_settings(1, 3, http))
        .unwrap()
        .run()
        .await
        .unwrap();
    assert_eq!(stats.total_requests, 3);
    assert_eq!(stats.successful, 3);
}
