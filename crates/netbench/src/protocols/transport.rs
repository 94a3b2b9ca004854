//! Byte-accounting wrapper for transport connections.
//!
//! Protocol libraries buffer internally, so the only place actual wire
//! traffic can be observed is the connection itself. [`TrackedStream`]
//! wraps any byte stream and adds successfully transferred byte counts to a
//! pair of shared accumulators. The accumulators live at adapter scope and
//! are passed into every connection the adapter opens, so totals survive
//! reconnects, redirects and keep-alive churn.

use std::io;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;

/// Shared read/write accumulators for one protocol adapter.
///
/// Monotonically non-decreasing; incremented only on successful read and
/// write completions. Writers are the connection poll paths, readers take a
/// relaxed snapshot once per stat-entry emission.
#[derive(Debug, Default)]
pub struct ByteCounters {
    read: AtomicI64,
    written: AtomicI64,
}

impl ByteCounters {
    pub fn new() -> Arc<Self> {
        Arc::new(ByteCounters::default())
    }

    fn add_read(&self, n: usize) {
        self.read.fetch_add(n as i64, Ordering::Relaxed);
    }

    fn add_written(&self, n: usize) {
        self.written.fetch_add(n as i64, Ordering::Relaxed);
    }

    pub fn bytes_read(&self) -> i64 {
        self.read.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> i64 {
        self.written.load(Ordering::Relaxed)
    }
}

/// Pass-through stream wrapper feeding [`ByteCounters`].
///
/// Errors and pending polls leave the counters untouched. Shutdown
/// delegates to the inner stream.
#[derive(Debug)]
pub struct TrackedStream<S> {
    inner: S,
    counters: Arc<ByteCounters>,
}

impl<S> TrackedStream<S> {
    pub fn new(inner: S, counters: Arc<ByteCounters>) -> Self {
        TrackedStream { inner, counters }
    }

    pub fn into_inner(self) -> (S, Arc<ByteCounters>) {
        (self.inner, self.counters)
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for TrackedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let me = self.get_mut();
        let before = buf.filled().len();
        match Pin::new(&mut me.inner).poll_read(cx, buf) {
            Poll::Ready(Ok(())) => {
                me.counters.add_read(buf.filled().len() - before);
                Poll::Ready(Ok(()))
            }
            other => other,
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for TrackedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let me = self.get_mut();
        match Pin::new(&mut me.inner).poll_write(cx, buf) {
            Poll::Ready(Ok(n)) => {
                me.counters.add_written(n);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let me = self.get_mut();
        match Pin::new(&mut me.inner).poll_write_vectored(cx, bufs) {
            Poll::Ready(Ok(n)) => {
                me.counters.add_written(n);
                Poll::Ready(Ok(n))
            }
            other => other,
        }
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// Dials `addr` and wraps the connection for byte accounting. A dial error
/// surfaces unchanged and moves no counters.
pub async fn dial_tracked(
    addr: &str,
    counters: Arc<ByteCounters>,
) -> io::Result<TrackedStream<TcpStream>> {
    let stream = TcpStream::connect(addr).await?;
    Ok(TrackedStream::new(stream, counters))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn counts_written_and_read_bytes() {
        let (client, server) = tokio::io::duplex(256);
        let counters = ByteCounters::new();
        let mut tracked = TrackedStream::new(client, counters.clone());
        let mut server = server;

        tracked.write_all(b"hello").await.unwrap();
        tracked.flush().await.unwrap();
        assert_eq!(counters.bytes_written(), 5);

        server.write_all(b"world!").await.unwrap();
        let mut buf = [0u8; 6];
        tracked.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world!");
        assert_eq!(counters.bytes_read(), 6);
    }

    #[tokio::test]
    async fn counters_are_monotonic_across_streams() {
        let counters = ByteCounters::new();
        for round in 1..=3i64 {
            let (client, mut server) = tokio::io::duplex(64);
            let mut tracked = TrackedStream::new(client, counters.clone());
            tracked.write_all(b"ping").await.unwrap();
            let mut buf = [0u8; 4];
            server.read_exact(&mut buf).await.unwrap();
            assert_eq!(counters.bytes_written(), round * 4);
        }
    }
}
