use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::Duration;

use hyper::Uri;
use hyper::rt::{Read, ReadBufCursor, Write};
use hyper_util::client::legacy::connect::{Connected, Connection, HttpConnector};
use tokio::time::Instant;

type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// TCP connector that measures how long each new connection took to establish.
///
/// The measurement rides on the connection as a [`Connected::extra`], so the pooled
/// client copies it into the extensions of every response sent over it.
#[derive(Debug, Clone)]
pub(crate) struct TimedConnector {
    inner: HttpConnector,
}

impl TimedConnector {
    pub(crate) fn new(inner: HttpConnector) -> Self {
        Self { inner }
    }
}

/// Connect duration of one pooled connection. Only the first response over the
/// connection reports it; reused connections cost nothing to connect.
#[derive(Debug, Clone)]
pub(crate) struct ConnectTiming {
    elapsed: Duration,
    claimed: Arc<AtomicBool>,
}

impl ConnectTiming {
    fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            claimed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn claim(&self) -> Option<Duration> {
        (!self.claimed.swap(true, Ordering::AcqRel)).then_some(self.elapsed)
    }
}

impl tower::Service<Uri> for TimedConnector {
    type Response = TimedStream<<HttpConnector as tower::Service<Uri>>::Response>;
    type Error = <HttpConnector as tower::Service<Uri>>::Error;
    type Future = BoxFuture<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, dst: Uri) -> Self::Future {
        let started = Instant::now();
        let connecting = self.inner.call(dst);
        Box::pin(async move {
            let inner = connecting.await?;
            Ok(TimedStream {
                inner,
                timing: ConnectTiming::new(started.elapsed()),
            })
        })
    }
}

#[derive(Debug)]
pub(crate) struct TimedStream<S> {
    inner: S,
    timing: ConnectTiming,
}

impl<S: Connection> Connection for TimedStream<S> {
    fn connected(&self) -> Connected {
        self.inner.connected().extra(self.timing.clone())
    }
}

impl<S: Read + Unpin> Read for TimedStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: ReadBufCursor<'_>,
    ) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_read(cx, buf)
    }
}

impl<S: Write + Unpin> Write for TimedStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write(cx, buf)
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[io::IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        Pin::new(&mut self.inner).poll_write_vectored(cx, bufs)
    }
}
