use super::Meters;
use std::io::{self, IoSlice};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};

/// Stream decorator that counts bytes as they pass.
///
/// Reads are client uplink, writes are client downlink. Only bytes the inner
/// stream actually moved are counted; errors are passed through untouched.
#[derive(Debug)]
pub struct MeteredStream<S> {
    inner: S,
    meters: Meters,
}

impl<S> MeteredStream<S> {
    pub fn new(inner: S, meters: Meters) -> Self {
        Self { inner, meters }
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for MeteredStream<S> {
    fn poll_read(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let filled = buf.filled().len();
        let poll = Pin::new(&mut self.inner).poll_read(cx, buf);
        if let Poll::Ready(Ok(())) = poll {
            self.meters.record_upload(buf.filled().len() - filled);
        }
        poll
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for MeteredStream<S> {
    fn poll_write(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write(cx, buf);
        if let Poll::Ready(Ok(written)) = poll {
            self.meters.record_download(written);
        }
        poll
    }

    fn poll_write_vectored(
        mut self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        let poll = Pin::new(&mut self.inner).poll_write_vectored(cx, bufs);
        if let Poll::Ready(Ok(written)) = poll {
            self.meters.record_download(written);
        }
        poll
    }

    fn is_write_vectored(&self) -> bool {
        self.inner.is_write_vectored()
    }

    fn poll_flush(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_flush(cx)
    }

    fn poll_shutdown(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.inner).poll_shutdown(cx)
    }
}

/// Outcome of routing a stream: either the untouched original or a
/// [`MeteredStream`] around it.
#[derive(Debug)]
pub enum RoutedStream<S> {
    Direct(S),
    Metered(MeteredStream<S>),
}

impl<S> RoutedStream<S> {
    pub fn is_metered(&self) -> bool {
        matches!(self, Self::Metered(_))
    }

    pub fn get_ref(&self) -> &S {
        match self {
            Self::Direct(inner) => inner,
            Self::Metered(metered) => metered.get_ref(),
        }
    }

    pub fn into_inner(self) -> S {
        match self {
            Self::Direct(inner) => inner,
            Self::Metered(metered) => metered.into_inner(),
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for RoutedStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Direct(inner) => Pin::new(inner).poll_read(cx, buf),
            Self::Metered(metered) => Pin::new(metered).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for RoutedStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Direct(inner) => Pin::new(inner).poll_write(cx, buf),
            Self::Metered(metered) => Pin::new(metered).poll_write(cx, buf),
        }
    }

    fn poll_write_vectored(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        bufs: &[IoSlice<'_>],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            Self::Direct(inner) => Pin::new(inner).poll_write_vectored(cx, bufs),
            Self::Metered(metered) => Pin::new(metered).poll_write_vectored(cx, bufs),
        }
    }

    fn is_write_vectored(&self) -> bool {
        match self {
            Self::Direct(inner) => inner.is_write_vectored(),
            Self::Metered(metered) => metered.is_write_vectored(),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Direct(inner) => Pin::new(inner).poll_flush(cx),
            Self::Metered(metered) => Pin::new(metered).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            Self::Direct(inner) => Pin::new(inner).poll_shutdown(cx),
            Self::Metered(metered) => Pin::new(metered).poll_shutdown(cx),
        }
    }
}
