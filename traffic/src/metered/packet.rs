use super::Meters;
use crate::packet::PacketConn;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;

/// Datagram decorator that counts each packet by its payload length.
///
/// Received datagrams are client uplink, sent datagrams are client downlink.
#[derive(Debug)]
pub struct MeteredPacketConn<P> {
    inner: P,
    meters: Meters,
}

impl<P> MeteredPacketConn<P> {
    pub fn new(inner: P, meters: Meters) -> Self {
        Self { inner, meters }
    }

    pub fn get_ref(&self) -> &P {
        &self.inner
    }

    pub fn into_inner(self) -> P {
        self.inner
    }
}

#[async_trait]
impl<P: PacketConn> PacketConn for MeteredPacketConn<P> {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        let (len, peer) = self.inner.recv_from(buf).await?;
        self.meters.record_upload(len);
        Ok((len, peer))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        let sent = self.inner.send_to(buf, target).await?;
        self.meters.record_download(sent);
        Ok(sent)
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }
}

/// Outcome of routing a packet connection.
#[derive(Debug)]
pub enum RoutedPacketConn<P> {
    Direct(P),
    Metered(MeteredPacketConn<P>),
}

impl<P> RoutedPacketConn<P> {
    pub fn is_metered(&self) -> bool {
        matches!(self, Self::Metered(_))
    }

    pub fn get_ref(&self) -> &P {
        match self {
            Self::Direct(inner) => inner,
            Self::Metered(metered) => metered.get_ref(),
        }
    }
}

#[async_trait]
impl<P: PacketConn> PacketConn for RoutedPacketConn<P> {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        match self {
            Self::Direct(inner) => inner.recv_from(buf).await,
            Self::Metered(metered) => metered.recv_from(buf).await,
        }
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        match self {
            Self::Direct(inner) => inner.send_to(buf, target).await,
            Self::Metered(metered) => metered.send_to(buf, target).await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        self.get_ref().local_addr()
    }
}
