use crate::error::{ProxyError, Result};
use crate::nodes::Node;
use dashmap::DashMap;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};
use traffic::{InboundMetadata, PacketConn, TrafficManager};

const MAX_DATAGRAM_SIZE: usize = 65_535;

/// Upstream side of one client peer.
struct UdpSession {
    socket: UdpSocket,
    created: Instant,
    /// Milliseconds since `created` of the last datagram in either direction
    last_seen_millis: AtomicU64,
}

impl UdpSession {
    fn touch(&self) {
        let elapsed = self.created.elapsed().as_millis() as u64;
        self.last_seen_millis.store(elapsed, Ordering::Relaxed);
    }

    fn idle_for(&self) -> Duration {
        let last_seen = Duration::from_millis(self.last_seen_millis.load(Ordering::Relaxed));
        self.created.elapsed().saturating_sub(last_seen)
    }
}

type Sessions = DashMap<SocketAddr, Arc<UdpSession>>;

pub async fn serve_udp(
    node: Node,
    traffic: Arc<TrafficManager>,
    session_timeout: Duration,
) -> Result<()> {
    let upstream_addr = tokio::net::lookup_host(&node.forward)
        .await?
        .next()
        .ok_or_else(|| {
            ProxyError::Configuration(format!("cannot resolve forward address {}", node.forward))
        })?;

    let socket = UdpSocket::bind(node.listen).await?;
    info!("Node {} accepting UDP on {}", node.tag, socket.local_addr()?);

    // Datagrams carry no identity, so the whole socket is routed once.
    let metadata = InboundMetadata::new(node.tag.clone(), None);
    let inbound = Arc::new(traffic.route_packet_connection(&metadata, socket));
    relay_datagrams(&node.tag, inbound, upstream_addr, session_timeout).await
}

/// Pause after a failed receive so a persistent socket error does not spin
/// the loop.
const RECV_BACKOFF: Duration = Duration::from_millis(100);

async fn relay_datagrams<P>(
    tag: &str,
    inbound: Arc<P>,
    upstream_addr: SocketAddr,
    session_timeout: Duration,
) -> Result<()>
where
    P: PacketConn + 'static,
{
    let sessions: Arc<Sessions> = Arc::new(DashMap::new());

    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        let (len, peer) = match inbound.recv_from(&mut buf).await {
            Ok(received) => received,
            Err(e) => {
                warn!("Node {} failed to receive datagram: {}", tag, e);
                tokio::time::sleep(RECV_BACKOFF).await;
                continue;
            }
        };

        let existing = sessions.get(&peer).map(|entry| entry.value().clone());
        let session = match existing {
            Some(session) => session,
            None => {
                let session = match open_session(upstream_addr).await {
                    Ok(session) => session,
                    Err(e) => {
                        warn!("Node {} cannot open session for {}: {}", tag, peer, e);
                        continue;
                    }
                };
                sessions.insert(peer, session.clone());
                debug!("Node {} opened UDP session for {}", tag, peer);
                tokio::spawn(relay_replies(
                    inbound.clone(),
                    sessions.clone(),
                    session.clone(),
                    peer,
                    session_timeout,
                ));
                session
            }
        };

        session.touch();
        if let Err(e) = session.socket.send(&buf[..len]).await {
            warn!("Node {} failed to forward datagram from {}: {}", tag, peer, e);
        }
    }
}

async fn open_session(upstream: SocketAddr) -> Result<Arc<UdpSession>> {
    let bind_addr: SocketAddr = if upstream.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(bind_addr).await?;
    socket.connect(upstream).await?;
    Ok(Arc::new(UdpSession {
        socket,
        created: Instant::now(),
        last_seen_millis: AtomicU64::new(0),
    }))
}

async fn relay_replies<P: PacketConn>(
    inbound: Arc<P>,
    sessions: Arc<Sessions>,
    session: Arc<UdpSession>,
    peer: SocketAddr,
    timeout: Duration,
) {
    let mut buf = vec![0u8; MAX_DATAGRAM_SIZE];
    loop {
        match tokio::time::timeout(timeout, session.socket.recv(&mut buf)).await {
            Ok(Ok(len)) => {
                session.touch();
                if let Err(e) = inbound.send_to(&buf[..len], peer).await {
                    warn!("Failed to deliver datagram to {}: {}", peer, e);
                }
            }
            Ok(Err(e)) => {
                debug!("UDP session for {} closed: {}", peer, e);
                break;
            }
            Err(_) if session.idle_for() >= timeout => {
                debug!("UDP session for {} expired", peer);
                break;
            }
            Err(_) => {}
        }
    }
    sessions.remove_if(&peer, |_, current| Arc::ptr_eq(current, &session));
}
