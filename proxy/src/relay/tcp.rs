use crate::error::{ProxyError, Result};
use crate::nodes::Node;
use crate::user_manager::UserManager;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufRead, AsyncReadExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};
use traffic::{InboundMetadata, TrafficManager};

const MAX_HEADER_LEN: usize = 512;
const HEADER_TIMEOUT: Duration = Duration::from_secs(10);
/// Pause after a failed accept so fd exhaustion does not spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

pub async fn serve_tcp(
    node: Node,
    users: Arc<UserManager>,
    traffic: Arc<TrafficManager>,
) -> Result<()> {
    let listener = TcpListener::bind(node.listen).await?;
    info!("Node {} accepting TCP on {}", node.tag, listener.local_addr()?);
    let node = Arc::new(node);

    loop {
        let (stream, addr) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Node {} failed to accept connection: {}", node.tag, e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
                continue;
            }
        };
        debug!("Node {} accepted connection from {}", node.tag, addr);

        let node = node.clone();
        let users = users.clone();
        let traffic = traffic.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, addr, &node, &users, &traffic).await {
                warn!("Node {} connection from {} failed: {}", node.tag, addr, e);
            }
        });
    }
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    node: &Node,
    users: &UserManager,
    traffic: &TrafficManager,
) -> Result<()> {
    let mut reader = BufReader::new(stream);
    let user = match read_header_within(&mut reader, HEADER_TIMEOUT).await? {
        Some((username, secret)) => {
            if !users.authenticate(&username, &secret) {
                return Err(ProxyError::Authentication(format!(
                    "invalid credentials for {}",
                    username
                )));
            }
            Some(username)
        }
        None => None,
    };

    let metadata = InboundMetadata::new(node.tag.clone(), user);
    let mut inbound = traffic.route_connection(&metadata, reader);

    let mut upstream = TcpStream::connect(&node.forward).await.map_err(|e| {
        error!("Node {} failed to reach {}: {}", node.tag, node.forward, e);
        e
    })?;

    let (up, down) = tokio::io::copy_bidirectional(&mut inbound, &mut upstream).await?;
    debug!(
        "Connection {} ({:?}) closed: {} bytes up, {} bytes down",
        addr, metadata.user(), up, down
    );
    Ok(())
}

/// Reads the header, giving up if the client has not sent a full line
/// before `limit` elapses.
async fn read_header_within<R>(reader: &mut R, limit: Duration) -> Result<Option<(String, String)>>
where
    R: AsyncBufRead + Unpin,
{
    tokio::time::timeout(limit, read_header(reader))
        .await
        .map_err(|_| ProxyError::Authentication("header timed out".to_string()))?
}

/// Reads the `<username> <secret>\n` header. An empty line is an anonymous
/// client.
async fn read_header<R>(reader: &mut R) -> Result<Option<(String, String)>>
where
    R: AsyncBufRead + Unpin,
{
    let mut line = Vec::with_capacity(64);
    loop {
        let byte = reader.read_u8().await?;
        if byte == b'\n' {
            break;
        }
        if line.len() == MAX_HEADER_LEN {
            return Err(ProxyError::Authentication("header too long".to_string()));
        }
        line.push(byte);
    }
    if line.last() == Some(&b'\r') {
        line.pop();
    }

    let line = String::from_utf8(line)
        .map_err(|_| ProxyError::Authentication("header is not UTF-8".to_string()))?;
    if line.is_empty() {
        return Ok(None);
    }
    match line.split_once(' ') {
        Some((username, secret)) if !username.is_empty() => {
            Ok(Some((username.to_string(), secret.to_string())))
        }
        _ => Err(ProxyError::Authentication("malformed header".to_string())),
    }
}
