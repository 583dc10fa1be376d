use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::SocketAddr;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeProtocol {
    #[default]
    Tunnel,
}

impl NodeProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeProtocol::Tunnel => "tunnel",
        }
    }
}

impl fmt::Display for NodeProtocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeNetwork {
    #[default]
    Tcp,
    Udp,
    TcpUdp,
}

impl NodeNetwork {
    pub fn has_tcp(&self) -> bool {
        matches!(self, NodeNetwork::Tcp | NodeNetwork::TcpUdp)
    }

    pub fn has_udp(&self) -> bool {
        matches!(self, NodeNetwork::Udp | NodeNetwork::TcpUdp)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Unique tag; connections accepted by this node carry it as inbound tag
    pub tag: String,

    #[serde(default)]
    pub protocol: NodeProtocol,

    #[serde(default)]
    pub network: NodeNetwork,

    pub listen: SocketAddr,

    /// Upstream `host:port` every accepted connection is relayed to
    pub forward: String,
}
