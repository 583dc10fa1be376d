use crate::config::{NodeConfig, NodeNetwork, NodeProtocol};
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;

/// A managed inbound listener. Immutable for the process lifetime.
#[derive(Debug, Clone)]
pub struct Node {
    pub tag: String,
    pub protocol: NodeProtocol,
    pub network: NodeNetwork,
    pub listen: SocketAddr,
    pub forward: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TunnelNodeObject<'a> {
    tag: &'a str,
    network: NodeNetwork,
    listen: SocketAddr,
    forward: &'a str,
}

impl Node {
    pub fn id(&self) -> &str {
        &self.tag
    }

    /// Protocol-specific description exposed by the management API.
    pub fn descriptor(&self) -> Value {
        match self.protocol {
            NodeProtocol::Tunnel => serde_json::to_value(TunnelNodeObject {
                tag: &self.tag,
                network: self.network,
                listen: self.listen,
                forward: &self.forward,
            })
            .unwrap_or(Value::Null),
        }
    }
}

impl From<&NodeConfig> for Node {
    fn from(config: &NodeConfig) -> Self {
        Self {
            tag: config.tag.clone(),
            protocol: config.protocol,
            network: config.network,
            listen: config.listen,
            forward: config.forward.clone(),
        }
    }
}

/// The node list known at startup.
#[derive(Debug, Default)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn from_config(configs: &[NodeConfig]) -> Self {
        Self::new(configs.iter().map(Node::from).collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn get(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|node| node.id() == id)
    }

    pub fn tags(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.tag.as_str())
    }

    /// Distinct protocols in declaration order.
    pub fn protocols(&self) -> Vec<NodeProtocol> {
        let mut protocols = Vec::new();
        for node in &self.nodes {
            if !protocols.contains(&node.protocol) {
                protocols.push(node.protocol);
            }
        }
        protocols
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(tag: &str) -> Node {
        Node {
            tag: tag.to_string(),
            protocol: NodeProtocol::Tunnel,
            network: NodeNetwork::TcpUdp,
            listen: "127.0.0.1:8388".parse().unwrap(),
            forward: "127.0.0.1:5201".to_string(),
        }
    }

    #[test]
    fn lookup_by_id() {
        let registry = NodeRegistry::new(vec![node("a"), node("b")]);
        assert_eq!(registry.get("b").map(|n| n.tag.as_str()), Some("b"));
        assert!(registry.get("c").is_none());
        assert_eq!(registry.tags().collect::<Vec<_>>(), vec!["a", "b"]);
    }

    #[test]
    fn protocols_are_distinct() {
        let registry = NodeRegistry::new(vec![node("a"), node("b")]);
        assert_eq!(registry.protocols(), vec![NodeProtocol::Tunnel]);
        assert!(NodeRegistry::default().protocols().is_empty());
    }

    #[test]
    fn descriptor_describes_tunnel() {
        let descriptor = node("a").descriptor();
        assert_eq!(descriptor["tag"], "a");
        assert_eq!(descriptor["network"], "tcp_udp");
        assert_eq!(descriptor["listen"], "127.0.0.1:8388");
        assert_eq!(descriptor["forward"], "127.0.0.1:5201");
    }
}
