use crate::api::{self, AppState};
use crate::config::ProxyConfig;
use crate::error::{ProxyError, Result};
use crate::nodes::NodeRegistry;
use crate::relay;
use crate::user_manager::UserManager;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tracing::{error, info};
use traffic::TrafficManager;

pub struct ProxyServer {
    config: Arc<ProxyConfig>,
    nodes: Arc<NodeRegistry>,
    users: Arc<UserManager>,
    traffic: Arc<TrafficManager>,
}

impl ProxyServer {
    pub fn new(config: ProxyConfig) -> Self {
        let nodes = NodeRegistry::from_config(&config.nodes);
        let traffic = Arc::new(TrafficManager::new(nodes.tags()));
        let users = Arc::new(UserManager::new(&config.users, traffic.clone()));

        Self {
            config: Arc::new(config),
            nodes: Arc::new(nodes),
            users,
            traffic,
        }
    }

    /// Runs every node inbound and the API until one of them fails or a
    /// shutdown signal arrives.
    pub async fn run(self) -> Result<()> {
        let mut tasks = JoinSet::new();
        let udp_timeout = Duration::from_secs(self.config.udp_session_timeout_secs);

        for node in self.nodes.iter() {
            if node.network.has_tcp() {
                tasks.spawn(relay::serve_tcp(
                    node.clone(),
                    self.users.clone(),
                    self.traffic.clone(),
                ));
            }
            if node.network.has_udp() {
                tasks.spawn(relay::serve_udp(
                    node.clone(),
                    self.traffic.clone(),
                    udp_timeout,
                ));
            }
        }

        let state = AppState {
            nodes: self.nodes.clone(),
            users: self.users.clone(),
            traffic: self.traffic.clone(),
        };
        let api_addr = self.config.api_addr.clone();
        tasks.spawn(async move { api::serve(&api_addr, state).await });

        info!("Proxy started with {} node(s)", self.nodes.iter().count());

        let result = tokio::select! {
            Some(joined) = tasks.join_next() => match joined {
                Ok(Ok(())) => {
                    error!("Server task stopped unexpectedly");
                    Ok(())
                }
                Ok(Err(e)) => {
                    error!("Server task failed: {}", e);
                    Err(e)
                }
                Err(e) => Err(ProxyError::Io(io::Error::other(e))),
            },
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                Ok(())
            }
        };

        tasks.shutdown().await;
        let global = self.traffic.read_global();
        info!(
            "Shutting down proxy, metered {} bytes up / {} bytes down",
            global.uplink, global.downlink
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{NodeConfig, NodeNetwork, NodeProtocol, UserConfig};

    fn config(api_addr: &str) -> ProxyConfig {
        let mut config: ProxyConfig = toml::from_str("").unwrap();
        config.api_addr = api_addr.to_string();
        config.nodes.push(NodeConfig {
            tag: "in-ss".to_string(),
            protocol: NodeProtocol::Tunnel,
            network: NodeNetwork::Tcp,
            listen: "127.0.0.1:0".parse().unwrap(),
            forward: "127.0.0.1:9".to_string(),
        });
        config.users.push(UserConfig {
            username: "alice".to_string(),
            secret: "psk".to_string(),
        });
        config
    }

    #[test]
    fn wires_nodes_and_users_into_traffic_manager() {
        let server = ProxyServer::new(config("127.0.0.1:0"));
        assert!(server.traffic.is_node_metered("in-ss"));
        assert!(!server.traffic.is_node_metered("other"));
        assert!(server.traffic.is_user_metered("alice"));
        assert!(server.nodes.get("in-ss").is_some());
    }

    #[tokio::test]
    async fn bind_failure_stops_server() {
        let server = ProxyServer::new(config("not-an-address"));
        assert!(server.run().await.is_err());
    }
}
