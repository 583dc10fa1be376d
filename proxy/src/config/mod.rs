mod node_config;
mod proxy_config;
mod user_config;

pub use node_config::{NodeConfig, NodeNetwork, NodeProtocol};
pub use proxy_config::ProxyConfig;
pub use user_config::UserConfig;
