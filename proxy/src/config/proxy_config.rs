use super::{NodeConfig, UserConfig};
use crate::error::ProxyError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    /// Management API listen address
    #[serde(default = "default_api_addr")]
    pub api_addr: String,

    #[serde(default)]
    pub console_port: Option<u16>,

    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log directory for file-based logging, empty to log to stdout
    #[serde(default = "default_log_dir")]
    pub log_dir: String,

    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Number of Tokio runtime worker threads (defaults to CPU cores)
    #[serde(default)]
    pub runtime_threads: Option<usize>,

    /// Idle time after which a UDP relay session is dropped
    #[serde(default = "default_udp_session_timeout_secs")]
    pub udp_session_timeout_secs: u64,

    #[serde(default)]
    pub nodes: Vec<NodeConfig>,

    #[serde(default)]
    pub users: Vec<UserConfig>,
}

fn default_api_addr() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_log_file() -> String {
    "traffic-proxy.log".to_string()
}

fn default_udp_session_timeout_secs() -> u64 {
    120
}

impl ProxyConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: ProxyConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ProxyError> {
        let mut tags = HashSet::new();
        for node in &self.nodes {
            if node.tag.is_empty() {
                return Err(ProxyError::Configuration("node tag is empty".to_string()));
            }
            if !tags.insert(node.tag.as_str()) {
                return Err(ProxyError::Configuration(format!(
                    "duplicate node tag: {}",
                    node.tag
                )));
            }
            if node.forward.is_empty() {
                return Err(ProxyError::Configuration(format!(
                    "node {} has no forward address",
                    node.tag
                )));
            }
        }

        let mut usernames = HashSet::new();
        for user in &self.users {
            if user.username.is_empty() {
                return Err(ProxyError::Configuration("username is empty".to_string()));
            }
            if !usernames.insert(user.username.as_str()) {
                return Err(ProxyError::Configuration(format!(
                    "duplicate user: {}",
                    user.username
                )));
            }
        }
        Ok(())
    }

    pub fn log_dir(&self) -> Option<&str> {
        if self.log_dir.is_empty() {
            None
        } else {
            Some(&self.log_dir)
        }
    }
}
