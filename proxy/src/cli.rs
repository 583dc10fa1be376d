use clap::Parser;

#[derive(Parser, Debug)]
#[command(name = "traffic-proxy")]
#[command(author, version, about = "Tunnel proxy with per-user traffic accounting", long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, env = "PROXY_CONFIG", default_value = "proxy.toml")]
    pub config: String,

    /// Override management API listen address
    #[arg(long, env = "PROXY_API_ADDR")]
    pub api_addr: Option<String>,

    /// Override log level (trace, debug, info, warn, error)
    #[arg(long, env = "PROXY_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Override number of runtime worker threads
    #[arg(long)]
    pub runtime_threads: Option<usize>,
}
