mod api;
mod cli;
mod config;
mod error;
mod nodes;
mod relay;
mod server;
mod telemetry;
mod user_manager;

use anyhow::{Context, Result};
use clap::Parser;
use mimalloc::MiMalloc;
use tracing::info;

#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

fn main() -> Result<()> {
    let args = cli::CliArgs::parse();

    let mut cfg = config::ProxyConfig::load(&args.config)
        .with_context(|| format!("Failed to load configuration from {}", args.config))?;

    // Override with command line arguments
    if let Some(api_addr) = args.api_addr {
        cfg.api_addr = api_addr;
    }
    if let Some(log_level) = args.log_level {
        cfg.log_level = log_level;
    }
    if let Some(runtime_threads) = args.runtime_threads {
        cfg.runtime_threads = Some(runtime_threads);
    }

    let _guard = telemetry::init_tracing(
        cfg.log_dir(),
        &cfg.log_file,
        &cfg.log_level,
        cfg.console_port,
    );

    let mut builder = tokio::runtime::Builder::new_multi_thread();
    builder.enable_all();
    if let Some(threads) = cfg.runtime_threads {
        builder.worker_threads(threads);
    }
    let runtime = builder.build().context("Failed to build tokio runtime")?;

    info!(
        "Starting proxy: api on {}, {} node(s), {} user(s)",
        cfg.api_addr,
        cfg.nodes.len(),
        cfg.users.len()
    );
    runtime.block_on(server::ProxyServer::new(cfg).run())?;

    info!("Proxy stopped");
    Ok(())
}
