use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Installs the global subscriber.
///
/// With a log directory, output goes to a daily rolling file through a
/// non-blocking writer whose guard must be kept alive by the caller.
/// Otherwise logs go to stdout.
pub fn init_tracing(
    log_dir: Option<&str>,
    log_file: &str,
    log_level: &str,
    console_port: Option<u16>,
) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    #[cfg(feature = "console")]
    let console_layer = console_port.map(|port| {
        console_subscriber::ConsoleLayer::builder()
            .server_addr((std::net::Ipv4Addr::LOCALHOST, port))
            .spawn()
    });

    #[cfg(not(feature = "console"))]
    let console_layer: Option<tracing_subscriber::layer::Identity> = {
        if console_port.is_some() {
            eprintln!(
                "console_port is configured but proxy is not built with --features console; tokio-console is disabled"
            );
        }
        None
    };

    if let Some(log_dir) = log_dir {
        let file_appender = tracing_appender::rolling::daily(log_dir, log_file);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(false),
            )
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true)
                    .with_ansi(true),
            )
            .init();
        None
    }
}
