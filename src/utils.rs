use std::path::PathBuf;

use time::OffsetDateTime;

/// Timestamp source for every record the server creates.
pub fn now() -> OffsetDateTime {
    OffsetDateTime::now_utc()
}

/// Prefixed record id, e.g. `progress-1756166400000000000`.
pub fn fresh_id(prefix: &str) -> String {
    format!("{prefix}-{}", now().unix_timestamp_nanos())
}

/// Initialize logging. With a directory, logs rotate daily into it;
/// otherwise they go to stdout.
pub fn init_log(log: Option<PathBuf>) -> tracing_appender::non_blocking::WorkerGuard {
    let subscriber_builder = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with_ansi(false)
        .with_file(true)
        .with_line_number(true)
        .with_thread_names(true);
    let (non_blocking, guard) = if let Some(log) = log {
        if !log.is_dir() {
            panic!("log path is not a directory");
        }
        let file_appender = tracing_appender::rolling::daily(log, "manabi_server.log");
        tracing_appender::non_blocking(file_appender)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };
    tracing::subscriber::set_global_default(
        subscriber_builder.with_writer(non_blocking).finish(),
    )
    .expect("init log failed");
    guard
}
