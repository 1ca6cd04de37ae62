//! Structured logging setup (§6 `logging.level`/`logging.encoding`).

use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Installs the global `tracing` subscriber.
///
/// Precedence: `ATTACKCTL_LOG`, then `RUST_LOG`, then `level` (the suite's
/// `logging.level`), then `verbose` (`debug` vs `info`).
pub fn init_logging(verbose: bool, no_color: bool, level: Option<&str>) {
    let filter = std::env::var("ATTACKCTL_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .map_or_else(
            |_| {
                let default = level.unwrap_or(if verbose { "debug" } else { "info" });
                EnvFilter::try_new(default).unwrap_or_else(|_| EnvFilter::new("info"))
            },
            |value| EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info")),
        );

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_ansi(!no_color)
        .finish();

    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("failed to set global default subscriber: {err}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_is_idempotent() {
        init_logging(false, true, None);
        init_logging(false, true, Some("info"));
    }
}
