//! Tracing initialisation for the CLI and embedding applications.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `default_filter`. With `log_dir` set, output goes to a
/// daily rolling file instead of stderr; keep the returned guard alive until
/// shutdown or buffered lines are lost.
pub fn init_tracing(default_filter: &str, log_json: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (writer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "harvest-client.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(env_filter);
    // try_init: a second call (tests, embedding apps) must not panic
    let _ = match (writer, log_json) {
        (Some(w), true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(w))
            .try_init(),
        (Some(w), false) => registry
            .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(w))
            .try_init(),
        (None, true) => registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .try_init(),
        (None, false) => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init(),
    };

    guard
}
