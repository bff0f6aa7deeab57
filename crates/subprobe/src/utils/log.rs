use crate::Result;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::layer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Install the global subscriber. Logs go to stderr, and additionally to
/// `log_file` (without ANSI colors) when one is given.
pub fn init_tracing_subscriber(log_file: Option<&Path>) -> Result<()> {
    // base for the subscriber
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_span_events(FmtSpan::CLOSE)
        .with_writer(std::io::stderr);

    match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let filename = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "subprobe.log".to_string());

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::NEVER)
                .filename_prefix(filename)
                .build(dir)?;
            let subscriber = subscriber
                .with_ansi(false)
                .with_file(false)
                .with_target(false)
                .with_writer(file_appender)
                .finish();

            // add log in terminal as an additional layer
            let stderr_layer = layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_ansi(true)
                .with_file(false)
                .with_target(false)
                .with_writer(std::io::stderr);

            tracing::subscriber::set_global_default(subscriber.with(stderr_layer))?;
        }
        None => {
            let subscriber = subscriber
                .with_ansi(true)
                .with_file(false)
                .with_target(false)
                .finish();

            tracing::subscriber::set_global_default(subscriber)?;
        }
    }

    Ok(())
}
