//! Logging and tracing configuration
//!
//! Console narration of check results goes through the reporter, not through
//! tracing. Tracing carries the engine's diagnostics: every attempt, every
//! retry and its classification.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Default filter for a given `-v` count
fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "conformance=warn,warn",
        1 => "conformance=info,warn",
        _ => "conformance=debug,info",
    }
}

/// Initialize tracing for a run
///
/// Logs are controlled by the `RUST_LOG` environment variable, falling back
/// to a level derived from `verbosity`. When `log_file` is given, a second
/// non-ANSI layer with full detail is written there; the returned guard must
/// be held until the process exits so buffered lines are flushed.
pub fn init(verbosity: u8, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .compact();

    let file_parts = log_file.and_then(|path| {
        let dir = path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
            .unwrap_or(Path::new("."));
        let name = path.file_name()?;
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Warning: Could not create log directory: {}", e);
            return None;
        }
        Some(tracing_appender::rolling::never(dir, name))
    });

    match file_parts {
        Some(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let file_layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .with(file_layer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(filter)
                .with(stderr_layer)
                .init();
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verbosity_raises_level() {
        assert!(default_directive(0).contains("conformance=warn"));
        assert!(default_directive(1).contains("conformance=info"));
        assert!(default_directive(5).contains("conformance=debug"));
    }
}
