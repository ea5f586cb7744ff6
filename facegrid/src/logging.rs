// THEORY:
// Logging is process-wide and owned by the binaries. Library code only emits
// `tracing` events; a binary calls `init` once at startup to decide where they go.
//
// Key architectural principles:
// 1.  **Environment First**: `RUST_LOG` overrides the directive the binary
//     passes in, so verbosity can change without a rebuild.
// 2.  **Two Shapes**: pretty output for a terminal, JSON lines for collection.
// 3.  **Idempotent Install**: a second `init` (tests, embedded use) is a no-op.

use tracing_subscriber::{EnvFilter, fmt};

/// Output format for the process-wide subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over `default_directive`.
///
/// Calling this twice is harmless: the second installation attempt is ignored.
pub fn init(format: LogFormat, default_directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));
    let builder = fmt().with_env_filter(filter).with_target(true);
    let result = match format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    if let Err(e) = result {
        tracing::debug!(error = %e, "tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_ignored() {
        init(LogFormat::Pretty, "debug");
        init(LogFormat::Json, "info");
        tracing::info!("still logging");
    }
}
