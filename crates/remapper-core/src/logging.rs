use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File written inside the log directory.
pub const LOG_FILE: &str = "remapper.log";

/// Directive used when `RUST_LOG` is unset or unparsable.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Keeps the file writer alive. Buffered lines are flushed on drop.
pub struct LogGuard {
    _worker: WorkerGuard,
    installed: bool,
}

impl LogGuard {
    /// Whether this call installed the global subscriber. A later call
    /// keeps the earlier subscriber and only opens the file writer.
    pub fn installed(&self) -> bool {
        self.installed
    }
}

/// Log to stdout and `<log_dir>/remapper.log` at [`DEFAULT_DIRECTIVE`].
pub fn init_logging(log_dir: &Path) -> anyhow::Result<LogGuard> {
    init_logging_with(log_dir, DEFAULT_DIRECTIVE)
}

/// Like [`init_logging`] with an explicit fallback directive such as
/// `"remapper_engine=debug"`.
pub fn init_logging_with(log_dir: &Path, directive: &str) -> anyhow::Result<LogGuard> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;

    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(directive))?;
    let (file, worker) = tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, LOG_FILE));

    let installed = match tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(file).with_ansi(false))
        .with(fmt::layer().compact().with_target(false))
        .try_init()
    {
        Ok(()) => true,
        Err(err) => {
            tracing::debug!(%err, "global subscriber already set, keeping it");
            false
        }
    };

    Ok(LogGuard {
        _worker: worker,
        installed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_creates_dir_and_is_reentrant() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("logs");
        let first = init_logging(&logs).unwrap();
        assert!(logs.is_dir());
        let second = init_logging(&logs).unwrap();
        assert!(!second.installed());
        drop(second);
        drop(first);
    }

    #[test]
    fn test_bad_directive_is_reported() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        assert!(init_logging_with(dir.path(), "remapper=notalevel").is_err());
    }
}
