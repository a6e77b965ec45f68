use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Installs the global subscriber. `RUST_LOG` wins over `default_level`.
/// With `log_dir`, events go to a daily rolling file instead of stderr and
/// the returned guard must be held until exit to flush them.
pub fn init(log_dir: Option<&Path>, default_level: &str) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir: {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "keycheck.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .try_init()
                .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;
            Ok(Some(guard))
        }
        None => {
            fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| anyhow::anyhow!("install subscriber: {}", e))?;
            Ok(None)
        }
    }
}
