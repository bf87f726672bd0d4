use color_eyre::{eyre::eyre, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Environment variable holding the log filter (e.g. `shellcache=debug`).
const LOG_ENV: &str = "SHELLCACHE_LOG";

/// Log to stderr and to a daily-rolling file in `log_dir`, both filtered by
/// `SHELLCACHE_LOG`.
///
/// The returned guard flushes the file writer when dropped; keep it alive
/// for the whole run.
pub fn init(log_dir: &Path) -> Result<WorkerGuard> {
  std::fs::create_dir_all(log_dir)
    .map_err(|e| eyre!("Failed to create log directory {}: {}", log_dir.display(), e))?;

  let (writer, guard) =
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, "shellcache.log"));

  let directives = std::env::var(LOG_ENV).ok();

  tracing_subscriber::registry()
    .with(
      fmt::layer()
        .with_ansi(false)
        .with_writer(writer)
        .with_filter(log_filter(directives.as_deref())),
    )
    .with(
      fmt::layer()
        .with_writer(std::io::stderr)
        .with_filter(log_filter(directives.as_deref())),
    )
    .try_init()
    .map_err(|e| eyre!("Failed to initialize logging: {}", e))?;

  Ok(guard)
}

/// Parse filter directives, falling back to `info` when unset or unparsable.
fn log_filter(directives: Option<&str>) -> EnvFilter {
  directives
    .and_then(|d| EnvFilter::try_new(d).ok())
    .unwrap_or_else(|| EnvFilter::new("info"))
}

#[cfg(test)]
mod tests {
  use super::*;
  use tracing_subscriber::filter::LevelFilter;

  #[test]
  fn test_log_filter_defaults_to_info() {
    assert_eq!(log_filter(None).max_level_hint(), Some(LevelFilter::INFO));
  }

  #[test]
  fn test_log_filter_uses_directives() {
    assert_eq!(
      log_filter(Some("debug")).max_level_hint(),
      Some(LevelFilter::DEBUG)
    );
    assert_eq!(
      log_filter(Some("warn")).max_level_hint(),
      Some(LevelFilter::WARN)
    );
  }
}
