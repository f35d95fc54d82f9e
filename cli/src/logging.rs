//! Log output for the `pdc` executable.
//!
//! `pdc_core` logs through the `log` facade. The subscriber installed here bridges those
//! records into `tracing` and writes them to stderr or to an hourly rolling file.

use std::error::Error;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";
const LOG_FILE_NAME: &str = "pdc.log";

/// Installs the global subscriber.
///
/// `RUST_LOG` overrides `default_filter`. With `log_dir` set, output goes to
/// `log_dir/pdc.log.<hour>` and the returned guard must be held until exit so buffered
/// lines are flushed.
pub fn init_logging(
    log_dir: Option<&Path>,
    default_filter: Option<&str>,
) -> Result<Option<WorkerGuard>, Box<dyn Error>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter.unwrap_or(DEFAULT_FILTER)));

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let file_appender = tracing_appender::rolling::hourly(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true)
                .try_init()
                .map_err(|e| e as Box<dyn Error>)?;
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .try_init()
                .map_err(|e| e as Box<dyn Error>)?;
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_subscriber_is_an_error() {
        // Another test may already own the global subscriber.
        let _ = init_logging(None, Some("debug"));
        assert!(init_logging(None, Some("debug")).is_err());
    }
}
