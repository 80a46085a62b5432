//! Logging initialization.
//!
//! Level and optional log file come from the `logging` section of the YAML
//! config; `--debug` overrides both to DEBUG on stderr. `RUST_LOG` takes
//! precedence over the configured level when set.

use std::fs::OpenOptions;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingSettings;
use crate::{Error, Result};

/// Initializes the global tracing subscriber.
///
/// # Errors
///
/// Returns [`Error::OperationFailed`] if the log file cannot be opened or a
/// subscriber is already installed.
pub fn init(settings: &LoggingSettings, debug: bool) -> Result<()> {
    let directive = if debug { "debug" } else { &settings.level };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive))
        .map_err(|e| Error::OperationFailed {
            operation: "logging filter".to_string(),
            cause: e.to_string(),
        })?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let result = match (&settings.file, debug) {
        // --debug forces stderr even when a log file is configured.
        (Some(path), false) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| Error::OperationFailed {
                    operation: format!("open log file '{}'", path.display()),
                    cause: e.to_string(),
                })?;
            builder.with_ansi(false).with_writer(Arc::new(file)).try_init()
        }
        _ => builder.with_writer(std::io::stderr).try_init(),
    };

    result.map_err(|e| Error::OperationFailed {
        operation: "init logging".to_string(),
        cause: e.to_string(),
    })
}
