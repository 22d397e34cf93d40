use std::{fs, path::Path, sync::OnceLock};

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

pub mod formatter;
pub mod writer;

pub use formatter::*;
pub use writer::*;

use crate::configs::{Config, LoggingConfig};

static FILE_WRITER: OnceLock<CircularFileWriter> = OnceLock::new();

/// Builds the filter directive from the logging section, e.g. `info,voxqueue::player=debug`.
pub fn filter_directive(logging: Option<&LoggingConfig>) -> String {
    let level = logging
        .and_then(|l| l.level.as_deref())
        .unwrap_or("info");
    let filters = logging.and_then(|l| l.filters.as_deref()).unwrap_or("");

    if filters.is_empty() {
        level.to_string()
    } else {
        format!("{},{}", level, filters)
    }
}

/// Installs the global subscriber. `RUST_LOG` takes precedence over the config file.
pub fn init(config: &Config) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(config.logging.as_ref())));

    let stdout_layer = fmt::layer()
        .event_format(LineFormatter::new(true))
        .with_ansi(true);

    let file_layer = config
        .logging
        .as_ref()
        .and_then(|l| l.file.as_ref())
        .map(|file| {
            if let Some(parent) = Path::new(&file.path).parent() {
                if let Err(e) = fs::create_dir_all(parent) {
                    eprintln!("Failed to create log directory: {}", e);
                }
            }

            let writer = FILE_WRITER
                .get_or_init(|| CircularFileWriter::new(file.path.clone(), file.max_lines))
                .clone();
            fmt::layer()
                .with_writer(writer)
                .event_format(LineFormatter::new(false))
                .with_ansi(false)
        });

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(stdout_layer)
        .with(file_layer)
        .try_init();
}
