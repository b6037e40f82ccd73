//! Diagnostic channel.
//!
//! Operational logging goes through `tracing`. The subscriber's writer is a
//! [`DiagnosticSink`], which can only be stderr or a log file: stdout carries
//! protocol frames and is not representable here.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::Level;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt};

use super::config::LoggingConfig;
use super::error::{Error, Result};

/// Destination of diagnostic output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiagnosticSink {
    Stderr,
    File(PathBuf),
}

impl DiagnosticSink {
    pub fn from_config(config: &LoggingConfig) -> Self {
        match &config.file {
            Some(path) => Self::File(path.clone()),
            None => Self::Stderr,
        }
    }

    pub fn description(&self) -> String {
        match self {
            Self::Stderr => "stderr".to_string(),
            Self::File(path) => path.display().to_string(),
        }
    }

    /// Build the writer handed to the fmt layer. Neither variant buffers.
    fn make_writer(&self) -> Result<BoxMakeWriter> {
        match self {
            Self::Stderr => Ok(BoxMakeWriter::new(std::io::stderr)),
            Self::File(path) => Ok(BoxMakeWriter::new(Mutex::new(open_log_file(path)?))),
        }
    }
}

fn open_log_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::config(format!("cannot open log file {}: {}", path.display(), e)))
}

/// Map a configured level name to a tracing level.
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Install the global subscriber for the diagnostic channel.
///
/// `RUST_LOG` directives are honored on top of the configured level.
pub fn init(config: &LoggingConfig) -> Result<DiagnosticSink> {
    let sink = DiagnosticSink::from_config(config);
    let filter = EnvFilter::from_default_env().add_directive(parse_level(&config.level).into());

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .with_ansi(matches!(sink, DiagnosticSink::Stderr))
        .with_writer(sink.make_writer()?)
        .try_init()
        .map_err(|e| Error::internal(format!("logging already initialized: {}", e)))?;

    Ok(sink)
}
