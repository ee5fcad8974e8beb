// ============================================================================
// logger.rs
// ============================================================================
//! Centralized logging configuration and initialization manager.
//!
//! The `LoggerManager` validates logging configuration and initializes
//! the global `tracing` subscriber with layers for console, append-only file
//! and/or systemd journald output. Console and file lines are stamped with
//! local `YYYY-MM-DD HH:MM:SS` time.
//!
//! File lines look like `[2025-03-14 10:02:11] MQTT connected to 192.168.106.196:1883`.
//! They are appended through a non-blocking `tracing-appender` writer. A failed
//! file write is reported on stdout and otherwise ignored, so a full disk never
//! stops scanning.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::{instrument, Event, Subscriber};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    fmt::{
        self,
        format::{FmtSpan, Writer},
        time::FormatTime,
        FmtContext, FormatEvent, FormatFields,
    },
    prelude::*,
    registry::LookupSpan,
    EnvFilter, Layer,
};
use validator::{Validate, ValidationErrors};

use crate::{
    config::{
        logger::{ConsoleConfig, LogFormat, LoggerConfig},
        timestamp,
    },
    print_info, print_warn,
};

/// Errors that can occur during logger configuration or initialization.
#[derive(Error, Debug)]
pub enum LoggerError {
    /// General initialization failure with a descriptive message.
    #[error("Logger initialization error: {0}")]
    InitializationError(String),

    /// Validation errors from the logger configuration struct.
    #[error("Logger configuration validation error: {0}")]
    ValidationError(#[from] ValidationErrors),

    /// IO error, typically during journald socket operations or while
    /// creating the log directory.
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// The log file could not be opened.
    #[error("Log file error: {0}")]
    FileError(String),

    /// No output layers were successfully configured.
    #[error("No logging layers were configured or successfully initialized")]
    NoLayersConfigured,

    /// Journald logger failed to initialize while console output is disabled.
    #[error(
        "Failed to initialize journald logger, and console logger is enabled. Please check your configuration."
    )]
    JournaldFailedWithConsoleEnabled,
}

type BoxedLayer = Box<dyn Layer<tracing_subscriber::Registry> + Send + Sync>;

/// Manages logging configuration and global subscriber initialization.
pub struct LoggerManager {
    config: LoggerConfig,

    /// Flushes the file writer when dropped; held for the process lifetime.
    file_guard: Option<WorkerGuard>,
}

impl LoggerManager {
    /// Creates a new `LoggerManager` and validates the provided configuration.
    ///
    /// # Errors
    ///
    /// Returns `LoggerError::ValidationError` if configuration validation fails.
    pub fn new(config: LoggerConfig) -> Result<Self, LoggerError> {
        config.validate()?;

        Ok(LoggerManager {
            config,
            file_guard: None,
        })
    }

    /// Initializes the global `tracing` subscriber with configured layers.
    ///
    /// Must be called once at application startup before any tracing macros
    /// are used.
    ///
    /// # Errors
    ///
    /// Returns an error if no valid layers can be created, if journald
    /// initialization fails while console output is enabled, or if a global
    /// subscriber is already installed.
    #[instrument(skip(self))]
    pub fn init(&mut self) -> Result<(), LoggerError> {
        let mut layers: Vec<BoxedLayer> = Vec::new();

        if let Some(console_config) = self.config.console.as_ref().filter(|c| c.enabled) {
            let console_layer = self.init_console_logger(console_config, self.filter())?;
            layers.push(console_layer);
        }

        if let Some(path) = self.config.file.clone() {
            // A log file that cannot be opened costs the file copy only.
            match file_writer(&path) {
                Ok((writer, guard)) => {
                    layers.push(file_layer(writer).with_filter(self.filter()).boxed());
                    self.file_guard = Some(guard);
                    print_info!("Appending log lines to {}", path.display());
                }
                Err(e) => print_warn!("Failed to open log file {}: {}", path.display(), e),
            }
        }

        // Journald layer (Linux/systemd only)
        match &self.config.journald {
            Some(journald_config) if journald_config.enabled => {
                match self.init_journald_logger(self.filter()) {
                    Ok(journald_layer) => {
                        layers.push(journald_layer);
                        print_info!(
                            "Systemd journald logger initialized with identifier: {}",
                            journald_config.identifier
                        );
                    }
                    Err(e) => {
                        print_warn!("Failed to initialize systemd journald logger: {}", e);
                        if self.config.console.as_ref().is_some_and(|c| c.enabled) {
                            return Err(LoggerError::JournaldFailedWithConsoleEnabled);
                        }
                    }
                }
            }
            _ => {}
        }

        // Ensure at least one layer is available
        if layers.is_empty() {
            print_warn!("No logging layers were initialized. Please check your configuration.");
            return Err(LoggerError::NoLayersConfigured);
        }
        tracing_subscriber::registry()
            .with(layers)
            .try_init()
            .map_err(|e| LoggerError::InitializationError(e.to_string()))
    }

    /// `RUST_LOG` when set, the configured level otherwise.
    fn filter(&self) -> EnvFilter {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.config.level))
    }

    /// Constructs a console output layer according to the provided configuration.
    fn init_console_logger(
        &self,
        config: &ConsoleConfig,
        filter: EnvFilter,
    ) -> Result<BoxedLayer, LoggerError> {
        let writer = io::stdout;
        let span_events = if config.show_spans {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };
        let layer = match config.format {
            LogFormat::Json => fmt::layer()
                .json()
                .with_timer(LocalTime)
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_timer(LocalTime)
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_timer(LocalTime)
                .with_target(config.show_target)
                .with_thread_ids(config.show_thread_ids)
                .with_span_events(span_events)
                .with_ansi(config.ansi_colors)
                .with_writer(writer)
                .with_filter(filter)
                .boxed(),
        };

        Ok(layer)
    }

    /// Constructs a journald output layer.
    fn init_journald_logger(&self, filter: EnvFilter) -> Result<BoxedLayer, LoggerError> {
        let journald_layer = tracing_journald::layer()?;
        Ok(journald_layer.with_filter(filter).boxed())
    }
}

/// Opens `path` for appending behind a non-blocking writer, creating parent
/// directories first. The guard must outlive every log call.
pub fn file_writer(path: &Path) -> Result<(NonBlocking, WorkerGuard), LoggerError> {
    let file_name = path
        .file_name()
        .ok_or_else(|| LoggerError::FileError(format!("{} names no file", path.display())))?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(dir)
        .map_err(|e| LoggerError::FileError(e.to_string()))?;

    Ok(tracing_appender::non_blocking(ReportFailures::new(appender, path)))
}

/// Builds the file output layer: one `[timestamp] message` line per event.
pub fn file_layer<S>(writer: NonBlocking) -> impl Layer<S> + Send + Sync
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .event_format(FileLineFormat)
        .with_ansi(false)
        .with_writer(writer)
}

/// Local `YYYY-MM-DD HH:MM:SS` timer for the console layer.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTime;

impl FormatTime for LocalTime {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        w.write_str(&timestamp())
    }
}

/// Event format for the log file. Level, target and spans are omitted.
#[derive(Debug, Clone, Copy, Default)]
pub struct FileLineFormat;

impl<S, N> FormatEvent<S, N> for FileLineFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        write!(writer, "[{}] ", timestamp())?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Reports write failures of the inner writer on stdout and swallows them.
///
/// Runs on the appender's worker thread, so reporting through `tracing` would
/// feed the failure back into the same writer.
pub struct ReportFailures<W> {
    inner: W,
    path: PathBuf,
}

impl<W: Write> ReportFailures<W> {
    pub fn new(inner: W, path: impl Into<PathBuf>) -> Self {
        Self {
            inner,
            path: path.into(),
        }
    }
}

impl<W: Write> Write for ReportFailures<W> {
    fn write(&mut self, bytes: &[u8]) -> io::Result<usize> {
        if let Err(e) = self.inner.write_all(bytes) {
            println!("Failed to write log file {}: {}", self.path.display(), e);
        }
        Ok(bytes.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if let Err(e) = self.inner.flush() {
            println!("Failed to flush log file {}: {}", self.path.display(), e);
        }
        Ok(())
    }
}
