//! Errors produced by the export pipeline.
//!
//! None of these ever reach producer threads through [`Writer::write`]; they
//! are surfaced to callers that explicitly ask for an outcome (the factory,
//! [`AgentWriter::shutdown`], [`AgentWriter::force_flush`]) and are otherwise
//! logged and counted.
//!
//! [`Writer::write`]: crate::writer::Writer::write
//! [`AgentWriter::shutdown`]: crate::writer::AgentWriter::shutdown
//! [`AgentWriter::force_flush`]: crate::writer::AgentWriter::force_flush
use std::time;
use thiserror::Error;

/// Trait for errors returned by exporters.
pub trait ExportError: std::error::Error + Send + Sync + 'static {
    /// The name of exporter that returned this error
    fn exporter_name(&self) -> &'static str;
}

/// A specialized `Result` type for writer and exporter operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Errors returned while exporting traces or driving a writer.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum TraceError {
    /// Export failed with the error returned by the exporter
    #[error("Exporter {name} encountered the following error(s): {0}", name = .0.exporter_name())]
    ExportFailed(Box<dyn ExportError>),

    /// Export failed to finish after certain period and the writer stopped waiting.
    #[error("Exporting timed out after {} ms", .0.as_millis())]
    ExportTimedOut(time::Duration),

    /// The writer was already closed.
    #[error("writer already closed")]
    AlreadyShutdown,

    /// The writer was never started.
    #[error("writer not started")]
    NotStarted,

    /// Other errors that weren't covered above
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl<T> From<T> for TraceError
where
    T: ExportError,
{
    fn from(err: T) -> Self {
        TraceError::ExportFailed(Box::new(err))
    }
}

impl From<String> for TraceError {
    fn from(err_msg: String) -> Self {
        TraceError::Other(err_msg.into())
    }
}

impl From<&'static str> for TraceError {
    fn from(err_msg: &'static str) -> Self {
        TraceError::Other(err_msg.into())
    }
}

/// Errors raised while turning a configuration snapshot into a writer.
///
/// These are the only fatal errors of the pipeline: they are returned at
/// construction and no writer exists afterwards.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// A setting holds a value the factory cannot act on.
    #[error("invalid configuration for {name}: '{value}' ({reason})")]
    InvalidConfiguration {
        /// The configuration name.
        name: &'static str,
        /// The offending value.
        value: String,
        /// Why the value was refused.
        reason: String,
    },

    /// No HTTP client was supplied and no client feature is enabled.
    #[error("http client must be set, users can enable the reqwest-blocking-client feature to use the built-in client")]
    NoHttpClient,

    /// The built-in HTTP client could not be created.
    #[error("cannot create http client: {0}")]
    HttpClientBuild(String),
}
