//! Export pipeline of a tracing agent.
//!
//! Finished traces are handed to a [`Writer`]. The agent-backed writer
//! buffers them in a bounded queue, batches them on a dedicated thread and
//! ships each batch to a collector, encoded either in the Datadog agent
//! format or as Zipkin v2 JSON. Every decision along the way (which writer,
//! which wire format, where to send it, how much to buffer) comes from a
//! layered, immutable [`Config`].
//!
//! ```no_run
//! use trace_agent::config::Config;
//! use trace_agent::writer::{Writer, WriterBuilder};
//!
//! # fn main() -> Result<(), trace_agent::error::ConfigError> {
//! let config = Config::get();
//! let writer = WriterBuilder::for_config(Some(&*config))?;
//! writer.start();
//! // writer.write(trace) from any number of threads
//! writer.close();
//! # Ok(())
//! # }
//! ```
//!
//! # Crate Feature Flags
//!
//! * `reqwest-blocking-client`: builds a blocking `reqwest` client when the
//!   embedder does not supply an [`HttpClient`]. Enabled by default.
//! * `reqwest-rustls`: use rustls for TLS connections of the built-in client.
//! * `internal-logs`: emit the agent's own diagnostics as `tracing` events.
//!   Enabled by default.
//!
//! [`Writer`]: writer::Writer
//! [`Config`]: config::Config
//! [`HttpClient`]: trace_agent_http::HttpClient
#![warn(
    future_incompatible,
    missing_debug_implementations,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod error;
pub mod export;
pub mod exporter;
mod internal_logging;
pub mod transport;
pub mod writer;

pub use config::Config;
pub use error::{ConfigError, ExportError, TraceError, TraceResult};
pub use export::trace::{SpanData, SpanId, Trace, TraceExporter, TraceId};
pub use writer::{TraceWriter, Writer, WriterBuilder};

#[doc(hidden)]
pub mod _private {
    pub use tracing::{debug, error, info, warn};
}
