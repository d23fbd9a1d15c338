//! # Trace writers
//!
//! A [`Writer`] is where finished traces go. [`Writer::write`] never blocks
//! on I/O and never fails towards the caller: problems are logged and
//! counted instead.
//!
//! * [`AgentWriter`] buffers traces and sends them in batches from a
//!   background thread through a [`TraceExporter`].
//! * [`LoggingWriter`] writes each trace to the log as it arrives.
//!
//! [`WriterBuilder`] picks and wires one of them from a [`Config`].
//!
//! [`TraceExporter`]: crate::export::trace::TraceExporter
//! [`Config`]: crate::config::Config
use crate::export::trace::Trace;
use std::fmt::Debug;

mod agent;
mod builder;
mod logging;
mod queue;

pub use agent::{AgentWriter, AgentWriterBuilder, BatchConfig, BatchConfigBuilder, WriterStats};
pub use builder::{ApiType, WriterBuilder, WriterType};
pub use logging::LoggingWriter;

/// Receives finished traces from any number of threads.
pub trait Writer: Send + Sync + Debug {
    /// Hands over one finished trace. Returns immediately.
    fn write(&self, trace: Trace);

    /// Begins background delivery. Traces written before are discarded.
    fn start(&self);

    /// Delivers what is buffered, within a grace period, and stops. Calling
    /// it again has no effect.
    fn close(&self);
}

/// The writer chosen by [`WriterBuilder`].
#[derive(Debug)]
#[non_exhaustive]
pub enum TraceWriter {
    Agent(AgentWriter),
    Logging(LoggingWriter),
}

impl TraceWriter {
    /// The agent writer, when that is what was built.
    pub fn as_agent(&self) -> Option<&AgentWriter> {
        match self {
            TraceWriter::Agent(writer) => Some(writer),
            TraceWriter::Logging(_) => None,
        }
    }
}

impl Writer for TraceWriter {
    fn write(&self, trace: Trace) {
        match self {
            TraceWriter::Agent(writer) => writer.write(trace),
            TraceWriter::Logging(writer) => writer.write(trace),
        }
    }

    fn start(&self) {
        match self {
            TraceWriter::Agent(writer) => writer.start(),
            TraceWriter::Logging(writer) => writer.start(),
        }
    }

    fn close(&self) {
        match self {
            TraceWriter::Agent(writer) => writer.close(),
            TraceWriter::Logging(writer) => writer.close(),
        }
    }
}
