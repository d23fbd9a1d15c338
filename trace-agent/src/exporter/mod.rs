//! Wire encoders and collector clients.
//!
//! Each exporter implements [`TraceExporter`] over the shared [`Transport`].
//! Which one a writer uses is decided once, when the writer is built.
//!
//! [`TraceExporter`]: crate::export::trace::TraceExporter
//! [`Transport`]: crate::transport::Transport
pub mod datadog;
pub mod zipkin;
