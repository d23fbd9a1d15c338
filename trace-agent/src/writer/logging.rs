use super::Writer;
use crate::export::trace::{SpanData, Trace};
use chrono::{DateTime, Utc};
use itertools::Itertools;
use std::fmt::Write as _;

/// Writes every trace synchronously to the log at `info` level. Meant for
/// local debugging; nothing is sent anywhere.
#[derive(Debug, Default)]
pub struct LoggingWriter {
    _private: (),
}

impl LoggingWriter {
    pub fn new() -> Self {
        LoggingWriter::default()
    }
}

impl Writer for LoggingWriter {
    fn write(&self, trace: Trace) {
        tracing::info!(
            name: "LoggingWriter.Trace",
            target: env!("CARGO_PKG_NAME"),
            spans = trace.len() as u64,
            "write(trace): {}",
            render_trace(&trace)
        );
    }

    fn start(&self) {}

    fn close(&self) {}
}

fn render_trace(trace: &Trace) -> String {
    format!("[{}]", trace.iter().map(render_span).join(", "))
}

fn render_span(span: &SpanData) -> String {
    let start: DateTime<Utc> = span.start_time.into();
    let mut out = format!(
        "{{trace_id={}, span_id={}, parent_id={}, service={}, name={}, resource={}",
        span.trace_id,
        span.span_id,
        span.parent_id,
        span.service_name,
        span.name,
        span.resource_name(),
    );
    if let Some(span_type) = &span.span_type {
        let _ = write!(out, ", type={span_type}");
    }
    let _ = write!(
        out,
        ", start={}, duration={}us, error={}",
        start.format("%Y-%m-%d %H:%M:%S%.6f"),
        span.duration.as_micros(),
        span.error,
    );
    if !span.tags.is_empty() {
        let tags = span.tags.iter().map(|(k, v)| format!("{k}={v}")).join(", ");
        let _ = write!(out, ", tags={{{tags}}}");
    }
    if !span.metrics.is_empty() {
        let metrics = span.metrics.iter().map(|(k, v)| format!("{k}={v}")).join(", ");
        let _ = write!(out, ", metrics={{{metrics}}}");
    }
    out.push('}');
    out
}
