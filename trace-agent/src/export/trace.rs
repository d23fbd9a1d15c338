//! Trace exporters
use crate::error::TraceError;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt::{self, Debug};
use std::time::{Duration, SystemTime};
use typed_builder::TypedBuilder;

/// Describes the result of an export.
pub type ExportResult = Result<(), TraceError>;

/// Spans sharing one trace id, submitted to a writer as a unit.
pub type Trace = Vec<SpanData>;

/// Identifier of a trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TraceId(u64);

impl TraceId {
    /// Invalid trace id
    pub const INVALID: TraceId = TraceId(0);

    /// Create a trace id from its representation as a u64.
    pub const fn from_u64(id: u64) -> Self {
        TraceId(id)
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::LowerHex for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// Identifier of a span within its trace.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SpanId(u64);

impl SpanId {
    /// Invalid span id, also used as the parent id of root spans.
    pub const INVALID: SpanId = SpanId(0);

    /// Create a span id from its representation as a u64.
    pub const fn from_u64(id: u64) -> Self {
        SpanId(id)
    }

    pub const fn to_u64(self) -> u64 {
        self.0
    }
}

impl fmt::LowerHex for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::LowerHex::fmt(&self.0, f)
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

/// A finished span. Immutable once handed to a writer.
#[derive(TypedBuilder, Clone, Debug, PartialEq)]
pub struct SpanData {
    pub trace_id: TraceId,
    pub span_id: SpanId,
    /// [`SpanId::INVALID`] for the root span of a trace.
    #[builder(default)]
    pub parent_id: SpanId,
    /// Operation name.
    #[builder(setter(into))]
    pub name: String,
    /// Resource the operation acted on. Empty means the operation name.
    #[builder(default, setter(into))]
    pub resource: String,
    #[builder(setter(into))]
    pub service_name: String,
    /// Datadog span type (`web`, `db`, ...).
    #[builder(default, setter(strip_option, into))]
    pub span_type: Option<String>,
    pub start_time: SystemTime,
    pub duration: Duration,
    #[builder(default)]
    pub tags: BTreeMap<String, String>,
    #[builder(default)]
    pub metrics: BTreeMap<String, f64>,
    #[builder(default)]
    pub error: bool,
}

impl SpanData {
    /// The resource, falling back to the operation name.
    pub fn resource_name(&self) -> &str {
        if self.resource.is_empty() {
            &self.name
        } else {
            &self.resource
        }
    }

    /// Nanoseconds since the Unix epoch, zero for start times before it.
    pub fn start_unix_nanos(&self) -> i64 {
        self.start_time
            .duration_since(SystemTime::UNIX_EPOCH)
            .map(|since_epoch| i64::try_from(since_epoch.as_nanos()).unwrap_or(i64::MAX))
            .unwrap_or(0)
    }

    pub fn duration_nanos(&self) -> i64 {
        i64::try_from(self.duration.as_nanos()).unwrap_or(i64::MAX)
    }
}

/// `TraceExporter` defines the interface that protocol-specific exporters
/// implement so that a writer can hand them batches.
///
/// An exporter is only a wire encoder plus a transmitter. Batching, buffering
/// and scheduling all belong to the writer.
#[async_trait]
pub trait TraceExporter: Send + Debug {
    /// Exports a batch of traces.
    ///
    /// This function is never called concurrently for the same exporter
    /// instance. It can be called again only after the current call returns.
    ///
    /// This function must not block indefinitely, there must be a reasonable
    /// upper limit after which the call must time out with an error result.
    ///
    /// Failed batches are not retried.
    async fn export(&mut self, batch: Vec<Trace>) -> ExportResult;

    /// Shuts down the exporter and releases its connection. Called once, after
    /// the last export.
    fn shutdown(&mut self) {}
}

#[async_trait]
impl<T: TraceExporter + ?Sized> TraceExporter for Box<T> {
    async fn export(&mut self, batch: Vec<Trace>) -> ExportResult {
        (**self).export(batch).await
    }

    fn shutdown(&mut self) {
        (**self).shutdown()
    }
}
