use crate::error::ExportError;
use crate::export::trace::Trace;
use crate::transport::TransportError;

mod v03;
mod v05;

/// Metric key carrying the sampling decision of a span.
pub(crate) const SAMPLING_PRIORITY_KEY: &str = "_sampling_priority_v1";

/// Wrap type for errors from the datadog exporter
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// Message pack error
    #[error("message pack error")]
    MessagePackError,
    /// The batch could not be delivered to the agent
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExportError for Error {
    fn exporter_name(&self) -> &'static str {
        "datadog"
    }
}

impl From<rmp::encode::ValueWriteError> for Error {
    fn from(_: rmp::encode::ValueWriteError) -> Self {
        Self::MessagePackError
    }
}

/// Version of the Datadog agent trace intake.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ApiVersion {
    /// Version 0.3, one map per span.
    Version03,
    /// Version 0.5, a shared string table and one array per span.
    Version05,
}

impl ApiVersion {
    pub(crate) fn path(self) -> &'static str {
        match self {
            ApiVersion::Version03 => "/v0.3/traces",
            ApiVersion::Version05 => "/v0.5/traces",
        }
    }

    pub(crate) fn content_type(self) -> &'static str {
        match self {
            ApiVersion::Version03 => "application/msgpack",
            ApiVersion::Version05 => "application/msgpack",
        }
    }

    pub(crate) fn encode(self, traces: &[Trace]) -> Result<Vec<u8>, Error> {
        match self {
            Self::Version03 => v03::encode(traces),
            Self::Version05 => v05::encode(traces),
        }
    }
}
