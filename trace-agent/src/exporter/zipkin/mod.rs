//! # Zipkin v2 exporter
//!
//! Flattens a batch into a JSON list of Zipkin v2 spans and POSTs it to the
//! collector endpoint resolved from the agent settings, honouring the
//! configured path and TLS flag.
mod model;

use crate::config::Config;
use crate::error::{ConfigError, ExportError};
use crate::export::trace::{ExportResult, Trace, TraceExporter};
use crate::transport::{AgentEndpoint, Transport, TransportError};
use async_trait::async_trait;
use http::Uri;
use std::sync::Arc;
use trace_agent_http::HttpClient;

/// Default Zipkin collector port.
pub const DEFAULT_COLLECTOR_PORT: u16 = 9411;

/// Default Zipkin collector path.
pub const DEFAULT_COLLECTOR_PATH: &str = "/api/v2/spans";

/// Wrap type for errors from the zipkin exporter
#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// The batch could not be serialized
    #[error("failed to serialize spans: {0}")]
    Json(#[from] serde_json::Error),
    /// The batch could not be delivered to the collector
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl ExportError for Error {
    fn exporter_name(&self) -> &'static str {
        "zipkin"
    }
}

/// Zipkin span exporter
#[derive(Debug)]
pub struct ZipkinExporter {
    transport: Transport,
    collector_endpoint: Uri,
}

/// Create a new Zipkin exporter builder.
pub fn new_exporter() -> ZipkinExporterBuilder {
    ZipkinExporterBuilder::default()
}

/// Builder for [`ZipkinExporter`].
#[derive(Debug, Default)]
pub struct ZipkinExporterBuilder {
    endpoint: Option<AgentEndpoint>,
    client: Option<Arc<dyn HttpClient>>,
}

impl ZipkinExporterBuilder {
    /// Send to the collector resolved from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.endpoint = Some(AgentEndpoint::from_config(
            config,
            DEFAULT_COLLECTOR_PORT,
            DEFAULT_COLLECTOR_PATH,
        ));
        self
    }

    /// Send to an explicit collector endpoint.
    pub fn with_endpoint(mut self, endpoint: AgentEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Choose the http client used to send batches.
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Share an http client with other exporters.
    pub fn with_shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn build(self) -> Result<ZipkinExporter, ConfigError> {
        let client = self.client.ok_or(ConfigError::NoHttpClient)?;
        let endpoint = self.endpoint.unwrap_or_else(|| AgentEndpoint {
            use_https: false,
            host: "localhost".to_string(),
            port: DEFAULT_COLLECTOR_PORT,
            path: DEFAULT_COLLECTOR_PATH.to_string(),
        });
        let collector_endpoint =
            endpoint
                .uri()
                .map_err(|err| ConfigError::InvalidConfiguration {
                    name: crate::config::ENDPOINT_URL,
                    value: endpoint.to_string(),
                    reason: err.to_string(),
                })?;

        Ok(ZipkinExporter {
            transport: Transport::new(client),
            collector_endpoint,
        })
    }
}

impl ZipkinExporter {
    /// Where batches are sent.
    pub fn collector_endpoint(&self) -> &Uri {
        &self.collector_endpoint
    }
}

#[async_trait]
impl TraceExporter for ZipkinExporter {
    /// Export traces to Zipkin
    async fn export(&mut self, batch: Vec<Trace>) -> ExportResult {
        let spans: Vec<model::span::Span> = batch
            .iter()
            .flatten()
            .map(model::into_zipkin_span)
            .collect();
        let payload = serde_json::to_vec(&spans).map_err(Error::from)?;
        self.transport
            .send(
                self.collector_endpoint.clone(),
                "application/json",
                &[],
                payload,
            )
            .await
            .map_err(Error::from)?;
        Ok(())
    }
}
