//! # Datadog agent exporter
//!
//! Encodes batches in the agent's MessagePack formats and POSTs them to
//! `http(s)://{host}:{port}/v0.X/traces`. The intake version is discovered
//! on first use: an empty v0.5 payload is sent, a 404 or 415 answer selects
//! v0.3. That answer is kept until the agent becomes unreachable, then
//! discovered again on the next batch. A probe failing any other way sends
//! the batch as v0.3 and probes again next time.
mod intern;
mod model;

pub use model::{ApiVersion, Error};

use crate::agent_debug;
use crate::agent_warn;
use crate::config::Config;
use crate::error::ConfigError;
use crate::export::trace::{ExportResult, Trace, TraceExporter};
use crate::transport::{AgentEndpoint, Transport, TransportError};
use async_trait::async_trait;
use http::StatusCode;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use trace_agent_http::{Bytes, HttpClient};

/// Default port of the Datadog agent.
pub const DEFAULT_AGENT_PORT: u16 = 8126;

/// Header name used to inform the Datadog agent of the number of traces in the payload
const DATADOG_TRACE_COUNT_HEADER: &str = "X-Datadog-Trace-Count";
const DATADOG_META_LANG_HEADER: &str = "Datadog-Meta-Lang";
const DATADOG_META_TRACER_VERSION_HEADER: &str = "Datadog-Meta-Tracer-Version";

#[derive(Debug, Default, Deserialize)]
struct AgentResponse {
    #[serde(default)]
    rate_by_service: BTreeMap<String, f64>,
}

/// Datadog span exporter
#[derive(Debug)]
pub struct DatadogExporter {
    transport: Transport,
    endpoint: AgentEndpoint,
    version: Option<ApiVersion>,
    pinned: bool,
    rate_by_service: BTreeMap<String, f64>,
}

/// Create a new Datadog exporter builder.
pub fn new_exporter() -> DatadogExporterBuilder {
    DatadogExporterBuilder::default()
}

/// Builder for [`DatadogExporter`].
#[derive(Debug, Default)]
pub struct DatadogExporterBuilder {
    endpoint: Option<AgentEndpoint>,
    version: Option<ApiVersion>,
    client: Option<Arc<dyn HttpClient>>,
}

impl DatadogExporterBuilder {
    /// Send to the agent resolved from `config`.
    pub fn with_config(mut self, config: &Config) -> Self {
        self.endpoint = Some(AgentEndpoint::from_config(config, DEFAULT_AGENT_PORT, "/"));
        self
    }

    /// Send to an explicit agent endpoint. Its path is ignored, every intake
    /// version has its own.
    pub fn with_endpoint(mut self, endpoint: AgentEndpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }

    /// Skip discovery and always use `version`.
    pub fn with_api_version(mut self, version: ApiVersion) -> Self {
        self.version = Some(version);
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

    pub fn build(self) -> Result<DatadogExporter, ConfigError> {
        let client = self.client.ok_or(ConfigError::NoHttpClient)?;
        let endpoint = self.endpoint.unwrap_or_else(|| AgentEndpoint {
            use_https: false,
            host: "localhost".to_string(),
            port: DEFAULT_AGENT_PORT,
            path: "/".to_string(),
        });
        if let Err(err) = endpoint.uri_for(ApiVersion::Version05.path()) {
            return Err(ConfigError::InvalidConfiguration {
                name: crate::config::AGENT_HOST,
                value: endpoint.base_uri(),
                reason: err.to_string(),
            });
        }

        Ok(DatadogExporter {
            transport: Transport::new(client),
            endpoint,
            version: self.version,
            pinned: self.version.is_some(),
            rate_by_service: BTreeMap::new(),
        })
    }
}

impl DatadogExporter {
    /// The intake version in use, `None` until it has been discovered.
    pub fn api_version(&self) -> Option<ApiVersion> {
        self.version
    }

    /// Sampling rates per service, as last reported by the agent.
    pub fn rate_by_service(&self) -> &BTreeMap<String, f64> {
        &self.rate_by_service
    }

    async fn send(
        &self,
        version: ApiVersion,
        traces: &[Trace],
    ) -> Result<Bytes, Error> {
        let payload = version.encode(traces)?;
        let uri = self
            .endpoint
            .uri_for(version.path())
            .map_err(TransportError::from)?;
        let headers = [
            (DATADOG_TRACE_COUNT_HEADER, traces.len().to_string()),
            (DATADOG_META_LANG_HEADER, crate::config::LANGUAGE_TAG_VALUE.to_string()),
            (
                DATADOG_META_TRACER_VERSION_HEADER,
                env!("CARGO_PKG_VERSION").to_string(),
            ),
        ];
        let response = self
            .transport
            .send(uri, version.content_type(), &headers, payload)
            .await?;
        Ok(response.into_body())
    }

    /// `None` when the probe gave no definitive answer.
    async fn discover(&self) -> Option<ApiVersion> {
        let probe = ApiVersion::Version05;
        match self.send(probe, &[]).await {
            Ok(_) => Some(probe),
            Err(Error::Transport(TransportError::Status(status)))
                if status == StatusCode::NOT_FOUND
                    || status == StatusCode::UNSUPPORTED_MEDIA_TYPE =>
            {
                agent_debug!(
                    name: "DatadogExporter.V05Unsupported",
                    status = status.as_u16(),
                );
                Some(ApiVersion::Version03)
            }
            Err(err) => {
                agent_warn!(
                    name: "DatadogExporter.DiscoveryFailed",
                    endpoint = self.endpoint.base_uri(),
                    reason = err.to_string(),
                );
                None
            }
        }
    }

    fn record_response(&mut self, body: &[u8]) -> Result<(), Error> {
        let text = String::from_utf8_lossy(body);
        let text = text.trim();
        // v0.3 agents answer with a bare "OK".
        if text.is_empty() || text == "OK" {
            return Ok(());
        }
        let response: AgentResponse = serde_json::from_str(text)
            .map_err(|err| TransportError::MalformedResponse(err.to_string()))?;
        if !response.rate_by_service.is_empty() {
            agent_debug!(
                name: "DatadogExporter.RatesUpdated",
                services = response.rate_by_service.len() as u64,
            );
            self.rate_by_service = response.rate_by_service;
        }
        Ok(())
    }
}

#[async_trait]
impl TraceExporter for DatadogExporter {
    /// Export traces to the datadog-agent
    async fn export(&mut self, batch: Vec<Trace>) -> ExportResult {
        let version = match self.version {
            Some(version) => version,
            None => match self.discover().await {
                Some(discovered) => {
                    agent_debug!(
                        name: "DatadogExporter.VersionDiscovered",
                        path = discovered.path(),
                    );
                    self.version = Some(discovered);
                    discovered
                }
                None => ApiVersion::Version03,
            },
        };

        match self.send(version, &batch).await {
            Ok(body) => Ok(self.record_response(&body)?),
            Err(Error::Transport(err)) => {
                if err.is_connection_failure() && !self.pinned {
                    self.version = None;
                }
                Err(Error::Transport(err).into())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::trace::tests::get_span;
    use crate::TraceError;
    use futures_executor::block_on;
    use http::{Request, Response};
    use std::sync::Mutex;
    use trace_agent_http::HttpError;

    /// Answers with scripted statuses and bodies, recording every request.
    #[derive(Debug, Default)]
    struct ScriptedClient {
        answers: Mutex<Vec<Result<(StatusCode, &'static str), std::io::ErrorKind>>>,
        requests: Mutex<Vec<Request<Bytes>>>,
    }

    impl ScriptedClient {
        fn new(answers: Vec<Result<(StatusCode, &'static str), std::io::ErrorKind>>) -> Arc<Self> {
            Arc::new(ScriptedClient {
                answers: Mutex::new(answers.into_iter().rev().collect()),
                requests: Mutex::default(),
            })
        }

        fn paths(&self) -> Vec<String> {
            self.requests
                .lock()
                .unwrap()
                .iter()
                .map(|r| r.uri().path().to_string())
                .collect()
        }
    }

    #[async_trait]
    impl HttpClient for ScriptedClient {
        async fn send_bytes(&self, request: Request<Bytes>) -> Result<Response<Bytes>, HttpError> {
            self.requests.lock().unwrap().push(request);
            match self.answers.lock().unwrap().pop() {
                Some(Ok((status, body))) => Ok(Response::builder()
                    .status(status)
                    .body(Bytes::from_static(body.as_bytes()))?),
                Some(Err(kind)) => Err(Box::new(std::io::Error::from(kind))),
                None => Ok(Response::builder().status(200).body(Bytes::new())?),
            }
        }
    }

    fn exporter(client: Arc<ScriptedClient>) -> DatadogExporter {
        new_exporter()
            .with_shared_http_client(client)
            .build()
            .unwrap()
    }

    #[test]
    fn discovers_v05_once() {
        let client = ScriptedClient::new(vec![
            Ok((StatusCode::OK, "{}")),
            Ok((StatusCode::OK, r#"{"rate_by_service":{"service:checkout,env:":0.5}}"#)),
            Ok((StatusCode::OK, "{}")),
        ]);
        let mut exporter = exporter(client.clone());

        block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap();
        block_on(exporter.export(vec![vec![get_span(2, 0, 2)]])).unwrap();

        assert_eq!(exporter.api_version(), Some(ApiVersion::Version05));
        assert_eq!(
            client.paths(),
            vec!["/v0.5/traces", "/v0.5/traces", "/v0.5/traces"]
        );
        assert_eq!(
            exporter.rate_by_service().get("service:checkout,env:"),
            Some(&0.5)
        );

        let requests = client.requests.lock().unwrap();
        let headers = requests[1].headers();
        assert_eq!(headers[DATADOG_TRACE_COUNT_HEADER], "1");
        assert_eq!(headers[DATADOG_META_LANG_HEADER], "rust");
        assert_eq!(headers[http::header::CONTENT_TYPE], "application/msgpack");
    }

    #[test]
    fn falls_back_to_v03_when_v05_is_unknown() {
        let client = ScriptedClient::new(vec![
            Ok((StatusCode::NOT_FOUND, "")),
            Ok((StatusCode::OK, "OK")),
        ]);
        let mut exporter = exporter(client.clone());

        block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap();

        assert_eq!(exporter.api_version(), Some(ApiVersion::Version03));
        assert_eq!(client.paths(), vec!["/v0.5/traces", "/v0.3/traces"]);
    }

    #[test]
    fn connection_failure_resets_discovery() {
        let client = ScriptedClient::new(vec![
            Ok((StatusCode::OK, "")),
            Err(std::io::ErrorKind::ConnectionRefused),
            Ok((StatusCode::UNSUPPORTED_MEDIA_TYPE, "")),
            Ok((StatusCode::OK, "")),
        ]);
        let mut exporter = exporter(client.clone());

        let err = block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap_err();
        assert!(matches!(err, TraceError::ExportFailed(_)));
        assert_eq!(exporter.api_version(), None);

        block_on(exporter.export(vec![vec![get_span(2, 0, 2)]])).unwrap();
        assert_eq!(exporter.api_version(), Some(ApiVersion::Version03));
    }

    #[test]
    fn inconclusive_probe_is_retried() {
        let client = ScriptedClient::new(vec![
            Ok((StatusCode::SERVICE_UNAVAILABLE, "")),
            Ok((StatusCode::OK, "OK")),
            Ok((StatusCode::OK, "")),
            Ok((StatusCode::OK, "{}")),
        ]);
        let mut exporter = exporter(client.clone());

        block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap();
        assert_eq!(exporter.api_version(), None);

        block_on(exporter.export(vec![vec![get_span(2, 0, 2)]])).unwrap();
        assert_eq!(exporter.api_version(), Some(ApiVersion::Version05));
        assert_eq!(
            client.paths(),
            vec!["/v0.5/traces", "/v0.3/traces", "/v0.5/traces", "/v0.5/traces"]
        );
    }

    #[test]
    fn pinned_version_skips_discovery() {
        let client = ScriptedClient::new(vec![Ok((StatusCode::SERVICE_UNAVAILABLE, ""))]);
        let mut exporter = new_exporter()
            .with_shared_http_client(client.clone())
            .with_api_version(ApiVersion::Version03)
            .build()
            .unwrap();

        let err = block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap_err();
        assert!(err.to_string().contains("503"));
        assert_eq!(client.paths(), vec!["/v0.3/traces"]);
    }

    #[test]
    fn malformed_agent_response_fails_the_batch() {
        let client = ScriptedClient::new(vec![Ok((StatusCode::OK, "<html>proxy</html>"))]);
        let mut exporter = new_exporter()
            .with_shared_http_client(client)
            .with_api_version(ApiVersion::Version05)
            .build()
            .unwrap();

        let err = block_on(exporter.export(vec![vec![get_span(1, 0, 1)]])).unwrap_err();
        assert!(err.to_string().contains("malformed response"));
    }

    #[test]
    fn missing_client_is_a_configuration_error() {
        assert!(matches!(
            new_exporter().build(),
            Err(ConfigError::NoHttpClient)
        ));
    }
}
