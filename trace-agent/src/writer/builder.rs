use super::{AgentWriter, BatchConfig, LoggingWriter, TraceWriter};
use crate::config::{self, Config, Properties};
use crate::error::ConfigError;
use crate::exporter::{datadog, zipkin};
use crate::{agent_info, agent_warn};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use trace_agent_http::HttpClient;

/// Writer variants selectable through `writer.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WriterType {
    /// `DDAgentWriter`: batches sent to an agent or collector.
    Agent,
    /// `LoggingWriter`: traces written to the log.
    Logging,
}

impl FromStr for WriterType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            config::DD_AGENT_WRITER_TYPE => Ok(WriterType::Agent),
            config::LOGGING_WRITER_TYPE => Ok(WriterType::Logging),
            other => Err(ConfigError::InvalidConfiguration {
                name: config::WRITER_TYPE,
                value: other.to_string(),
                reason: "unknown writer type".to_string(),
            }),
        }
    }
}

/// Wire formats selectable through `api.type`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiType {
    /// `DD`: Datadog agent msgpack intake.
    Datadog,
    /// `ZipkinV2`: Zipkin v2 JSON.
    ZipkinV2,
}

impl FromStr for ApiType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            config::DD_AGENT_API_TYPE => Ok(ApiType::Datadog),
            config::ZIPKIN_V2_API_TYPE => Ok(ApiType::ZipkinV2),
            other => Err(ConfigError::InvalidConfiguration {
                name: config::API_TYPE,
                value: other.to_string(),
                reason: "unknown api type".to_string(),
            }),
        }
    }
}

/// Builds the [`TraceWriter`] a configuration asks for.
///
/// | `writer.type`   | `api.type` | writer                                   |
/// |-----------------|------------|------------------------------------------|
/// | `DDAgentWriter` | `DD`       | [`AgentWriter`] over the Datadog exporter |
/// | `DDAgentWriter` | `ZipkinV2` | [`AgentWriter`] over the Zipkin exporter  |
/// | `LoggingWriter` | ignored    | [`LoggingWriter`]                        |
/// | anything else   | ignored    | [`AgentWriter`] over the Datadog exporter, with a warning |
///
/// Any other `api.type` for an agent writer is an error.
#[derive(Debug, Default)]
pub struct WriterBuilder {
    client: Option<Arc<dyn HttpClient>>,
    batch_config: Option<BatchConfig>,
}

impl WriterBuilder {
    pub fn new() -> Self {
        WriterBuilder::default()
    }

    /// Builds the writer `config` asks for, with the built-in http client.
    /// Without a configuration an agent writer over the Datadog exporter is
    /// built from the process-wide settings.
    pub fn for_config(config: Option<&Config>) -> Result<TraceWriter, ConfigError> {
        WriterBuilder::new().build(config)
    }

    /// Builds the writer for `properties` layered over the process-wide settings.
    pub fn for_properties(properties: &Properties) -> Result<TraceWriter, ConfigError> {
        let config = Config::get_with(properties);
        WriterBuilder::new().build(Some(&*config))
    }

    /// Choose the http client used by agent writers.
    pub fn with_http_client<T: HttpClient + 'static>(mut self, client: T) -> Self {
        self.client = Some(Arc::new(client));
        self
    }

    /// Share an http client with other writers.
    pub fn with_shared_http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.client = Some(client);
        self
    }

    /// Batching parameters of agent writers, instead of the configured ones.
    pub fn with_batch_config(mut self, batch_config: BatchConfig) -> Self {
        self.batch_config = Some(batch_config);
        self
    }

    pub fn build(self, config: Option<&Config>) -> Result<TraceWriter, ConfigError> {
        let Some(config) = config else {
            agent_warn!(
                name: "WriterBuilder.MissingConfig",
                message = "no configuration given, using an agent writer with the DD api",
            );
            let root = Config::get();
            return self.agent_writer(&root, ApiType::Datadog);
        };

        let writer_type = match config.writer_type().parse::<WriterType>() {
            Ok(writer_type) => writer_type,
            Err(_) => {
                agent_warn!(
                    name: "WriterBuilder.UnknownWriterType",
                    writer_type = config.writer_type(),
                    message = "using an agent writer with the DD api",
                );
                return self.agent_writer(config, ApiType::Datadog);
            }
        };

        match writer_type {
            WriterType::Logging => {
                agent_info!(name: "WriterBuilder.LoggingWriter");
                Ok(TraceWriter::Logging(LoggingWriter::new()))
            }
            WriterType::Agent => {
                let api_type = config.api_type().parse::<ApiType>()?;
                self.agent_writer(config, api_type)
            }
        }
    }

    fn agent_writer(self, config: &Config, api_type: ApiType) -> Result<TraceWriter, ConfigError> {
        let client = match self.client {
            Some(client) => client,
            None => default_http_client(config.agent_timeout())?,
        };
        let batch_config = self
            .batch_config
            .unwrap_or_else(|| BatchConfig::from(config));

        let writer = match api_type {
            ApiType::Datadog => {
                let exporter = datadog::new_exporter()
                    .with_config(config)
                    .with_shared_http_client(client)
                    .build()?;
                AgentWriter::new(exporter, batch_config)
            }
            ApiType::ZipkinV2 => {
                let exporter = zipkin::new_exporter()
                    .with_config(config)
                    .with_shared_http_client(client)
                    .build()?;
                AgentWriter::new(exporter, batch_config)
            }
        };
        agent_info!(
            name: "WriterBuilder.AgentWriter",
            api_type = format!("{api_type:?}"),
            agent_url = config.agent_url().unwrap_or_default(),
        );
        Ok(TraceWriter::Agent(writer))
    }
}

#[cfg(all(feature = "reqwest-blocking-client", not(target_arch = "wasm32")))]
fn default_http_client(timeout: Duration) -> Result<Arc<dyn HttpClient>, ConfigError> {
    // A blocking client cannot be built from within an async runtime.
    std::thread::spawn(move || reqwest::blocking::Client::builder().timeout(timeout).build())
        .join()
        .map_err(|_| ConfigError::HttpClientBuild("client builder thread panicked".to_string()))?
        .map(|client| Arc::new(client) as Arc<dyn HttpClient>)
        .map_err(|err| ConfigError::HttpClientBuild(err.to_string()))
}

#[cfg(not(all(feature = "reqwest-blocking-client", not(target_arch = "wasm32"))))]
fn default_http_client(_timeout: Duration) -> Result<Arc<dyn HttpClient>, ConfigError> {
    Err(ConfigError::NoHttpClient)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("DDAgentWriter", Some(WriterType::Agent))]
    #[case("LoggingWriter", Some(WriterType::Logging))]
    #[case("loggingwriter", None)]
    #[case("", None)]
    fn parses_writer_types(#[case] input: &str, #[case] expected: Option<WriterType>) {
        assert_eq!(input.parse::<WriterType>().ok(), expected);
    }

    #[rstest]
    #[case("DD", Some(ApiType::Datadog))]
    #[case("ZipkinV2", Some(ApiType::ZipkinV2))]
    #[case("bogus", None)]
    fn parses_api_types(#[case] input: &str, #[case] expected: Option<ApiType>) {
        assert_eq!(input.parse::<ApiType>().ok(), expected);
    }

    #[test]
    fn unknown_api_type_names_the_setting() {
        match "bogus".parse::<ApiType>() {
            Err(ConfigError::InvalidConfiguration { name, value, .. }) => {
                assert_eq!(name, config::API_TYPE);
                assert_eq!(value, "bogus");
            }
            other => panic!("unexpected result {other:?}"),
        }
    }
}
