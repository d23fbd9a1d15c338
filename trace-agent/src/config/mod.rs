//! Layered configuration of the trace agent.
//!
//! A [`Config`] is an immutable snapshot. The root snapshot is resolved from
//! process-level [`Properties`] and the [`Environment`], each read under the
//! `dd.` prefix first and the `signalfx.` prefix second, falling back to the
//! hard-coded defaults. Child snapshots are layered over a parent: a value
//! from the overriding [`Properties`] wins when it is present and not blank,
//! otherwise the parent's resolved value is kept.
//!
//! ```
//! use trace_agent::config::{Config, Environment, Properties};
//!
//! let root = Config::builder()
//!     .with_environment(Environment::from_vars([("DD_SERVICE_NAME", "checkout")]))
//!     .build();
//! assert_eq!(root.service_name(), "checkout");
//!
//! let child = root.child(&Properties::new().with("service.name", "billing"));
//! assert_eq!(child.service_name(), "billing");
//! assert_eq!(child.runtime_id(), root.runtime_id());
//! ```
use crate::agent_warn;
use once_cell::sync::OnceCell;
use parse::{parse_bool, parse_list, parse_map, parse_number, parse_url};
use source::RootSources;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

mod parse;
mod source;

pub use source::{env_name, ConfigSource, Environment, Properties, ALIAS_PREFIX, PREFIX};

pub const SERVICE_NAME: &str = "service.name";
pub const SERVICE: &str = "service";
pub const WRITER_TYPE: &str = "writer.type";
pub const API_TYPE: &str = "api.type";
pub const USE_B3_PROPAGATION: &str = "b3.propagation";
pub const AGENT_HOST: &str = "agent.host";
pub const TRACE_AGENT_PORT: &str = "trace.agent.port";
pub const AGENT_PORT_LEGACY: &str = "agent.port";
pub const AGENT_PATH: &str = "agent.path";
pub const AGENT_USE_HTTPS: &str = "agent.https";
pub const ENDPOINT_URL: &str = "endpoint.url";
pub const PRIORITY_SAMPLING: &str = "priority.sampling";
pub const TRACE_RESOLVER_ENABLED: &str = "trace.resolver.enabled";
pub const SERVICE_MAPPING: &str = "service.mapping";
pub const GLOBAL_TAGS: &str = "trace.global.tags";
pub const SPAN_TAGS: &str = "trace.span.tags";
pub const METRIC_TAGS: &str = "trace.metric.tags";
pub const HEADER_TAGS: &str = "trace.header.tags";
pub const HTTP_CLIENT_HOST_SPLIT_BY_DOMAIN: &str = "trace.http.client.split-by-domain";
pub const PARTIAL_FLUSH_MIN_SPANS: &str = "trace.partial.flush.min.spans";
pub const RUNTIME_CONTEXT_FIELD_INJECTION: &str = "trace.runtime.context.field.injection";
pub const LOGS_INJECTION_ENABLED: &str = "logs.injection";
pub const WRITER_QUEUE_SIZE: &str = "writer.queue.size";
pub const WRITER_FLUSH_INTERVAL: &str = "writer.flush.interval";
pub const WRITER_BATCH_MAX_SPANS: &str = "writer.batch.max.spans";
pub const WRITER_SHUTDOWN_TIMEOUT: &str = "writer.shutdown.timeout";
pub const AGENT_TIMEOUT: &str = "agent.timeout";

pub const RUNTIME_ID_TAG: &str = "runtime-id";
pub const LANGUAGE_TAG_KEY: &str = "language";
pub const LANGUAGE_TAG_VALUE: &str = "rust";

pub const DD_AGENT_WRITER_TYPE: &str = "DDAgentWriter";
pub const LOGGING_WRITER_TYPE: &str = "LoggingWriter";
pub const DD_AGENT_API_TYPE: &str = "DD";
pub const ZIPKIN_V2_API_TYPE: &str = "ZipkinV2";

pub const DEFAULT_SERVICE_NAME: &str = "unnamed-rust-app";
pub const DEFAULT_WRITER_TYPE: &str = DD_AGENT_WRITER_TYPE;
pub const DEFAULT_API_TYPE: &str = ZIPKIN_V2_API_TYPE;
pub const DEFAULT_AGENT_ENDPOINT: &str = "http://localhost:9080/v1/trace";
pub const DEFAULT_WRITER_QUEUE_SIZE: usize = 2048;
pub const DEFAULT_WRITER_FLUSH_INTERVAL: Duration = Duration::from_millis(1000);
pub const DEFAULT_WRITER_BATCH_MAX_SPANS: usize = 512;
pub const DEFAULT_WRITER_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(5000);
pub const DEFAULT_AGENT_TIMEOUT: Duration = Duration::from_millis(10000);

static INSTANCE: OnceCell<Arc<Config>> = OnceCell::new();

/// An immutable, fully resolved configuration.
#[derive(Clone, Debug)]
pub struct Config {
    layer: Layer,
    runtime_id: String,
    settings: Settings,
}

#[derive(Clone, Debug)]
enum Layer {
    Root(Arc<RootSources>),
    Child {
        properties: Properties,
        parent: Arc<Config>,
    },
}

impl Layer {
    /// The value this layer itself holds for `name`, ignoring any parent.
    fn own(&self, name: &str) -> Option<String> {
        match self {
            Layer::Root(sources) => sources.lookup(name),
            Layer::Child { properties, .. } => properties.non_blank(name),
        }
    }

    fn string(&self, name: &str, fallback: &str) -> String {
        self.own(name).unwrap_or_else(|| fallback.to_string())
    }

    fn opt_string(&self, name: &str, fallback: Option<&String>) -> Option<String> {
        self.own(name).or_else(|| fallback.cloned())
    }

    fn boolean(&self, name: &str, fallback: bool) -> bool {
        self.opt_boolean(name, Some(fallback)).unwrap_or(fallback)
    }

    fn opt_boolean(&self, name: &str, fallback: Option<bool>) -> Option<bool> {
        self.own(name)
            .and_then(|value| parse_bool(name, &value))
            .or(fallback)
    }

    fn number<T>(&self, name: &str, fallback: T) -> T
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.own(name)
            .and_then(|value| parse_number(name, &value))
            .unwrap_or(fallback)
    }

    fn opt_number<T>(&self, name: &str, fallback: Option<T>) -> Option<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.own(name)
            .and_then(|value| parse_number(name, &value))
            .or(fallback)
    }

    fn millis(&self, name: &str, fallback: Duration) -> Duration {
        self.own(name)
            .and_then(|value| parse_number::<u64>(name, &value))
            .map(Duration::from_millis)
            .unwrap_or(fallback)
    }

    fn url(&self, name: &str, fallback: Option<&Url>) -> Option<Url> {
        self.own(name)
            .and_then(|value| parse_url(name, &value))
            .or_else(|| fallback.cloned())
    }

    fn map(&self, name: &str, fallback: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        match self.own(name) {
            Some(value) => parse_map(name, &value),
            None => fallback.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Settings {
    service_name: String,
    writer_type: String,
    api_type: String,
    b3_propagation: bool,
    agent_host: Option<String>,
    agent_port: Option<u16>,
    agent_path: Option<String>,
    agent_use_https: Option<bool>,
    endpoint_url: Option<Url>,
    priority_sampling: bool,
    trace_resolver_enabled: bool,
    service_mapping: BTreeMap<String, String>,
    global_tags: BTreeMap<String, String>,
    span_tags: BTreeMap<String, String>,
    metric_tags: BTreeMap<String, String>,
    header_tags: BTreeMap<String, String>,
    http_client_split_by_domain: bool,
    partial_flush_min_spans: u32,
    runtime_context_field_injection: bool,
    logs_injection: bool,
    writer_queue_size: usize,
    writer_flush_interval: Duration,
    writer_batch_max_spans: usize,
    writer_shutdown_timeout: Duration,
    agent_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            writer_type: DEFAULT_WRITER_TYPE.to_string(),
            api_type: DEFAULT_API_TYPE.to_string(),
            b3_propagation: true,
            agent_host: None,
            agent_port: None,
            agent_path: None,
            agent_use_https: None,
            endpoint_url: Url::parse(DEFAULT_AGENT_ENDPOINT).ok(),
            priority_sampling: false,
            trace_resolver_enabled: true,
            service_mapping: BTreeMap::new(),
            global_tags: BTreeMap::new(),
            span_tags: BTreeMap::new(),
            metric_tags: BTreeMap::new(),
            header_tags: BTreeMap::new(),
            http_client_split_by_domain: false,
            partial_flush_min_spans: 0,
            runtime_context_field_injection: true,
            logs_injection: false,
            writer_queue_size: DEFAULT_WRITER_QUEUE_SIZE,
            writer_flush_interval: DEFAULT_WRITER_FLUSH_INTERVAL,
            writer_batch_max_spans: DEFAULT_WRITER_BATCH_MAX_SPANS,
            writer_shutdown_timeout: DEFAULT_WRITER_SHUTDOWN_TIMEOUT,
            agent_timeout: DEFAULT_AGENT_TIMEOUT,
        }
    }
}

impl Settings {
    fn resolve(layer: &Layer, base: &Settings) -> Settings {
        // The legacy port key only applies when the current key is absent.
        let legacy_port = layer.opt_number(AGENT_PORT_LEGACY, base.agent_port);
        Settings {
            service_name: layer.string(SERVICE_NAME, &base.service_name),
            writer_type: layer.string(WRITER_TYPE, &base.writer_type),
            api_type: layer.string(API_TYPE, &base.api_type),
            b3_propagation: layer.boolean(USE_B3_PROPAGATION, base.b3_propagation),
            agent_host: layer.opt_string(AGENT_HOST, base.agent_host.as_ref()),
            agent_port: layer.opt_number(TRACE_AGENT_PORT, legacy_port),
            agent_path: layer.opt_string(AGENT_PATH, base.agent_path.as_ref()),
            agent_use_https: layer.opt_boolean(AGENT_USE_HTTPS, base.agent_use_https),
            endpoint_url: layer.url(ENDPOINT_URL, base.endpoint_url.as_ref()),
            priority_sampling: layer.boolean(PRIORITY_SAMPLING, base.priority_sampling),
            trace_resolver_enabled: layer
                .boolean(TRACE_RESOLVER_ENABLED, base.trace_resolver_enabled),
            service_mapping: layer.map(SERVICE_MAPPING, &base.service_mapping),
            global_tags: layer.map(GLOBAL_TAGS, &base.global_tags),
            span_tags: layer.map(SPAN_TAGS, &base.span_tags),
            metric_tags: layer.map(METRIC_TAGS, &base.metric_tags),
            header_tags: layer.map(HEADER_TAGS, &base.header_tags),
            http_client_split_by_domain: layer.boolean(
                HTTP_CLIENT_HOST_SPLIT_BY_DOMAIN,
                base.http_client_split_by_domain,
            ),
            partial_flush_min_spans: layer
                .number(PARTIAL_FLUSH_MIN_SPANS, base.partial_flush_min_spans),
            runtime_context_field_injection: layer.boolean(
                RUNTIME_CONTEXT_FIELD_INJECTION,
                base.runtime_context_field_injection,
            ),
            logs_injection: layer.boolean(LOGS_INJECTION_ENABLED, base.logs_injection),
            writer_queue_size: layer.number(WRITER_QUEUE_SIZE, base.writer_queue_size),
            writer_flush_interval: layer.millis(WRITER_FLUSH_INTERVAL, base.writer_flush_interval),
            writer_batch_max_spans: layer
                .number(WRITER_BATCH_MAX_SPANS, base.writer_batch_max_spans),
            writer_shutdown_timeout: layer
                .millis(WRITER_SHUTDOWN_TIMEOUT, base.writer_shutdown_timeout),
            agent_timeout: layer.millis(AGENT_TIMEOUT, base.agent_timeout),
        }
    }
}

/// Builds an independent root [`Config`] from explicit sources.
///
/// Unlike [`Config::get`], building never touches the process-wide instance.
#[derive(Debug, Default)]
pub struct ConfigBuilder {
    system_properties: Properties,
    environment: Option<Environment>,
}

impl ConfigBuilder {
    /// Process-level properties, keyed by prefixed name (`dd.agent.host`).
    pub fn with_system_properties(mut self, properties: Properties) -> Self {
        self.system_properties = properties;
        self
    }

    /// Use the given environment instead of capturing the process one.
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    /// Resolves every setting and returns the snapshot.
    pub fn build(self) -> Config {
        let sources = RootSources {
            system_properties: self.system_properties,
            environment: self.environment.unwrap_or_else(Environment::capture),
        };
        let layer = Layer::Root(Arc::new(sources));
        let settings = Settings::resolve(&layer, &Settings::default());
        Config {
            layer,
            runtime_id: uuid::Uuid::new_v4().to_string(),
            settings,
        }
    }
}

impl Config {
    /// Returns a builder for an independent root snapshot.
    pub fn builder() -> ConfigBuilder {
        ConfigBuilder::default()
    }

    /// Installs the process-wide root snapshot, resolved from the given
    /// system properties and the current environment.
    ///
    /// Only the first call has an effect. Later calls log a warning and return
    /// the snapshot that is already installed.
    pub fn init(system_properties: Properties) -> Arc<Config> {
        let mut installed = false;
        let config = INSTANCE.get_or_init(|| {
            installed = true;
            Arc::new(
                Config::builder()
                    .with_system_properties(system_properties)
                    .build(),
            )
        });
        if !installed {
            agent_warn!(
                name: "Config.AlreadyInitialized",
                message = "the process-wide configuration was already resolved, keeping it",
            );
        }
        config.clone()
    }

    /// Returns the process-wide root snapshot, resolving it from the current
    /// environment on first use.
    pub fn get() -> Arc<Config> {
        INSTANCE
            .get_or_init(|| Arc::new(Config::builder().build()))
            .clone()
    }

    /// Returns the root snapshot when `properties` is empty, otherwise a child
    /// of the root layered with `properties`.
    pub fn get_with(properties: &Properties) -> Arc<Config> {
        let root = Config::get();
        if properties.is_empty() {
            root
        } else {
            Arc::new(Config::with_parent(properties, root))
        }
    }

    /// Layers `properties` (unprefixed names) over `parent`.
    pub fn with_parent(properties: &Properties, parent: Arc<Config>) -> Config {
        let runtime_id = parent.runtime_id.clone();
        let layer = Layer::Child {
            properties: properties.clone(),
            parent: parent.clone(),
        };
        let settings = Settings::resolve(&layer, &parent.settings);
        Config {
            layer,
            runtime_id,
            settings,
        }
    }

    /// Convenience for [`Config::with_parent`] on a snapshot that is not
    /// shared yet.
    pub fn child(&self, properties: &Properties) -> Config {
        Config::with_parent(properties, Arc::new(self.clone()))
    }

    /// Raw value of an arbitrary setting, walking the layers from the most
    /// specific to the root sources. Blank values count as unset.
    pub fn setting(&self, name: &str) -> Option<String> {
        match &self.layer {
            Layer::Root(sources) => sources.lookup(name),
            Layer::Child { properties, parent } => properties
                .non_blank(name)
                .or_else(|| parent.setting(name)),
        }
    }

    /// [`Config::setting`] parsed as a boolean, `default` when unset or invalid.
    pub fn bool_setting(&self, name: &str, default: bool) -> bool {
        self.setting(name)
            .and_then(|value| parse_bool(name, &value))
            .unwrap_or(default)
    }

    /// [`Config::setting`] parsed as an integer, `default` when unset or invalid.
    pub fn integer_setting(&self, name: &str, default: i64) -> i64 {
        self.setting(name)
            .and_then(|value| parse_number(name, &value))
            .unwrap_or(default)
    }

    /// [`Config::setting`] parsed as a float, `default` when unset or invalid.
    pub fn float_setting(&self, name: &str, default: f64) -> f64 {
        self.setting(name)
            .and_then(|value| parse_number(name, &value))
            .unwrap_or(default)
    }

    /// [`Config::setting`] parsed as a URL, `None` when unset or malformed.
    pub fn url_setting(&self, name: &str) -> Option<Url> {
        self.setting(name)
            .and_then(|value| parse_url(name, &value))
    }

    /// [`Config::setting`] split on commas, empty when unset.
    pub fn list_setting(&self, name: &str) -> Vec<String> {
        self.setting(name)
            .map(|value| parse_list(&value))
            .unwrap_or_default()
    }

    /// [`Config::setting`] parsed as `key:value` pairs, empty when unset or
    /// malformed.
    pub fn map_setting(&self, name: &str) -> BTreeMap<String, String> {
        self.setting(name)
            .map(|value| parse_map(name, &value))
            .unwrap_or_default()
    }

    /// Whether a set of integrations is enabled through
    /// `integration.<name>.enabled`.
    ///
    /// With `default_enabled` every listed integration must stay enabled,
    /// otherwise enabling any one of them is enough.
    pub fn integration_enabled<'a, I>(&self, names: I, default_enabled: bool) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.toggles(names, default_enabled, |name| {
            format!("integration.{name}.enabled")
        })
    }

    /// Same rule as [`Config::integration_enabled`] for
    /// `integration.<name>.analytics.enabled`.
    pub fn trace_analytics_integration_enabled<'a, I>(
        &self,
        names: I,
        default_enabled: bool,
    ) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        self.toggles(names, default_enabled, |name| {
            format!("integration.{name}.analytics.enabled")
        })
    }

    fn toggles<'a, I, F>(&self, names: I, default_enabled: bool, key: F) -> bool
    where
        I: IntoIterator<Item = &'a str>,
        F: Fn(&str) -> String,
    {
        let mut names = names.into_iter();
        if default_enabled {
            names.all(|name| self.bool_setting(&key(name), default_enabled))
        } else {
            names.any(|name| self.bool_setting(&key(name), default_enabled))
        }
    }

    /// Process-scoped identifier, generated once per root snapshot.
    pub fn runtime_id(&self) -> &str {
        &self.runtime_id
    }

    pub fn service_name(&self) -> &str {
        &self.settings.service_name
    }

    pub fn writer_type(&self) -> &str {
        &self.settings.writer_type
    }

    pub fn api_type(&self) -> &str {
        &self.settings.api_type
    }

    pub fn b3_propagation(&self) -> bool {
        self.settings.b3_propagation
    }

    /// The discrete host setting, or the host of the endpoint URL.
    pub fn agent_host(&self) -> Option<&str> {
        self.settings.agent_host.as_deref().or_else(|| {
            self.settings
                .endpoint_url
                .as_ref()
                .and_then(|url| url.host_str())
        })
    }

    /// The discrete port setting, or the port of the endpoint URL (the
    /// scheme's default port when the URL names none).
    pub fn agent_port(&self) -> Option<u16> {
        self.settings.agent_port.or_else(|| {
            self.settings
                .endpoint_url
                .as_ref()
                .and_then(|url| url.port_or_known_default())
        })
    }

    /// The discrete path setting, or the path of the endpoint URL.
    pub fn agent_path(&self) -> Option<&str> {
        self.settings
            .agent_path
            .as_deref()
            .or_else(|| self.settings.endpoint_url.as_ref().map(|url| url.path()))
    }

    /// The discrete TLS flag, or whether the endpoint URL uses `https`.
    pub fn agent_use_https(&self) -> bool {
        self.settings
            .agent_use_https
            .or_else(|| {
                self.settings
                    .endpoint_url
                    .as_ref()
                    .map(|url| url.scheme() == "https")
            })
            .unwrap_or(false)
    }

    pub fn endpoint_url(&self) -> Option<&Url> {
        self.settings.endpoint_url.as_ref()
    }

    /// `scheme://host:port/path` composed from the resolved agent settings.
    pub fn agent_url(&self) -> Option<String> {
        let host = self.agent_host()?;
        let scheme = if self.agent_use_https() {
            "https"
        } else {
            "http"
        };
        let path = self.agent_path().unwrap_or_default();
        Some(match self.agent_port() {
            Some(port) => format!("{scheme}://{host}:{port}{path}"),
            None => format!("{scheme}://{host}{path}"),
        })
    }

    pub fn priority_sampling(&self) -> bool {
        self.settings.priority_sampling
    }

    pub fn trace_resolver_enabled(&self) -> bool {
        self.settings.trace_resolver_enabled
    }

    pub fn service_mapping(&self) -> &BTreeMap<String, String> {
        &self.settings.service_mapping
    }

    pub fn global_tags(&self) -> &BTreeMap<String, String> {
        &self.settings.global_tags
    }

    pub fn span_tags(&self) -> &BTreeMap<String, String> {
        &self.settings.span_tags
    }

    pub fn metric_tags(&self) -> &BTreeMap<String, String> {
        &self.settings.metric_tags
    }

    pub fn header_tags(&self) -> &BTreeMap<String, String> {
        &self.settings.header_tags
    }

    pub fn http_client_split_by_domain(&self) -> bool {
        self.settings.http_client_split_by_domain
    }

    pub fn partial_flush_min_spans(&self) -> u32 {
        self.settings.partial_flush_min_spans
    }

    pub fn runtime_context_field_injection(&self) -> bool {
        self.settings.runtime_context_field_injection
    }

    pub fn logs_injection(&self) -> bool {
        self.settings.logs_injection
    }

    pub fn writer_queue_size(&self) -> usize {
        self.settings.writer_queue_size
    }

    pub fn writer_flush_interval(&self) -> Duration {
        self.settings.writer_flush_interval
    }

    pub fn writer_batch_max_spans(&self) -> usize {
        self.settings.writer_batch_max_spans
    }

    pub fn writer_shutdown_timeout(&self) -> Duration {
        self.settings.writer_shutdown_timeout
    }

    pub fn agent_timeout(&self) -> Duration {
        self.settings.agent_timeout
    }

    /// Global tags overridden by span tags.
    ///
    /// Runtime tags are left out, they belong on the local root span only.
    pub fn merged_span_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.settings.global_tags.clone();
        tags.extend(self.settings.span_tags.clone());
        tags
    }

    /// Tags attached to runtime metrics: global, metric and runtime tags plus
    /// the service name under `service`.
    pub fn merged_metric_tags(&self) -> BTreeMap<String, String> {
        let mut tags = self.settings.global_tags.clone();
        tags.extend(self.settings.metric_tags.clone());
        tags.extend(self.runtime_tags());
        tags.insert(SERVICE.to_string(), self.settings.service_name.clone());
        tags
    }

    /// Tags linking runtime metrics to traces.
    pub fn runtime_tags(&self) -> BTreeMap<String, String> {
        BTreeMap::from([
            (RUNTIME_ID_TAG.to_string(), self.runtime_id.clone()),
            (LANGUAGE_TAG_KEY.to_string(), LANGUAGE_TAG_VALUE.to_string()),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn root_with_env(vars: &[(&str, &str)]) -> Config {
        Config::builder()
            .with_environment(Environment::from_vars(vars.iter().copied()))
            .build()
    }

    fn root_with_properties(props: &[(&str, &str)]) -> Config {
        Config::builder()
            .with_system_properties(props.iter().copied().collect())
            .with_environment(Environment::default())
            .build()
    }

    #[test]
    fn defaults() {
        let config = root_with_env(&[]);
        assert_eq!(config.service_name(), DEFAULT_SERVICE_NAME);
        assert_eq!(config.writer_type(), DD_AGENT_WRITER_TYPE);
        assert_eq!(config.api_type(), ZIPKIN_V2_API_TYPE);
        assert!(config.b3_propagation());
        assert!(!config.priority_sampling());
        assert!(config.trace_resolver_enabled());
        assert!(config.runtime_context_field_injection());
        assert!(!config.logs_injection());
        assert_eq!(config.partial_flush_min_spans(), 0);
        assert_eq!(config.writer_queue_size(), DEFAULT_WRITER_QUEUE_SIZE);
        assert_eq!(config.writer_flush_interval(), Duration::from_secs(1));
        assert_eq!(
            config.agent_url().as_deref(),
            Some("http://localhost:9080/v1/trace")
        );
        assert!(config.global_tags().is_empty());
    }

    #[test]
    fn environment_and_properties_precedence() {
        let config = Config::builder()
            .with_system_properties(Properties::new().with("dd.service.name", "from-property"))
            .with_environment(Environment::from_vars([
                ("DD_SERVICE_NAME", "from-env"),
                ("DD_WRITER_TYPE", "LoggingWriter"),
            ]))
            .build();
        assert_eq!(config.service_name(), "from-property");
        assert_eq!(config.writer_type(), LOGGING_WRITER_TYPE);
    }

    #[test]
    fn alias_prefix_is_a_fallback() {
        let config = root_with_env(&[
            ("SIGNALFX_SERVICE_NAME", "alias"),
            ("SIGNALFX_AGENT_HOST", "alias-host"),
            ("DD_AGENT_HOST", "primary-host"),
        ]);
        assert_eq!(config.service_name(), "alias");
        assert_eq!(config.agent_host(), Some("primary-host"));
    }

    #[test]
    fn overriding_layer_beats_parent_beats_default() {
        let root = root_with_properties(&[("dd.service.name", "root"), ("dd.agent.port", "8126")]);
        let child = root.child(
            &Properties::new()
                .with(SERVICE_NAME, "child")
                .with(API_TYPE, "   "),
        );
        assert_eq!(child.service_name(), "child");
        assert_eq!(child.agent_port(), Some(8126));
        assert_eq!(child.api_type(), DEFAULT_API_TYPE);

        let grandchild = Config::with_parent(
            &Properties::new().with(PRIORITY_SAMPLING, "TRUE"),
            Arc::new(child),
        );
        assert_eq!(grandchild.service_name(), "child");
        assert!(grandchild.priority_sampling());
        assert_eq!(grandchild.runtime_id(), root.runtime_id());
    }

    #[test]
    fn invalid_values_fall_back() {
        let root = root_with_properties(&[
            ("dd.trace.agent.port", "eighty"),
            ("dd.b3.propagation", "nope"),
            ("dd.writer.queue.size", "-1"),
        ]);
        assert_eq!(root.settings.agent_port, None);
        assert!(root.b3_propagation());
        assert_eq!(root.writer_queue_size(), DEFAULT_WRITER_QUEUE_SIZE);

        let parent = root_with_properties(&[("dd.trace.partial.flush.min.spans", "100")]);
        let child = parent.child(&Properties::new().with(PARTIAL_FLUSH_MIN_SPANS, "lots"));
        assert_eq!(child.partial_flush_min_spans(), 100);
    }

    #[test]
    fn legacy_port_key() {
        let legacy = root_with_properties(&[("dd.agent.port", "8126")]);
        assert_eq!(legacy.agent_port(), Some(8126));

        let both = root_with_properties(&[("dd.agent.port", "8126"), ("dd.trace.agent.port", "9126")]);
        assert_eq!(both.agent_port(), Some(9126));
    }

    #[test]
    fn discrete_agent_settings() {
        let config = root_with_properties(&[
            ("dd.agent.host", "localhost"),
            ("dd.trace.agent.port", "9080"),
            ("dd.agent.path", "/v1/trace"),
            ("dd.agent.https", "false"),
        ]);
        assert_eq!(
            config.agent_url().as_deref(),
            Some("http://localhost:9080/v1/trace")
        );
    }

    #[test]
    fn endpoint_url_decomposition() {
        let config = root_with_properties(&[("dd.endpoint.url", "https://collector:443/api/v2/spans")]);
        assert_eq!(config.agent_host(), Some("collector"));
        assert_eq!(config.agent_port(), Some(443));
        assert!(config.agent_use_https());
        assert_eq!(config.agent_path(), Some("/api/v2/spans"));
    }

    #[test]
    fn discrete_settings_beat_endpoint_url() {
        let config = root_with_properties(&[
            ("dd.endpoint.url", "https://collector:443/api/v2/spans"),
            ("dd.agent.host", "sidecar"),
            ("dd.agent.https", "false"),
        ]);
        assert_eq!(config.agent_host(), Some("sidecar"));
        assert_eq!(config.agent_port(), Some(443));
        assert!(!config.agent_use_https());
        assert_eq!(
            config.agent_url().as_deref(),
            Some("http://sidecar:443/api/v2/spans")
        );
    }

    #[rstest]
    #[case("env:prod,team:core", &[("env", "prod"), ("team", "core")])]
    #[case("env:prod,team:", &[("env", "prod")])]
    #[case("env:prod,team", &[])]
    #[case("env=prod", &[])]
    fn global_tags(#[case] raw: &str, #[case] expected: &[(&str, &str)]) {
        let config = root_with_env(&[("DD_TRACE_GLOBAL_TAGS", raw)]);
        let expected: BTreeMap<String, String> = expected
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        assert_eq!(config.global_tags(), &expected);
    }

    #[test]
    fn merged_tags() {
        let config = root_with_env(&[
            ("DD_SERVICE_NAME", "checkout"),
            ("DD_TRACE_GLOBAL_TAGS", "env:prod,team:core"),
            ("DD_TRACE_SPAN_TAGS", "team:payments"),
            ("DD_TRACE_METRIC_TAGS", "host:a"),
        ]);
        let span_tags = config.merged_span_tags();
        assert_eq!(span_tags.get("team").map(String::as_str), Some("payments"));
        assert_eq!(span_tags.get("env").map(String::as_str), Some("prod"));
        assert!(!span_tags.contains_key(RUNTIME_ID_TAG));

        let metric_tags = config.merged_metric_tags();
        assert_eq!(metric_tags.get("team").map(String::as_str), Some("core"));
        assert_eq!(metric_tags.get("host").map(String::as_str), Some("a"));
        assert_eq!(metric_tags.get(SERVICE).map(String::as_str), Some("checkout"));
        assert_eq!(
            metric_tags.get(LANGUAGE_TAG_KEY).map(String::as_str),
            Some(LANGUAGE_TAG_VALUE)
        );
        assert_eq!(
            metric_tags.get(RUNTIME_ID_TAG).map(String::as_str),
            Some(config.runtime_id())
        );
    }

    #[test]
    fn runtime_id_is_per_root() {
        let first = root_with_env(&[]);
        let second = root_with_env(&[]);
        assert_ne!(first.runtime_id(), second.runtime_id());
        assert!(uuid::Uuid::parse_str(first.runtime_id()).is_ok());
    }

    #[test]
    fn generic_settings_walk_the_layers() {
        let root = root_with_env(&[
            ("DD_INTEGRATION_GRPC_ENABLED", "false"),
            ("DD_TRACE_SAMPLE_RATE", "0.25"),
            ("DD_TRACE_CLASSES_EXCLUDE", "a.B,c.D"),
        ]);
        let child = root.child(&Properties::new().with("integration.http.enabled", "false"));

        assert_eq!(child.float_setting("trace.sample.rate", 1.0), 0.25);
        assert_eq!(child.list_setting("trace.classes.exclude"), vec!["a.B", "c.D"]);
        assert_eq!(child.integer_setting("missing", 7), 7);

        assert!(!child.integration_enabled(["grpc", "netty"], true));
        assert!(child.integration_enabled(["netty"], true));
        assert!(root.integration_enabled(["http"], true));
        assert!(!child.integration_enabled(["http"], true));
        assert!(!child.trace_analytics_integration_enabled(["grpc"], false));
    }

    #[test]
    fn get_with_empty_properties_returns_root() {
        temp_env::with_vars([("DD_SERVICE_NAME", Some("singleton"))], || {
            let root = Config::get();
            assert!(Arc::ptr_eq(&root, &Config::get_with(&Properties::new())));

            let child = Config::get_with(&Properties::new().with(SERVICE_NAME, "child"));
            assert!(!Arc::ptr_eq(&root, &child));
            assert_eq!(child.service_name(), "child");
            assert_eq!(child.runtime_id(), root.runtime_id());
        });
    }
}
