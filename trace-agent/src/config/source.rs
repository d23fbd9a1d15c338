//! Where raw settings come from.
use super::parse::is_blank;
use std::collections::HashMap;
use std::env;

/// Primary prefix of every setting name.
pub const PREFIX: &str = "dd.";
/// Alias prefix consulted when no primary-prefixed value exists.
pub const ALIAS_PREFIX: &str = "signalfx.";

/// A flat source of raw settings.
pub trait ConfigSource {
    /// Returns the raw value stored under `key`, if any.
    fn get(&self, key: &str) -> Option<String>;
}

/// String-keyed properties, used both as process-level system properties and
/// as per-call overriding layers.
///
/// Keys of system properties carry their prefix (`dd.service.name`), keys of
/// an overriding layer do not (`service.name`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Properties(HashMap<String, String>);

impl Properties {
    /// Creates an empty set of properties.
    pub fn new() -> Self {
        Properties::default()
    }

    /// Stores `value` under `key`, replacing any previous value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    /// Builder flavour of [`Properties::set`].
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(key, value);
        self
    }

    /// Returns `true` if no property is set.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub(crate) fn non_blank(&self, key: &str) -> Option<String> {
        self.0.get(key).filter(|value| !is_blank(value)).cloned()
    }
}

impl ConfigSource for Properties {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).cloned()
    }
}

impl<K, V> FromIterator<(K, V)> for Properties
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Properties(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// Environment variables, looked up by the derived variable name of a
/// setting.
///
/// The environment is captured once, when the snapshot is built; later
/// changes to the process environment are not observed.
#[derive(Clone, Debug, Default)]
pub struct Environment(HashMap<String, String>);

impl Environment {
    /// Captures the variables of the current process that carry one of the
    /// recognized prefixes.
    pub fn capture() -> Self {
        let prefixes = [env_name(PREFIX), env_name(ALIAS_PREFIX)];
        Environment(
            env::vars()
                .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p.as_str())))
                .collect(),
        )
    }

    /// Uses a fixed set of variables instead of the process environment.
    pub fn from_vars<K, V, I>(vars: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        Environment(
            vars.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

impl ConfigSource for Environment {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(&env_name(key)).cloned()
    }
}

/// Derives the environment variable name of a prefixed setting name:
/// upper-cased, with every character outside `[A-Za-z0-9_]` replaced by `_`.
pub fn env_name(setting: &str) -> String {
    setting
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// System properties layered over the environment, under both prefixes.
#[derive(Clone, Debug, Default)]
pub(crate) struct RootSources {
    pub(crate) system_properties: Properties,
    pub(crate) environment: Environment,
}

impl RootSources {
    /// Resolves an unprefixed setting name.
    ///
    /// Order: `dd.` property, `DD_` variable, `signalfx.` property,
    /// `SIGNALFX_` variable. Blank values count as unset.
    pub(crate) fn lookup(&self, name: &str) -> Option<String> {
        [PREFIX, ALIAS_PREFIX].iter().find_map(|prefix| {
            let key = format!("{prefix}{name}");
            self.system_properties
                .non_blank(&key)
                .or_else(|| self.environment.get(&key).filter(|v| !is_blank(v)))
        })
    }
}
