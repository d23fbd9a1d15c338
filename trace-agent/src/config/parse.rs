//! Parsers for raw setting values.
//!
//! A value that cannot be parsed never fails the resolution: the parser logs
//! a warning naming the setting and the caller substitutes its fallback.
use crate::agent_warn;
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::fmt::Display;
use std::str::FromStr;
use url::Url;

// key(:value)?(,key:value)* with an optional trailing comma.
static MAP_GRAMMAR: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"^([^,:]+(:[^,:]*)?(,[^,:]+:[^,:]*)*,?)?$").ok());

pub(crate) fn is_blank(value: &str) -> bool {
    value.trim().is_empty()
}

pub(crate) fn parse_bool(name: &str, value: &str) -> Option<bool> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("true") {
        Some(true)
    } else if value.eq_ignore_ascii_case("false") {
        Some(false)
    } else {
        agent_warn!(
            name: "Config.InvalidBoolean",
            setting = name,
            value = value,
        );
        None
    }
}

pub(crate) fn parse_number<T>(name: &str, value: &str) -> Option<T>
where
    T: FromStr,
    T::Err: Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            agent_warn!(
                name: "Config.InvalidNumber",
                setting = name,
                value = value,
                reason = err.to_string(),
            );
            None
        }
    }
}

pub(crate) fn parse_url(name: &str, value: &str) -> Option<Url> {
    match Url::parse(value.trim()) {
        Ok(url) => Some(url),
        Err(err) => {
            agent_warn!(
                name: "Config.MalformedUrl",
                setting = name,
                value = value,
                reason = err.to_string(),
            );
            None
        }
    }
}

pub(crate) fn parse_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(String::from)
        .collect()
}

/// Parses `key1:value1,key2:value2`.
///
/// A string that does not follow the grammar yields an empty map. Entries
/// without a value, or with an empty key or value, are skipped.
pub(crate) fn parse_map(name: &str, value: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    if is_blank(value) {
        return map;
    }

    let well_formed = MAP_GRAMMAR
        .as_ref()
        .map(|grammar| grammar.is_match(value))
        .unwrap_or(false);
    if !well_formed {
        agent_warn!(
            name: "Config.MalformedMap",
            setting = name,
            value = value,
            message = "Must match 'key1:value1,key2:value2'.",
        );
        return map;
    }

    for token in value.split(',').filter(|token| !token.is_empty()) {
        let Some((key, entry_value)) = token.split_once(':') else {
            agent_warn!(
                name: "Config.MapEntryWithoutValue",
                setting = name,
                entry = token,
            );
            continue;
        };
        let (key, entry_value) = (key.trim(), entry_value.trim());
        if key.is_empty() || entry_value.is_empty() {
            agent_warn!(
                name: "Config.MapEntryIgnored",
                setting = name,
                key = key,
            );
            continue;
        }
        map.insert(key.to_string(), entry_value.to_string());
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn map(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[rstest]
    #[case("", &[])]
    #[case("   ", &[])]
    #[case("a:1", &[("a", "1")])]
    #[case("a:1,b:2", &[("a", "1"), ("b", "2")])]
    #[case("a:1,b:2,", &[("a", "1"), ("b", "2")])]
    #[case(" a : 1 , b:2", &[("a", "1"), ("b", "2")])]
    #[case("a", &[])]
    #[case("a,b:2", &[("b", "2")])]
    #[case("a:,b:2", &[("b", "2")])]
    #[case("a:1,a:2", &[("a", "2")])]
    fn parses_well_formed_maps(#[case] input: &str, #[case] expected: &[(&str, &str)]) {
        assert_eq!(parse_map("trace.span.tags", input), map(expected));
    }

    #[rstest]
    #[case("a:1:2")]
    #[case(":1")]
    #[case("a:1,,b:2")]
    #[case("a:1,b")]
    #[case(",")]
    #[case("a:1;b:2,c")]
    fn malformed_maps_degrade_to_empty(#[case] input: &str) {
        assert!(parse_map("trace.global.tags", input).is_empty());
    }

    #[test]
    fn booleans_are_case_insensitive() {
        assert_eq!(parse_bool("x", "TRUE"), Some(true));
        assert_eq!(parse_bool("x", " false "), Some(false));
        assert_eq!(parse_bool("x", "yes"), None);
    }

    #[test]
    fn numbers_fall_back_on_garbage() {
        assert_eq!(parse_number::<u16>("agent.port", "8126"), Some(8126));
        assert_eq!(parse_number::<u16>("agent.port", "eighty"), None);
        assert_eq!(parse_number::<u16>("agent.port", "70000"), None);
        assert_eq!(parse_number::<f32>("rate", "0.5"), Some(0.5));
    }

    #[test]
    fn lists_keep_order() {
        assert_eq!(parse_list("b, a,,c"), vec!["b", "a", "c"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn urls() {
        let url = parse_url("endpoint.url", "https://collector:443/api/v2/spans").unwrap();
        assert_eq!(url.host_str(), Some("collector"));
        assert!(parse_url("endpoint.url", "not a url").is_none());
    }
}
