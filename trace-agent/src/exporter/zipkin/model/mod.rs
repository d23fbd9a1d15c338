use crate::export::trace::{SpanData, SpanId};
use std::collections::BTreeMap;

pub(crate) mod endpoint;
pub(crate) mod span;

use endpoint::Endpoint;

const SPAN_KIND_TAG: &str = "span.kind";
const SPAN_TYPE_TAG: &str = "span.type";
const RESOURCE_NAME_TAG: &str = "resource.name";
const ERROR_TAG: &str = "error";
const ERROR_MESSAGE_TAG: &str = "error.msg";

/// Converts a [`SpanData`] into the Zipkin v2 model.
///
/// The span kind comes from the `span.kind` tag. Metrics become string tags,
/// and error spans get an `error` tag holding their message, or `true`.
pub(crate) fn into_zipkin_span(span_data: &SpanData) -> span::Span {
    let mut tags: BTreeMap<String, String> = span_data
        .tags
        .iter()
        .filter(|(key, _)| key.as_str() != SPAN_KIND_TAG && key.as_str() != ERROR_TAG)
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    for (key, value) in &span_data.metrics {
        tags.entry(key.clone()).or_insert_with(|| value.to_string());
    }
    if let Some(span_type) = &span_data.span_type {
        tags.insert(SPAN_TYPE_TAG.to_string(), span_type.clone());
    }
    if !span_data.resource.is_empty() && span_data.resource != span_data.name {
        tags.insert(RESOURCE_NAME_TAG.to_string(), span_data.resource.clone());
    }
    if span_data.error {
        let message = span_data
            .tags
            .get(ERROR_MESSAGE_TAG)
            .cloned()
            .unwrap_or_else(|| "true".to_string());
        tags.insert(ERROR_TAG.to_string(), message);
    }

    let parent_id = (span_data.parent_id != SpanId::INVALID).then(|| span_data.parent_id.to_string());

    span::Span::builder()
        .trace_id(span_data.trace_id.to_string())
        .parent_id(parent_id)
        .id(span_data.span_id.to_string())
        .kind(
            span_data
                .tags
                .get(SPAN_KIND_TAG)
                .and_then(|kind| span::Kind::from_tag(kind)),
        )
        .name(span_data.name.clone())
        .timestamp(u64::try_from(span_data.start_unix_nanos() / 1_000).unwrap_or_default())
        .duration(u64::try_from(span_data.duration.as_micros()).unwrap_or(u64::MAX))
        .local_endpoint(Endpoint::new(span_data.service_name.clone()))
        .tags(tags)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::trace::tests::get_span;

    #[test]
    fn tags_carry_kind_type_and_resource() {
        let mut span_data = get_span(7, 0, 1);
        span_data.tags.insert(SPAN_KIND_TAG.to_string(), "server".to_string());
        span_data.span_type = Some("web".to_string());
        span_data.metrics.insert("rows".to_string(), 3.0);

        let span = into_zipkin_span(&span_data);
        assert_eq!(span.kind(), Some(&span::Kind::Server));
        let tags = span.tags();
        assert!(!tags.contains_key(SPAN_KIND_TAG));
        assert_eq!(tags[SPAN_TYPE_TAG], "web");
        assert_eq!(tags[RESOURCE_NAME_TAG], "GET /users");
        assert_eq!(tags["rows"], "3");
        assert_eq!(tags["http.method"], "GET");
        assert!(!tags.contains_key(ERROR_TAG));
    }

    #[test]
    fn error_spans() {
        let mut with_message = get_span(7, 1, 2);
        with_message.error = true;
        with_message.tags.insert(ERROR_MESSAGE_TAG.to_string(), "timeout".to_string());
        assert_eq!(into_zipkin_span(&with_message).tags()[ERROR_TAG], "timeout");

        let mut bare = get_span(7, 1, 3);
        bare.error = true;
        bare.tags.insert(ERROR_TAG.to_string(), "ignored".to_string());
        assert_eq!(into_zipkin_span(&bare).tags()[ERROR_TAG], "true");
    }

    #[test]
    fn json_shape() {
        let span = into_zipkin_span(&get_span(7, 1, 2));
        let json: serde_json::Value = serde_json::to_value(&span).unwrap();
        assert_eq!(json["traceId"], "0000000000000007");
        assert_eq!(json["parentId"], "0000000000000001");
        assert_eq!(json["id"], "0000000000000002");
        assert_eq!(json["timestamp"], 1_700_000_000_000_000u64);
        assert_eq!(json["duration"], 20_000);
        assert_eq!(json["localEndpoint"]["serviceName"], "checkout");
        assert!(json.get("kind").is_none());

        let root = serde_json::to_value(into_zipkin_span(&get_span(7, 0, 1))).unwrap();
        assert!(root.get("parentId").is_none());
    }
}
