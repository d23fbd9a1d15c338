use super::Error;
use crate::export::trace::{SpanData, Trace};

// A span is a map of 11 fields, 12 when it carries a type.
const SPAN_NUM_FIELDS: u32 = 11;

pub(crate) fn encode(traces: &[Trace]) -> Result<Vec<u8>, Error> {
    let mut encoded = Vec::new();
    rmp::encode::write_array_len(&mut encoded, traces.len() as u32)?;

    for trace in traces {
        rmp::encode::write_array_len(&mut encoded, trace.len() as u32)?;
        for span in trace {
            encode_span(&mut encoded, span)?;
        }
    }

    Ok(encoded)
}

fn encode_span(encoded: &mut Vec<u8>, span: &SpanData) -> Result<(), Error> {
    match &span.span_type {
        Some(span_type) => {
            rmp::encode::write_map_len(encoded, SPAN_NUM_FIELDS + 1)?;
            rmp::encode::write_str(encoded, "type")?;
            rmp::encode::write_str(encoded, span_type)?;
        }
        None => {
            rmp::encode::write_map_len(encoded, SPAN_NUM_FIELDS)?;
        }
    }

    rmp::encode::write_str(encoded, "service")?;
    rmp::encode::write_str(encoded, &span.service_name)?;

    rmp::encode::write_str(encoded, "name")?;
    rmp::encode::write_str(encoded, &span.name)?;

    rmp::encode::write_str(encoded, "resource")?;
    rmp::encode::write_str(encoded, span.resource_name())?;

    rmp::encode::write_str(encoded, "trace_id")?;
    rmp::encode::write_u64(encoded, span.trace_id.to_u64())?;

    rmp::encode::write_str(encoded, "span_id")?;
    rmp::encode::write_u64(encoded, span.span_id.to_u64())?;

    rmp::encode::write_str(encoded, "parent_id")?;
    rmp::encode::write_u64(encoded, span.parent_id.to_u64())?;

    rmp::encode::write_str(encoded, "start")?;
    rmp::encode::write_i64(encoded, span.start_unix_nanos())?;

    rmp::encode::write_str(encoded, "duration")?;
    rmp::encode::write_i64(encoded, span.duration_nanos())?;

    rmp::encode::write_str(encoded, "error")?;
    rmp::encode::write_i32(encoded, i32::from(span.error))?;

    rmp::encode::write_str(encoded, "meta")?;
    rmp::encode::write_map_len(encoded, span.tags.len() as u32)?;
    for (key, value) in &span.tags {
        rmp::encode::write_str(encoded, key)?;
        rmp::encode::write_str(encoded, value)?;
    }

    rmp::encode::write_str(encoded, "metrics")?;
    rmp::encode::write_map_len(encoded, span.metrics.len() as u32)?;
    for (key, value) in &span.metrics {
        rmp::encode::write_str(encoded, key)?;
        rmp::encode::write_f64(encoded, *value)?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exporter::datadog::model::tests::{get_traces, read_str};
    use std::collections::BTreeMap;
    use std::io::Cursor;

    #[derive(Debug, Default)]
    struct DecodedSpan {
        strings: BTreeMap<String, String>,
        ints: BTreeMap<String, i64>,
        meta: BTreeMap<String, String>,
        metrics: BTreeMap<String, f64>,
    }

    fn decode_span(cursor: &mut Cursor<&[u8]>) -> DecodedSpan {
        let mut span = DecodedSpan::default();
        let fields = rmp::decode::read_map_len(cursor).unwrap();
        for _ in 0..fields {
            let key = read_str(cursor);
            match key.as_str() {
                "type" | "service" | "name" | "resource" => {
                    let value = read_str(cursor);
                    span.strings.insert(key, value);
                }
                "meta" => {
                    let len = rmp::decode::read_map_len(cursor).unwrap();
                    for _ in 0..len {
                        let k = read_str(cursor);
                        let v = read_str(cursor);
                        span.meta.insert(k, v);
                    }
                }
                "metrics" => {
                    let len = rmp::decode::read_map_len(cursor).unwrap();
                    for _ in 0..len {
                        let k = read_str(cursor);
                        let v = rmp::decode::read_f64(cursor).unwrap();
                        span.metrics.insert(k, v);
                    }
                }
                "error" => {
                    let value = rmp::decode::read_i32(cursor).unwrap();
                    span.ints.insert(key, i64::from(value));
                }
                "start" | "duration" => {
                    let value = rmp::decode::read_i64(cursor).unwrap();
                    span.ints.insert(key, value);
                }
                _ => {
                    let value = rmp::decode::read_u64(cursor).unwrap();
                    span.ints.insert(key, value as i64);
                }
            }
        }
        span
    }

    #[test]
    fn spans_are_grouped_by_trace() {
        let encoded = encode(&get_traces()).unwrap();
        let mut cursor = Cursor::new(encoded.as_slice());

        assert_eq!(rmp::decode::read_array_len(&mut cursor).unwrap(), 2);
        assert_eq!(rmp::decode::read_array_len(&mut cursor).unwrap(), 2);

        let root = decode_span(&mut cursor);
        assert_eq!(root.strings["type"], "web");
        assert_eq!(root.strings["service"], "checkout");
        assert_eq!(root.strings["name"], "http.request");
        assert_eq!(root.strings["resource"], "GET /users");
        assert_eq!(root.ints["trace_id"], 7);
        assert_eq!(root.ints["span_id"], 1);
        assert_eq!(root.ints["parent_id"], 0);
        assert_eq!(root.ints["start"], 1_700_000_000_000_000_000);
        assert_eq!(root.ints["duration"], 20_000_000);
        assert_eq!(root.ints["error"], 0);
        assert_eq!(root.meta["http.method"], "GET");
        assert_eq!(root.metrics["_sampling_priority_v1"], 1.0);

        let child = decode_span(&mut cursor);
        assert!(!child.strings.contains_key("type"));
        assert_eq!(child.strings["resource"], "db.query");
        assert_eq!(child.ints["parent_id"], 1);
        assert_eq!(child.ints["error"], 1);

        assert_eq!(rmp::decode::read_array_len(&mut cursor).unwrap(), 1);
        let other = decode_span(&mut cursor);
        assert_eq!(other.ints["trace_id"], 8);
        assert_eq!(cursor.position() as usize, encoded.len());
    }
}
