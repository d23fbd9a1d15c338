use super::Error;
use crate::export::trace::{SpanData, Trace};
use crate::exporter::datadog::intern::StringInterner;

const SPAN_NUM_ELEMENTS: u32 = 12;

// The payload is an array of two elements:
//
//  1. An array of all unique strings of the payload, referred to by index.
//  2. An array of traces, where each trace is an array of spans. A span is an
//     array of exactly 12 elements, in this order:
//
//      0: Service   (uint32)
//      1: Name      (uint32)
//      2: Resource  (uint32)
//      3: TraceID   (uint64)
//      4: SpanID    (uint64)
//      5: ParentID  (uint64)
//      6: Start     (int64)
//      7: Duration  (int64)
//      8: Error     (int32)
//      9: Meta      (map[uint32]uint32)
//     10: Metrics   (map[uint32]float64)
//     11: Type      (uint32)
//
// No element may be nil, unset strings are the empty string.
pub(crate) fn encode(traces: &[Trace]) -> Result<Vec<u8>, Error> {
    let mut interner = StringInterner::new();
    let mut encoded_traces = encode_traces(&mut interner, traces)?;

    let mut payload = Vec::new();
    rmp::encode::write_array_len(&mut payload, 2)?;

    rmp::encode::write_array_len(&mut payload, interner.len())?;
    for data in interner.iter() {
        rmp::encode::write_str(&mut payload, data)?;
    }

    payload.append(&mut encoded_traces);

    Ok(payload)
}

fn encode_traces(interner: &mut StringInterner, traces: &[Trace]) -> Result<Vec<u8>, Error> {
    let mut encoded = Vec::new();
    rmp::encode::write_array_len(&mut encoded, traces.len() as u32)?;

    for trace in traces {
        rmp::encode::write_array_len(&mut encoded, trace.len() as u32)?;
        for span in trace {
            encode_span(&mut encoded, interner, span)?;
        }
    }

    Ok(encoded)
}

fn encode_span(
    encoded: &mut Vec<u8>,
    interner: &mut StringInterner,
    span: &SpanData,
) -> Result<(), Error> {
    let span_type = interner.intern(span.span_type.as_deref().unwrap_or_default());

    rmp::encode::write_array_len(encoded, SPAN_NUM_ELEMENTS)?;
    rmp::encode::write_u32(encoded, interner.intern(&span.service_name))?;
    rmp::encode::write_u32(encoded, interner.intern(&span.name))?;
    rmp::encode::write_u32(encoded, interner.intern(span.resource_name()))?;
    rmp::encode::write_u64(encoded, span.trace_id.to_u64())?;
    rmp::encode::write_u64(encoded, span.span_id.to_u64())?;
    rmp::encode::write_u64(encoded, span.parent_id.to_u64())?;
    rmp::encode::write_i64(encoded, span.start_unix_nanos())?;
    rmp::encode::write_i64(encoded, span.duration_nanos())?;
    rmp::encode::write_i32(encoded, i32::from(span.error))?;

    rmp::encode::write_map_len(encoded, span.tags.len() as u32)?;
    for (key, value) in &span.tags {
        rmp::encode::write_u32(encoded, interner.intern(key))?;
        rmp::encode::write_u32(encoded, interner.intern(value))?;
    }

    rmp::encode::write_map_len(encoded, span.metrics.len() as u32)?;
    for (key, value) in &span.metrics {
        rmp::encode::write_u32(encoded, interner.intern(key))?;
        rmp::encode::write_f64(encoded, *value)?;
    }

    rmp::encode::write_u32(encoded, span_type)?;
    Ok(())
}
