//! Sends a few traces to the agent configured in the environment.
//!
//! ```shell
//! DD_AGENT_HOST=localhost DD_TRACE_AGENT_PORT=8126 DD_API_TYPE=DD \
//!     cargo run --example agent_writer
//! ```
//!
//! Set `DD_WRITER_TYPE=LoggingWriter` to print the traces instead.
use std::collections::BTreeMap;
use std::thread;
use std::time::{Duration, SystemTime};
use trace_agent::config::{Config, Properties};
use trace_agent::{SpanData, SpanId, Trace, TraceId, Writer, WriterBuilder};

fn request_trace(id: u64) -> Trace {
    let start = SystemTime::now();
    let root = SpanData::builder()
        .trace_id(TraceId::from_u64(id))
        .span_id(SpanId::from_u64(id << 8))
        .name("http.request")
        .resource("GET /checkout")
        .service_name("trace-demo")
        .span_type("web")
        .start_time(start)
        .duration(Duration::from_millis(18))
        .tags(BTreeMap::from([
            ("http.method".to_string(), "GET".to_string()),
            ("span.kind".to_string(), "server".to_string()),
        ]))
        .build();
    let query = SpanData::builder()
        .trace_id(TraceId::from_u64(id))
        .span_id(SpanId::from_u64((id << 8) + 1))
        .parent_id(root.span_id)
        .name("postgres.query")
        .resource("SELECT * FROM carts WHERE id = ?")
        .service_name("trace-demo-db")
        .span_type("db")
        .start_time(start + Duration::from_millis(2))
        .duration(Duration::from_millis(11))
        .error(id % 3 == 0)
        .build();
    vec![root, query]
}

fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync + 'static>> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let config = Config::init(Properties::new().with("dd.service.name", "trace-demo"));
    let writer = WriterBuilder::for_config(Some(&*config))?;
    writer.start();

    for id in 1..=5 {
        writer.write(request_trace(id));
        thread::sleep(Duration::from_millis(100));
    }

    writer.close();
    if let Some(agent) = writer.as_agent() {
        println!("{:?}", agent.stats());
    }
    Ok(())
}
