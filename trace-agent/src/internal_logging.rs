//! Diagnostics of the pipeline itself: degraded configuration, dropped
//! traces, failed or abandoned batches.
//!
//! Every event carries a stable `name` (`AgentWriter.BatchFailed`) and
//! optional `key = value` fields. With the `internal-logs` feature the events
//! go to `tracing` under the crate's target; under `cfg(test)` they are also
//! printed so `--nocapture` shows them. Without either, the arguments are
//! evaluated and discarded.
//!
//! These macros are for the agent's own use, not for application logging.
#![allow(unused_macros)]

#[doc(hidden)]
#[macro_export]
macro_rules! __agent_event {
    ($level:ident, $label:literal, $name:expr $(, $key:ident = $value:expr)*) => {{
        #[cfg(feature = "internal-logs")]
        {
            $crate::_private::$level!(name: $name, target: env!("CARGO_PKG_NAME"), name = $name $(, $key = $value)*);
        }

        #[cfg(test)]
        {
            print!("{}: name={}", $label, $name);
            $(
                print!(", {}={}", stringify!($key), $value);
            )*
            println!();
        }

        #[cfg(all(not(feature = "internal-logs"), not(test)))]
        {
            let _ = ($name $(, $value)*);
        }
    }};
}

/// Informational event, e.g. a writer starting.
///
/// ```rust
/// use trace_agent::agent_info;
/// agent_info!(name: "writer_start", queue_size = 2048);
/// ```
#[macro_export]
macro_rules! agent_info {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__agent_event!(info, "agent_info", $name $(, $key = $value)*)
    };
}

/// Something degraded but the pipeline keeps going: an invalid setting that
/// fell back, a dropped trace, a failed batch.
///
/// ```rust
/// use trace_agent::agent_warn;
/// agent_warn!(name: "config_invalid", setting = "agent.port", value = "eighty");
/// ```
#[macro_export]
macro_rules! agent_warn {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__agent_event!(warn, "agent_warn", $name $(, $key = $value)*)
    };
}

/// Per-batch detail, e.g. the discovered intake version.
///
/// ```rust
/// use trace_agent::agent_debug;
/// agent_debug!(name: "batch_sent", traces = 12);
/// ```
#[macro_export]
macro_rules! agent_debug {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__agent_event!(debug, "agent_debug", $name $(, $key = $value)*)
    };
}

/// The pipeline lost data it could not account for otherwise, e.g. a close
/// that gave up on the final send.
///
/// ```rust
/// use trace_agent::agent_error;
/// agent_error!(name: "writer_shutdown_timeout", timeout_ms = 5000);
/// ```
#[macro_export]
macro_rules! agent_error {
    (name: $name:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::__agent_event!(error, "agent_error", $name $(, $key = $value)*)
    };
}
