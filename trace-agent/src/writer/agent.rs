//! The agent-backed writer.
//!
//! Producer threads only ever touch the [`TraceQueue`]. One dedicated thread
//! per writer drains it, cuts batches when they reach the span threshold or
//! when the flush interval elapses, and hands each batch to the exporter.
//! Sending blocks that thread and nothing else.
use super::queue::{ControlMessage, PushOutcome, TraceQueue, Wake};
use super::Writer;
use crate::config::Config;
use crate::error::{TraceError, TraceResult};
use crate::export::trace::{Trace, TraceExporter};
use crate::{agent_debug, agent_error, agent_info, agent_warn};
use futures_executor::block_on;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

const CREATED: u8 = 0;
const RUNNING: u8 = 1;
const CLOSED: u8 = 2;

/// Shortest flush interval; a zero interval would keep the worker spinning.
const MIN_SCHEDULED_DELAY: Duration = Duration::from_millis(10);

/// Batching parameters of an [`AgentWriter`].
/// Use [`BatchConfigBuilder`] to configure your own instance of [`BatchConfig`].
#[derive(Clone, Debug)]
pub struct BatchConfig {
    /// Traces buffered between producers and the worker. When full, the
    /// oldest trace is dropped. The default value is 2048.
    pub(crate) max_queue_size: usize,

    /// The longest a partial batch waits before it is sent. The default
    /// value is 1 second, the minimum 10 milliseconds.
    pub(crate) scheduled_delay: Duration,

    /// Spans that trigger sending the current batch. A single trace with more
    /// spans is sent on its own. The default value is 512.
    pub(crate) max_export_batch_size: usize,

    /// Grace period of [`AgentWriter::close`] and wait limit of
    /// [`AgentWriter::force_flush`]. The default value is 5 seconds.
    pub(crate) shutdown_timeout: Duration,
}

impl Default for BatchConfig {
    fn default() -> Self {
        BatchConfigBuilder::default().build()
    }
}

impl From<&Config> for BatchConfig {
    fn from(config: &Config) -> Self {
        BatchConfigBuilder::default()
            .with_max_queue_size(config.writer_queue_size())
            .with_scheduled_delay(config.writer_flush_interval())
            .with_max_export_batch_size(config.writer_batch_max_spans())
            .with_shutdown_timeout(config.writer_shutdown_timeout())
            .build()
    }
}

impl BatchConfig {
    pub fn max_queue_size(&self) -> usize {
        self.max_queue_size
    }

    pub fn scheduled_delay(&self) -> Duration {
        self.scheduled_delay
    }

    pub fn max_export_batch_size(&self) -> usize {
        self.max_export_batch_size
    }

    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }
}

/// A builder for creating [`BatchConfig`] instances.
#[derive(Debug)]
pub struct BatchConfigBuilder {
    max_queue_size: usize,
    scheduled_delay: Duration,
    max_export_batch_size: usize,
    shutdown_timeout: Duration,
}

impl Default for BatchConfigBuilder {
    fn default() -> Self {
        BatchConfigBuilder {
            max_queue_size: crate::config::DEFAULT_WRITER_QUEUE_SIZE,
            scheduled_delay: crate::config::DEFAULT_WRITER_FLUSH_INTERVAL,
            max_export_batch_size: crate::config::DEFAULT_WRITER_BATCH_MAX_SPANS,
            shutdown_timeout: crate::config::DEFAULT_WRITER_SHUTDOWN_TIMEOUT,
        }
    }
}

impl BatchConfigBuilder {
    /// Set max_queue_size for [`BatchConfigBuilder`].
    pub fn with_max_queue_size(mut self, max_queue_size: usize) -> Self {
        self.max_queue_size = max_queue_size;
        self
    }

    /// Set scheduled_delay for [`BatchConfigBuilder`].
    pub fn with_scheduled_delay(mut self, scheduled_delay: Duration) -> Self {
        self.scheduled_delay = scheduled_delay;
        self
    }

    /// Set max_export_batch_size for [`BatchConfigBuilder`].
    pub fn with_max_export_batch_size(mut self, max_export_batch_size: usize) -> Self {
        self.max_export_batch_size = max_export_batch_size;
        self
    }

    /// Set shutdown_timeout for [`BatchConfigBuilder`].
    pub fn with_shutdown_timeout(mut self, shutdown_timeout: Duration) -> Self {
        self.shutdown_timeout = shutdown_timeout;
        self
    }

    /// Builds a `BatchConfig` enforcing the following invariants:
    /// * `max_queue_size` and `max_export_batch_size` are at least 1.
    /// * `scheduled_delay` is at least 10 milliseconds.
    ///
    /// The queue holds traces while the batch threshold counts spans, so the
    /// two are independent.
    pub fn build(self) -> BatchConfig {
        BatchConfig {
            max_queue_size: self.max_queue_size.max(1),
            scheduled_delay: self.scheduled_delay.max(MIN_SCHEDULED_DELAY),
            max_export_batch_size: self.max_export_batch_size.max(1),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

/// Counters of an [`AgentWriter`], as returned by [`AgentWriter::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Traces admitted into the queue.
    pub traces_accepted: u64,
    /// Traces evicted from a full queue, or discarded by a `close` that gave
    /// up waiting.
    pub traces_dropped: u64,
    /// Traces discarded because the writer was not running.
    pub traces_rejected: u64,
    /// Batches the collector accepted.
    pub batches_sent: u64,
    /// Batches that failed, including a send cut short by `close`.
    pub batches_failed: u64,
    /// Traces contained in the batches the collector accepted.
    pub traces_sent: u64,
}

#[derive(Debug, Default)]
struct Counters {
    traces_accepted: AtomicU64,
    traces_dropped: AtomicU64,
    traces_rejected: AtomicU64,
    batches_sent: AtomicU64,
    batches_failed: AtomicU64,
    traces_sent: AtomicU64,
    // Set when `close` gave up waiting; the worker stops sending.
    abandoned: AtomicBool,
}

impl Counters {
    fn snapshot(&self) -> WriterStats {
        WriterStats {
            traces_accepted: self.traces_accepted.load(Ordering::Relaxed),
            traces_dropped: self.traces_dropped.load(Ordering::Relaxed),
            traces_rejected: self.traces_rejected.load(Ordering::Relaxed),
            batches_sent: self.batches_sent.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            traces_sent: self.traces_sent.load(Ordering::Relaxed),
        }
    }
}

/// An asynchronous writer sending batches through a [`TraceExporter`] from a
/// dedicated background thread.
pub struct AgentWriter {
    queue: Arc<TraceQueue>,
    state: AtomicU8,
    exporter: Mutex<Option<Box<dyn TraceExporter>>>,
    handle: Mutex<Option<thread::JoinHandle<()>>>,
    counters: Arc<Counters>,
    config: BatchConfig,
}

impl fmt::Debug for AgentWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentWriter")
            .field("state", &self.state.load(Ordering::Relaxed))
            .field("queued", &self.queue.len())
            .field("stats", &self.counters.snapshot())
            .field("config", &self.config)
            .finish()
    }
}

impl AgentWriter {
    /// Creates a writer in the *Created* state. Nothing is sent before
    /// [`Writer::start`].
    pub fn new<E>(exporter: E, config: BatchConfig) -> Self
    where
        E: TraceExporter + 'static,
    {
        AgentWriter {
            queue: Arc::new(TraceQueue::new(config.max_queue_size)),
            state: AtomicU8::new(CREATED),
            exporter: Mutex::new(Some(Box::new(exporter))),
            handle: Mutex::new(None),
            counters: Arc::new(Counters::default()),
            config,
        }
    }

    /// builder
    pub fn builder<E>(exporter: E) -> AgentWriterBuilder<E>
    where
        E: TraceExporter + 'static,
    {
        AgentWriterBuilder {
            exporter,
            config: BatchConfig::default(),
        }
    }

    pub fn batch_config(&self) -> &BatchConfig {
        &self.config
    }

    /// Snapshot of the writer's counters.
    pub fn stats(&self) -> WriterStats {
        self.counters.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.state.load(Ordering::Acquire) == RUNNING
    }

    /// Sends the partial batch now and waits, up to the shutdown timeout,
    /// for the outcome.
    pub fn force_flush(&self) -> TraceResult<()> {
        match self.state.load(Ordering::Acquire) {
            CREATED => return Err(TraceError::NotStarted),
            CLOSED => return Err(TraceError::AlreadyShutdown),
            _ => {}
        }
        let (sender, receiver) = sync_channel(1);
        self.queue
            .signal(ControlMessage::Flush(sender))
            .map_err(|_| TraceError::AlreadyShutdown)?;

        receiver
            .recv_timeout(self.config.shutdown_timeout)
            .map_err(|_| TraceError::ExportTimedOut(self.config.shutdown_timeout))?
    }

    /// Stops accepting traces, sends what is buffered and releases the
    /// exporter. Waits at most the shutdown timeout; a send still running
    /// after that is abandoned and counted as failed.
    pub fn shutdown(&self) -> TraceResult<()> {
        match self.state.swap(CLOSED, Ordering::AcqRel) {
            CLOSED => return Err(TraceError::AlreadyShutdown),
            CREATED => {
                if let Some(mut exporter) = self.take_exporter() {
                    exporter.shutdown();
                }
                return Ok(());
            }
            _ => {}
        }

        let (sender, receiver) = sync_channel(1);
        self.queue
            .signal(ControlMessage::Shutdown(sender))
            .map_err(|_| TraceError::AlreadyShutdown)?;

        let result = match receiver.recv_timeout(self.config.shutdown_timeout) {
            Ok(result) => {
                if let Some(handle) = self.take_handle() {
                    let _ = handle.join();
                }
                result
            }
            Err(RecvTimeoutError::Timeout) => {
                self.counters.abandoned.store(true, Ordering::Release);
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                // Detach the worker, it exits once the send returns.
                drop(self.take_handle());
                agent_error!(
                    name: "AgentWriter.ShutdownTimedOut",
                    timeout_ms = self.config.shutdown_timeout.as_millis() as u64,
                );
                Err(TraceError::ExportTimedOut(self.config.shutdown_timeout))
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(TraceError::Other("writer thread exited unexpectedly".into()))
            }
        };

        let stats = self.stats();
        if stats.traces_dropped > 0 {
            agent_warn!(
                name: "AgentWriter.TracesDropped",
                dropped = stats.traces_dropped,
                message = "traces were dropped because the writer queue was full",
            );
        }
        result
    }

    fn take_exporter(&self) -> Option<Box<dyn TraceExporter>> {
        self.exporter
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn take_handle(&self) -> Option<thread::JoinHandle<()>> {
        self.handle
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    fn reject(&self) {
        if self.counters.traces_rejected.fetch_add(1, Ordering::Relaxed) == 0 {
            agent_warn!(
                name: "AgentWriter.TraceRejected",
                message = "trace written while the writer is not running, dropping it. Further rejections are only counted.",
            );
        }
    }
}

impl Writer for AgentWriter {
    fn write(&self, trace: Trace) {
        if self.state.load(Ordering::Acquire) != RUNNING {
            self.reject();
            return;
        }
        match self.queue.push(trace) {
            PushOutcome::Accepted => {
                self.counters.traces_accepted.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::EvictedOldest => {
                self.counters.traces_accepted.fetch_add(1, Ordering::Relaxed);
                // The first time we have to drop a trace, emit a warning.
                if self.counters.traces_dropped.fetch_add(1, Ordering::Relaxed) == 0 {
                    agent_warn!(
                        name: "AgentWriter.TraceDroppingStarted",
                        message = "writer queue is full, dropping the oldest traces. No further warning is emitted until close, which reports the total count.",
                    );
                }
            }
            PushOutcome::Closed => self.reject(),
        }
    }

    fn start(&self) {
        if self
            .state
            .compare_exchange(CREATED, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            agent_debug!(name: "AgentWriter.AlreadyStarted");
            return;
        }
        let Some(exporter) = self.take_exporter() else {
            self.state.store(CLOSED, Ordering::Release);
            return;
        };

        let worker = Worker {
            exporter,
            queue: self.queue.clone(),
            counters: self.counters.clone(),
            config: self.config.clone(),
        };
        match thread::Builder::new()
            .name("trace-agent-writer".to_string())
            .spawn(move || worker.run())
        {
            Ok(handle) => {
                *self
                    .handle
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
                agent_info!(
                    name: "AgentWriter.Started",
                    max_queue_size = self.config.max_queue_size as u64,
                    max_export_batch_size = self.config.max_export_batch_size as u64,
                    scheduled_delay_ms = self.config.scheduled_delay.as_millis() as u64,
                );
            }
            Err(err) => {
                self.state.store(CLOSED, Ordering::Release);
                agent_error!(
                    name: "AgentWriter.ThreadSpawnFailed",
                    reason = err.to_string(),
                );
            }
        }
    }

    fn close(&self) {
        match self.shutdown() {
            Ok(()) | Err(TraceError::AlreadyShutdown) => {}
            Err(err) => {
                agent_warn!(name: "AgentWriter.CloseFailed", reason = err.to_string());
            }
        }
    }
}

impl Drop for AgentWriter {
    fn drop(&mut self) {
        if self.state.load(Ordering::Acquire) != CLOSED {
            self.close();
        }
    }
}

/// Builder for [`AgentWriter`].
#[derive(Debug)]
pub struct AgentWriterBuilder<E>
where
    E: TraceExporter + 'static,
{
    exporter: E,
    config: BatchConfig,
}

impl<E> AgentWriterBuilder<E>
where
    E: TraceExporter + 'static,
{
    /// Set the BatchConfig for [`AgentWriterBuilder`]
    pub fn with_batch_config(self, config: BatchConfig) -> Self {
        AgentWriterBuilder { config, ..self }
    }

    /// Build a new instance of [`AgentWriter`].
    pub fn build(self) -> AgentWriter {
        AgentWriter::new(self.exporter, self.config)
    }
}

/// State owned by the background thread.
struct Worker {
    exporter: Box<dyn TraceExporter>,
    queue: Arc<TraceQueue>,
    counters: Arc<Counters>,
    config: BatchConfig,
}

impl Worker {
    fn run(mut self) {
        let batch_spans = self.config.max_export_batch_size;
        let mut last_export_time = Instant::now();

        loop {
            let timeout = self
                .config
                .scheduled_delay
                .saturating_sub(last_export_time.elapsed());

            match self.queue.wait(timeout, batch_spans) {
                Wake::BatchReady => {
                    let batch = self.queue.take_batch(batch_spans);
                    let _ = self.export(batch);
                    last_export_time = Instant::now();
                }
                Wake::TimedOut => {
                    if last_export_time.elapsed() >= self.config.scheduled_delay {
                        let batch = self.queue.take_batch(batch_spans);
                        let _ = self.export(batch);
                        last_export_time = Instant::now();
                    }
                }
                Wake::Control(ControlMessage::Flush(sender)) => {
                    // Only what was buffered when the flush was handled.
                    let buffered = self.queue.len();
                    let result = self.export_buffered(buffered);
                    last_export_time = Instant::now();
                    let _ = sender.send(result);
                }
                Wake::Control(ControlMessage::Shutdown(sender)) => {
                    // The queue is closed, nothing is added behind us.
                    let result = self.export_buffered(usize::MAX);
                    let discarded = self.queue.clear() as u64;
                    if discarded > 0 {
                        self.counters
                            .traces_dropped
                            .fetch_add(discarded, Ordering::Relaxed);
                        agent_warn!(
                            name: "AgentWriter.TracesDiscarded",
                            traces = discarded,
                            message = "close gave up waiting, buffered traces were not sent",
                        );
                    }
                    self.exporter.shutdown();
                    let _ = sender.send(result);
                    break;
                }
            }
        }
    }

    fn is_abandoned(&self) -> bool {
        self.counters.abandoned.load(Ordering::Acquire)
    }

    /// Sends up to `traces` buffered traces, batch by batch, keeping the
    /// first error. Stops once `close` has given up waiting.
    fn export_buffered(&mut self, mut traces: usize) -> TraceResult<()> {
        let mut result = Ok(());
        while traces > 0 && !self.is_abandoned() {
            let batch = self.queue.take_batch(self.config.max_export_batch_size);
            if batch.is_empty() {
                break;
            }
            traces = traces.saturating_sub(batch.len());
            result = result.and(self.export(batch));
        }
        result
    }

    fn export(&mut self, batch: Vec<Trace>) -> TraceResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let trace_count = batch.len() as u64;
        let result = block_on(self.exporter.export(batch));
        if self.is_abandoned() {
            // Already counted as failed by `shutdown`.
            return result;
        }
        match &result {
            Ok(()) => {
                self.counters.batches_sent.fetch_add(1, Ordering::Relaxed);
                self.counters
                    .traces_sent
                    .fetch_add(trace_count, Ordering::Relaxed);
                agent_debug!(name: "AgentWriter.BatchSent", traces = trace_count);
            }
            Err(err) => {
                self.counters.batches_failed.fetch_add(1, Ordering::Relaxed);
                agent_warn!(
                    name: "AgentWriter.BatchFailed",
                    traces = trace_count,
                    reason = err.to_string(),
                );
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::export::trace::tests::get_span;
    use crate::export::trace::ExportResult;
    use async_trait::async_trait;
    use std::sync::mpsc::{channel, Receiver, Sender};

    #[derive(Debug)]
    struct ChannelExporter {
        sender: Sender<Vec<Trace>>,
    }

    #[async_trait]
    impl TraceExporter for ChannelExporter {
        async fn export(&mut self, batch: Vec<Trace>) -> ExportResult {
            let _ = self.sender.send(batch);
            Ok(())
        }
    }

    fn writer(config: BatchConfig) -> (AgentWriter, Receiver<Vec<Trace>>) {
        let (sender, receiver) = channel();
        (AgentWriter::new(ChannelExporter { sender }, config), receiver)
    }

    fn trace(id: u64, spans: u64) -> Trace {
        (1..=spans).map(|span| get_span(id, 0, span)).collect()
    }

    #[test]
    fn batch_config_invariants() {
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(0)
            .with_max_export_batch_size(0)
            .with_scheduled_delay(Duration::ZERO)
            .build();
        assert_eq!(config.max_queue_size(), 1);
        assert_eq!(config.max_export_batch_size(), 1);
        assert_eq!(config.scheduled_delay(), MIN_SCHEDULED_DELAY);

        // Spans per batch are not bounded by traces in the queue.
        let config = BatchConfigBuilder::default()
            .with_max_queue_size(4)
            .with_max_export_batch_size(64)
            .build();
        assert_eq!(config.max_export_batch_size(), 64);

        let defaults = BatchConfig::default();
        assert_eq!(defaults.max_queue_size(), 2048);
        assert_eq!(defaults.max_export_batch_size(), 512);
        assert_eq!(defaults.scheduled_delay(), Duration::from_secs(1));
        assert_eq!(defaults.shutdown_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn builder_applies_batch_config() {
        let (sender, _receiver) = channel();
        let writer = AgentWriter::builder(ChannelExporter { sender })
            .with_batch_config(BatchConfigBuilder::default().with_max_queue_size(8).build())
            .build();
        assert_eq!(writer.batch_config().max_queue_size(), 8);
        assert!(!writer.is_running());
    }

    #[test]
    fn batch_config_from_config() {
        let config = Config::builder()
            .with_environment(crate::config::Environment::from_vars([
                ("DD_WRITER_QUEUE_SIZE", "16"),
                ("DD_WRITER_FLUSH_INTERVAL", "250"),
                ("DD_WRITER_BATCH_MAX_SPANS", "8"),
                ("DD_WRITER_SHUTDOWN_TIMEOUT", "100"),
            ]))
            .build();
        let batch = BatchConfig::from(&config);
        assert_eq!(batch.max_queue_size(), 16);
        assert_eq!(batch.scheduled_delay(), Duration::from_millis(250));
        assert_eq!(batch.max_export_batch_size(), 8);
        assert_eq!(batch.shutdown_timeout(), Duration::from_millis(100));
    }

    #[test]
    fn span_threshold_cuts_batches() {
        let (writer, receiver) = writer(
            BatchConfigBuilder::default()
                .with_max_export_batch_size(3)
                .with_scheduled_delay(Duration::from_secs(3600))
                .build(),
        );
        writer.start();
        writer.write(trace(1, 2));
        writer.write(trace(2, 1));

        let batch = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        let ids: Vec<u64> = batch.iter().map(|t| t[0].trace_id.to_u64()).collect();
        assert_eq!(ids, vec![1, 2]);
        writer.close();
    }

    #[test]
    fn flush_interval_sends_partial_batches() {
        let (writer, receiver) = writer(
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_millis(20))
                .build(),
        );
        writer.start();
        writer.write(trace(1, 1));
        let batch = receiver.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(batch.len(), 1);
        writer.close();
    }

    #[test]
    fn force_flush_sends_now() {
        let (writer, receiver) = writer(
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(3600))
                .build(),
        );
        assert!(matches!(writer.force_flush(), Err(TraceError::NotStarted)));

        writer.start();
        writer.write(trace(1, 1));
        writer.force_flush().unwrap();
        assert_eq!(receiver.try_recv().unwrap().len(), 1);
        assert_eq!(writer.stats().batches_sent, 1);

        writer.close();
        assert!(matches!(writer.force_flush(), Err(TraceError::AlreadyShutdown)));
    }

    #[test]
    fn close_flushes_partial_batch_once() {
        let (writer, receiver) = writer(
            BatchConfigBuilder::default()
                .with_scheduled_delay(Duration::from_secs(3600))
                .build(),
        );
        writer.start();
        writer.write(trace(1, 1));
        writer.write(trace(2, 1));
        writer.close();
        writer.close();
        assert!(matches!(writer.shutdown(), Err(TraceError::AlreadyShutdown)));

        let batches: Vec<Vec<Trace>> = receiver.try_iter().collect();
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].len(), 2);
        assert!(!writer.is_running());

        writer.write(trace(3, 1));
        assert_eq!(writer.stats().traces_rejected, 1);
    }

    #[test]
    fn closing_an_unstarted_writer() {
        let (writer, receiver) = writer(BatchConfig::default());
        writer.write(trace(1, 1));
        writer.close();
        writer.start();
        writer.write(trace(2, 1));

        assert!(!writer.is_running());
        assert_eq!(writer.stats().traces_rejected, 2);
        assert!(receiver.try_recv().is_err());
    }
}
