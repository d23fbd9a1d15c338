//! Bounded hand-off between producer threads and the batching worker.
//!
//! Producers never wait on the worker: when the queue is full the oldest
//! trace is evicted to admit the new one. The worker takes one batch at a
//! time, so everything not yet being sent stays in the queue where eviction
//! can reach it.
use crate::error::TraceResult;
use crate::export::trace::Trace;
use std::collections::VecDeque;
use std::sync::mpsc::SyncSender;
use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Requests from the writer handle to its worker.
#[derive(Debug)]
pub(crate) enum ControlMessage {
    /// Send whatever is buffered now and report the outcome.
    Flush(SyncSender<TraceResult<()>>),
    /// Send whatever is buffered, release the exporter, report and stop.
    Shutdown(SyncSender<TraceResult<()>>),
}

/// What happened to a pushed trace.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Accepted,
    /// Accepted after evicting the oldest buffered trace.
    EvictedOldest,
    /// The queue is closed, the trace was discarded.
    Closed,
}

/// Why [`TraceQueue::wait`] returned.
#[derive(Debug)]
pub(crate) enum Wake {
    Control(ControlMessage),
    /// At least a full batch worth of spans is buffered.
    BatchReady,
    TimedOut,
}

#[derive(Debug, Default)]
struct State {
    traces: VecDeque<Trace>,
    spans: usize,
    control: VecDeque<ControlMessage>,
    closed: bool,
}

impl State {
    fn pop_oldest(&mut self) -> Option<Trace> {
        let trace = self.traces.pop_front()?;
        self.spans -= trace.len();
        Some(trace)
    }
}

#[derive(Debug)]
pub(crate) struct TraceQueue {
    state: Mutex<State>,
    available: Condvar,
    capacity: usize,
}

impl TraceQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        TraceQueue {
            state: Mutex::new(State::default()),
            available: Condvar::new(),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // Nothing panics while holding the lock, a poisoned state is still consistent.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn push(&self, trace: Trace) -> PushOutcome {
        let mut state = self.lock();
        if state.closed {
            return PushOutcome::Closed;
        }
        let outcome = if state.traces.len() >= self.capacity {
            state.pop_oldest();
            PushOutcome::EvictedOldest
        } else {
            PushOutcome::Accepted
        };
        state.spans += trace.len();
        state.traces.push_back(trace);
        drop(state);
        self.available.notify_one();
        outcome
    }

    /// Queues a control message for the worker. Returns it back if the queue
    /// is already closed.
    pub(crate) fn signal(&self, message: ControlMessage) -> Result<(), ControlMessage> {
        let mut state = self.lock();
        if state.closed {
            return Err(message);
        }
        if matches!(message, ControlMessage::Shutdown(_)) {
            state.closed = true;
        }
        state.control.push_back(message);
        drop(state);
        self.available.notify_one();
        Ok(())
    }

    /// Waits up to `timeout` for a control message or for `batch_spans`
    /// buffered spans. Control messages come first.
    pub(crate) fn wait(&self, timeout: Duration, batch_spans: usize) -> Wake {
        let state = self.lock();
        let (mut state, _) = self
            .available
            .wait_timeout_while(state, timeout, |state| {
                state.control.is_empty() && state.spans < batch_spans
            })
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match state.control.pop_front() {
            Some(message) => Wake::Control(message),
            None if state.spans >= batch_spans => Wake::BatchReady,
            None => Wake::TimedOut,
        }
    }

    /// Takes the oldest traces up to `batch_spans` spans, and always at least
    /// one trace when any is buffered. Traces are never split.
    pub(crate) fn take_batch(&self, batch_spans: usize) -> Vec<Trace> {
        let mut state = self.lock();
        let mut batch = Vec::new();
        let mut spans = 0;
        while let Some(len) = state.traces.front().map(Vec::len) {
            if !batch.is_empty() && spans + len > batch_spans {
                break;
            }
            spans += len;
            if let Some(trace) = state.pop_oldest() {
                batch.push(trace);
            }
        }
        batch
    }

    /// Discards everything buffered, returning how many traces were dropped.
    pub(crate) fn clear(&self) -> usize {
        let mut state = self.lock();
        state.spans = 0;
        let dropped = state.traces.len();
        state.traces.clear();
        dropped
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().traces.len()
    }

    #[cfg(test)]
    pub(crate) fn is_closed(&self) -> bool {
        self.lock().closed
    }
}
