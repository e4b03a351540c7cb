//! Telemetry adapters: in-memory recorder, no-op, and base-tag wrapper.

use docsync_ports::{TelemetryPort, TelemetryTags, TelemetryTimer};
use docsync_shared::{REDACTED, is_secret_key};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;

/// Counters and timer samples recorded so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    /// Counter totals by name.
    pub counters: BTreeMap<Box<str>, u64>,
    /// Timer samples (milliseconds) by name, in record order.
    pub timers: BTreeMap<Box<str>, Vec<u64>>,
}

impl TelemetrySnapshot {
    /// Counter total, zero when never incremented.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    /// Number of samples recorded for a timer.
    #[must_use]
    pub fn timer_samples(&self, name: &str) -> usize {
        self.timers.get(name).map_or(0, Vec::len)
    }
}

/// Telemetry adapter that aggregates in memory. Tags are not kept.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTelemetry {
    state: Arc<Mutex<TelemetrySnapshot>>,
}

impl InMemoryTelemetry {
    /// Empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything recorded.
    #[must_use]
    pub fn snapshot(&self) -> TelemetrySnapshot {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn record(&self, name: &str, duration_ms: u64) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.timers.entry(name.into()).or_default().push(duration_ms);
    }
}

impl TelemetryPort for InMemoryTelemetry {
    fn increment_counter(&self, name: &str, value: u64, _tags: Option<&TelemetryTags>) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let counter = state.counters.entry(name.into()).or_default();
        *counter = counter.saturating_add(value);
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, _tags: Option<&TelemetryTags>) {
        self.record(name, duration_ms);
    }

    fn start_timer(&self, name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(InMemoryTimer {
            telemetry: self.clone(),
            name: name.into(),
            started_at: Instant::now(),
            stopped: AtomicBool::new(false),
        })
    }
}

struct InMemoryTimer {
    telemetry: InMemoryTelemetry,
    name: Box<str>,
    started_at: Instant,
    stopped: AtomicBool,
}

impl TelemetryTimer for InMemoryTimer {
    fn stop(&self) {
        if self.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let elapsed = u64::try_from(self.started_at.elapsed().as_millis()).unwrap_or(u64::MAX);
        self.telemetry.record(&self.name, elapsed);
    }
}

/// Telemetry adapter that drops everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTelemetry;

struct NoopTimer;

impl TelemetryTimer for NoopTimer {
    fn stop(&self) {}
}

impl TelemetryPort for NoopTelemetry {
    fn increment_counter(&self, _name: &str, _value: u64, _tags: Option<&TelemetryTags>) {}

    fn record_timer_ms(&self, _name: &str, _duration_ms: u64, _tags: Option<&TelemetryTags>) {}

    fn start_timer(&self, _name: &str, _tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        Box::new(NoopTimer)
    }
}

/// Telemetry adapter that applies base tags to an inner telemetry sink.
#[derive(Clone)]
pub struct TaggedTelemetry {
    inner: Arc<dyn TelemetryPort>,
    tags: TelemetryTags,
}

impl TaggedTelemetry {
    /// Wrap a telemetry sink with base tags.
    #[must_use]
    pub fn new(inner: Arc<dyn TelemetryPort>, tags: TelemetryTags) -> Self {
        Self { inner, tags }
    }
}

impl TelemetryPort for TaggedTelemetry {
    fn increment_counter(&self, name: &str, value: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.increment_counter(name, value, Some(&merged));
    }

    fn record_timer_ms(&self, name: &str, duration_ms: u64, tags: Option<&TelemetryTags>) {
        let merged = merge_tags(&self.tags, tags);
        self.inner.record_timer_ms(name, duration_ms, Some(&merged));
    }

    fn start_timer(&self, name: &str, tags: Option<&TelemetryTags>) -> Box<dyn TelemetryTimer> {
        let merged = merge_tags(&self.tags, tags);
        self.inner.start_timer(name, Some(&merged))
    }
}

fn merge_tags(base: &TelemetryTags, extra: Option<&TelemetryTags>) -> TelemetryTags {
    let mut merged = base.clone();
    if let Some(extra) = extra {
        merged.extend(extra.iter().map(|(key, value)| (key.clone(), value.clone())));
    }
    for (key, value) in &mut merged {
        if is_secret_key(key) {
            *value = REDACTED.into();
        }
    }
    merged
}
