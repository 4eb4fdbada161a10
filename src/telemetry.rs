use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::TelemetryConfig;
use crate::error::{ChatError, Result};

/// Install the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured filter when set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_filter))
        .map_err(|err| ChatError::Config(format!("invalid log filter: {err}")))?;

    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };
    installed.map_err(|err| ChatError::Config(format!("failed to install subscriber: {err}")))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryEvent {
    pub kind: String,
    pub timestamp: SystemTime,
    pub detail: serde_json::Value,
}

/// Events kept before the oldest are discarded.
pub const DEFAULT_EVENT_CAPACITY: usize = 1024;

#[derive(Debug)]
struct Inner {
    events: VecDeque<TelemetryEvent>,
    capacity: usize,
    rule_hits: BTreeMap<String, u64>,
}

/// In-memory event sink shared by every session of a process. Keeps the
/// most recent events and running rule-hit counts.
#[derive(Debug, Clone)]
pub struct TelemetryCollector {
    inner: Arc<Mutex<Inner>>,
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_EVENT_CAPACITY)
    }
}

impl TelemetryCollector {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                events: VecDeque::new(),
                capacity,
                rule_hits: BTreeMap::new(),
            })),
        }
    }

    fn inner(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, kind: impl Into<String>, detail: serde_json::Value) {
        let kind = kind.into();
        let mut inner = self.inner();
        if kind == "reply" {
            if let Some(rule) = detail["rule"].as_str() {
                *inner.rule_hits.entry(rule.to_string()).or_insert(0) += 1;
            }
        }
        if inner.capacity == 0 {
            return;
        }
        while inner.events.len() >= inner.capacity {
            inner.events.pop_front();
        }
        inner.events.push_back(TelemetryEvent {
            kind,
            timestamp: SystemTime::now(),
            detail,
        });
    }

    /// How often each rule produced a reply since the collector was created.
    pub fn rule_hits(&self) -> BTreeMap<String, u64> {
        self.inner().rule_hits.clone()
    }

    pub fn len(&self) -> usize {
        self.inner().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner().events.is_empty()
    }

    /// Take the buffered events. Rule-hit counts are kept.
    pub fn drain(&self) -> Vec<TelemetryEvent> {
        self.inner().events.drain(..).collect()
    }
}
