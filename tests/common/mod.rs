//! Shared utilities for host integration tests.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::field::{Field, Visit};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::Layer;

use sage::config::MemorySource;
use sage::{BackgroundWorker, HostBuilder, ShutdownSignal, WorkerError};

/// One captured log event.
#[derive(Debug, Clone)]
pub struct Captured {
    pub level: Level,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

/// A `tracing` layer that records every event it sees.
#[derive(Clone, Default)]
pub struct LogCapture {
    events: Arc<Mutex<Vec<Captured>>>,
}

impl LogCapture {
    /// A subscriber that only records into this capture.
    pub fn subscriber(&self) -> impl Subscriber + Send + Sync {
        tracing_subscriber::registry().with(self.clone())
    }

    pub fn events(&self) -> Vec<Captured> {
        self.events.lock().unwrap().clone()
    }

    /// Events whose message equals `message`.
    pub fn with_message(&self, message: &str) -> Vec<Captured> {
        self.events()
            .into_iter()
            .filter(|e| e.message == message)
            .collect()
    }

    pub fn count(&self, message: &str) -> usize {
        self.with_message(message).len()
    }
}

struct MessageVisitor<'a> {
    message: &'a mut String,
    fields: &'a mut BTreeMap<String, String>,
}

impl Visit for MessageVisitor<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            *self.message = value.to_string();
        } else {
            self.fields.insert(field.name().to_string(), value.to_string());
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            *self.message = format!("{value:?}");
        } else {
            self.fields
                .insert(field.name().to_string(), format!("{value:?}"));
        }
    }
}

impl<S: Subscriber> Layer<S> for LogCapture {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let mut message = String::new();
        let mut fields = BTreeMap::new();
        event.record(&mut MessageVisitor {
            message: &mut message,
            fields: &mut fields,
        });
        self.events.lock().unwrap().push(Captured {
            level: *event.metadata().level(),
            message,
            fields,
        });
    }
}

/// A builder that stays off global state: no global subscriber, no file
/// watching, no OS signal handlers.
pub fn quiet_builder(values: &[(&str, &str)]) -> HostBuilder {
    let mut builder = HostBuilder::new();
    builder
        .install_logging(false)
        .watch_config(false)
        .handle_signals(false)
        .add_config_source(MemorySource::new(
            "test",
            values
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<Vec<_>>(),
        ));
    builder
}

/// Counts ticks until cancelled.
pub struct CounterWorker {
    pub name: String,
    pub ticks: Arc<AtomicU32>,
}

impl CounterWorker {
    pub fn new(name: &str) -> (Self, Arc<AtomicU32>) {
        let ticks = Arc::new(AtomicU32::new(0));
        (
            Self {
                name: name.to_string(),
                ticks: ticks.clone(),
            },
            ticks,
        )
    }
}

#[async_trait]
impl BackgroundWorker for CounterWorker {
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, mut shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        let mut interval = tokio::time::interval(Duration::from_millis(5));
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.ticks.fetch_add(1, Ordering::SeqCst);
                }
                _ = shutdown.recv() => return Ok(()),
            }
        }
    }
}

/// Fails after a short delay.
pub struct FaultyWorker {
    pub after: Duration,
}

#[async_trait]
impl BackgroundWorker for FaultyWorker {
    fn name(&self) -> &str {
        "faulty"
    }

    async fn run(&self, _shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        tokio::time::sleep(self.after).await;
        Err(WorkerError::failed("lost connection to upstream"))
    }
}

/// Ignores cancellation.
pub struct StubbornWorker;

#[async_trait]
impl BackgroundWorker for StubbornWorker {
    fn name(&self) -> &str {
        "stubborn"
    }

    async fn run(&self, _shutdown: ShutdownSignal) -> Result<(), WorkerError> {
        tokio::time::sleep(Duration::from_secs(3600)).await;
        Ok(())
    }
}
