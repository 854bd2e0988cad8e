//! Process status shared between workers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Tracks liveness of the bundled workers.
pub trait StatusService: Send + Sync {
    fn record_beat(&self, message: &str);

    fn beats(&self) -> u64;

    fn last_message(&self) -> Option<String>;
}

/// Process-local [`StatusService`].
#[derive(Debug, Default)]
pub struct InMemoryStatus {
    beats: AtomicU64,
    last: Mutex<Option<String>>,
}

impl StatusService for InMemoryStatus {
    fn record_beat(&self, message: &str) {
        self.beats.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut last) = self.last.lock() {
            *last = Some(message.to_string());
        }
    }

    fn beats(&self) -> u64 {
        self.beats.load(Ordering::Relaxed)
    }

    fn last_message(&self) -> Option<String> {
        self.last
            .lock()
            .ok()
            .and_then(|last| last.clone())
    }
}
