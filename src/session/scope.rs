//! Which worker owns the consumer's mailbox and transcript.
//!
//! A worker abandoned after a stop timeout keeps running on its own thread. Once the
//! controller has spawned a successor, anything the old worker publishes is dropped here.

use crate::bridge::LineSink;
use log::info;
use std::sync::{Arc, Mutex, MutexGuard};

/// Generation counter shared by the controller and every worker it spawns.
#[derive(Debug, Clone, Default)]
pub struct GenerationGate {
    current: Arc<Mutex<u64>>,
}

impl GenerationGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Retire every earlier worker and hand out the scope for the next one.
    pub fn advance(&self) -> WorkerScope {
        let mut current = self.lock();
        *current += 1;
        WorkerScope {
            gate: self.clone(),
            generation: *current,
        }
    }

    pub fn current(&self) -> u64 {
        *self.lock()
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// One worker's claim on the shared outputs.
#[derive(Debug, Clone)]
pub struct WorkerScope {
    gate: GenerationGate,
    generation: u64,
}

impl WorkerScope {
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.gate.current() == self.generation
    }

    /// Run `publish` only while this scope is current. The gate stays locked for the
    /// duration, so a successor cannot be spawned between the check and the write.
    pub fn publish<F: FnOnce()>(&self, publish: F) -> bool {
        let current = self.gate.lock();
        if *current != self.generation {
            return false;
        }
        publish();
        true
    }
}

/// Forwards session output to `inner` while the worker is current; afterwards it only logs.
pub struct ScopedSink {
    inner: Arc<dyn LineSink>,
    scope: WorkerScope,
}

impl ScopedSink {
    pub fn new(inner: Arc<dyn LineSink>, scope: WorkerScope) -> Self {
        Self { inner, scope }
    }
}

impl LineSink for ScopedSink {
    fn emit(&self, text: &str) {
        if self.scope.publish(|| self.inner.emit(text)) {
            return;
        }
        for line in text.lines() {
            info!(
                target: "talkback::session",
                "[retired worker {}] {}",
                self.scope.generation,
                line
            );
        }
    }
}
