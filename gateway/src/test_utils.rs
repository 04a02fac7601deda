//! Test doubles shared across unit tests.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::event::{EventEnvelope, InternalMessageEvent};
use crate::queue::{EventPublisher, PublishError};

/// In-memory [`EventPublisher`] that records every publish instead of
/// talking to a broker.
#[derive(Default)]
pub struct RecordingPublisher {
    published: Mutex<Vec<(String, EventEnvelope<InternalMessageEvent>)>>,
    attempts: AtomicU32,
    fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent publish fail with a transient error.
    pub fn fail_next_publishes(&self) {
        self.fail.store(true, Ordering::SeqCst);
    }

    /// Total publish calls, including failed ones.
    pub fn publish_attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    /// Successfully recorded publishes, in call order.
    pub fn published(&self) -> Vec<(String, EventEnvelope<InternalMessageEvent>)> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn connect(&self) -> Result<(), PublishError> {
        Ok(())
    }

    async fn publish(
        &self,
        queue: &str,
        envelope: &EventEnvelope<InternalMessageEvent>,
    ) -> Result<(), PublishError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::Disconnected);
        }
        self.published
            .lock()
            .unwrap()
            .push((queue.to_string(), envelope.clone()));
        Ok(())
    }

    async fn close(&self) {}
}
