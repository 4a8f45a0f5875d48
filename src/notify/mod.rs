//! One-way outputs: client responses and stored notifications.

use crate::domain::{GainId, NotificationLevel, OutboundEvent};
use async_trait::async_trait;
use std::sync::Mutex;

/// Delivers events to the client that made the request.
pub trait ResponseSink: Send + Sync {
    fn respond(&self, event: OutboundEvent);
}

/// Stores asynchronous notifications for an account.
///
/// Failures are reported to the caller, who logs them; a lost notification
/// never changes the outcome of a withdrawal.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn notify(
        &self,
        account: &GainId,
        level: NotificationLevel,
        kind: &str,
        message: &str,
    ) -> anyhow::Result<()>;
}

/// Buffers every event; drained once the request finishes.
#[derive(Debug, Default)]
pub struct CollectingResponder {
    events: Mutex<Vec<OutboundEvent>>,
}

impl CollectingResponder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of events emitted so far.
    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    pub fn take(&self) -> Vec<OutboundEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner()),
        )
    }
}

impl ResponseSink for CollectingResponder {
    fn respond(&self, event: OutboundEvent) {
        self.events
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(event);
    }
}
