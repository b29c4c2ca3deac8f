//! Fire-and-forget analytics event publishing.
//!
//! `emit` never blocks and never fails the caller: events go onto a
//! bounded queue, a background worker fans them out to broadcast
//! subscribers, and a full queue drops the event with a counter. The
//! dialog path must be indifferent to whether anyone is listening.

use maru_core::event::DialogEvent;
use metrics::counter;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

/// Bounded, non-blocking publisher of [`DialogEvent`]s.
pub struct EventPublisher {
    queue: mpsc::Sender<DialogEvent>,
    fanout: broadcast::Sender<DialogEvent>,
}

impl EventPublisher {
    /// Create a publisher and start its drain worker. Must be called
    /// inside a tokio runtime.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (queue, mut rx) = mpsc::channel::<DialogEvent>(capacity);
        let (fanout, _) = broadcast::channel::<DialogEvent>(capacity.max(16));

        let tx = fanout.clone();
        drop(tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                // Err means no live subscriber, which is fine.
                let _ = tx.send(event);
            }
            debug!("event publisher worker shut down");
        }));

        Self { queue, fanout }
    }

    /// Queue an event for delivery. Never blocks; a full queue drops the
    /// event rather than stall the dialog path.
    pub fn emit(&self, event: DialogEvent) {
        let event_type = event.event_type().to_string();
        counter!("dialog_events", "type" => event_type.clone()).increment(1);
        if self.queue.try_send(event).is_err() {
            warn!(event_type = %event_type, "event queue full, dropping event");
            counter!("dialog_events_dropped").increment(1);
        }
    }

    /// Subscribe to the event stream. Each subscriber sees every event
    /// emitted after it subscribes.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<DialogEvent> {
        self.fanout.subscribe()
    }
}
