//! Typed event bus for pipeline output.
//!
//! Every subscriber receives each event published after it subscribed, in
//! the order the pipeline produced them. Events of one camera arrive in that
//! camera's processing order; there is no ordering across cameras. Once the
//! bus is closed every receiver drains what it already holds and then
//! disconnects.

use crossbeam_channel::{Receiver, Sender, unbounded};
use parking_lot::Mutex;

use crate::integration::metrics::PipelineMetrics;
use crate::tracker::{Detection, TrackedPerson};

#[derive(Debug, Clone)]
pub enum PipelineEvent {
    /// One frame went through detection and tracking.
    ObjectDetected {
        camera_id: String,
        detections: Vec<Detection>,
        /// The camera's active set after the update
        tracked: Vec<TrackedPerson>,
        processing_time_ms: f64,
    },
    /// Periodic aggregate metrics.
    PerformanceUpdated(PipelineMetrics),
}

#[derive(Debug, Default)]
struct Subscribers {
    senders: Vec<Sender<PipelineEvent>>,
    closed: bool,
}

#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Subscribers>,
}

impl EventBus {
    /// A receiver for later events. After [`close`](Self::close) the
    /// receiver comes back already disconnected.
    pub fn subscribe(&self) -> Receiver<PipelineEvent> {
        let (tx, rx) = unbounded();
        let mut subscribers = self.subscribers.lock();
        if !subscribers.closed {
            subscribers.senders.push(tx);
        }
        rx
    }

    /// Deliver to every live subscriber, pruning the ones that hung up.
    pub fn publish(&self, event: PipelineEvent) {
        let mut subscribers = self.subscribers.lock();
        subscribers
            .senders
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Hang up on every subscriber. Later publishes go nowhere.
    pub fn close(&self) {
        let mut subscribers = self.subscribers.lock();
        subscribers.closed = true;
        subscribers.senders.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fan_out_and_prune() {
        let bus = EventBus::default();
        let a = bus.subscribe();
        let b = bus.subscribe();
        bus.publish(PipelineEvent::PerformanceUpdated(PipelineMetrics::default()));
        assert!(a.try_recv().is_ok());
        assert!(b.try_recv().is_ok());

        drop(b);
        bus.publish(PipelineEvent::PerformanceUpdated(PipelineMetrics::default()));
        assert_eq!(bus.subscribers.lock().senders.len(), 1);
        assert!(a.try_recv().is_ok());
    }

    #[test]
    fn test_close_disconnects_subscribers() {
        let bus = EventBus::default();
        let events = bus.subscribe();
        bus.publish(PipelineEvent::PerformanceUpdated(PipelineMetrics::default()));
        bus.close();
        bus.publish(PipelineEvent::PerformanceUpdated(PipelineMetrics::default()));

        // The event published before closing is still delivered.
        assert_eq!(events.iter().count(), 1);
        assert!(bus.subscribe().recv().is_err());
    }
}
