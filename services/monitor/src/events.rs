//! Typed event fan-out.
//!
//! One bounded broadcast channel per topic, with explicit subscriber
//! registration. Slow subscribers lose the oldest events instead of
//! blocking ingestion; stale events are worthless downstream anyway.

use std::collections::HashMap;

use tokio::sync::broadcast;
use tracing::trace;

use types::{ChainEvent, EventTopic};

const TOPICS: [EventTopic; 8] = [
    EventTopic::Block,
    EventTopic::Transaction,
    EventTopic::Swap,
    EventTopic::Liquidation,
    EventTopic::FlashLoan,
    EventTopic::HighValue,
    EventTopic::GasUpdate,
    EventTopic::Reorg,
];

/// Broadcast topics the monitor publishes on.
pub struct EventBus {
    topics: HashMap<EventTopic, broadcast::Sender<ChainEvent>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let topics = TOPICS
            .iter()
            .map(|t| (*t, broadcast::channel(capacity.max(1)).0))
            .collect();
        Self { topics }
    }

    /// Subscribe to one topic. Every subscriber gets its own cursor.
    pub fn subscribe(&self, topic: EventTopic) -> broadcast::Receiver<ChainEvent> {
        self.topics[&topic].subscribe()
    }

    /// Publish an event on a topic. A send with no subscribers is not an
    /// error; the monitor runs regardless of who is listening.
    pub fn publish(&self, topic: EventTopic, event: ChainEvent) {
        if let Some(sender) = self.topics.get(&topic) {
            let delivered = sender.send(event).unwrap_or(0);
            trace!(?topic, delivered, "event published");
        }
    }

    /// Publish a transaction on the firehose topic plus every class topic
    /// it carries.
    pub fn publish_transaction(&self, event: ChainEvent) {
        if let ChainEvent::Transaction(observed) = &event {
            let class_topics: Vec<EventTopic> = observed
                .classes
                .iter()
                .map(|c| c.topic())
                .filter(|t| *t != EventTopic::Transaction)
                .collect();
            self.publish(EventTopic::Transaction, event.clone());
            for topic in class_topics {
                self.publish(topic, event.clone());
            }
        }
    }

    /// Subscriber count across all topics, for the status surface.
    pub fn subscriber_count(&self) -> usize {
        self.topics.values().map(|s| s.receiver_count()).sum()
    }
}
