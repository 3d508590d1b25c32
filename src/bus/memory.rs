//! In-memory message bus
//!
//! Process-local `MessageBus` over tokio channels. A single channel per
//! subscriber keeps deliveries in publish order, which is stronger than the
//! per-partition ordering the contract promises. Messages published before
//! any subscriber exists are held back and flushed to the first one, so
//! nothing is lost during assembly.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::mpsc::{self, UnboundedSender};
use tokio::sync::Mutex;

use super::{BusError, BusSubscription, Delivery, MessageBus};

#[derive(Debug, Default)]
struct Topic {
    senders: Vec<UnboundedSender<Delivery>>,
    backlog: Vec<Delivery>,
}

/// Message bus held entirely in memory
#[derive(Debug, Default)]
pub struct InMemoryBus {
    topics: Mutex<HashMap<String, Topic>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        partition_key: Option<String>,
    ) -> Result<(), BusError> {
        let delivery = Delivery {
            topic: topic.to_string(),
            partition_key,
            payload,
        };

        let mut topics = self.topics.lock().await;
        let entry = topics.entry(topic.to_string()).or_default();

        // Drop subscribers whose receiving side is gone
        entry.senders.retain(|s| !s.is_closed());

        if entry.senders.is_empty() {
            entry.backlog.push(delivery);
            return Ok(());
        }

        for sender in &entry.senders {
            // at-least-once: every live subscriber sees the message
            let _ = sender.send(delivery.clone());
        }

        Ok(())
    }

    async fn subscribe(&self, topic: &str) -> BusSubscription {
        let (tx, rx) = mpsc::unbounded_channel();

        let mut topics = self.topics.lock().await;
        let entry = topics.entry(topic.to_string()).or_default();

        for delivery in entry.backlog.drain(..) {
            let _ = tx.send(delivery);
        }
        entry.senders.push(tx);

        BusSubscription::new(rx)
    }
}
