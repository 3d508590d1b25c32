//! Message bus abstraction
//!
//! At-least-once, partition-ordered delivery channel between the
//! orchestrator and the confirmation worker. Publishing is fire-and-forget;
//! ordering is guaranteed only within a partition key, so every consumer
//! must be idempotent (the `find_by_hash` gate in the ledger exists for
//! exactly this reason).

mod memory;

use async_trait::async_trait;
use tokio::sync::mpsc::UnboundedReceiver;

pub use memory::InMemoryBus;

/// Topic for the asynchronous confirmation retry loop.
pub const PENDING_CONFIRMATION_TOPIC: &str = "transfer.pending-confirmation";

/// One delivered message. Payloads are opaque bytes; decoding and the
/// handling of malformed payloads belong to the consumer.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub topic: String,
    pub partition_key: Option<String>,
    pub payload: Vec<u8>,
}

/// Message bus errors
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Bus unavailable: {0}")]
    Unavailable(String),

    #[error("Failed to encode message: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Receiving half of a topic subscription.
pub struct BusSubscription {
    receiver: UnboundedReceiver<Delivery>,
}

impl BusSubscription {
    pub(crate) fn new(receiver: UnboundedReceiver<Delivery>) -> Self {
        Self { receiver }
    }

    /// Wait for the next delivery. `None` means the bus shut down.
    pub async fn recv(&mut self) -> Option<Delivery> {
        self.receiver.recv().await
    }
}

/// Publish/subscribe contract.
///
/// Delivery is at-least-once and ordered only within `partition_key`
/// (keying by user id preserves per-account ordering).
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Fire-and-forget publish.
    async fn publish(
        &self,
        topic: &str,
        payload: Vec<u8>,
        partition_key: Option<String>,
    ) -> Result<(), BusError>;

    /// Subscribe to a topic as the single logical consumer group.
    async fn subscribe(&self, topic: &str) -> BusSubscription;
}
