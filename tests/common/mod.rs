//! Common test utilities
//!
//! Assembles the full transfer pipeline over deterministic in-memory
//! collaborators.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use coin_ledger::bus::{InMemoryBus, MessageBus, PENDING_CONFIRMATION_TOPIC};
use coin_ledger::ledger::InMemoryLedger;
use coin_ledger::notify::RecordingNotifier;
use coin_ledger::settlement::ScriptedSettlement;
use coin_ledger::{App, ConfirmationMessage, WorkerConfig};

pub struct Harness {
    pub ledger: Arc<InMemoryLedger>,
    pub settlement: Arc<ScriptedSettlement>,
    pub bus: Arc<InMemoryBus>,
    pub notifier: Arc<RecordingNotifier>,
    pub app: App,
}

impl Harness {
    /// Assemble the pipeline with tight backoff so tests run fast.
    pub async fn start() -> Self {
        Self::start_with(WorkerConfig {
            backoff_base: Duration::from_millis(2),
            backoff_max: Duration::from_millis(20),
            max_retries: 5,
        })
        .await
    }

    pub async fn start_with(config: WorkerConfig) -> Self {
        let ledger = Arc::new(InMemoryLedger::new());
        let settlement = Arc::new(ScriptedSettlement::new());
        let bus = Arc::new(InMemoryBus::new());
        let notifier = Arc::new(RecordingNotifier::new());

        let app = App::assemble(
            ledger.clone(),
            settlement.clone(),
            bus.clone(),
            notifier.clone(),
            config,
        )
        .await;

        Self {
            ledger,
            settlement,
            bus,
            notifier,
            app,
        }
    }

    /// Inject a confirmation message directly, simulating bus (re)delivery.
    pub async fn deliver(&self, message: &ConfirmationMessage) {
        self.bus
            .publish(
                PENDING_CONFIRMATION_TOPIC,
                message.to_bytes().expect("encode confirmation message"),
                Some(message.request.user_id.to_string()),
            )
            .await
            .expect("publish confirmation message");
    }
}

/// Poll `check` until it holds or a two-second deadline passes.
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while tokio::time::Instant::now() < deadline {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    false
}
