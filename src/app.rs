//! Application assembly
//!
//! Explicit constructor wiring: the ledger store is built first, then the
//! orchestrator and the confirmation worker on top of it, then the worker
//! loop is spawned. One assembly step at startup, no runtime container.

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::bus::{MessageBus, PENDING_CONFIRMATION_TOPIC};
use crate::ledger::LedgerStore;
use crate::notify::FailureNotifier;
use crate::orchestrator::TransferOrchestrator;
use crate::settlement::SettlementClient;
use crate::worker::{ConfirmationWorker, WorkerConfig};

/// The assembled transfer pipeline.
pub struct App {
    /// Entry point for the transport adapter
    pub orchestrator: Arc<TransferOrchestrator>,
    worker: JoinHandle<()>,
}

impl App {
    /// Build the component graph and start the confirmation loop.
    pub async fn assemble(
        ledger: Arc<dyn LedgerStore>,
        settlement: Arc<dyn SettlementClient>,
        bus: Arc<dyn MessageBus>,
        notifier: Arc<dyn FailureNotifier>,
        worker_config: WorkerConfig,
    ) -> Self {
        let orchestrator = Arc::new(TransferOrchestrator::new(
            Arc::clone(&ledger),
            Arc::clone(&settlement),
            Arc::clone(&bus),
            Arc::clone(&notifier),
        ));

        let worker = Arc::new(ConfirmationWorker::new(
            ledger,
            settlement,
            Arc::clone(&bus),
            notifier,
            worker_config,
        ));

        let subscription = bus.subscribe(PENDING_CONFIRMATION_TOPIC).await;
        let worker = tokio::spawn(worker.run(subscription));

        Self {
            orchestrator,
            worker,
        }
    }

    /// Stop the confirmation loop.
    pub async fn shutdown(self) {
        self.worker.abort();
        // Cancellation is the expected way out of the consume loop
        let _ = self.worker.await;
    }
}
