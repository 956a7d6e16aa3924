//! Session-scoped record of strategy runs.
//!
//! The ledger owns every [`StrategyRun`] and the cancellation signal of each
//! run. It is in-memory only; nothing survives the process.

use std::collections::HashMap;

use fbot_core::error::BotError;
use fbot_core::types::*;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

use crate::gateway::OrderGateway;

struct Entry {
    run: StrategyRun,
    cancel_tx: watch::Sender<bool>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<RunId, Entry>,
    /// Run ids in insertion order.
    order: Vec<RunId>,
}

#[derive(Default)]
pub struct OrderLedger {
    inner: Mutex<Inner>,
}

impl OrderLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new run.
    pub async fn insert(&self, run: StrategyRun) {
        let mut inner = self.inner.lock().await;
        let id = run.id;
        let (cancel_tx, _) = watch::channel(false);
        if inner.entries.insert(id, Entry { run, cancel_tx }).is_none() {
            inner.order.push(id);
        }
    }

    /// Move a pending run to `InProgress`.
    pub async fn start(&self, run_id: RunId) -> Result<(), BotError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(&run_id).ok_or(BotError::UnknownRun(run_id))?;
        if entry.run.status != RunStatus::Pending {
            return Err(BotError::RunAlreadyStarted(run_id));
        }
        entry.run.status = RunStatus::InProgress;
        Ok(())
    }

    /// Append a child order to its run.
    pub async fn record(&self, run_id: RunId, child: ChildOrder) -> Result<(), BotError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(&run_id).ok_or(BotError::UnknownRun(run_id))?;
        entry.run.children.push(child);
        Ok(())
    }

    /// Close a run: compute its aggregate status and stamp the finish time.
    pub async fn finish(&self, run_id: RunId, cancelled: bool, finished_at_ms: u64) -> Result<StrategyRun, BotError> {
        let mut inner = self.inner.lock().await;
        let entry = inner.entries.get_mut(&run_id).ok_or(BotError::UnknownRun(run_id))?;
        let run = &mut entry.run;
        run.cancelled = cancelled;
        run.status = run.final_status();
        run.finished_at_ms = Some(finished_at_ms);
        Ok(run.clone())
    }

    pub async fn get(&self, run_id: RunId) -> Option<StrategyRun> {
        self.inner.lock().await.entries.get(&run_id).map(|e| e.run.clone())
    }

    /// All runs of the session, oldest first.
    pub async fn runs(&self) -> Vec<StrategyRun> {
        let inner = self.inner.lock().await;
        inner.order.iter().filter_map(|id| inner.entries.get(id)).map(|e| e.run.clone()).collect()
    }

    /// Ask a run to stop submitting children.
    ///
    /// Returns `false` when the run had already reached a terminal status.
    pub async fn request_cancel(&self, run_id: RunId) -> Result<bool, BotError> {
        let inner = self.inner.lock().await;
        let entry = inner.entries.get(&run_id).ok_or(BotError::UnknownRun(run_id))?;
        if entry.run.status.is_terminal() {
            return Ok(false);
        }
        entry.cancel_tx.send_replace(true);
        info!("[ledger] cancel requested for run {run_id}");
        Ok(true)
    }

    /// Receiver that flips to `true` once cancellation is requested.
    pub async fn cancel_signal(&self, run_id: RunId) -> Option<watch::Receiver<bool>> {
        self.inner.lock().await.entries.get(&run_id).map(|e| e.cancel_tx.subscribe())
    }

    /// Cancel every child of a run that is still resting on the book.
    ///
    /// Filled market slices and rejected children are skipped. Each cancel is
    /// independent; one failure does not stop the others.
    pub async fn cancel_all(&self, run_id: RunId, gateway: &OrderGateway) -> Result<Vec<CancelResult>, BotError> {
        let targets: Vec<(String, u64)> = {
            let inner = self.inner.lock().await;
            let entry = inner.entries.get(&run_id).ok_or(BotError::UnknownRun(run_id))?;
            entry
                .run
                .children
                .iter()
                .filter(|c| c.outcome.is_open())
                .filter_map(|c| c.outcome.order_id().map(|id| (c.request.symbol.clone(), id)))
                .collect()
        };

        let mut results = Vec::with_capacity(targets.len());
        for (symbol, order_id) in targets {
            let result = match gateway.cancel(&symbol, order_id).await {
                Ok(snap) => {
                    self.update_child_status(run_id, order_id, snap.status).await;
                    Ok(snap.status)
                }
                Err(e) => {
                    warn!("[ledger] cancel {symbol} #{order_id} for run {run_id} failed: {e}");
                    Err(e.source)
                }
            };
            results.push(CancelResult { symbol, order_id, result });
        }
        Ok(results)
    }

    async fn update_child_status(&self, run_id: RunId, order_id: u64, new_status: OrderStatus) {
        let mut inner = self.inner.lock().await;
        let Some(entry) = inner.entries.get_mut(&run_id) else {
            return;
        };
        for child in &mut entry.run.children {
            if let OrderOutcome::Accepted { order_id: id, status, .. } = &mut child.outcome {
                if *id == order_id {
                    *status = new_status;
                }
            }
        }
    }
}
