//! Engine facade: intents in, strategy runs out.
//!
//! A run goes through two steps:
//!
//! 1. `prepare_*` validates the intent, loads symbol rules, plans every child
//!    order and registers the run in the ledger (`PENDING`).
//! 2. [`TradingEngine::execute`] drives the plan through the gateway, one
//!    child at a time, pausing between TWAP slices.
//!
//! `place_*` does both. Splitting them lets another task cancel a run by id
//! while it is executing. Every public method returns a value or a
//! [`BotError`]; a failed run never leaves the engine unusable.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fbot_core::config::EngineConfig;
use fbot_core::error::BotError;
use fbot_core::time_util::now_ms;
use fbot_core::types::*;
use rust_decimal::Decimal;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};
use uuid::Uuid;

use crate::ExchangeApi;
use crate::clock::ClockSync;
use crate::event::{EngineEvent, EngineEventReceiver, EngineEventSender};
use crate::gateway::OrderGateway;
use crate::ledger::OrderLedger;
use crate::precision::PrecisionNormalizer;
use crate::scheduler::{Sleeper, TokioSleeper};
use crate::strategy::{Plan, client_order_prefix, grid, simple, twap};

pub struct TradingEngine {
    gateway: Arc<OrderGateway>,
    normalizer: PrecisionNormalizer,
    ledger: OrderLedger,
    sleeper: Arc<dyn Sleeper>,
    config: EngineConfig,
    /// Plans of prepared runs that have not been executed yet.
    pending: Mutex<HashMap<RunId, Plan>>,
    events: EngineEventSender,
}

impl TradingEngine {
    /// Create an engine on top of `api`.
    ///
    /// Returns the engine and a receiver for [`EngineEvent`]s.
    pub fn new(api: Arc<dyn ExchangeApi>, config: EngineConfig) -> (Self, EngineEventReceiver) {
        Self::with_sleeper(api, config, Arc::new(TokioSleeper))
    }

    /// Like [`new`](Self::new) with a custom sleeper for retries and TWAP
    /// pacing.
    pub fn with_sleeper(
        api: Arc<dyn ExchangeApi>,
        config: EngineConfig,
        sleeper: Arc<dyn Sleeper>,
    ) -> (Self, EngineEventReceiver) {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let gateway = OrderGateway::new(api, Arc::new(ClockSync::new()), Arc::clone(&sleeper), config.retry.clone())
            .with_events(tx.clone());
        let engine = Self {
            gateway: Arc::new(gateway),
            normalizer: PrecisionNormalizer::new(config.price_rounding),
            ledger: OrderLedger::new(),
            sleeper,
            config,
            pending: Mutex::new(HashMap::new()),
            events: tx,
        };
        (engine, rx)
    }

    pub fn gateway(&self) -> &Arc<OrderGateway> {
        &self.gateway
    }

    /// Sync the exchange clock now and keep it synced in the background.
    ///
    /// A failed initial sync is not an error: requests fall back to local
    /// time and the gateway resyncs on the first timestamp rejection.
    pub async fn start_clock_sync(&self) -> tokio::task::JoinHandle<()> {
        let _ = self.gateway.resync_clock().await;
        self.gateway.spawn_clock_resync(Duration::from_secs(self.config.clock_resync_secs))
    }

    // -----------------------------------------------------------------------
    // Strategies
    // -----------------------------------------------------------------------

    /// Plan a single order without sending it.
    pub async fn prepare_simple(&self, intent: SimpleIntent) -> Result<RunId, BotError> {
        simple::validate(&intent)?;
        let rules = self.normalizer.rules(&self.gateway, &intent.symbol).await?;
        let reference = self.reference_price(&intent.symbol).await;
        let run_id = Uuid::new_v4();
        let plan = simple::plan(&intent, &rules, self.normalizer.rounding(), reference, run_id)?;
        self.register(run_id, Intent::Simple(intent), plan).await;
        Ok(run_id)
    }

    /// Plan a TWAP schedule without sending anything.
    pub async fn prepare_twap(&self, intent: TwapIntent) -> Result<RunId, BotError> {
        twap::validate(&intent)?;
        let rules = self.normalizer.rules(&self.gateway, &intent.symbol).await?;
        let reference = self.reference_price(&intent.symbol).await;
        let run_id = Uuid::new_v4();
        let plan = twap::plan(&intent, &rules, reference, run_id)?;
        self.register(run_id, Intent::Twap(intent), plan).await;
        Ok(run_id)
    }

    /// Plan a grid without sending anything.
    pub async fn prepare_grid(&self, intent: GridIntent) -> Result<RunId, BotError> {
        grid::validate(&intent)?;
        let rules = self.normalizer.rules(&self.gateway, &intent.symbol).await?;
        let reference = self.reference_price(&intent.symbol).await;
        let run_id = Uuid::new_v4();
        let plan = grid::plan(&intent, &rules, self.normalizer.rounding(), reference, run_id)?;
        self.register(run_id, Intent::Grid(intent), plan).await;
        Ok(run_id)
    }

    pub async fn place_simple_order(&self, intent: SimpleIntent) -> Result<StrategyRun, BotError> {
        let run_id = self.prepare_simple(intent).await?;
        self.execute(run_id).await
    }

    pub async fn place_twap(&self, intent: TwapIntent) -> Result<StrategyRun, BotError> {
        let run_id = self.prepare_twap(intent).await?;
        self.execute(run_id).await
    }

    pub async fn place_grid(&self, intent: GridIntent) -> Result<StrategyRun, BotError> {
        let run_id = self.prepare_grid(intent).await?;
        self.execute(run_id).await
    }

    /// Drive a prepared run to a terminal status.
    pub async fn execute(&self, run_id: RunId) -> Result<StrategyRun, BotError> {
        let plan = self.pending.lock().await.remove(&run_id);
        match plan {
            Some(plan) => self.drive(run_id, plan).await,
            None if self.ledger.get(run_id).await.is_some() => Err(BotError::RunAlreadyStarted(run_id)),
            None => Err(BotError::UnknownRun(run_id)),
        }
    }

    // -----------------------------------------------------------------------
    // Runs
    // -----------------------------------------------------------------------

    pub async fn run_status(&self, run_id: RunId) -> Result<StrategyRun, BotError> {
        self.ledger.get(run_id).await.ok_or(BotError::UnknownRun(run_id))
    }

    /// All runs of this session, oldest first.
    pub async fn runs(&self) -> Vec<StrategyRun> {
        self.ledger.runs().await
    }

    /// Stop a run from submitting further children.
    ///
    /// Orders already accepted stay on the exchange; use
    /// [`cancel_run_orders`](Self::cancel_run_orders) to pull resting ones.
    pub async fn cancel_run(&self, run_id: RunId) -> Result<StrategyRun, BotError> {
        self.ledger.request_cancel(run_id).await?;

        // Prepared but never executed: close it here.
        if self.pending.lock().await.remove(&run_id).is_some() {
            let run = self.ledger.finish(run_id, true, now_ms()).await?;
            info!("[engine] run {run_id} cancelled before execution");
            self.emit(EngineEvent::RunFinished { run_id, status: run.status, cancelled: true });
            return Ok(run);
        }

        self.run_status(run_id).await
    }

    /// Cancel every resting order a run placed.
    pub async fn cancel_run_orders(&self, run_id: RunId) -> Result<Vec<CancelResult>, BotError> {
        self.ledger.cancel_all(run_id, &self.gateway).await
    }

    /// Cancel the open orders tagged with `run_id`'s client order prefix.
    ///
    /// Works for runs placed by an earlier session, which this engine's
    /// ledger has never seen.
    pub async fn cancel_tagged_orders(
        &self,
        symbol: Option<&str>,
        run_id: RunId,
    ) -> Result<Vec<CancelResult>, BotError> {
        let prefix = client_order_prefix(run_id);
        let targets: Vec<OrderSnapshot> = self
            .gateway
            .open_orders(symbol)
            .await?
            .into_iter()
            .filter(|o| o.client_order_id.starts_with(&prefix))
            .collect();
        info!("[engine] {} open order(s) tagged for run {run_id}", targets.len());

        let mut results = Vec::with_capacity(targets.len());
        for order in targets {
            let result = self.gateway.cancel(&order.symbol, order.order_id).await.map(|s| s.status).map_err(|e| {
                warn!("[engine] cancel {} #{} failed: {e}", order.symbol, order.order_id);
                e.source
            });
            results.push(CancelResult { symbol: order.symbol, order_id: order.order_id, result });
        }
        Ok(results)
    }

    // -----------------------------------------------------------------------
    // Direct exchange queries
    // -----------------------------------------------------------------------

    pub async fn cancel_order(&self, symbol: &str, order_id: u64) -> Result<OrderSnapshot, BotError> {
        Ok(self.gateway.cancel(symbol, order_id).await?)
    }

    pub async fn order_status(&self, symbol: &str, order_id: u64) -> Result<OrderSnapshot, BotError> {
        Ok(self.gateway.order(symbol, order_id).await?)
    }

    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderSnapshot>, BotError> {
        Ok(self.gateway.open_orders(symbol).await?)
    }

    pub async fn balance(&self) -> Result<Balances, BotError> {
        Ok(self.gateway.balance().await?)
    }

    pub async fn price(&self, symbol: &str) -> Result<Decimal, BotError> {
        Ok(self.gateway.price(symbol).await?)
    }

    /// Round a raw price/quantity to `symbol`'s rules.
    pub async fn normalize(
        &self,
        symbol: &str,
        raw_price: Option<Decimal>,
        raw_qty: Decimal,
    ) -> Result<Normalized, BotError> {
        let reference = self.reference_price(symbol).await;
        Ok(self.normalizer.normalize(&self.gateway, symbol, raw_price, raw_qty, reference).await?)
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    async fn register(&self, run_id: RunId, intent: Intent, plan: Plan) {
        let kind = intent.kind();
        let run = StrategyRun::new(run_id, intent, plan.len(), now_ms());
        self.ledger.insert(run).await;
        info!("[engine] prepared {kind} run {run_id} with {} child order(s)", plan.len());
        self.pending.lock().await.insert(run_id, plan);
    }

    /// Market price for rounding ties and market-order notional checks.
    async fn reference_price(&self, symbol: &str) -> Option<Decimal> {
        if !self.config.use_market_reference {
            return None;
        }
        match self.gateway.price(symbol).await {
            Ok(price) => Some(price),
            Err(e) => {
                warn!("[engine] no market price for {symbol}, planning without it: {e}");
                None
            }
        }
    }

    async fn drive(&self, run_id: RunId, plan: Plan) -> Result<StrategyRun, BotError> {
        self.ledger.start(run_id).await?;
        let mut cancel_rx = self.ledger.cancel_signal(run_id).await.ok_or(BotError::UnknownRun(run_id))?;

        let total = plan.len();
        let kind = self.ledger.get(run_id).await.map(|r| r.kind()).ok_or(BotError::UnknownRun(run_id))?;
        info!("[engine] run {run_id} started: {kind}, {total} child order(s)");
        self.emit(EngineEvent::RunStarted { run_id, kind, planned: total });

        let mut cancelled = false;
        for (index, request) in plan.requests.into_iter().enumerate() {
            let stop = *cancel_rx.borrow();
            if stop {
                cancelled = true;
                break;
            }

            let outcome = self.gateway.submit(&request).await;
            if let OrderOutcome::Rejected { reason, .. } = &outcome {
                // A rejected child does not stop the run.
                warn!("[engine] run {run_id} child {}/{total} rejected: {reason}", index + 1);
            }
            let child = ChildOrder { request, outcome };
            self.ledger.record(run_id, child.clone()).await?;
            self.emit(EngineEvent::ChildRecorded { run_id, index, child });

            if index + 1 < total && !plan.interval.is_zero() {
                tokio::select! {
                    _ = self.sleeper.sleep(plan.interval) => {}
                    _ = wait_for_cancel(&mut cancel_rx) => {
                        cancelled = true;
                        break;
                    }
                }
            }
        }

        let run = self.ledger.finish(run_id, cancelled, now_ms()).await?;
        info!(
            "[engine] run {run_id} finished: {} ({}/{} accepted, {} skipped, filled {})",
            run.status,
            run.accepted(),
            run.planned,
            run.skipped(),
            run.filled_quantity()
        );
        self.emit(EngineEvent::RunFinished { run_id, status: run.status, cancelled });
        Ok(run)
    }

    fn emit(&self, event: EngineEvent) {
        let _ = self.events.send(event);
    }
}

/// Resolves once cancellation has been requested.
async fn wait_for_cancel(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|cancelled| *cancelled).await.is_err() {
        // Sender gone: no cancel can arrive any more.
        std::future::pending::<()>().await;
    }
}
