//! Retry and error-classification layer around [`ExchangeApi`].
//!
//! Every exchange call made by the engine goes through [`OrderGateway::call`]:
//!
//! | Class                  | Policy                                              |
//! |------------------------|-----------------------------------------------------|
//! | `Retryable`            | up to `max_attempts` calls, `retry_delay` apart     |
//! | `RetryableWithBackoff` | doubling backoff from `backoff_initial`, capped     |
//! | `TimestampSkew`        | resync the clock, retry once                        |
//! | `Fatal`                | return immediately                                  |
//!
//! Each attempt is logged with a request id, the operation name, latency and
//! outcome. Waits go through the injected [`Sleeper`].

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use fbot_core::config::RetryConfig;
use fbot_core::error::{CODE_DUPLICATE_CLIENT_ID, ErrorClass, ExchangeError, GatewayError};
use fbot_core::types::*;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::ExchangeApi;
use crate::clock::ClockSync;
use crate::event::{EngineEvent, EngineEventSender};
use crate::scheduler::Sleeper;

/// Floor for the background clock resync period.
pub const MIN_CLOCK_RESYNC: Duration = Duration::from_secs(1);

/// The only path from the engine to the exchange.
pub struct OrderGateway {
    api: Arc<dyn ExchangeApi>,
    clock: Arc<ClockSync>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryConfig,
    next_request_id: AtomicU64,
    events: Option<EngineEventSender>,
}

impl OrderGateway {
    pub fn new(api: Arc<dyn ExchangeApi>, clock: Arc<ClockSync>, sleeper: Arc<dyn Sleeper>, policy: RetryConfig) -> Self {
        Self {
            api,
            clock,
            sleeper,
            policy,
            next_request_id: AtomicU64::new(1),
            events: None,
        }
    }

    /// Publish clock sync results on `tx`.
    pub fn with_events(mut self, tx: EngineEventSender) -> Self {
        self.events = Some(tx);
        self
    }

    pub fn clock(&self) -> &ClockSync {
        &self.clock
    }

    // -----------------------------------------------------------------------
    // Order operations
    // -----------------------------------------------------------------------

    /// Submit one order. Failures come back as [`OrderOutcome::Rejected`].
    ///
    /// A transport error or 5xx leaves it unknown whether the exchange booked
    /// the order. If such an attempt is followed by a final failure, or the
    /// exchange reports the client order id as duplicated, the order is looked
    /// up by client order id and an existing order is reported as accepted.
    pub async fn submit(&self, request: &OrderRequest) -> OrderOutcome {
        info!("[gateway] submit {} cid={}", request.summary(), request.client_order_id);
        let ambiguous = AtomicBool::new(false);
        let flag = &ambiguous;
        let result = self
            .call("submit", |ts| async move {
                let result = self.api.create_order(request, ts).await;
                if let Err(e) = &result {
                    if e.class() == ErrorClass::Retryable {
                        flag.store(true, Ordering::Relaxed);
                    }
                }
                result
            })
            .await;

        let err = match result {
            Ok(ack) => {
                info!(
                    "[gateway] accepted cid={} id={} status={:?} filled={}",
                    ack.client_order_id, ack.order_id, ack.status, ack.executed_qty
                );
                return ack.into();
            }
            Err(e) => e,
        };

        if ambiguous.load(Ordering::Relaxed) || err.source.code() == Some(CODE_DUPLICATE_CLIENT_ID) {
            if let Some(snap) = self.reconcile(request).await {
                return snap.into();
            }
        }
        warn!("[gateway] rejected cid={}: {err}", request.client_order_id);
        err.into()
    }

    /// Find the order booked under `request`'s client order id, if any.
    async fn reconcile(&self, request: &OrderRequest) -> Option<OrderSnapshot> {
        let cid = &request.client_order_id;
        match self.call("reconcile", |ts| self.api.get_order_by_client_id(&request.symbol, cid, ts)).await {
            Ok(snap) => {
                info!(
                    "[gateway] reconciled cid={cid}: exchange has id={} status={:?} filled={}",
                    snap.order_id, snap.status, snap.filled_quantity
                );
                Some(snap)
            }
            Err(e) => {
                debug!("[gateway] reconcile cid={cid}: no order found: {e}");
                None
            }
        }
    }

    /// Cancel one order.
    pub async fn cancel(&self, symbol: &str, order_id: u64) -> Result<OrderSnapshot, GatewayError> {
        self.call("cancel", |ts| self.api.cancel_order(symbol, order_id, ts)).await
    }

    /// Current state of one order.
    pub async fn order(&self, symbol: &str, order_id: u64) -> Result<OrderSnapshot, GatewayError> {
        self.call("order", |ts| self.api.get_order(symbol, order_id, ts)).await
    }

    /// Current state of one order as an outcome.
    pub async fn status(&self, symbol: &str, order_id: u64) -> OrderOutcome {
        match self.order(symbol, order_id).await {
            Ok(snap) => snap.into(),
            Err(e) => e.into(),
        }
    }

    pub async fn open_orders(&self, symbol: Option<&str>) -> Result<Vec<OrderSnapshot>, GatewayError> {
        self.call("open_orders", |ts| self.api.get_open_orders(symbol, ts)).await
    }

    pub async fn balance(&self) -> Result<Balances, GatewayError> {
        self.call("balance", |ts| self.api.get_account_balance(ts)).await
    }

    pub async fn price(&self, symbol: &str) -> Result<Decimal, GatewayError> {
        self.call("price", |_| self.api.get_symbol_price(symbol)).await
    }

    pub async fn exchange_info(&self) -> Result<HashMap<String, SymbolRules>, GatewayError> {
        self.call("exchange_info", |_| self.api.get_exchange_info()).await
    }

    // -----------------------------------------------------------------------
    // Clock
    // -----------------------------------------------------------------------

    /// Re-sync the exchange clock and publish the result.
    pub async fn resync_clock(&self) -> Result<i64, ExchangeError> {
        let result = self.clock.sync(self.api.as_ref()).await;
        let event = match &result {
            Ok(offset_ms) => EngineEvent::ClockSynced { offset_ms: *offset_ms },
            Err(e) => EngineEvent::ClockSyncFailed { message: e.to_string() },
        };
        self.emit(event);
        result
    }

    /// Start a background task that re-syncs the clock every `interval`,
    /// but never more often than [`MIN_CLOCK_RESYNC`].
    pub fn spawn_clock_resync(self: &Arc<Self>, interval: Duration) -> tokio::task::JoinHandle<()> {
        let gateway = Arc::clone(self);
        let interval = interval.max(MIN_CLOCK_RESYNC);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // skip the immediate first tick

            loop {
                ticker.tick().await;
                // Failure is already logged and published.
                let _ = gateway.resync_clock().await;
            }
        })
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }

    // -----------------------------------------------------------------------
    // Retry loop
    // -----------------------------------------------------------------------

    /// Run `f` with the retry policy. `f` receives the clock-adjusted
    /// timestamp for each attempt.
    pub async fn call<T, F, Fut>(&self, op: &'static str, mut f: F) -> Result<T, GatewayError>
    where
        F: FnMut(u64) -> Fut,
        Fut: Future<Output = Result<T, ExchangeError>>,
    {
        let mut attempts = 0u32;
        let mut transient_failures = 0u32;
        let mut backoff_failures = 0u32;
        let mut resynced = false;

        loop {
            attempts += 1;
            let request_id = self.next_request_id.fetch_add(1, Ordering::Relaxed);
            let timestamp = self.clock.current_skewed_time();

            let started = Instant::now();
            let result = f(timestamp).await;
            let latency_us = started.elapsed().as_micros() as u64;

            let err = match result {
                Ok(value) => {
                    debug!(request_id, op, attempt = attempts, latency_us, "[gateway] ok");
                    return Ok(value);
                }
                Err(err) => err,
            };

            let class = err.class();
            warn!(request_id, op, attempt = attempts, latency_us, ?class, "[gateway] failed: {err}");

            let give_up = |exhausted: bool, source: ExchangeError| GatewayError { op, attempts, exhausted, source };

            match class {
                ErrorClass::Fatal => return Err(give_up(false, err)),
                ErrorClass::Retryable => {
                    transient_failures += 1;
                    if transient_failures >= self.policy.max_attempts {
                        return Err(give_up(true, err));
                    }
                    self.sleeper.sleep(self.policy.retry_delay()).await;
                }
                ErrorClass::RetryableWithBackoff => {
                    backoff_failures += 1;
                    if backoff_failures >= self.policy.max_backoff_attempts {
                        return Err(give_up(true, err));
                    }
                    let delay = self.policy.backoff(backoff_failures - 1);
                    info!(request_id, op, "[gateway] rate limited, backing off {}ms", delay.as_millis());
                    self.sleeper.sleep(delay).await;
                }
                ErrorClass::TimestampSkew => {
                    if resynced {
                        return Err(give_up(true, err));
                    }
                    resynced = true;
                    info!(request_id, op, "[gateway] timestamp rejected, resyncing clock");
                    let _ = self.resync_clock().await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockExchange, RecordingSleeper};
    use fbot_core::error::{CODE_INVALID_TIMESTAMP, CODE_TOO_MANY_ORDERS};
    use rust_decimal_macros::dec;

    fn gateway(api: &Arc<MockExchange>, sleeper: &Arc<RecordingSleeper>) -> OrderGateway {
        OrderGateway::new(
            api.clone(),
            Arc::new(ClockSync::new()),
            sleeper.clone(),
            RetryConfig::default(),
        )
    }

    fn request() -> OrderRequest {
        OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.001), "fb-test-0".into())
    }

    fn transport() -> ExchangeError {
        ExchangeError::Transport("connection reset".into())
    }

    fn http(status: u16, code: i64) -> ExchangeError {
        ExchangeError::Http { status, code: Some(code), message: "rejected".into() }
    }

    #[tokio::test]
    async fn persistent_transient_failure_is_tried_three_times() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(transport()), Err(transport()), Err(transport()), Err(transport())]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(matches!(outcome, OrderOutcome::Rejected { retryable: false, .. }));
        assert_eq!(api.created().len(), 3);
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(250); 2]);
    }

    #[tokio::test]
    async fn transient_failure_then_success_is_accepted() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(http(503, -1001))]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(outcome.is_accepted());
        assert_eq!(api.created().len(), 2);
        // Same client order id on both attempts.
        assert!(api.created().iter().all(|(r, _)| r.client_order_id == "fb-test-0"));
    }

    #[tokio::test]
    async fn rate_limit_backs_off_exponentially() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([
            Err(http(429, -1003)),
            Err(http(400, CODE_TOO_MANY_ORDERS)),
            Err(http(429, -1003)),
            Err(http(429, -1003)),
        ]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(outcome.is_accepted());
        let secs: Vec<u64> = sleeper.sleeps().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8]);
    }

    #[tokio::test]
    async fn rate_limit_gives_up_after_backoff_budget() {
        let api = Arc::new(MockExchange::new());
        api.script_orders(std::iter::repeat_with(|| Err(http(429, -1003))).take(6));
        let sleeper = Arc::new(RecordingSleeper::new());

        let req = request();
        let err = gateway(&api, &sleeper)
            .call("submit", |ts| api.create_order(&req, ts))
            .await
            .unwrap_err();

        assert_eq!(err.attempts, 5);
        assert!(err.exhausted);
        let secs: Vec<u64> = sleeper.sleeps().iter().map(Duration::as_secs).collect();
        assert_eq!(secs, vec![1, 2, 4, 8]);
    }

    #[tokio::test]
    async fn timestamp_error_resyncs_and_retries_once() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(http(400, CODE_INVALID_TIMESTAMP))]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(outcome.is_accepted());
        assert_eq!(api.server_time_calls(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn repeated_timestamp_error_is_final() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(http(400, CODE_INVALID_TIMESTAMP)), Err(http(400, CODE_INVALID_TIMESTAMP))]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        match outcome {
            OrderOutcome::Rejected { code, retryable, .. } => {
                assert_eq!(code, Some(CODE_INVALID_TIMESTAMP));
                assert!(!retryable);
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(api.created().len(), 2);
        assert_eq!(api.server_time_calls(), 1);
    }

    #[tokio::test]
    async fn business_rejection_is_not_retried() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(http(400, -2019))]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(matches!(outcome, OrderOutcome::Rejected { code: Some(-2019), retryable: false, .. }));
        assert_eq!(api.created().len(), 1);
        assert!(sleeper.sleeps().is_empty());
    }

    #[tokio::test]
    async fn lost_ack_is_reconciled_by_client_order_id() {
        let api = Arc::new(MockExchange::new());
        api.lose_acks(1);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        // First attempt booked the order but timed out; the retry hit -4116.
        assert_eq!(api.created().len(), 2);
        assert_eq!(outcome.order_id(), Some(1000));
        assert!(matches!(outcome, OrderOutcome::Accepted { status: OrderStatus::Filled, .. }));
        assert_eq!(sleeper.sleeps(), vec![Duration::from_millis(250)]);
    }

    #[tokio::test]
    async fn lost_resting_order_is_booked_once() {
        let api = Arc::new(MockExchange::new());
        api.lose_acks(1);
        let sleeper = Arc::new(RecordingSleeper::new());
        let limit = OrderRequest::limit("BTCUSDT", Side::Buy, dec!(0.001), dec!(100000), "fb-test-1".into());

        let outcome = gateway(&api, &sleeper).submit(&limit).await;

        assert!(outcome.is_open());
        let open = api.get_open_orders(Some("BTCUSDT"), 0).await.unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(outcome.order_id(), Some(open[0].order_id));
    }

    #[tokio::test]
    async fn timeouts_without_a_booked_order_stay_rejected() {
        let api = Arc::new(MockExchange::new());
        api.script_orders([Err(transport()), Err(transport()), Err(transport())]);
        let sleeper = Arc::new(RecordingSleeper::new());

        let outcome = gateway(&api, &sleeper).submit(&request()).await;

        assert!(matches!(outcome, OrderOutcome::Rejected { code: None, .. }));
    }

    #[tokio::test]
    async fn requests_are_stamped_with_clock_offset() {
        let api = Arc::new(MockExchange::new().with_server_skew_ms(60_000));
        let sleeper = Arc::new(RecordingSleeper::new());
        let gw = gateway(&api, &sleeper);
        gw.resync_clock().await.unwrap();

        gw.submit(&request()).await;

        let (_, ts) = api.created()[0].clone();
        let drift = ts as i64 - fbot_core::time_util::now_ms() as i64;
        assert!((drift - 60_000).abs() < 1_000, "drift {drift}");
    }

    #[tokio::test]
    async fn resync_publishes_events() {
        let api = Arc::new(MockExchange::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let gw = gateway(&api, &sleeper).with_events(tx);

        gw.resync_clock().await.unwrap();
        api.fail_server_time(true);
        assert!(gw.resync_clock().await.is_err());

        assert!(matches!(rx.recv().await, Some(EngineEvent::ClockSynced { .. })));
        assert!(matches!(rx.recv().await, Some(EngineEvent::ClockSyncFailed { .. })));
        assert!(gw.clock().is_degraded());
    }

    #[tokio::test(start_paused = true)]
    async fn zero_resync_interval_is_clamped() {
        let api = Arc::new(MockExchange::new());
        let sleeper = Arc::new(RecordingSleeper::new());
        let gw = Arc::new(gateway(&api, &sleeper));

        let handle = gw.spawn_clock_resync(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(2_500)).await;

        assert!(!handle.is_finished());
        assert_eq!(api.server_time_calls(), 2);
        handle.abort();
    }
}
