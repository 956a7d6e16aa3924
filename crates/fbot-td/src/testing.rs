//! In-memory fakes for engine tests.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use fbot_core::error::{CODE_DUPLICATE_CLIENT_ID, ExchangeError};
use fbot_core::time_util::{now_ms, offset_ms};
use fbot_core::types::*;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::sync::mpsc;

use crate::ExchangeApi;
use crate::scheduler::Sleeper;

/// BTCUSDT rules used throughout the tests.
pub fn btc_rules() -> SymbolRules {
    SymbolRules {
        symbol: "BTCUSDT".into(),
        tick_size: dec!(0.1),
        step_size: dec!(0.0001),
        min_notional: dec!(5),
        min_qty: dec!(0.0001),
        max_qty: dec!(1000),
    }
}

/// Scriptable exchange.
///
/// `create_order` pops scripted results first; once the script is empty it
/// accepts everything. Market orders fill immediately at the mock price,
/// limit and stop orders rest with status `NEW` until cancelled. A client
/// order id that is already booked is rejected with `-4116`.
pub struct MockExchange {
    rules: HashMap<String, SymbolRules>,
    price: Mutex<Decimal>,
    server_skew_ms: AtomicI64,
    fail_server_time: AtomicBool,
    price_error: Mutex<Option<ExchangeError>>,
    order_script: Mutex<VecDeque<Result<OrderAck, ExchangeError>>>,
    created: Mutex<Vec<(OrderRequest, u64)>>,
    book: Mutex<HashMap<u64, OrderSnapshot>>,
    cancelled: Mutex<Vec<u64>>,
    next_order_id: AtomicU64,
    lost_acks: AtomicU64,
    server_time_calls: AtomicU64,
    exchange_info_calls: AtomicU64,
}

impl MockExchange {
    pub fn new() -> Self {
        let rules = btc_rules();
        Self {
            rules: HashMap::from([(rules.symbol.clone(), rules)]),
            price: Mutex::new(dec!(110000)),
            server_skew_ms: AtomicI64::new(0),
            fail_server_time: AtomicBool::new(false),
            price_error: Mutex::new(None),
            order_script: Mutex::new(VecDeque::new()),
            created: Mutex::new(Vec::new()),
            book: Mutex::new(HashMap::new()),
            cancelled: Mutex::new(Vec::new()),
            next_order_id: AtomicU64::new(1000),
            lost_acks: AtomicU64::new(0),
            server_time_calls: AtomicU64::new(0),
            exchange_info_calls: AtomicU64::new(0),
        }
    }

    pub fn with_server_skew_ms(self, skew: i64) -> Self {
        self.server_skew_ms.store(skew, Ordering::SeqCst);
        self
    }

    pub fn set_price(&self, price: Decimal) {
        *self.price.lock().unwrap() = price;
    }

    pub fn fail_server_time(&self, fail: bool) {
        self.fail_server_time.store(fail, Ordering::SeqCst);
    }

    pub fn fail_price(&self, err: Option<ExchangeError>) {
        *self.price_error.lock().unwrap() = err;
    }

    /// Queue results for the next `create_order` calls.
    pub fn script_orders(&self, results: impl IntoIterator<Item = Result<OrderAck, ExchangeError>>) {
        self.order_script.lock().unwrap().extend(results);
    }

    /// Book the next `n` unscripted orders but answer with a timeout, as if
    /// the response was lost on the way back.
    pub fn lose_acks(&self, n: u64) {
        self.lost_acks.store(n, Ordering::SeqCst);
    }

    /// Every `create_order` call with its request timestamp.
    pub fn created(&self) -> Vec<(OrderRequest, u64)> {
        self.created.lock().unwrap().clone()
    }

    /// Order ids passed to `cancel_order`.
    pub fn cancelled(&self) -> Vec<u64> {
        self.cancelled.lock().unwrap().clone()
    }

    /// Mark a resting order as filled.
    pub fn fill(&self, order_id: u64) {
        if let Some(snap) = self.book.lock().unwrap().get_mut(&order_id) {
            snap.status = OrderStatus::Filled;
            snap.filled_quantity = snap.quantity;
            snap.avg_price = snap.price;
        }
    }

    pub fn server_time_calls(&self) -> u64 {
        self.server_time_calls.load(Ordering::SeqCst)
    }

    pub fn exchange_info_calls(&self) -> u64 {
        self.exchange_info_calls.load(Ordering::SeqCst)
    }

    fn accept(&self, request: &OrderRequest) -> OrderAck {
        let order_id = self.next_order_id.fetch_add(1, Ordering::SeqCst);
        let market_price = *self.price.lock().unwrap();
        let (status, executed_qty, avg_price) = match request.order_type {
            OrderType::Market => (OrderStatus::Filled, request.quantity, market_price),
            _ => (OrderStatus::New, Decimal::ZERO, Decimal::ZERO),
        };
        self.book.lock().unwrap().insert(
            order_id,
            OrderSnapshot {
                symbol: request.symbol.clone(),
                order_id,
                client_order_id: request.client_order_id.clone(),
                status,
                side: request.side,
                order_type: request.order_type.exchange_type().to_string(),
                price: request.price.unwrap_or_default(),
                stop_price: request.stop_price.unwrap_or_default(),
                quantity: request.quantity,
                filled_quantity: executed_qty,
                avg_price,
                update_time: now_ms(),
            },
        );
        OrderAck {
            order_id,
            client_order_id: request.client_order_id.clone(),
            status,
            executed_qty,
            avg_price,
        }
    }

    fn unknown_order() -> ExchangeError {
        ExchangeError::Http { status: 400, code: Some(-2013), message: "Order does not exist.".into() }
    }

    fn duplicate_client_id() -> ExchangeError {
        ExchangeError::Http {
            status: 400,
            code: Some(CODE_DUPLICATE_CLIENT_ID),
            message: "ClientOrderId is duplicated.".into(),
        }
    }
}

#[async_trait]
impl ExchangeApi for MockExchange {
    async fn get_exchange_info(&self) -> Result<HashMap<String, SymbolRules>, ExchangeError> {
        self.exchange_info_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.rules.clone())
    }

    async fn get_server_time(&self) -> Result<u64, ExchangeError> {
        self.server_time_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_server_time.load(Ordering::SeqCst) {
            return Err(ExchangeError::Transport("server time unavailable".into()));
        }
        Ok(offset_ms(now_ms(), self.server_skew_ms.load(Ordering::SeqCst)))
    }

    async fn get_symbol_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        if let Some(err) = self.price_error.lock().unwrap().clone() {
            return Err(err);
        }
        if !self.rules.contains_key(symbol) {
            return Err(ExchangeError::Http { status: 400, code: Some(-1121), message: "Invalid symbol.".into() });
        }
        Ok(*self.price.lock().unwrap())
    }

    async fn create_order(&self, request: &OrderRequest, timestamp: u64) -> Result<OrderAck, ExchangeError> {
        self.created.lock().unwrap().push((request.clone(), timestamp));
        let scripted = self.order_script.lock().unwrap().pop_front();
        if let Some(result) = scripted {
            return result;
        }
        let duplicate = self
            .book
            .lock()
            .unwrap()
            .values()
            .any(|o| o.client_order_id == request.client_order_id);
        if duplicate {
            return Err(Self::duplicate_client_id());
        }
        let ack = self.accept(request);
        if self.lost_acks.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1)).is_ok() {
            return Err(ExchangeError::Transport("operation timed out".into()));
        }
        Ok(ack)
    }

    async fn cancel_order(&self, _symbol: &str, order_id: u64, _timestamp: u64) -> Result<OrderSnapshot, ExchangeError> {
        self.cancelled.lock().unwrap().push(order_id);
        let mut book = self.book.lock().unwrap();
        let snap = book.get_mut(&order_id).ok_or_else(Self::unknown_order)?;
        if !snap.status.is_open() {
            return Err(Self::unknown_order());
        }
        snap.status = OrderStatus::Canceled;
        Ok(snap.clone())
    }

    async fn get_order(&self, _symbol: &str, order_id: u64, _timestamp: u64) -> Result<OrderSnapshot, ExchangeError> {
        self.book.lock().unwrap().get(&order_id).cloned().ok_or_else(Self::unknown_order)
    }

    async fn get_order_by_client_id(
        &self,
        _symbol: &str,
        client_order_id: &str,
        _timestamp: u64,
    ) -> Result<OrderSnapshot, ExchangeError> {
        self.book
            .lock()
            .unwrap()
            .values()
            .find(|o| o.client_order_id == client_order_id)
            .cloned()
            .ok_or_else(Self::unknown_order)
    }

    async fn get_open_orders(&self, symbol: Option<&str>, _timestamp: u64) -> Result<Vec<OrderSnapshot>, ExchangeError> {
        let mut open: Vec<OrderSnapshot> = self
            .book
            .lock()
            .unwrap()
            .values()
            .filter(|o| o.status.is_open() && symbol.is_none_or(|s| s == o.symbol))
            .cloned()
            .collect();
        open.sort_by_key(|o| o.order_id);
        Ok(open)
    }

    async fn get_account_balance(&self, _timestamp: u64) -> Result<Balances, ExchangeError> {
        Ok(Balances::from([("USDT".to_string(), dec!(15000)), ("BNB".to_string(), dec!(0))]))
    }
}

/// Returns immediately and records every requested duration.
#[derive(Default)]
pub struct RecordingSleeper {
    sleeps: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for RecordingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.sleeps.lock().unwrap().push(duration);
        tokio::task::yield_now().await;
    }
}

/// Returns immediately for the first `gate_at` sleeps, then reports the
/// sleep index on a channel and never wakes up.
pub struct GatedSleeper {
    sleeps: Mutex<Vec<Duration>>,
    gate_at: usize,
    reached: mpsc::UnboundedSender<usize>,
}

impl GatedSleeper {
    pub fn new(gate_at: usize) -> (Self, mpsc::UnboundedReceiver<usize>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let sleeper = Self { sleeps: Mutex::new(Vec::new()), gate_at, reached: tx };
        (sleeper, rx)
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Sleeper for GatedSleeper {
    async fn sleep(&self, duration: Duration) {
        let index = {
            let mut sleeps = self.sleeps.lock().unwrap();
            sleeps.push(duration);
            sleeps.len() - 1
        };
        if index >= self.gate_at {
            let _ = self.reached.send(index);
            std::future::pending::<()>().await;
        }
    }
}
