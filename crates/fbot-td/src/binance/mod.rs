//! Binance USDT-M futures transport.
//!
//! Implements [`ExchangeApi`](crate::ExchangeApi) on top of the REST client
//! in [`futures`]. Responses are decoded from `serde_json::Value` by the
//! `parse_*` helpers below, which tolerate Binance's habit of sending
//! decimals as strings.
//!
//! # Architecture
//!
//! ```text
//! FuturesClient (ExchangeApi)
//! ├── futures   REST requests, signing, HTTP error mapping
//! ├── auth      HMAC-SHA256 query signing
//! └── config    credentials, endpoint, recvWindow
//! ```

pub mod auth;
pub mod config;
pub mod futures;

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use fbot_core::error::ExchangeError;
use fbot_core::types::*;
use rust_decimal::Decimal;
use serde_json::Value;
use tracing::info;

pub use self::config::BinanceFuturesConfig;
pub use self::futures::FuturesClient;
use crate::ExchangeApi;

#[async_trait]
impl ExchangeApi for FuturesClient {
    async fn get_exchange_info(&self) -> Result<HashMap<String, SymbolRules>, ExchangeError> {
        let body = self.exchange_info().await?;
        let rules = parse_exchange_info(&body)?;
        info!("[binance] exchange info: {} tradable symbols", rules.len());
        Ok(rules)
    }

    async fn get_server_time(&self) -> Result<u64, ExchangeError> {
        let body = self.server_time().await?;
        body.get("serverTime")
            .and_then(Value::as_u64)
            .ok_or_else(|| invalid("serverTime", &body))
    }

    async fn get_symbol_price(&self, symbol: &str) -> Result<Decimal, ExchangeError> {
        let body = self.ticker_price(symbol).await?;
        dec_field(&body, "price").ok_or_else(|| invalid("price", &body))
    }

    async fn create_order(&self, request: &OrderRequest, timestamp: u64) -> Result<OrderAck, ExchangeError> {
        let body = self.new_order(request, timestamp).await?;
        parse_order_ack(&body).ok_or_else(|| invalid("order ack", &body))
    }

    async fn cancel_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<OrderSnapshot, ExchangeError> {
        let body = self.delete_order(symbol, order_id, timestamp).await?;
        parse_order_snapshot(&body).ok_or_else(|| invalid("order", &body))
    }

    async fn get_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<OrderSnapshot, ExchangeError> {
        let body = self.query_order(symbol, order_id, timestamp).await?;
        parse_order_snapshot(&body).ok_or_else(|| invalid("order", &body))
    }

    async fn get_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
        timestamp: u64,
    ) -> Result<OrderSnapshot, ExchangeError> {
        let body = self.query_order_by_client_id(symbol, client_order_id, timestamp).await?;
        parse_order_snapshot(&body).ok_or_else(|| invalid("order", &body))
    }

    async fn get_open_orders(&self, symbol: Option<&str>, timestamp: u64) -> Result<Vec<OrderSnapshot>, ExchangeError> {
        let body = self.open_orders(symbol, timestamp).await?;
        let arr = body.as_array().ok_or_else(|| invalid("open orders", &body))?;
        Ok(arr.iter().filter_map(parse_order_snapshot).collect())
    }

    async fn get_account_balance(&self, timestamp: u64) -> Result<Balances, ExchangeError> {
        let body = self.balance(timestamp).await?;
        parse_balances(&body).ok_or_else(|| invalid("balance", &body))
    }
}

// ---------------------------------------------------------------------------
// JSON → typed helpers
// ---------------------------------------------------------------------------

fn invalid(what: &str, body: &Value) -> ExchangeError {
    let mut text = body.to_string();
    text.truncate(200);
    ExchangeError::InvalidResponse(format!("missing {what} in {text}"))
}

/// Read a decimal that Binance may send as a string or a number.
fn dec_field(v: &Value, key: &str) -> Option<Decimal> {
    match v.get(key)? {
        Value::String(s) => Decimal::from_str(s).ok().map(|d| d.normalize()),
        Value::Number(n) => Decimal::from_str(&n.to_string()).ok().map(|d| d.normalize()),
        _ => None,
    }
}

/// Rules for every trading symbol in an `exchangeInfo` response.
pub fn parse_exchange_info(body: &Value) -> Result<HashMap<String, SymbolRules>, ExchangeError> {
    let symbols = body
        .get("symbols")
        .and_then(Value::as_array)
        .ok_or_else(|| invalid("symbols", body))?;

    Ok(symbols
        .iter()
        .filter(|s| s.get("status").and_then(Value::as_str).is_none_or(|st| st == "TRADING"))
        .filter_map(parse_symbol_rules)
        .map(|r| (r.symbol.clone(), r))
        .collect())
}

/// Build [`SymbolRules`] from one `symbols[]` entry.
///
/// `PRICE_FILTER` and `LOT_SIZE` are required; a missing `MIN_NOTIONAL`
/// filter falls back to [`DEFAULT_MIN_NOTIONAL`].
pub fn parse_symbol_rules(v: &Value) -> Option<SymbolRules> {
    let symbol = v.get("symbol")?.as_str()?.to_string();
    let filters = v.get("filters")?.as_array()?;
    let filter = |kind: &str| {
        filters
            .iter()
            .find(|f| f.get("filterType").and_then(Value::as_str) == Some(kind))
    };

    let price_filter = filter("PRICE_FILTER")?;
    let lot_size = filter("LOT_SIZE")?;
    let min_notional = filter("MIN_NOTIONAL")
        .and_then(|f| dec_field(f, "notional").or_else(|| dec_field(f, "minNotional")))
        .unwrap_or(DEFAULT_MIN_NOTIONAL);

    Some(SymbolRules {
        symbol,
        tick_size: dec_field(price_filter, "tickSize")?,
        step_size: dec_field(lot_size, "stepSize")?,
        min_notional,
        min_qty: dec_field(lot_size, "minQty")?,
        max_qty: dec_field(lot_size, "maxQty")?,
    })
}

/// Parse the `POST /fapi/v1/order` response.
pub fn parse_order_ack(v: &Value) -> Option<OrderAck> {
    Some(OrderAck {
        order_id: v.get("orderId")?.as_u64()?,
        client_order_id: v.get("clientOrderId").and_then(Value::as_str).unwrap_or_default().to_string(),
        status: OrderStatus::from_exchange(v.get("status")?.as_str()?),
        executed_qty: dec_field(v, "executedQty").unwrap_or_default(),
        avg_price: dec_field(v, "avgPrice").unwrap_or_default(),
    })
}

/// Parse a Binance order object (query, cancel, open orders).
pub fn parse_order_snapshot(v: &Value) -> Option<OrderSnapshot> {
    Some(OrderSnapshot {
        symbol: v.get("symbol")?.as_str()?.to_string(),
        order_id: v.get("orderId")?.as_u64()?,
        client_order_id: v.get("clientOrderId").and_then(Value::as_str).unwrap_or_default().to_string(),
        status: OrderStatus::from_exchange(v.get("status")?.as_str()?),
        side: v.get("side")?.as_str()?.parse().ok()?,
        order_type: v.get("type").and_then(Value::as_str).unwrap_or_default().to_string(),
        price: dec_field(v, "price").unwrap_or_default(),
        stop_price: dec_field(v, "stopPrice").unwrap_or_default(),
        quantity: dec_field(v, "origQty").unwrap_or_default(),
        filled_quantity: dec_field(v, "executedQty").unwrap_or_default(),
        avg_price: dec_field(v, "avgPrice").unwrap_or_default(),
        update_time: v.get("updateTime").and_then(Value::as_u64).unwrap_or(0),
    })
}

/// Parse `GET /fapi/v2/balance` into asset → wallet balance.
pub fn parse_balances(v: &Value) -> Option<Balances> {
    let arr = v.as_array()?;
    Some(
        arr.iter()
            .filter_map(|b| Some((b.get("asset")?.as_str()?.to_string(), dec_field(b, "balance")?)))
            .collect(),
    )
}
