//! Binance USDT-M futures REST client.
//!
//! Thin HTTP layer: builds (and signs) requests, maps failures to
//! [`ExchangeError`] and returns the raw JSON body. Typed parsing lives in
//! the parent module.
//!
//! # REST endpoints
//!
//! | Operation     | Method | Path                     | Signed |
//! |---------------|--------|--------------------------|--------|
//! | Exchange info | GET    | `/fapi/v1/exchangeInfo`  | no     |
//! | Server time   | GET    | `/fapi/v1/time`          | no     |
//! | Last price    | GET    | `/fapi/v1/ticker/price`  | no     |
//! | New order     | POST   | `/fapi/v1/order`         | yes    |
//! | Cancel order  | DELETE | `/fapi/v1/order`         | yes    |
//! | Query order   | GET    | `/fapi/v1/order`         | yes    |
//! | Open orders   | GET    | `/fapi/v1/openOrders`    | yes    |
//! | Balance       | GET    | `/fapi/v2/balance`       | yes    |

use std::time::Duration;

use anyhow::{Context, Result};
use fbot_core::error::ExchangeError;
use fbot_core::types::{OrderRequest, OrderType};
use reqwest::Method;
use tracing::debug;

use super::auth;
use super::config::BinanceFuturesConfig;

/// Binance USDT-M futures REST client.
pub struct FuturesClient {
    /// Shared HTTP client.
    http: reqwest::Client,
    api_key: String,
    /// Secret key for HMAC-SHA256 signing.
    secret_key: String,
    /// REST base URL (e.g. `https://testnet.binancefuture.com`).
    base_url: String,
    /// `recvWindow` for signed requests.
    recv_window: u64,
}

impl FuturesClient {
    /// Create a client (no connection is opened yet).
    pub fn new(config: &BinanceFuturesConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            http,
            api_key: config.api_key.clone(),
            secret_key: config.secret_key.clone(),
            base_url: config.rest_url.trim_end_matches('/').to_string(),
            recv_window: config.recv_window,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // -----------------------------------------------------------------------
    // Public endpoints
    // -----------------------------------------------------------------------

    pub async fn exchange_info(&self) -> Result<serde_json::Value, ExchangeError> {
        self.public_get("/fapi/v1/exchangeInfo", &[]).await
    }

    pub async fn server_time(&self) -> Result<serde_json::Value, ExchangeError> {
        self.public_get("/fapi/v1/time", &[]).await
    }

    pub async fn ticker_price(&self, symbol: &str) -> Result<serde_json::Value, ExchangeError> {
        self.public_get("/fapi/v1/ticker/price", &[("symbol", symbol)]).await
    }

    // -----------------------------------------------------------------------
    // Signed endpoints
    // -----------------------------------------------------------------------

    pub async fn new_order(&self, request: &OrderRequest, timestamp: u64) -> Result<serde_json::Value, ExchangeError> {
        let params = order_params(request);
        let refs: Vec<(&str, &str)> = params.iter().map(|(k, v)| (*k, v.as_str())).collect();
        self.signed(Method::POST, "/fapi/v1/order", &refs, timestamp).await
    }

    pub async fn delete_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<serde_json::Value, ExchangeError> {
        let oid = order_id.to_string();
        self.signed(Method::DELETE, "/fapi/v1/order", &[("symbol", symbol), ("orderId", &oid)], timestamp)
            .await
    }

    pub async fn query_order(&self, symbol: &str, order_id: u64, timestamp: u64) -> Result<serde_json::Value, ExchangeError> {
        let oid = order_id.to_string();
        self.signed(Method::GET, "/fapi/v1/order", &[("symbol", symbol), ("orderId", &oid)], timestamp)
            .await
    }

    pub async fn query_order_by_client_id(
        &self,
        symbol: &str,
        client_order_id: &str,
        timestamp: u64,
    ) -> Result<serde_json::Value, ExchangeError> {
        self.signed(
            Method::GET,
            "/fapi/v1/order",
            &[("symbol", symbol), ("origClientOrderId", client_order_id)],
            timestamp,
        )
        .await
    }

    /// Open orders, optionally filtered by symbol.
    pub async fn open_orders(&self, symbol: Option<&str>, timestamp: u64) -> Result<serde_json::Value, ExchangeError> {
        let mut params: Vec<(&str, &str)> = Vec::new();
        if let Some(sym) = symbol {
            params.push(("symbol", sym));
        }
        self.signed(Method::GET, "/fapi/v1/openOrders", &params, timestamp).await
    }

    pub async fn balance(&self, timestamp: u64) -> Result<serde_json::Value, ExchangeError> {
        self.signed(Method::GET, "/fapi/v2/balance", &[], timestamp).await
    }

    // -----------------------------------------------------------------------
    // Request helpers
    // -----------------------------------------------------------------------

    async fn public_get(&self, path: &str, params: &[(&str, &str)]) -> Result<serde_json::Value, ExchangeError> {
        let url = if params.is_empty() {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}{path}?{}", self.base_url, auth::encode_query(params))
        };
        let resp = self.http.get(&url).send().await.map_err(transport_error)?;
        read_json(resp).await
    }

    async fn signed(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, &str)],
        timestamp: u64,
    ) -> Result<serde_json::Value, ExchangeError> {
        let recv_str = self.recv_window.to_string();
        let ts_str = timestamp.to_string();
        let mut all: Vec<(&str, &str)> = params.to_vec();
        all.push(("recvWindow", &recv_str));
        all.push(("timestamp", &ts_str));

        let query = auth::build_signed_query(&all, &self.secret_key);
        let url = format!("{}{path}?{query}", self.base_url);
        debug!("[binance] {method} {path}");

        let resp = self
            .http
            .request(method, &url)
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await
            .map_err(transport_error)?;
        read_json(resp).await
    }
}

/// Parameters for `POST /fapi/v1/order`, in the order they are signed.
pub fn order_params(request: &OrderRequest) -> Vec<(&'static str, String)> {
    let mut params = vec![
        ("symbol", request.symbol.clone()),
        ("side", request.side.as_str().to_string()),
        ("type", request.order_type.exchange_type().to_string()),
        ("quantity", request.quantity.normalize().to_string()),
    ];
    if let Some(price) = request.price {
        params.push(("price", price.normalize().to_string()));
    }
    if let Some(stop) = request.stop_price {
        params.push(("stopPrice", stop.normalize().to_string()));
    }
    if let Some(tif) = request.time_in_force {
        params.push(("timeInForce", tif.as_str().to_string()));
    }
    params.push(("newClientOrderId", request.client_order_id.clone()));
    if request.order_type == OrderType::Market {
        // Report fills in the acknowledgement.
        params.push(("newOrderRespType", "RESULT".to_string()));
    }
    params
}

/// Map a non-2xx response body (`{"code":-2019,"msg":"..."}`) to an error.
pub fn http_error(status: u16, body: &str) -> ExchangeError {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let code = parsed.as_ref().and_then(|v| v.get("code")).and_then(|c| c.as_i64());
    let message = parsed
        .as_ref()
        .and_then(|v| v.get("msg"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
        .unwrap_or_else(|| body.chars().take(200).collect());
    ExchangeError::Http { status, code, message }
}

fn transport_error(e: reqwest::Error) -> ExchangeError {
    ExchangeError::Transport(e.to_string())
}

async fn read_json(resp: reqwest::Response) -> Result<serde_json::Value, ExchangeError> {
    let status = resp.status();
    let body = resp.text().await.map_err(transport_error)?;
    if !status.is_success() {
        return Err(http_error(status.as_u16(), &body));
    }
    serde_json::from_str(&body).map_err(|e| ExchangeError::InvalidResponse(format!("{e}: {body}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fbot_core::error::ErrorClass;
    use fbot_core::types::{Side, TimeInForce};
    use rust_decimal_macros::dec;

    fn param<'a>(params: &'a [(&'static str, String)], key: &str) -> Option<&'a str> {
        params.iter().find(|(k, _)| *k == key).map(|(_, v)| v.as_str())
    }

    #[test]
    fn market_order_requests_result_response() {
        let req = OrderRequest::market("BTCUSDT", Side::Buy, dec!(0.0030), "fb-1".into());
        let params = order_params(&req);
        assert_eq!(param(&params, "type"), Some("MARKET"));
        assert_eq!(param(&params, "quantity"), Some("0.003"));
        assert_eq!(param(&params, "newOrderRespType"), Some("RESULT"));
        assert_eq!(param(&params, "price"), None);
        assert_eq!(param(&params, "timeInForce"), None);
    }

    #[test]
    fn stop_limit_is_sent_as_stop_with_both_prices() {
        let req = OrderRequest {
            symbol: "BTCUSDT".into(),
            side: Side::Sell,
            order_type: OrderType::StopLimit,
            quantity: dec!(0.002),
            price: Some(dec!(99000.0)),
            stop_price: Some(dec!(99500)),
            time_in_force: Some(TimeInForce::Gtc),
            client_order_id: "fb-2".into(),
        };
        let params = order_params(&req);
        assert_eq!(param(&params, "type"), Some("STOP"));
        assert_eq!(param(&params, "price"), Some("99000"));
        assert_eq!(param(&params, "stopPrice"), Some("99500"));
        assert_eq!(param(&params, "timeInForce"), Some("GTC"));
        assert_eq!(param(&params, "newClientOrderId"), Some("fb-2"));
        assert_eq!(param(&params, "newOrderRespType"), None);
    }

    #[test]
    fn error_body_is_decoded() {
        let err = http_error(400, r#"{"code":-1021,"msg":"Timestamp for this request is outside of the recvWindow."}"#);
        assert_eq!(err.code(), Some(-1021));
        assert_eq!(err.class(), ErrorClass::TimestampSkew);

        let err = http_error(502, "<html>Bad Gateway</html>");
        assert_eq!(err.code(), None);
        assert_eq!(err.class(), ErrorClass::Retryable);
        assert!(err.to_string().contains("Bad Gateway"));
    }
}
