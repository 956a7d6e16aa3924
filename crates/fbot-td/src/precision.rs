//! Symbol rules cache and order normalization.
//!
//! Rules for every listed symbol are loaded from exchange info on the first
//! miss and kept for the lifetime of the process. Entries are never replaced,
//! so a caller holding an `Arc<SymbolRules>` always sees the same values.

use std::collections::HashMap;
use std::sync::Arc;

use fbot_core::error::PrecisionError;
use fbot_core::types::{Normalized, PriceRounding, SymbolRules};
use rust_decimal::Decimal;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::gateway::OrderGateway;

pub struct PrecisionNormalizer {
    rules: RwLock<HashMap<String, Arc<SymbolRules>>>,
    /// Serializes exchange-info refreshes so concurrent misses fetch once.
    refresh_lock: Mutex<()>,
    rounding: PriceRounding,
}

impl PrecisionNormalizer {
    pub fn new(rounding: PriceRounding) -> Self {
        Self {
            rules: RwLock::new(HashMap::new()),
            refresh_lock: Mutex::new(()),
            rounding,
        }
    }

    pub fn rounding(&self) -> PriceRounding {
        self.rounding
    }

    /// Cached rules for `symbol`, without touching the exchange.
    pub async fn cached(&self, symbol: &str) -> Option<Arc<SymbolRules>> {
        self.rules.read().await.get(symbol).cloned()
    }

    /// Rules for `symbol`, fetching exchange info on a cache miss.
    pub async fn rules(&self, gateway: &OrderGateway, symbol: &str) -> Result<Arc<SymbolRules>, PrecisionError> {
        if let Some(rules) = self.cached(symbol).await {
            return Ok(rules);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another task may have refreshed while we waited.
        if let Some(rules) = self.cached(symbol).await {
            return Ok(rules);
        }

        let fetched = gateway.exchange_info().await.map_err(|e| {
            warn!("[precision] exchange info unavailable for {symbol}: {e}");
            PrecisionError::InvalidSymbol { symbol: symbol.to_string(), reason: e.to_string() }
        })?;

        let mut rules = self.rules.write().await;
        let count = fetched.len();
        for (name, r) in fetched {
            rules.entry(name).or_insert_with(|| Arc::new(r));
        }
        info!("[precision] loaded rules for {count} symbols");

        rules.get(symbol).cloned().ok_or_else(|| PrecisionError::InvalidSymbol {
            symbol: symbol.to_string(),
            reason: "not listed on the exchange".into(),
        })
    }

    /// Round and validate a raw price/quantity for `symbol`.
    ///
    /// `reference` is the current market price, used for rounding ties and
    /// for the notional check of market orders.
    pub async fn normalize(
        &self,
        gateway: &OrderGateway,
        symbol: &str,
        raw_price: Option<Decimal>,
        raw_qty: Decimal,
        reference: Option<Decimal>,
    ) -> Result<Normalized, PrecisionError> {
        let rules = self.rules(gateway, symbol).await?;
        rules.normalize(raw_price, raw_qty, self.rounding, reference)
    }
}
