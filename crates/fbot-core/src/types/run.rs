//! Strategy runs: the intent a caller submitted and everything that was sent
//! to the exchange on its behalf.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{OrderType, RunStatus, Side, StrategyKind, TimeInForce};
use super::trading::{OrderOutcome, OrderRequest};

/// Unique id of a strategy run within a session.
pub type RunId = Uuid;

// ---------------------------------------------------------------------------
// Intents
// ---------------------------------------------------------------------------

/// A single order exactly as the user asked for it (not yet rounded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimpleIntent {
    pub symbol: String,
    pub side: Side,
    pub order_type: OrderType,
    pub quantity: Decimal,
    pub price: Option<Decimal>,
    pub stop_price: Option<Decimal>,
    pub time_in_force: Option<TimeInForce>,
}

/// A market order split into equal slices over a duration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TwapIntent {
    pub symbol: String,
    pub side: Side,
    pub total_quantity: Decimal,
    pub duration_minutes: u32,
    pub slices: u32,
}

/// Resting limit orders at evenly spaced prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridIntent {
    pub symbol: String,
    pub side: Side,
    pub total_quantity: Decimal,
    pub lower_price: Decimal,
    pub upper_price: Decimal,
    pub levels: u32,
}

/// The original request behind a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "strategy", rename_all = "lowercase")]
pub enum Intent {
    Simple(SimpleIntent),
    Twap(TwapIntent),
    Grid(GridIntent),
}

impl Intent {
    pub fn kind(&self) -> StrategyKind {
        match self {
            Self::Simple(_) => StrategyKind::Simple,
            Self::Twap(_) => StrategyKind::Twap,
            Self::Grid(_) => StrategyKind::Grid,
        }
    }

    pub fn symbol(&self) -> &str {
        match self {
            Self::Simple(i) => &i.symbol,
            Self::Twap(i) => &i.symbol,
            Self::Grid(i) => &i.symbol,
        }
    }
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

/// One submitted child order and what came of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildOrder {
    pub request: OrderRequest,
    pub outcome: OrderOutcome,
}

/// One invocation of a strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyRun {
    pub id: RunId,
    pub intent: Intent,
    /// Number of child orders the plan contains.
    pub planned: usize,
    /// Executed children, in submission order.
    pub children: Vec<ChildOrder>,
    pub status: RunStatus,
    /// The caller stopped the run before every child was submitted.
    pub cancelled: bool,
    pub created_at_ms: u64,
    pub finished_at_ms: Option<u64>,
}

impl StrategyRun {
    pub fn new(id: RunId, intent: Intent, planned: usize, created_at_ms: u64) -> Self {
        Self {
            id,
            intent,
            planned,
            children: Vec::with_capacity(planned),
            status: RunStatus::Pending,
            cancelled: false,
            created_at_ms,
            finished_at_ms: None,
        }
    }

    pub fn kind(&self) -> StrategyKind {
        self.intent.kind()
    }

    /// Children the exchange accepted.
    pub fn accepted(&self) -> usize {
        self.children.iter().filter(|c| c.outcome.is_accepted()).count()
    }

    /// Planned children that were never submitted.
    pub fn skipped(&self) -> usize {
        self.planned.saturating_sub(self.children.len())
    }

    /// Sum of filled quantity across accepted children.
    pub fn filled_quantity(&self) -> Decimal {
        self.children
            .iter()
            .filter_map(|c| match c.outcome {
                OrderOutcome::Accepted { filled_qty, .. } => Some(filled_qty),
                OrderOutcome::Rejected { .. } => None,
            })
            .sum()
    }

    /// Aggregate status once no more children will be submitted.
    ///
    /// - Cancelled run: `Completed` if every submitted child was accepted,
    ///   else `PartiallyFilled`. Skipped children do not count.
    /// - Every planned child accepted → `Completed`.
    /// - No child accepted → `Failed`, except for a grid, which is
    ///   `PartiallyFilled` whenever any level is missing.
    /// - Otherwise → `PartiallyFilled`.
    pub fn final_status(&self) -> RunStatus {
        let accepted = self.accepted();
        if self.cancelled {
            return if accepted == self.children.len() {
                RunStatus::Completed
            } else {
                RunStatus::PartiallyFilled
            };
        }
        if accepted == self.planned {
            RunStatus::Completed
        } else if accepted == 0 && self.kind() != StrategyKind::Grid {
            RunStatus::Failed
        } else {
            RunStatus::PartiallyFilled
        }
    }
}
