//! Events emitted by the engine to downstream consumers (the runner, a UI).
//!
//! The consumer polls an [`EngineEventReceiver`] and reacts to run progress
//! and clock sync health. Sending never blocks the engine.

use fbot_core::types::{ChildOrder, RunId, RunStatus, StrategyKind};

/// A typed event emitted by the [`TradingEngine`](crate::TradingEngine).
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A run started submitting child orders.
    RunStarted {
        run_id: RunId,
        kind: StrategyKind,
        /// Number of child orders in the plan.
        planned: usize,
    },

    /// One child order was submitted and its outcome recorded.
    ChildRecorded {
        run_id: RunId,
        /// Zero-based position in the plan.
        index: usize,
        child: ChildOrder,
    },

    /// A run reached a terminal status.
    RunFinished {
        run_id: RunId,
        status: RunStatus,
        /// The run was stopped before every child was submitted.
        cancelled: bool,
    },

    /// Exchange clock offset refreshed.
    ClockSynced {
        offset_ms: i64,
    },

    /// Clock sync failed; requests are stamped with local time.
    ClockSyncFailed {
        message: String,
    },
}

/// Sender half of the engine event channel.
pub type EngineEventSender = tokio::sync::mpsc::UnboundedSender<EngineEvent>;

/// Receiver half of the engine event channel.
pub type EngineEventReceiver = tokio::sync::mpsc::UnboundedReceiver<EngineEvent>;
