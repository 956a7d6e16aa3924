//! Exchange clock offset tracking.
//!
//! Signed Binance requests are rejected (code -1021) when their timestamp
//! falls outside `recvWindow` of server time. [`ClockSync`] keeps the offset
//! `server - local` and stamps requests with local time plus that offset.
//!
//! The offset is a single atomic word, so readers always see the last
//! complete value. Resyncs are serialized by an async mutex.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

use fbot_core::error::ExchangeError;
use fbot_core::time_util::{now_ms, offset_ms};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::ExchangeApi;

/// Local-to-exchange clock offset.
#[derive(Debug, Default)]
pub struct ClockSync {
    /// Exchange time minus local time, in ms.
    offset_ms: AtomicI64,
    /// The last sync failed and the offset was reset to zero.
    degraded: AtomicBool,
    /// Local time of the last successful sync (0 = never).
    last_sync_ms: AtomicU64,
    sync_lock: Mutex<()>,
}

impl ClockSync {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn offset_ms(&self) -> i64 {
        self.offset_ms.load(Ordering::Acquire)
    }

    /// `true` while running on local time after a failed sync.
    pub fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Acquire)
    }

    pub fn last_sync_ms(&self) -> Option<u64> {
        match self.last_sync_ms.load(Ordering::Acquire) {
            0 => None,
            ms => Some(ms),
        }
    }

    /// Timestamp to put on a signed request.
    pub fn current_skewed_time(&self) -> u64 {
        offset_ms(now_ms(), self.offset_ms())
    }

    /// Fetch server time and store the new offset.
    ///
    /// On failure the offset falls back to zero and the clock is flagged as
    /// degraded; the error is returned for the caller to report.
    pub async fn sync(&self, api: &dyn ExchangeApi) -> Result<i64, ExchangeError> {
        let _guard = self.sync_lock.lock().await;

        let local_at_request = now_ms();
        match api.get_server_time().await {
            Ok(server_time) => {
                let offset = server_time as i64 - local_at_request as i64;
                self.offset_ms.store(offset, Ordering::Release);
                self.degraded.store(false, Ordering::Release);
                self.last_sync_ms.store(local_at_request, Ordering::Release);
                info!("[clock] synced with exchange, offset={offset}ms");
                Ok(offset)
            }
            Err(e) => {
                self.offset_ms.store(0, Ordering::Release);
                self.degraded.store(true, Ordering::Release);
                warn!("[clock] sync failed, continuing on local time: {e}");
                Err(e)
            }
        }
    }
}
