//! Suspension points used by the gateway and the TWAP loop.
//!
//! Every wait in the engine goes through a [`Sleeper`], so tests can replace
//! real time with a recording or gated fake.

use std::time::Duration;

use async_trait::async_trait;

/// Something that can suspend the current task.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Production sleeper backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
