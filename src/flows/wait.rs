use std::time::Duration;

use async_trait::async_trait;

/// Strategy seam for the simulated-hardware waits. Production uses real
/// timers; tests plug in a zero-delay fake or a recorder. If the backend
/// ever reports real insertion/unlock completion, a confirming
/// implementation slots in here without touching the flows.
#[async_trait]
pub trait WaitStrategy: Send + Sync {
    async fn wait(&self, duration: Duration);
}

/// Real non-blocking timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimerWait;

#[async_trait]
impl WaitStrategy for TimerWait {
    async fn wait(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Completes immediately. For tests and non-interactive runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoWait;

#[async_trait]
impl WaitStrategy for NoWait {
    async fn wait(&self, _duration: Duration) {}
}
