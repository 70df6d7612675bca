use std::time;

/// How long the worker waits after a failure before trying again.
///
/// The interval is fixed: every failed store connection attempt and every failed cycle waits
/// the same amount, however many failures came before it.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Backoff {
    interval: time::Duration,
}

impl Backoff {
    pub fn fixed(interval: time::Duration) -> Self {
        Self { interval }
    }

    pub fn interval(&self) -> time::Duration {
        self.interval
    }

    pub async fn wait(&self) {
        tokio::time::sleep(self.interval).await
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            interval: time::Duration::from_secs(5),
        }
    }
}
