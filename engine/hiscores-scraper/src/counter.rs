use tokio::sync::watch;

/// Monotonic counter whose changes can be awaited. Workers use it as an
/// ordering gate: the holder of job `n` waits until the counter reaches
/// `n`, emits, then advances it.
pub struct JobCounter {
    tx: watch::Sender<u64>,
}

impl JobCounter {
    pub fn new(start: u64) -> Self {
        let (tx, _rx) = watch::channel(start);
        Self { tx }
    }

    pub fn value(&self) -> u64 {
        *self.tx.borrow()
    }

    /// Advance by one, waking every waiter; returns the new value
    pub fn next(&self) -> u64 {
        self.tx.send_modify(|v| *v += 1);
        self.value()
    }

    /// Wait until the counter moves past `last_seen`; returns the new value
    pub async fn await_next(&self, last_seen: u64) -> u64 {
        self.wait_for(|v| v > last_seen).await
    }

    /// Wait until the counter reaches `target`
    pub async fn wait_until(&self, target: u64) {
        self.wait_for(|v| v >= target).await;
    }

    async fn wait_for(&self, ready: impl Fn(u64) -> bool) -> u64 {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close under us
        let value = match rx.wait_for(|v| ready(*v)).await {
            Ok(v) => *v,
            Err(_) => self.value(),
        };
        value
    }
}
