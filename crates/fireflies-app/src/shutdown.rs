//! Broadcast, level-triggered cancellation shared by every runtime task.

use tokio::sync::watch;

/// Owning side of a cancellation signal.
#[derive(Debug)]
pub struct ShutdownTrigger {
    sender: watch::Sender<bool>,
}

/// Observing side; cheap to clone, one per task.
#[derive(Debug, Clone)]
pub struct Shutdown {
    receiver: watch::Receiver<bool>,
}

impl ShutdownTrigger {
    #[must_use]
    pub fn new() -> Self {
        let (sender, _) = watch::channel(false);
        Self { sender }
    }

    /// New observer; subscribing after the trigger fired still observes it.
    #[must_use]
    pub fn subscribe(&self) -> Shutdown {
        Shutdown {
            receiver: self.sender.subscribe(),
        }
    }

    /// Fire the signal. Idempotent.
    pub fn trigger(&self) {
        self.sender.send_replace(true);
    }

    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.sender.borrow()
    }
}

impl Default for ShutdownTrigger {
    fn default() -> Self {
        Self::new()
    }
}

impl Shutdown {
    #[must_use]
    pub fn is_triggered(&self) -> bool {
        *self.receiver.borrow()
    }

    /// Resolves once the signal has fired (immediately if it already has).
    ///
    /// A dropped trigger counts as fired so orphaned tasks never hang.
    pub async fn cancelled(&mut self) {
        let _ = self.receiver.wait_for(|fired| *fired).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn signal_is_level_triggered() {
        let trigger = ShutdownTrigger::new();
        let mut early = trigger.subscribe();
        assert!(!early.is_triggered());

        trigger.trigger();
        let mut late = trigger.subscribe();
        for _ in 0..3 {
            tokio::time::timeout(Duration::from_millis(100), early.cancelled())
                .await
                .expect("early observer sees the signal repeatedly");
        }
        tokio::time::timeout(Duration::from_millis(100), late.cancelled())
            .await
            .expect("late observer sees the signal");
        assert!(trigger.is_triggered());
        assert!(late.is_triggered());
    }

    #[tokio::test]
    async fn pending_until_triggered() {
        let trigger = ShutdownTrigger::new();
        let mut shutdown = trigger.subscribe();
        let waited = tokio::time::timeout(Duration::from_millis(30), shutdown.cancelled()).await;
        assert!(waited.is_err(), "must not resolve before the trigger fires");
    }

    #[tokio::test]
    async fn dropped_trigger_releases_waiters() {
        let trigger = ShutdownTrigger::new();
        let mut shutdown = trigger.subscribe();
        drop(trigger);
        tokio::time::timeout(Duration::from_millis(100), shutdown.cancelled())
            .await
            .expect("waiter released");
    }
}
