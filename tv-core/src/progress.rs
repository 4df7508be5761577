//! Per-job/per-session progress fan-out (spec.md §4.8).
//!
//! State is published as whole snapshots rather than deltas: a subscriber that reconnects simply
//! reads the latest snapshot instead of replaying a log, which sidesteps lost-update hazards.
//! [`tokio::sync::watch`] gives exactly that semantics for free.

use tokio::sync::watch;

/// A handle that publishes snapshots of `T` to any number of subscribers. Cheaply `Clone`, so a
/// blocking parse worker can hold its own copy and publish progress without touching any
/// outer lock (spec.md §4.8).
#[derive(Debug)]
pub struct ProgressPublisher<T> {
    tx: watch::Sender<T>,
}

impl<T> Clone for ProgressPublisher<T> {
    fn clone(&self) -> Self {
        Self { tx: self.tx.clone() }
    }
}

impl<T: Clone> ProgressPublisher<T> {
    pub fn new(initial: T) -> (Self, ProgressSubscriber<T>) {
        let (tx, rx) = watch::channel(initial);
        (Self { tx }, ProgressSubscriber { rx })
    }

    /// Publishes a new snapshot. Never blocks; subscribers simply see the latest value whenever
    /// they next poll.
    pub fn publish(&self, snapshot: T) {
        let _ = self.tx.send(snapshot);
    }

    pub fn subscribe(&self) -> ProgressSubscriber<T> {
        ProgressSubscriber {
            rx: self.tx.subscribe(),
        }
    }

    pub fn current(&self) -> T {
        self.tx.borrow().clone()
    }
}

/// A read-only view of a [`ProgressPublisher`]'s latest snapshot.
#[derive(Debug, Clone)]
pub struct ProgressSubscriber<T> {
    rx: watch::Receiver<T>,
}

impl<T: Clone> ProgressSubscriber<T> {
    pub fn current(&self) -> T {
        self.rx.borrow().clone()
    }

    /// Awaits the next snapshot distinct from the one last observed by this subscriber.
    pub async fn changed(&mut self) -> Option<T> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow().clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_observes_published_snapshots_in_order() {
        let (publisher, mut subscriber) = ProgressPublisher::new(0u32);
        assert_eq!(subscriber.current(), 0);

        publisher.publish(10);
        assert_eq!(subscriber.changed().await, Some(10));

        publisher.publish(100);
        assert_eq!(subscriber.current(), 100);
    }
}
