//! Run-level cancellation signal
//!
//! One watch channel carries the stop flag to every in-flight task: agent
//! actions, local subprocesses, and the job lifecycle manager. The helper
//! here resolves only on a genuine cancel; a dropped sender means the run
//! owner went away without cancelling, which must never read as a stop.

use tokio::sync::watch;

/// Create the cancellation pair for one run
pub fn channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Resolve when the flag turns true; never resolves on sender drop
pub async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_resolves_on_cancel() {
        let (tx, mut rx) = channel();
        let task = tokio::spawn(async move {
            cancelled(&mut rx).await;
            true
        });
        tx.send(true).unwrap();
        assert!(task.await.unwrap());
    }

    #[tokio::test]
    async fn test_already_cancelled_resolves_immediately() {
        let (tx, mut rx) = channel();
        tx.send(true).unwrap();
        cancelled(&mut rx).await;
    }

    #[tokio::test]
    async fn test_sender_drop_does_not_resolve() {
        let (tx, mut rx) = channel();
        drop(tx);

        let result = tokio::time::timeout(Duration::from_millis(100), cancelled(&mut rx)).await;
        assert!(result.is_err(), "dropped sender must not look like a cancel");
    }
}
