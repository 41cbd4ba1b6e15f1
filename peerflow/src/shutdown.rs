use tokio::sync::watch;

/// Cancellation handle for long-running source and destination operations.
/// Triggering it cuts the replication socket mid-pull and makes transactional
/// work roll back at the next suspension point.
#[derive(Debug, Clone)]
pub struct ShutdownTx(watch::Sender<bool>);

pub type ShutdownRx = watch::Receiver<bool>;

impl ShutdownTx {
    pub fn trigger(&self) {
        // the only send failure is "no receivers left", which means
        // everything already stopped
        let _ = self.0.send(true);
    }

    pub fn subscribe(&self) -> ShutdownRx {
        self.0.subscribe()
    }
}

pub fn shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(tx), rx)
}

/// Resolves once the channel has been triggered. Usable inside `select!`
/// against the operation being cancelled.
pub async fn triggered(rx: &mut ShutdownRx) {
    while !*rx.borrow() {
        if rx.changed().await.is_err() {
            // sender dropped without triggering; treat as shutdown
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn trigger_wakes_subscribers() {
        let (tx, mut rx) = shutdown_channel();
        assert!(!*rx.borrow());
        tx.trigger();
        triggered(&mut rx).await;
        assert!(*rx.borrow());
    }

    #[tokio::test]
    async fn dropped_sender_counts_as_shutdown() {
        let (tx, mut rx) = shutdown_channel();
        drop(tx);
        triggered(&mut rx).await;
    }
}
