//! External interrupt signalling
//!
//! A run is cut short by firing the [`InterruptTrigger`], usually from a
//! Ctrl-C handler. The sequencer holds the [`Interrupt`] side and checks it
//! before every step and while waiting on requests or settle delays.

use tokio::sync::watch;

/// Fires the interrupt
#[derive(Debug)]
pub struct InterruptTrigger {
    tx: watch::Sender<bool>,
}

impl InterruptTrigger {
    pub fn fire(&self) {
        self.tx.send_replace(true);
    }
}

/// Observes the interrupt
#[derive(Debug, Clone)]
pub struct Interrupt {
    rx: watch::Receiver<bool>,
}

impl Interrupt {
    /// A linked trigger/observer pair
    pub fn pair() -> (InterruptTrigger, Interrupt) {
        let (tx, rx) = watch::channel(false);
        (InterruptTrigger { tx }, Interrupt { rx })
    }

    /// An interrupt that can never fire
    pub fn never() -> Self {
        let (_, interrupt) = Self::pair();
        interrupt
    }

    pub fn is_set(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the interrupt fires; pending forever if it cannot
    pub async fn triggered(&self) {
        let mut rx = self.rx.clone();
        if rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_fire_is_observed() {
        let (trigger, interrupt) = Interrupt::pair();
        assert!(!interrupt.is_set());

        trigger.fire();
        assert!(interrupt.is_set());
        tokio::time::timeout(Duration::from_secs(1), interrupt.triggered())
            .await
            .expect("triggered should resolve");
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_stays_pending() {
        let interrupt = Interrupt::never();
        let waited = tokio::time::timeout(Duration::from_secs(5), interrupt.triggered()).await;
        assert!(waited.is_err());
        assert!(!interrupt.is_set());
    }
}
