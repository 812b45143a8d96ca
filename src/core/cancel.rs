//! Cancellation signal shared by the pump loops and the supervisor.
//!
//! A `CancelHandle` flips a `watch` flag once; every `CancelSignal` cloned
//! from it observes the flip. Dropping the handle also counts as
//! cancellation so a loop can never outlive its owner.

use tokio::sync::watch;

#[derive(Debug)]
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

#[derive(Debug, Clone)]
pub struct CancelSignal {
    rx: watch::Receiver<bool>,
}

impl CancelHandle {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(false);
        Self { tx }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }

    pub fn signal(&self) -> CancelSignal {
        CancelSignal {
            rx: self.tx.subscribe(),
        }
    }
}

impl Default for CancelHandle {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelSignal {
    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Completes once the handle is cancelled or dropped.
    pub async fn cancelled(&mut self) {
        // Err means the handle is gone, which is treated the same way.
        let _ = self.rx.wait_for(|cancelled| *cancelled).await;
    }
}
