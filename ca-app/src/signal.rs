//! Content-free "history changed" notifications from a running turn to the UI.
//!
//! Backed by a `watch` generation counter: bursts of notifications collapse
//! into one wake-up, and dropping the sender closes the channel.

use tokio::sync::watch;

/// Producer half, owned by the turn task.
#[derive(Debug)]
pub struct UpdateSignal {
    tx: watch::Sender<u64>,
}

/// Consumer half, held by whoever renders the transcript.
#[derive(Debug, Clone)]
pub struct Updates {
    rx: watch::Receiver<u64>,
}

impl UpdateSignal {
    pub fn channel() -> (Self, Updates) {
        let (tx, rx) = watch::channel(0);
        (Self { tx }, Updates { rx })
    }

    /// Never blocks, even when nobody is listening.
    pub fn notify(&self) {
        self.tx.send_modify(|generation| *generation += 1);
    }

    pub fn generation(&self) -> u64 {
        *self.tx.borrow()
    }
}

impl Updates {
    /// Resolves once the history changed since the last call, or `false`
    /// once the turn is over and every change has been observed.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }

    /// Number of notifications sent so far.
    pub fn generation(&self) -> u64 {
        *self.rx.borrow()
    }
}
