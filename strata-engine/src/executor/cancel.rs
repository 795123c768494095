//! Run cancellation
//!
//! A cancelled run stops dispatching new waves; stages already in flight run
//! to completion.

use tokio::sync::watch;

/// Creates a connected trigger/signal pair
pub fn cancellation() -> (CancelTrigger, CancelSignal) {
    let (tx, rx) = watch::channel(false);
    (CancelTrigger(tx), CancelSignal(rx))
}

/// Requests cancellation of the run observing the paired signal
#[derive(Debug)]
pub struct CancelTrigger(watch::Sender<bool>);

impl CancelTrigger {
    pub fn cancel(&self) {
        self.0.send_replace(true);
    }
}

/// Observed by the executor between waves
#[derive(Debug, Clone)]
pub struct CancelSignal(watch::Receiver<bool>);

impl CancelSignal {
    /// A signal nobody can fire
    pub fn never() -> Self {
        cancellation().1
    }

    pub fn is_cancelled(&self) -> bool {
        *self.0.borrow()
    }
}
