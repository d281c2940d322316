//! Broadcast shutdown signalling.
//!
//! Every long-running thread holds a [`ShutdownSignal`] and includes it in
//! its `select!` loop. Signalling works by dropping the sole sender of a
//! zero-capacity channel: all receivers observe the disconnect at once, and
//! a receiver created after the signal observes it immediately.

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError};

/// Owner side of the shutdown broadcast. Dropping it also signals.
pub struct Shutdown {
    tx: Option<Sender<()>>,
    rx: Receiver<()>,
}

impl Shutdown {
    #[must_use]
    pub fn new() -> Self {
        let (tx, rx) = bounded(0);
        Self { tx: Some(tx), rx }
    }

    /// A receiver for one task's `select!` loop.
    #[must_use]
    pub fn subscribe(&self) -> ShutdownSignal {
        ShutdownSignal {
            rx: self.rx.clone(),
        }
    }

    /// Broadcast shutdown. Idempotent.
    pub fn signal(&mut self) {
        self.tx.take();
    }
}

impl Default for Shutdown {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiver side: completes a `recv` select arm once shutdown is signalled.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: Receiver<()>,
}

impl ShutdownSignal {
    /// The raw receiver, for use in `select!` arms.
    #[must_use]
    pub fn receiver(&self) -> &Receiver<()> {
        &self.rx
    }

    /// Non-blocking check, for loops that cannot park on a select.
    #[must_use]
    pub fn is_signalled(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::select;
    use std::time::Duration;

    #[test]
    fn signal_wakes_select() {
        let mut shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        shutdown.signal();
        select! {
            recv(signal.receiver()) -> _ => {}
            default(Duration::from_secs(1)) => panic!("signal not observed"),
        }
    }

    #[test]
    fn not_signalled_until_asked() {
        let shutdown = Shutdown::new();
        let signal = shutdown.subscribe();
        assert!(!signal.is_signalled());
    }

    #[test]
    fn late_subscribers_see_the_signal() {
        let mut shutdown = Shutdown::new();
        shutdown.signal();
        assert!(shutdown.subscribe().is_signalled());
    }

    #[test]
    fn drop_signals() {
        let signal = {
            let shutdown = Shutdown::new();
            shutdown.subscribe()
        };
        assert!(signal.is_signalled());
    }
}
