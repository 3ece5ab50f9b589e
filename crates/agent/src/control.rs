//! External pause / stop signalling for a running agent.
//!
//! The loop samples the signal at the top of every step, never mid-step.

use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunSignal {
    Run,
    Pause,
    Stop,
}

/// Cloneable handle for steering a run from outside the loop.
///
/// `stop` is sticky: once stopped, `pause` and `resume` have no effect.
#[derive(Debug, Clone)]
pub struct RunControl {
    tx: Arc<watch::Sender<RunSignal>>,
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

impl RunControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(RunSignal::Run);
        Self { tx: Arc::new(tx) }
    }

    pub fn pause(&self) {
        self.set(RunSignal::Pause);
    }

    pub fn resume(&self) {
        self.set(RunSignal::Run);
    }

    pub fn stop(&self) {
        self.set(RunSignal::Stop);
    }

    pub fn signal(&self) -> RunSignal {
        *self.tx.borrow()
    }

    pub fn is_stopped(&self) -> bool {
        self.signal() == RunSignal::Stop
    }

    /// Watch for signal changes.
    pub fn subscribe(&self) -> watch::Receiver<RunSignal> {
        self.tx.subscribe()
    }

    fn set(&self, signal: RunSignal) {
        self.tx.send_if_modified(|current| {
            if *current == RunSignal::Stop || *current == signal {
                return false;
            }
            *current = signal;
            true
        });
    }
}
