//! Manual-reset events used to coordinate the receive thread with its owner.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// A latch that stays set until explicitly reset, waking every waiter.
#[derive(Debug, Default)]
pub struct Event {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Event {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        let mut flag = self.flag.lock();
        *flag = true;
        self.cond.notify_all();
    }

    pub fn reset(&self) {
        *self.flag.lock() = false;
    }

    pub fn is_set(&self) -> bool {
        *self.flag.lock()
    }

    /// Block until the event is set or `timeout` elapses. Returns whether it was set.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut flag = self.flag.lock();
        while !*flag {
            if self.cond.wait_until(&mut flag, deadline).timed_out() {
                break;
            }
        }
        *flag
    }
}

/// The per-connection signal bundle, allocated on open and dropped on close.
#[derive(Debug, Default)]
pub(crate) struct Signals {
    /// Set by `close`; every wait in the channel also watches this.
    pub shutdown: Event,
    /// Set by the receive thread right before it returns.
    pub receive_exited: Event,
    /// Set whenever a write finishes, successfully or not.
    pub send_idle: Event,
}

impl Signals {
    pub fn new() -> Self {
        let signals = Self::default();
        signals.send_idle.set();
        signals
    }
}
