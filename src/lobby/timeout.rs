//! Cancellable ready-up timers
//!
//! A [`ReadyTimeout`] is a one-shot race between the ready-up deadline and a
//! cancellation. Exactly one side wins: the state moves out of `Armed`
//! through a single compare-and-swap, so an expiry that loses to a cancel
//! never applies, and a cancel that loses to an expiry is a no-op.

use std::sync::atomic::{AtomicU8, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

const ARMED: u8 = 0;
const CANCELLED: u8 = 1;
const FIRED: u8 = 2;

/// Where a timer is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    Armed,
    Cancelled,
    Fired,
}

impl TimerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ARMED => TimerState::Armed,
            CANCELLED => TimerState::Cancelled,
            _ => TimerState::Fired,
        }
    }
}

/// How a timer wait ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOutcome {
    /// The deadline passed while the timer was still armed
    Elapsed,
    /// The timer was cancelled first
    Cancelled,
}

/// One ready-up window of one lobby
#[derive(Debug)]
pub struct ReadyTimeout {
    state: AtomicU8,
    cancel: Notify,
    duration: Duration,
}

impl ReadyTimeout {
    pub fn new(duration: Duration) -> Self {
        Self {
            state: AtomicU8::new(ARMED),
            cancel: Notify::new(),
            duration,
        }
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn state(&self) -> TimerState {
        TimerState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_armed(&self) -> bool {
        self.state() == TimerState::Armed
    }

    /// Stop the timer; returns false when it already fired or was cancelled
    pub fn cancel(&self) -> bool {
        let won = self
            .state
            .compare_exchange(ARMED, CANCELLED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if won {
            // notify_one stores a permit, so a waiter that has not polled yet
            // still wakes.
            self.cancel.notify_one();
        }
        won
    }

    /// Claim the expiry; returns false when a cancel got there first
    pub fn try_fire(&self) -> bool {
        self.state
            .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Sleep until the deadline or a cancellation, whichever comes first
    ///
    /// Elapsing does not claim the expiry; callers must still win
    /// [`ReadyTimeout::try_fire`] before acting on it.
    pub async fn wait(&self) -> TimerOutcome {
        if !self.is_armed() {
            return TimerOutcome::Cancelled;
        }
        tokio::select! {
            _ = tokio::time::sleep(self.duration) => {
                if self.is_armed() {
                    TimerOutcome::Elapsed
                } else {
                    TimerOutcome::Cancelled
                }
            }
            _ = self.cancel.notified() => TimerOutcome::Cancelled,
        }
    }
}
