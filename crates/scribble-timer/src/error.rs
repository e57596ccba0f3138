//! Error types for countdown timers.

use crate::{TimerKind, TimerState};

/// Errors returned by [`CountdownTimer`](crate::CountdownTimer).
///
/// Races between `stop()` and expiry never produce an error; only
/// misuse of a single-use timer does.
#[derive(Debug, thiserror::Error)]
pub enum TimerError {
    /// `start()` was called on a timer that already left `Idle`.
    #[error("{kind} timer cannot be started from state {state}")]
    AlreadyUsed {
        /// Purpose of the timer.
        kind: TimerKind,
        /// State the timer was in when `start()` was called.
        state: TimerState,
    },
}
