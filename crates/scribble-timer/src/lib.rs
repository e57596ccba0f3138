//! Cancellable countdown timers for Scribble.
//!
//! A [`CountdownTimer`] counts down whole seconds on its own Tokio task,
//! reporting every second to a [`CountdownObserver`] and firing
//! [`CountdownObserver::on_expire`] exactly once if it reaches zero
//! without being stopped.
//!
//! # State machine
//!
//! ```text
//! Idle ──start──▶ Running ──(reaches 0)──▶ Expired
//!   │                │
//!   └──────stop──────┴──────stop──────▶ Cancelled
//! ```
//!
//! Every transition is a compare-and-swap on a single atomic, so a
//! `stop()` racing the final second resolves to exactly one outcome:
//! either `stop()` returns `true` and `on_expire` never runs, or expiry
//! wins and `stop()` returns `false`.
//!
//! # Integration
//!
//! Timers are single-use. Sessions create a fresh timer for each
//! countdown and hand it a child of the session's cancellation token,
//! so shutting the session down stops every outstanding timer:
//!
//! ```ignore
//! let timer = CountdownTimer::with_parent(TimerKind::Guess, turn_len, &session_token);
//! timer.start(observer)?;
//! ```

mod error;
mod kind;

pub use error::TimerError;
pub use kind::TimerKind;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Interval between two ticks.
pub const TICK_INTERVAL: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// Observer
// ---------------------------------------------------------------------------

/// Receives the ticks and the expiry of a running [`CountdownTimer`].
///
/// Both callbacks run on the timer's own task. The timer awaits each
/// callback before sleeping again, so a slow observer delays later ticks
/// but never reorders them.
pub trait CountdownObserver: Send + Sync + 'static {
    /// Called once per second with the seconds left, starting at the full
    /// duration and ending at 1.
    fn on_tick(
        &self,
        kind: TimerKind,
        remaining: u32,
    ) -> impl Future<Output = ()> + Send;

    /// Called at most once, when the countdown reaches zero uncancelled.
    fn on_expire(&self, kind: TimerKind) -> impl Future<Output = ()> + Send;
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Lifecycle state of a [`CountdownTimer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerState {
    /// Created, not started yet.
    Idle,
    /// Counting down.
    Running,
    /// Stopped before reaching zero. Terminal.
    Cancelled,
    /// Reached zero and fired its expiry. Terminal.
    Expired,
}

impl TimerState {
    const fn as_u8(self) -> u8 {
        match self {
            Self::Idle => 0,
            Self::Running => 1,
            Self::Cancelled => 2,
            Self::Expired => 3,
        }
    }

    const fn from_u8(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Cancelled,
            _ => Self::Expired,
        }
    }

    /// Returns `true` for `Cancelled` and `Expired`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Expired)
    }
}

impl std::fmt::Display for TimerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "Idle"),
            Self::Running => write!(f, "Running"),
            Self::Cancelled => write!(f, "Cancelled"),
            Self::Expired => write!(f, "Expired"),
        }
    }
}

struct Shared {
    state: AtomicU8,
    remaining: AtomicU32,
    token: CancellationToken,
}

impl Shared {
    fn state(&self) -> TimerState {
        TimerState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn transition(&self, from: TimerState, to: TimerState) -> bool {
        self.state
            .compare_exchange(
                from.as_u8(),
                to.as_u8(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

// ---------------------------------------------------------------------------
// Timer
// ---------------------------------------------------------------------------

/// A single-use, one-second-resolution countdown.
///
/// Cloning is cheap and every clone controls the same countdown, so a
/// caller can copy a timer out of a locked structure and stop it after
/// the lock is released.
#[derive(Clone)]
pub struct CountdownTimer {
    kind: TimerKind,
    duration_secs: u32,
    shared: Arc<Shared>,
}

impl CountdownTimer {
    /// Creates an idle timer with its own cancellation token.
    pub fn new(kind: TimerKind, duration: Duration) -> Self {
        Self::with_token(kind, duration, CancellationToken::new())
    }

    /// Creates an idle timer cancelled together with `parent`.
    pub fn with_parent(
        kind: TimerKind,
        duration: Duration,
        parent: &CancellationToken,
    ) -> Self {
        Self::with_token(kind, duration, parent.child_token())
    }

    fn with_token(
        kind: TimerKind,
        duration: Duration,
        token: CancellationToken,
    ) -> Self {
        let duration_secs =
            u32::try_from(duration.as_secs()).unwrap_or(u32::MAX);
        Self {
            kind,
            duration_secs,
            shared: Arc::new(Shared {
                state: AtomicU8::new(TimerState::Idle.as_u8()),
                remaining: AtomicU32::new(duration_secs),
                token,
            }),
        }
    }

    /// Starts the countdown on a new task.
    ///
    /// # Errors
    /// Returns [`TimerError::AlreadyUsed`] if the timer left `Idle`
    /// before this call, including when it was stopped before starting.
    pub fn start<O: CountdownObserver>(
        &self,
        observer: O,
    ) -> Result<(), TimerError> {
        if !self.shared.transition(TimerState::Idle, TimerState::Running) {
            return Err(TimerError::AlreadyUsed {
                kind: self.kind,
                state: self.shared.state(),
            });
        }
        debug!(kind = %self.kind, secs = self.duration_secs, "timer started");
        tokio::spawn(run(
            self.kind,
            self.duration_secs,
            Arc::clone(&self.shared),
            observer,
        ));
        Ok(())
    }

    /// Stops the countdown.
    ///
    /// Returns `true` if this call cancelled an idle or running timer.
    /// Returns `false` if the timer had already expired or been stopped,
    /// in which case nothing changes.
    pub fn stop(&self) -> bool {
        let cancelled = self
            .shared
            .transition(TimerState::Running, TimerState::Cancelled)
            || self.shared.transition(TimerState::Idle, TimerState::Cancelled);
        if cancelled {
            self.shared.token.cancel();
            debug!(kind = %self.kind, "timer stopped");
        }
        cancelled
    }

    /// Seconds left as of the last tick, or 0 if the timer is not running.
    pub fn remaining_secs(&self) -> u32 {
        if self.shared.state() == TimerState::Running {
            self.shared.remaining.load(Ordering::Acquire)
        } else {
            0
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> TimerState {
        self.shared.state()
    }

    /// Whether the countdown is in progress.
    pub fn is_running(&self) -> bool {
        self.shared.state() == TimerState::Running
    }

    /// The purpose this timer was created for.
    pub fn kind(&self) -> TimerKind {
        self.kind
    }

    /// Configured length of the countdown.
    pub fn duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.duration_secs))
    }

    /// A clone of the token that cancels this countdown.
    pub fn cancellation(&self) -> CancellationToken {
        self.shared.token.clone()
    }
}

impl std::fmt::Debug for CountdownTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CountdownTimer")
            .field("kind", &self.kind)
            .field("duration_secs", &self.duration_secs)
            .field("state", &self.shared.state())
            .field("remaining", &self.shared.remaining.load(Ordering::Relaxed))
            .finish()
    }
}

async fn run<O: CountdownObserver>(
    kind: TimerKind,
    duration_secs: u32,
    shared: Arc<Shared>,
    observer: O,
) {
    for remaining in (1..=duration_secs).rev() {
        if shared.token.is_cancelled() {
            break;
        }
        shared.remaining.store(remaining, Ordering::Release);
        trace!(%kind, remaining, "timer tick");
        observer.on_tick(kind, remaining).await;

        tokio::select! {
            biased;
            _ = shared.token.cancelled() => break,
            _ = tokio::time::sleep(TICK_INTERVAL) => {}
        }
    }

    if shared.token.is_cancelled() {
        // Parent cancellation never went through stop().
        shared.transition(TimerState::Running, TimerState::Cancelled);
        return;
    }

    if shared.transition(TimerState::Running, TimerState::Expired) {
        shared.remaining.store(0, Ordering::Release);
        debug!(%kind, "timer expired");
        observer.on_expire(kind).await;
    }
    shared.token.cancel();
}
