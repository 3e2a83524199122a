//! Authoritative countdowns for Quizforge activities.
//!
//! Two pieces:
//!
//! - [`Countdown`] — deadline arithmetic for an open activity. The
//!   remaining time is always *derived* from the start instant and the
//!   budget, never stored and never decremented, so any number of
//!   clients (including one that just reconnected) can be told the same
//!   exact value with no drift.
//! - [`Alarm`] — a single cancellable scheduled task per open activity
//!   (or per reconnection wait). On firing it runs a caller-supplied
//!   future, which in practice posts a timeout command back into the
//!   room's serialized command stream. An alarm never mutates state
//!   directly.
//!
//! # Integration
//!
//! The room actor owns at most one activity alarm and at most one
//! supervisor alarm. Both re-enter the actor's mpsc channel:
//!
//! ```ignore
//! let tx = handle.sender();
//! let alarm = Alarm::at(countdown.deadline(), async move {
//!     let _ = tx.send(RoomCommand::ActivityExpired { generation }).await;
//! });
//! // ... a valid close cancels it:
//! alarm.cancel();
//! ```
//!
//! Time is `tokio::time::Instant` throughout, so tests drive everything
//! with the paused clock (`#[tokio::test(start_paused = true)]`).

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tracing::trace;

// ---------------------------------------------------------------------------
// Countdown
// ---------------------------------------------------------------------------

/// A running countdown for one activity.
///
/// `remaining()` is monotonically non-increasing between observations
/// and clamped at zero. Restarting (for the next exam question) resets
/// the start instant; nothing else about the countdown is mutable.
#[derive(Debug, Clone)]
pub struct Countdown {
    started_at: Instant,
    budget: Duration,
}

impl Countdown {
    /// Starts a countdown of `budget` from now.
    pub fn start(budget: Duration) -> Self {
        Self { started_at: Instant::now(), budget }
    }

    /// Restarts the countdown from now with the same budget.
    pub fn restart(&mut self) {
        self.started_at = Instant::now();
    }

    /// Remaining time, clamped to zero.
    pub fn remaining(&self) -> Duration {
        self.budget.saturating_sub(self.started_at.elapsed())
    }

    /// Remaining time in whole milliseconds, for the wire.
    pub fn remaining_millis(&self) -> u64 {
        self.remaining().as_millis() as u64
    }

    /// Whether the budget has fully elapsed.
    pub fn is_expired(&self) -> bool {
        self.remaining().is_zero()
    }

    /// The instant at which the countdown reaches zero.
    pub fn deadline(&self) -> Instant {
        self.started_at + self.budget
    }

    /// The configured budget.
    pub fn budget(&self) -> Duration {
        self.budget
    }
}

// ---------------------------------------------------------------------------
// Alarm
// ---------------------------------------------------------------------------

/// A cancellable one-shot scheduled task.
///
/// Dropping the alarm cancels it, so an alarm stored in an activity
/// slot dies with the activity it was armed for — a closed activity can
/// never fire a late wake-up.
#[derive(Debug)]
pub struct Alarm {
    handle: JoinHandle<()>,
}

impl Alarm {
    /// Schedules `fire` to run at `deadline`.
    pub fn at<F>(deadline: Instant, fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            time::sleep_until(deadline).await;
            trace!("alarm fired");
            fire.await;
        });
        Self { handle }
    }

    /// Schedules `fire` to run after `delay`.
    pub fn after<F>(delay: Duration, fire: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Self::at(Instant::now() + delay, fire)
    }

    /// Cancels the alarm. A no-op if it already fired.
    pub fn cancel(self) {
        self.handle.abort();
    }

    /// Whether the alarm task has finished (fired or been aborted).
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for Alarm {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
