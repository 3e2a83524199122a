//! The Reconnection Supervisor's actor-side half.
//!
//! The *decision* state machine — when to start a wait, what happens
//! when it elapses, what a return in time means — lives in
//! [`LobbyState`](crate::LobbyState) (`reconnect_pending` plus the
//! `drop_connection` / `resume_connection` / `supervisor_timeout`
//! operations). This module holds the other half: the single pending
//! wake-up task, keyed by player and activity generation so a stale
//! expiry can be recognized and dropped.
//!
//! ```text
//! Connected ──(drop, active, activity open)──→ Pending
//!   Pending ──(player returns in time)───────→ cancelled, play resumes
//!   Pending ──(wait elapses)────────────────→ timeout-equivalent close
//! ```

use quizforge_protocol::PlayerId;
use quizforge_timer::Alarm;

use crate::activity::Generation;

/// At most one wait is pending per room: only the active player's
/// disconnect starts one, and there is only one active player.
#[derive(Debug, Default)]
pub struct ReconnectSupervisor {
    pending: Option<PendingWait>,
}

#[derive(Debug)]
struct PendingWait {
    player: PlayerId,
    generation: Generation,
    /// Dropping the alarm aborts the scheduled wake-up.
    _alarm: Alarm,
}

impl ReconnectSupervisor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the wait for a dropped active player. Replaces any previous
    /// wait (its alarm is aborted on drop).
    pub fn arm(&mut self, player: PlayerId, generation: Generation, alarm: Alarm) {
        self.pending = Some(PendingWait { player, generation, _alarm: alarm });
    }

    /// Cancels the pending wait, if any. Returns the player it covered.
    pub fn cancel(&mut self) -> Option<PlayerId> {
        self.pending.take().map(|w| w.player)
    }

    /// The player currently waited on.
    pub fn pending_player(&self) -> Option<PlayerId> {
        self.pending.as_ref().map(|w| w.player)
    }

    /// Whether a fired wake-up for `(player, generation)` is still the
    /// one we armed — anything else is stale.
    pub fn matches(&self, player: PlayerId, generation: Generation) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|w| w.player == player && w.generation == generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn dummy_alarm() -> Alarm {
        Alarm::after(Duration::from_secs(3600), async {})
    }

    #[tokio::test]
    async fn test_arm_then_cancel_returns_player() {
        let mut sup = ReconnectSupervisor::new();
        sup.arm(PlayerId(1), Generation(3), dummy_alarm());

        assert_eq!(sup.pending_player(), Some(PlayerId(1)));
        assert_eq!(sup.cancel(), Some(PlayerId(1)));
        assert_eq!(sup.pending_player(), None);
    }

    #[tokio::test]
    async fn test_cancel_without_pending_is_none() {
        let mut sup = ReconnectSupervisor::new();
        assert_eq!(sup.cancel(), None);
    }

    #[tokio::test]
    async fn test_matches_requires_player_and_generation() {
        let mut sup = ReconnectSupervisor::new();
        sup.arm(PlayerId(1), Generation(3), dummy_alarm());

        assert!(sup.matches(PlayerId(1), Generation(3)));
        assert!(!sup.matches(PlayerId(1), Generation(4)), "stale generation");
        assert!(!sup.matches(PlayerId(2), Generation(3)), "wrong player");
    }

    #[tokio::test]
    async fn test_rearm_replaces_previous_wait() {
        let mut sup = ReconnectSupervisor::new();
        sup.arm(PlayerId(1), Generation(1), dummy_alarm());
        sup.arm(PlayerId(2), Generation(2), dummy_alarm());

        assert!(!sup.matches(PlayerId(1), Generation(1)));
        assert!(sup.matches(PlayerId(2), Generation(2)));
    }
}
