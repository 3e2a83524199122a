//! Lobby configuration.

use std::time::Duration;

/// Tunables for one lobby room. The registry hands every room it
/// creates a clone of the same config.
#[derive(Debug, Clone)]
pub struct LobbyConfig {
    /// Maximum players in a room.
    pub max_players: usize,

    /// Countdown budget for a Point question.
    pub question_time: Duration,

    /// Countdown budget for each exam question (restarted per question).
    pub exam_question_time: Duration,

    /// How long the Reconnection Supervisor waits for a dropped active
    /// player before forcing a timeout-equivalent resolution. The
    /// effective wait is capped by the open activity's own remaining
    /// time — the supervisor never outlives the countdown.
    pub reconnect_wait: Duration,

    /// Fraction of exam questions that must be answered correctly.
    /// 1.0 (the default) means a single incorrect answer fails the exam
    /// at that question.
    pub exam_pass_threshold: f64,

    /// Points granted for a correct question answer.
    pub correct_reward: u32,

    /// Points granted to the player who passes a phase exam.
    pub exam_reward: u32,

    /// A room with no connected players, no open activity, and no
    /// commands for this long is evicted by the registry sweep.
    pub idle_timeout: Duration,
}

impl Default for LobbyConfig {
    fn default() -> Self {
        Self {
            max_players: 8,
            question_time: Duration::from_secs(30),
            exam_question_time: Duration::from_secs(20),
            reconnect_wait: Duration::from_secs(15),
            exam_pass_threshold: 1.0,
            correct_reward: 10,
            exam_reward: 50,
            idle_timeout: Duration::from_secs(300),
        }
    }
}

impl LobbyConfig {
    /// Clamps out-of-range values so the config is safe to use.
    /// Called by the registry when a room is created.
    pub fn validated(mut self) -> Self {
        self.exam_pass_threshold = self.exam_pass_threshold.clamp(0.0, 1.0);
        if self.max_players == 0 {
            self.max_players = 1;
        }
        self
    }
}
