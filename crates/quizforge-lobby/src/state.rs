//! Per-room session state and command outcomes.
//!
//! [`LobbyState`] is the authoritative record for one room: roster,
//! turn, board, activity slot, scoreboard, and the reconnection-wait
//! state. It is owned exclusively by the room's relay actor and mutated
//! only on that actor's serialized command stream.
//!
//! Every operation returns an [`Outcome`]: the exact delta events to
//! broadcast plus directives telling the actor what to do with the
//! activity alarm and the reconnection supervisor. The state itself
//! never spawns tasks or touches channels — that separation keeps the
//! whole engine testable without a runtime.

use std::collections::HashMap;
use std::time::Duration;

use quizforge_protocol::{PlayerId, Recipient, RoomEvent, RoomId};
use tokio::time::Instant;

use crate::activity::{ActivitySlot, Generation};
use crate::board::Board;
use crate::turns::{self, Roster};
use crate::{LobbyConfig, LobbyError};

// ---------------------------------------------------------------------------
// Scoreboard
// ---------------------------------------------------------------------------

/// Session and per-player scores, plus the shared incorrect counter.
#[derive(Debug, Clone, Default)]
pub struct Scoreboard {
    pub session_score: u32,
    per_user: HashMap<PlayerId, u32>,
    pub incorrect_answers: u32,
}

impl Scoreboard {
    /// Awards points to a player and the session. Returns the new
    /// `(user_score, session_score)` pair for the `scores` event.
    pub fn award(&mut self, player: PlayerId, points: u32) -> (u32, u32) {
        let user = self.per_user.entry(player).or_insert(0);
        *user += points;
        self.session_score += points;
        (*user, self.session_score)
    }

    pub fn user_score(&self, player: PlayerId) -> u32 {
        self.per_user.get(&player).copied().unwrap_or(0)
    }

    /// Per-player entries in a stable order for `initScores`.
    pub fn entries(&self) -> Vec<(PlayerId, u32)> {
        let mut entries: Vec<_> = self.per_user.iter().map(|(p, s)| (*p, *s)).collect();
        entries.sort_by_key(|(p, _)| *p);
        entries
    }
}

// ---------------------------------------------------------------------------
// Outcome and directives
// ---------------------------------------------------------------------------

/// What the actor should do with the activity alarm after a command.
#[derive(Debug)]
pub enum TimerDirective {
    /// Leave any armed alarm as it is.
    Keep,
    /// Arm (or re-arm) the alarm for the open activity.
    Arm { deadline: Instant, generation: Generation },
    /// Disarm — the activity closed.
    Cancel,
}

/// What the actor should do with the reconnection supervisor.
#[derive(Debug)]
pub enum SupervisorDirective {
    Keep,
    /// Start the bounded wait for a dropped active player.
    Arm {
        player: PlayerId,
        wait: Duration,
        generation: Generation,
    },
    /// The wait is over (player returned or was resolved).
    Cancel,
}

/// The full result of applying one command: delta events in emission
/// order, plus alarm/supervisor directives.
#[derive(Debug)]
pub struct Outcome {
    pub events: Vec<(Recipient, RoomEvent)>,
    pub timer: TimerDirective,
    pub supervisor: SupervisorDirective,
}

impl Outcome {
    pub fn new() -> Self {
        Self {
            events: Vec::new(),
            timer: TimerDirective::Keep,
            supervisor: SupervisorDirective::Keep,
        }
    }

    /// Queues an event for every connected member.
    pub fn broadcast(&mut self, event: RoomEvent) {
        self.events.push((Recipient::All, event));
    }

    /// Queues an event for a single member.
    pub fn to(&mut self, player: PlayerId, event: RoomEvent) {
        self.events.push((Recipient::Player(player), event));
    }
}

impl Default for Outcome {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// LobbyState
// ---------------------------------------------------------------------------

/// The authoritative state of one lobby room.
#[derive(Debug)]
pub struct LobbyState {
    pub room_id: RoomId,
    pub config: LobbyConfig,
    pub roster: Roster,
    pub active_player: Option<PlayerId>,
    pub board: Board,
    pub slot: ActivitySlot,
    pub scores: Scoreboard,
    /// The player the Reconnection Supervisor is currently waiting on,
    /// if any. An explicit state instead of a boolean flag: the pending
    /// wait, its cancellation, and its expiry all key off this field.
    pub reconnect_pending: Option<PlayerId>,
}

impl LobbyState {
    pub fn new(room_id: RoomId, config: LobbyConfig, board: Board) -> Self {
        Self {
            room_id,
            config,
            roster: Roster::new(),
            active_player: None,
            board,
            slot: ActivitySlot::new(),
            scores: Scoreboard::default(),
            reconnect_pending: None,
        }
    }

    /// The `users` event for the current roster and turn.
    pub fn users_event(&self) -> RoomEvent {
        RoomEvent::Users {
            players: self.roster.infos(),
            active_player_id: self.active_player,
        }
    }

    /// The `initScores` event for a joining or rejoining socket.
    pub fn init_scores_event(&self) -> RoomEvent {
        RoomEvent::InitScores {
            session_score: self.scores.session_score,
            user_scores: self.scores.entries(),
            incorrect_answers: self.scores.incorrect_answers,
        }
    }

    /// Advances the turn after an activity resolution and broadcasts
    /// the new roster/turn snapshot.
    pub(crate) fn pass_turn(&mut self, out: &mut Outcome) {
        self.active_player = turns::next_turn(&self.roster, self.active_player);
        out.broadcast(self.users_event());
    }

    // -----------------------------------------------------------------
    // Membership
    // -----------------------------------------------------------------

    /// Adds a player to the room, or resumes them if they are already
    /// on the roster but disconnected.
    pub fn join(
        &mut self,
        player: PlayerId,
        display_name: &str,
    ) -> Result<Outcome, LobbyError> {
        if self.roster.contains(player) {
            if self.roster.is_connected(player) {
                return Err(LobbyError::AlreadyInRoom(player, self.room_id));
            }
            // A re-join from a fresh socket is a resume.
            return Ok(self.resume_connection(player));
        }

        if self.roster.len() >= self.config.max_players {
            return Err(LobbyError::RoomFull(self.room_id));
        }

        self.roster.add(player, display_name);
        if self.active_player.is_none() {
            self.active_player = turns::reevaluate(&self.roster, None);
        }

        let mut out = Outcome::new();
        out.broadcast(self.users_event());
        out.to(player, self.init_scores_event());
        self.restore_to(player, &mut out);

        tracing::info!(
            room_id = %self.room_id,
            %player,
            players = self.roster.len(),
            "player joined"
        );
        Ok(out)
    }

    /// Removes a player — the only operation that shrinks the roster.
    ///
    /// If the leaver held the turn with an open activity, the activity
    /// resolves exactly as a timeout would before the turn moves on.
    pub fn leave(&mut self, player: PlayerId) -> Result<Outcome, LobbyError> {
        if !self.roster.contains(player) {
            return Err(LobbyError::NotInRoom(player));
        }

        let mut out = Outcome::new();

        if self.reconnect_pending == Some(player) {
            self.reconnect_pending = None;
            out.supervisor = SupervisorDirective::Cancel;
        }

        let was_active = self.active_player == Some(player);
        if was_active && self.slot.is_open() {
            self.close_activity_as_timeout(&mut out);
        }

        // Pick the successor while the leaver still occupies their
        // join-order slot, then drop the slot.
        if was_active {
            let next = turns::next_turn(&self.roster, Some(player));
            self.active_player = if next == Some(player) { None } else { next };
        }
        self.roster.remove(player);
        if self.active_player.is_none() {
            self.active_player = turns::reevaluate(&self.roster, None);
        }

        out.broadcast(self.users_event());
        tracing::info!(
            room_id = %self.room_id,
            %player,
            players = self.roster.len(),
            "player left"
        );
        Ok(out)
    }

    /// A socket dropped without an explicit leave.
    ///
    /// The active player mid-activity gets a supervisor wait; everyone
    /// else just flips to disconnected and the turn is re-evaluated.
    pub fn drop_connection(&mut self, player: PlayerId) -> Outcome {
        let mut out = Outcome::new();
        if !self.roster.set_connected(player, false) {
            return out;
        }

        tracing::info!(room_id = %self.room_id, %player, "player disconnected");

        if self.active_player == Some(player) && self.slot.is_open() {
            // Bounded wait, never longer than the activity's own clock.
            let remaining = self
                .slot
                .countdown()
                .map(|c| c.remaining())
                .unwrap_or(Duration::ZERO);
            let wait = self.config.reconnect_wait.min(remaining);

            self.reconnect_pending = Some(player);
            out.supervisor = SupervisorDirective::Arm {
                player,
                wait,
                generation: self.slot.generation(),
            };

            let name = self
                .roster
                .display_name(player)
                .unwrap_or_default()
                .to_string();
            out.broadcast(RoomEvent::ReconnectWaiting {
                active_player_name: name,
                time_left: wait.as_millis() as u64,
            });
            out.broadcast(self.users_event());
        } else {
            self.active_player = turns::reevaluate(&self.roster, self.active_player);
            out.broadcast(self.users_event());
        }
        out
    }

    /// A dropped player came back (same session, new socket).
    pub fn resume_connection(&mut self, player: PlayerId) -> Outcome {
        let mut out = Outcome::new();
        if !self.roster.set_connected(player, true) {
            return out;
        }

        tracing::info!(room_id = %self.room_id, %player, "player reconnected");

        if self.reconnect_pending == Some(player) {
            // Supervisor wait cancelled; play resumes exactly where it
            // left off — no turn change, no activity change.
            self.reconnect_pending = None;
            out.supervisor = SupervisorDirective::Cancel;
            let name = self
                .roster
                .display_name(player)
                .unwrap_or_default()
                .to_string();
            out.broadcast(RoomEvent::ReconnectCanceled { active_player_name: name });
        } else {
            self.active_player = turns::reevaluate(&self.roster, self.active_player);
        }

        out.broadcast(self.users_event());
        out.to(player, self.init_scores_event());
        self.restore_to(player, &mut out);
        out
    }

    /// Queues the activity re-sync events for one (re)joining socket:
    /// the contested point and the open question/exam with the exact
    /// authoritative remaining time. Targeted, never broadcast, so the
    /// rest of the room sees no countdown flash.
    pub(crate) fn restore_to(&self, player: PlayerId, out: &mut Outcome) {
        out.to(
            player,
            RoomEvent::ActivePointChanged { active_point_id: self.slot.active_point() },
        );
        if let Some(question) = self.slot.question() {
            out.to(
                player,
                RoomEvent::QuestionRestore {
                    point_id: question.point_id,
                    question: question.question.view(),
                    time_left: question.countdown.remaining_millis(),
                },
            );
        }
        if let Some(exam) = self.slot.exam() {
            out.to(
                player,
                RoomEvent::ExamRestore {
                    exam_id: exam.spec.id,
                    questions: exam.spec.questions.iter().map(|q| q.exam_view()).collect(),
                    index: exam.index,
                    correct_count: exam.correct_count,
                    time_left: exam.countdown.remaining_millis(),
                },
            );
        }
    }
}
