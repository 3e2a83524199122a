//! The Event Relay: one actor task per room.
//!
//! All commands for a room — client commands, membership changes,
//! timer expirations, supervisor expirations — arrive on one mpsc
//! channel and are applied strictly one at a time, so state transitions
//! are linearizable per room while rooms run fully in parallel. Alarms
//! never mutate state: they post commands back onto this same channel
//! and take their turn in the stream like everything else.
//!
//! After each command the relay broadcasts exactly the delta events the
//! mutation produced, in command order, to the room's connected member
//! sockets. There is no full-state dump and no batching.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quizforge_protocol::{ClientCommand, PlayerId, Recipient, RoomEvent, RoomId};
use quizforge_timer::Alarm;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

use crate::activity::Generation;
use crate::board::Board;
use crate::sources::{AnswerChecker, QuestionSource};
use crate::state::{LobbyState, Outcome, SupervisorDirective, TimerDirective};
use crate::supervisor::ReconnectSupervisor;
use crate::{LobbyConfig, LobbyError};

/// Channel sender for delivering events to one player's connection
/// handler, which forwards them to the socket.
pub type EventSender = mpsc::UnboundedSender<RoomEvent>;

/// Commands sent to a room actor through its serialized stream.
pub(crate) enum RoomCommand {
    /// Add a player (or resume them if they rejoined by name).
    Join {
        player_id: PlayerId,
        display_name: String,
        sender: EventSender,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// Explicitly remove a player.
    Leave {
        player_id: PlayerId,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// A room-scoped quiz command from a member.
    Client { sender: PlayerId, command: ClientCommand },

    /// The player's socket dropped without a leave.
    Dropped { player_id: PlayerId },

    /// The player's session resumed on a new socket.
    Resumed {
        player_id: PlayerId,
        sender: EventSender,
        reply: oneshot::Sender<Result<(), LobbyError>>,
    },

    /// The open activity's countdown elapsed (posted by its alarm).
    ActivityExpired { generation: Generation },

    /// The reconnection wait elapsed (posted by the supervisor alarm).
    ReconnectExpired { player_id: PlayerId, generation: Generation },

    /// Request room metadata.
    GetInfo { reply: oneshot::Sender<RoomInfo> },

    /// Stop the actor.
    Shutdown,
}

/// A snapshot of room metadata (not the game state itself).
#[derive(Debug, Clone)]
pub struct RoomInfo {
    pub room_id: RoomId,
    /// Roster size, connected or not.
    pub player_count: usize,
    /// Members with a live socket.
    pub connected_count: usize,
    /// Whether an activity is currently open.
    pub activity_open: bool,
    /// Time since the last non-informational command.
    pub idle_for: Duration,
}

// ---------------------------------------------------------------------------
// RelayHandle
// ---------------------------------------------------------------------------

/// Handle to a running room actor. Cheap to clone; the registry holds
/// one per room.
#[derive(Clone)]
pub struct RelayHandle {
    room_id: RoomId,
    sender: mpsc::Sender<RoomCommand>,
}

impl RelayHandle {
    pub fn room_id(&self) -> RoomId {
        self.room_id
    }

    /// Sends a join request and waits for the verdict.
    pub async fn join(
        &self,
        player_id: PlayerId,
        display_name: String,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Join { player_id, display_name, sender, reply: reply_tx })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?
    }

    /// Sends a leave request and waits for the verdict.
    pub async fn leave(&self, player_id: PlayerId) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Leave { player_id, reply: reply_tx })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?
    }

    /// Submits a quiz command (fire-and-forget; rejections come back as
    /// targeted `rejected` events).
    pub async fn command(
        &self,
        sender: PlayerId,
        command: ClientCommand,
    ) -> Result<(), LobbyError> {
        self.sender
            .send(RoomCommand::Client { sender, command })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))
    }

    /// Reports a socket drop.
    pub async fn dropped(&self, player_id: PlayerId) -> Result<(), LobbyError> {
        self.sender
            .send(RoomCommand::Dropped { player_id })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))
    }

    /// Reports a session resume on a new socket.
    pub async fn resumed(
        &self,
        player_id: PlayerId,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::Resumed { player_id, sender, reply: reply_tx })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?
    }

    /// Requests the current room info.
    pub async fn info(&self) -> Result<RoomInfo, LobbyError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.sender
            .send(RoomCommand::GetInfo { reply: reply_tx })
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))?;
        reply_rx
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))
    }

    /// Tells the room to shut down.
    pub async fn shutdown(&self) -> Result<(), LobbyError> {
        self.sender
            .send(RoomCommand::Shutdown)
            .await
            .map_err(|_| LobbyError::Unavailable(self.room_id))
    }
}

// ---------------------------------------------------------------------------
// The actor
// ---------------------------------------------------------------------------

/// The internal room actor. Runs inside a Tokio task and exclusively
/// owns its [`LobbyState`].
struct RoomRelay {
    state: LobbyState,
    /// Per-player outbound channels — only players with a live socket.
    senders: HashMap<PlayerId, EventSender>,
    source: Arc<dyn QuestionSource>,
    checker: Arc<dyn AnswerChecker>,
    /// The scheduled wake-up for the open activity, if any.
    activity_alarm: Option<Alarm>,
    supervisor: ReconnectSupervisor,
    receiver: mpsc::Receiver<RoomCommand>,
    /// For alarms to post their expiry back into this room's stream.
    self_tx: mpsc::Sender<RoomCommand>,
    last_command: Instant,
}

impl RoomRelay {
    async fn run(mut self) {
        tracing::info!(room_id = %self.state.room_id, "room relay started");

        while let Some(cmd) = self.receiver.recv().await {
            match cmd {
                RoomCommand::Join { player_id, display_name, sender, reply } => {
                    self.touch();
                    let result = self.handle_join(player_id, &display_name, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::Leave { player_id, reply } => {
                    self.touch();
                    let result = self.handle_leave(player_id);
                    let _ = reply.send(result);
                }
                RoomCommand::Client { sender, command } => {
                    self.touch();
                    self.handle_client(sender, command);
                }
                RoomCommand::Dropped { player_id } => {
                    self.touch();
                    self.senders.remove(&player_id);
                    let outcome = self.state.drop_connection(player_id);
                    self.apply(outcome);
                }
                RoomCommand::Resumed { player_id, sender, reply } => {
                    self.touch();
                    let result = self.handle_resumed(player_id, sender);
                    let _ = reply.send(result);
                }
                RoomCommand::ActivityExpired { generation } => {
                    self.touch();
                    let result = self.state.activity_timeout(generation);
                    self.apply_result(result, None);
                }
                RoomCommand::ReconnectExpired { player_id, generation } => {
                    self.touch();
                    if self.supervisor.matches(player_id, generation) {
                        self.supervisor.cancel();
                        let result = self.state.supervisor_timeout(player_id);
                        self.apply_result(result, None);
                    } else {
                        tracing::debug!(
                            room_id = %self.state.room_id,
                            %player_id,
                            "stale reconnect expiry, ignoring"
                        );
                    }
                }
                RoomCommand::GetInfo { reply } => {
                    let _ = reply.send(self.info());
                }
                RoomCommand::Shutdown => {
                    tracing::info!(room_id = %self.state.room_id, "room shutting down");
                    break;
                }
            }
        }

        tracing::info!(room_id = %self.state.room_id, "room relay stopped");
    }

    fn touch(&mut self) {
        self.last_command = Instant::now();
    }

    fn handle_join(
        &mut self,
        player_id: PlayerId,
        display_name: &str,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        let outcome = self.state.join(player_id, display_name)?;
        // Register the socket before dispatch so the joiner receives
        // their own targeted events (initScores, restore).
        self.senders.insert(player_id, sender);
        self.apply(outcome);
        Ok(())
    }

    fn handle_leave(&mut self, player_id: PlayerId) -> Result<(), LobbyError> {
        let outcome = self.state.leave(player_id)?;
        self.senders.remove(&player_id);
        self.apply(outcome);
        Ok(())
    }

    fn handle_resumed(
        &mut self,
        player_id: PlayerId,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        if !self.state.roster.contains(player_id) {
            return Err(LobbyError::NotInRoom(player_id));
        }
        self.senders.insert(player_id, sender);
        let outcome = self.state.resume_connection(player_id);
        self.apply(outcome);
        Ok(())
    }

    fn handle_client(&mut self, sender: PlayerId, command: ClientCommand) {
        if !self.state.roster.contains(sender) {
            tracing::warn!(
                room_id = %self.state.room_id,
                %sender,
                "command from non-member, ignoring"
            );
            return;
        }

        let result = match command {
            ClientCommand::OpenPoint { point_id } => {
                self.state.open_question(sender, point_id, &*self.source)
            }
            ClientCommand::OpenExam { exam_id } => {
                self.state.open_exam(sender, exam_id, &*self.source)
            }
            ClientCommand::Answer { point_id, answer } => {
                self.state
                    .submit_answer(sender, point_id, &answer, &*self.checker)
            }
            ClientCommand::ExamAnswer { exam_id, answer } => {
                self.state
                    .submit_exam_answer(sender, exam_id, &answer, &*self.checker)
            }
            ClientCommand::CheckActiveQuestion { point_id } => {
                self.state.check_active_question(sender, point_id)
            }
            ClientCommand::CheckActiveExam { exam_id } => {
                self.state.check_active_exam(sender, exam_id)
            }
            ClientCommand::Timeout { point_id } => {
                self.state.client_timeout_hint(sender, point_id)
            }
        };

        self.apply_result(result, Some(sender));
    }

    /// Maps an operation result onto the wire: outcomes dispatch their
    /// events, errors become targeted self-correction or rejection
    /// events, stale generations vanish with a debug line.
    fn apply_result(&mut self, result: Result<Outcome, LobbyError>, from: Option<PlayerId>) {
        match result {
            Ok(outcome) => self.apply(outcome),
            Err(LobbyError::StaleGeneration) => {
                tracing::debug!(
                    room_id = %self.state.room_id,
                    "stale command discarded"
                );
            }
            Err(LobbyError::WrongPoint { requested, active }) => {
                if let Some(player) = from {
                    self.send_to(
                        player,
                        RoomEvent::WrongPoint { requested_id: requested, active_id: active },
                    );
                }
            }
            Err(LobbyError::WrongExam { requested, active }) => {
                if let Some(player) = from {
                    self.send_to(
                        player,
                        RoomEvent::WrongExam { requested_id: requested, active_id: active },
                    );
                }
            }
            Err(err) => {
                tracing::debug!(
                    room_id = %self.state.room_id,
                    error = %err,
                    "command rejected"
                );
                if let Some(player) = from {
                    self.send_to(player, RoomEvent::Rejected { reason: err.to_string() });
                }
            }
        }
    }

    /// Dispatches the outcome's events and applies its alarm and
    /// supervisor directives.
    fn apply(&mut self, outcome: Outcome) {
        for (recipient, event) in outcome.events {
            match recipient {
                Recipient::All => {
                    for sender in self.senders.values() {
                        let _ = sender.send(event.clone());
                    }
                }
                Recipient::Player(player) => self.send_to(player, event),
                Recipient::AllExcept(excluded) => {
                    for (player, sender) in &self.senders {
                        if *player != excluded {
                            let _ = sender.send(event.clone());
                        }
                    }
                }
            }
        }

        match outcome.timer {
            TimerDirective::Keep => {}
            TimerDirective::Cancel => {
                self.activity_alarm = None;
            }
            TimerDirective::Arm { deadline, generation } => {
                let tx = self.self_tx.clone();
                self.activity_alarm = Some(Alarm::at(deadline, async move {
                    let _ = tx.send(RoomCommand::ActivityExpired { generation }).await;
                }));
            }
        }

        match outcome.supervisor {
            SupervisorDirective::Keep => {}
            SupervisorDirective::Cancel => {
                self.supervisor.cancel();
            }
            SupervisorDirective::Arm { player, wait, generation } => {
                let tx = self.self_tx.clone();
                let alarm = Alarm::after(wait, async move {
                    let _ = tx
                        .send(RoomCommand::ReconnectExpired { player_id: player, generation })
                        .await;
                });
                self.supervisor.arm(player, generation, alarm);
            }
        }
    }

    /// Sends an event to a single player. Silently drops if their
    /// socket is gone — the Dropped command will catch up shortly.
    fn send_to(&self, player: PlayerId, event: RoomEvent) {
        if let Some(sender) = self.senders.get(&player) {
            let _ = sender.send(event);
        }
    }

    fn info(&self) -> RoomInfo {
        RoomInfo {
            room_id: self.state.room_id,
            player_count: self.state.roster.len(),
            connected_count: self.state.roster.connected_count(),
            activity_open: self.state.slot.is_open(),
            idle_for: self.last_command.elapsed(),
        }
    }
}

/// Spawns a new room actor task and returns a handle to it.
///
/// `channel_size` bounds the command queue — senders wait when it fills
/// up rather than letting one noisy room grow without limit.
pub(crate) fn spawn_room(
    room_id: RoomId,
    config: LobbyConfig,
    source: Arc<dyn QuestionSource>,
    checker: Arc<dyn AnswerChecker>,
    channel_size: usize,
) -> RelayHandle {
    let (tx, rx) = mpsc::channel(channel_size);

    let config = config.validated();
    let board = Board::new(source.board());
    let relay = RoomRelay {
        state: LobbyState::new(room_id, config, board),
        senders: HashMap::new(),
        source,
        checker,
        activity_alarm: None,
        supervisor: ReconnectSupervisor::new(),
        receiver: rx,
        self_tx: tx.clone(),
        last_command: Instant::now(),
    };

    tokio::spawn(relay.run());

    RelayHandle { room_id, sender: tx }
}
