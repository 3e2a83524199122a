//! Error types for the lobby engine.

use quizforge_protocol::{ExamId, PlayerId, PointId, RoomId};

/// Errors produced while applying room commands.
///
/// None of these corrupt or terminate a session. The relay maps them to
/// outcomes: `WrongPoint`/`WrongExam` become self-correction events for
/// the asking client, `StaleGeneration` is silently dropped (logged at
/// debug), everything else is answered to the offending player as a
/// `rejected` event.
#[derive(Debug, thiserror::Error)]
pub enum LobbyError {
    /// A state-mutating command came from a non-active player.
    #[error("not your turn, {0}")]
    NotYourTurn(PlayerId),

    /// The Point is locked, completed, or contested.
    #[error("point {0} is not available")]
    PointNotAvailable(PointId),

    /// Another activity is already open on this session.
    #[error("an activity is already open")]
    ActivityAlreadyOpen,

    /// A second submission for the same activity instance. Rejected
    /// loudly (rather than ignored) to surface client bugs.
    #[error("answer already submitted for this activity")]
    AlreadySubmitted,

    /// The phase's exam cannot start until every Point of the phase is
    /// completed.
    #[error("exam {0} is not ready: phase incomplete")]
    ExamNotReady(ExamId),

    /// The client asked about a Point that is not the active one.
    #[error("point {requested} is not the active point {active}")]
    WrongPoint { requested: PointId, active: PointId },

    /// The client asked about an exam that is not the active one.
    #[error("exam {requested} is not the active exam {active}")]
    WrongExam { requested: ExamId, active: ExamId },

    /// A command tagged with an older activity generation arrived after
    /// that activity was already resolved — the classic answer-vs-timeout
    /// race, decided by generation rather than arrival order.
    #[error("stale activity generation")]
    StaleGeneration,

    /// No Point with this id exists on the board.
    #[error("unknown point {0}")]
    UnknownPoint(PointId),

    /// The room does not exist.
    #[error("unknown room {0}")]
    UnknownRoom(RoomId),

    /// The player is not a member of any room.
    #[error("player {0} is not in a room")]
    NotInRoom(PlayerId),

    /// The player is already in a room.
    #[error("player {0} is already in room {1}")]
    AlreadyInRoom(PlayerId, RoomId),

    /// No free player slot in the room.
    #[error("room {0} is full")]
    RoomFull(RoomId),

    /// The room's command channel is closed or full.
    #[error("room {0} is unavailable")]
    Unavailable(RoomId),
}
