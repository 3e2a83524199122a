//! Core protocol types for Quizforge's wire format.
//!
//! Everything here travels on the wire between the browser client and
//! the lobby server. System messages (handshake, heartbeat, room
//! membership) use PascalCase internal tagging; the quiz catalog
//! ([`ClientCommand`], [`RoomEvent`]) uses camelCase tags and field
//! names because that is the channel naming the browser client
//! consumes (`openModal`, `examTimerReset`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Identity types
// ---------------------------------------------------------------------------

/// A unique identifier for a player.
///
/// Newtype over `u64` so a `RoomId` can never be passed where a
/// `PlayerId` is expected. `#[serde(transparent)]` keeps the wire shape
/// a plain number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlayerId(pub u64);

impl fmt::Display for PlayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P-{}", self.0)
    }
}

/// A unique identifier for a lobby room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RoomId(pub u64);

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R-{}", self.0)
    }
}

/// A unique identifier for a board Point (a topic node).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PointId(pub u64);

impl fmt::Display for PointId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pt-{}", self.0)
    }
}

/// A unique identifier for a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QuestionId(pub u64);

impl fmt::Display for QuestionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q-{}", self.0)
    }
}

/// A unique identifier for a phase exam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExamId(pub u64);

impl fmt::Display for ExamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ex-{}", self.0)
    }
}

/// A board phase index. Points and exams belong to exactly one phase;
/// phases unlock in order as exams are passed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PhaseId(pub u32);

impl fmt::Display for PhaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "phase-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Recipient — who should receive an event?
// ---------------------------------------------------------------------------

/// Specifies who should receive a room event.
///
/// The lobby engine produces `(Recipient, RoomEvent)` pairs; the relay
/// fans each one out to the matching member sockets. Restore and
/// self-correction events go to a single player so the rest of the room
/// never sees a desynchronized flash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recipient {
    /// Every connected player in the room.
    All,
    /// One specific player.
    Player(PlayerId),
    /// Everyone except the specified player.
    AllExcept(PlayerId),
}

// ---------------------------------------------------------------------------
// Board vocabulary shared between engine and wire
// ---------------------------------------------------------------------------

/// The lifecycle status of a board Point.
///
/// Status only moves forward (`Locked → Available → Completed`), with a
/// single exception: a failed exam resets every Point of its phase back
/// to `Available`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PointStatus {
    Locked,
    Available,
    Completed,
}

impl fmt::Display for PointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Locked => write!(f, "locked"),
            Self::Available => write!(f, "available"),
            Self::Completed => write!(f, "completed"),
        }
    }
}

/// A roster entry as broadcast in the `users` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerInfo {
    pub id: PlayerId,
    pub display_name: String,
    pub connected: bool,
}

/// The client-visible portion of an open question.
///
/// Never carries the expected answer — correctness lives behind the
/// engine's answer-checker seam.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionView {
    pub question_id: QuestionId,
    pub topic: String,
    pub prompt: String,
    pub hint: Option<String>,
}

/// One exam question as sent in `examStart` / `examRestore`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExamQuestionView {
    pub question_id: QuestionId,
    pub prompt: String,
    pub hint: Option<String>,
}

// ---------------------------------------------------------------------------
// ClientCommand — the C→S quiz catalog
// ---------------------------------------------------------------------------

/// Room-scoped commands a client may submit.
///
/// Every variant is processed on the room's single serialized stream;
/// there is no fast path that bypasses ordering.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientCommand {
    /// Active player opens the question bound to an available Point.
    OpenPoint { point_id: PointId },

    /// Active player starts the current phase's exam.
    OpenExam { exam_id: ExamId },

    /// Answer the open question on `point_id`.
    Answer { point_id: PointId, answer: String },

    /// Answer the current exam question. Correctness is evaluated
    /// server-side; the client asserts nothing.
    ExamAnswer { exam_id: ExamId, answer: String },

    /// Ask for a `questionRestore` of the open question (reconnection).
    /// `point_id` is what the client believes is active, if anything.
    CheckActiveQuestion { point_id: Option<PointId> },

    /// Ask for an `examRestore` of the open exam (reconnection).
    CheckActiveExam { exam_id: Option<ExamId> },

    /// Client-side countdown hit zero. A hint only — the authoritative
    /// timeout is the engine's own alarm.
    Timeout { point_id: PointId },
}

// ---------------------------------------------------------------------------
// RoomEvent — the S→room quiz catalog
// ---------------------------------------------------------------------------

/// Events the engine broadcasts to a room (or targets at one member).
///
/// All time fields are remaining milliseconds, recomputed from the
/// authoritative countdown at emission time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RoomEvent {
    /// Roster or turn changed.
    Users {
        players: Vec<PlayerInfo>,
        active_player_id: Option<PlayerId>,
    },

    /// A question was opened on a Point.
    OpenModal {
        point_id: PointId,
        question: QuestionView,
        time_left: u64,
    },

    /// Re-sync of the open question for one rejoining client.
    QuestionRestore {
        point_id: PointId,
        question: QuestionView,
        time_left: u64,
    },

    /// An exam began at question 0.
    ExamStart {
        exam_id: ExamId,
        questions: Vec<ExamQuestionView>,
        index: usize,
        time_left: u64,
    },

    /// The exam advanced to the next question.
    ExamNext { exam_id: ExamId, index: usize, time_left: u64 },

    /// Re-sync of the open exam for one rejoining client.
    ExamRestore {
        exam_id: ExamId,
        questions: Vec<ExamQuestionView>,
        index: usize,
        correct_count: u32,
        time_left: u64,
    },

    /// The exam resolved, either way.
    ExamComplete {
        exam_id: ExamId,
        passed: bool,
        correct_answers: u32,
        total_questions: u32,
    },

    /// A Point's status changed.
    UpdatePointStatus { point_id: PointId, status: PointStatus },

    /// Score delta after a correct answer.
    Scores {
        player_id: PlayerId,
        user_score: u32,
        session_score: u32,
    },

    /// Full scoreboard for a joining socket.
    InitScores {
        session_score: u32,
        user_scores: Vec<(PlayerId, u32)>,
        incorrect_answers: u32,
    },

    /// The shared incorrect-answer counter moved.
    IncorrectCountUpdate { incorrect_answers: u32 },

    /// Authoritative remaining time for the open question.
    TimerReset { time_left: u64 },

    /// Authoritative remaining time for the current exam question.
    ExamTimerReset { time_left: u64 },

    /// The active player dropped mid-activity; the room is waiting.
    ReconnectWaiting { active_player_name: String, time_left: u64 },

    /// The reconnection window elapsed; the activity resolved as a
    /// timeout and the turn moved on.
    ReconnectTimeout { player_id: PlayerId },

    /// The active player returned in time; play resumes unchanged.
    ReconnectCanceled { active_player_name: String },

    /// The asker requested a Point that is not the active one.
    WrongPoint { requested_id: PointId, active_id: PointId },

    /// The asker requested an exam that is not the active one.
    WrongExam { requested_id: ExamId, active_id: ExamId },

    /// The contested Point changed (opened or released).
    ActivePointChanged { active_point_id: Option<PointId> },

    /// A command was rejected; sent to the offending player only.
    Rejected { reason: String },
}

// ---------------------------------------------------------------------------
// SystemMessage — framework-level messages
// ---------------------------------------------------------------------------

/// Messages used by the connection plumbing itself (not quiz-specific):
/// connecting, resuming, heartbeats, room membership, errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SystemMessage {
    // -- Connection lifecycle --
    /// Client → Server: "Hello." `token` identifies the player to the
    /// authenticator; `resume` is a reconnection token from an earlier
    /// [`SystemMessage::HandshakeAck`], used to pick a dropped session
    /// back up inside the grace period.
    Handshake {
        version: u32,
        token: Option<String>,
        resume: Option<String>,
    },

    /// Server → Client: "Welcome, you're connected."
    HandshakeAck {
        player_id: PlayerId,
        reconnect_token: String,
        server_time: u64,
    },

    /// Either direction: "I'm disconnecting."
    Disconnect { reason: String },

    // -- Heartbeat (keep-alive) --
    /// Client → Server: "I'm still here."
    Heartbeat { client_time: u64 },

    /// Server → Client: echo for RTT calculation.
    HeartbeatAck { client_time: u64, server_time: u64 },

    // -- Room membership --
    /// Client → Server: the catalog's `join`. An unknown room id
    /// creates the lobby lazily.
    JoinRoom { room_id: RoomId, display_name: String },

    /// Server → Client: membership confirmed.
    RoomJoined { room_id: RoomId },

    /// Client → Server: explicit leave — the only way a player is
    /// removed from the roster (a socket drop merely disconnects).
    LeaveRoom,

    // -- Errors --
    /// Server → Client: HTTP-style `code` plus a human-readable message.
    Error { code: u16, message: String },
}

// ---------------------------------------------------------------------------
// Payload and Envelope — the top-level wire format
// ---------------------------------------------------------------------------

/// The content of a message: framework plumbing or quiz traffic.
///
/// Adjacently tagged so the handler can check "system or game?" without
/// decoding the inner bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum Payload {
    /// A framework-level message (handshake, heartbeat, membership).
    System(SystemMessage),

    /// Quiz traffic: a [`ClientCommand`] or [`RoomEvent`] serialized by
    /// the codec. Opaque at this level.
    Game(Vec<u8>),
}

/// The top-level message wrapper. Every message on the wire is an
/// `Envelope`: a per-direction sequence number, a server-relative
/// timestamp in milliseconds, and the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Auto-incrementing per sender. Used to detect missing or
    /// out-of-order messages while debugging.
    pub seq: u64,

    /// Milliseconds since the server started.
    pub timestamp: u64,

    /// The actual content.
    pub payload: Payload,
}

// =========================================================================
// Tests
// =========================================================================
