//! The Quizforge lobby synchronization engine.
//!
//! Keeps a variable number of connected players, a shared board, a
//! single active turn, a running countdown, and the in-flight
//! question/exam activity consistent across all participants — through
//! disconnects, answer-vs-timeout races, and reconnection.
//!
//! # Key pieces
//!
//! - [`LobbyRegistry`] — one relay actor per room; lazy creation,
//!   empty/idle eviction
//! - [`RelayHandle`] — the serialized command stream into one room
//! - [`LobbyState`] — the authoritative per-room state (roster, turn,
//!   board, activity slot, scores)
//! - [`Board`] / [`turns`] / activity state machine — the engine's
//!   decision logic, all pure of I/O
//! - [`QuestionSource`] / [`AnswerChecker`] — seams to the platform's
//!   content and evaluation services
//!
//! # Concurrency model
//!
//! One mpsc command stream per room, processed by one actor task;
//! rooms share nothing. Timer and supervisor expirations are commands
//! on the same stream, so "the player just answered" and "the clock
//! just ran out" are ordered events and the activity generation decides
//! the race deterministically.

mod activity;
mod board;
mod config;
mod error;
mod registry;
mod relay;
mod sources;
mod state;
mod supervisor;
mod turns;

pub use activity::{Activity, ActivitySlot, ExamActivity, Generation, QuestionActivity};
pub use board::{Board, Point};
pub use config::LobbyConfig;
pub use error::LobbyError;
pub use registry::LobbyRegistry;
pub use relay::{EventSender, RelayHandle, RoomInfo};
pub use sources::{
    AnswerChecker, ExamSpec, PointSpec, QuestionSource, QuestionSpec, StaticSource,
};
pub use state::{LobbyState, Outcome, Scoreboard, SupervisorDirective, TimerDirective};
pub use supervisor::ReconnectSupervisor;
pub use turns::{ensure_turn, next_turn, reevaluate, PlayerRecord, Roster};
