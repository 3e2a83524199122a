//! # Quizforge
//!
//! Authoritative multiplayer lobby server for browser quiz games.
//!
//! The engine keeps each room's players, board, turn, countdown, and
//! in-flight question/exam consistent across all participants — through
//! disconnects, answer-vs-timeout races, and reconnection. Content and
//! correctness come from the surrounding platform through the
//! [`QuestionSource`](quizforge_lobby::QuestionSource) and
//! [`AnswerChecker`](quizforge_lobby::AnswerChecker) seams; identity
//! comes through [`Authenticator`](quizforge_session::Authenticator).
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use quizforge::QuizforgeServerBuilder;
//!
//! let server = QuizforgeServerBuilder::new()
//!     .bind("0.0.0.0:8080")
//!     .build(my_auth, source, checker)
//!     .await?;
//! server.run().await
//! ```

mod error;
mod handler;
mod server;
pub mod ws;

pub use error::QuizforgeError;
pub use server::{QuizforgeServer, QuizforgeServerBuilder, PROTOCOL_VERSION};
