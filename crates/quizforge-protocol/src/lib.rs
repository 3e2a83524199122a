//! Wire protocol for Quizforge.
//!
//! This crate defines the "language" that the browser client and the
//! lobby server speak:
//!
//! - **Types** ([`Envelope`], [`SystemMessage`], [`ClientCommand`],
//!   [`RoomEvent`], the identity newtypes) — the structures that travel
//!   on the wire.
//! - **Codec** ([`Codec`] trait, [`JsonCodec`]) — how those messages
//!   are converted to/from bytes.
//! - **Errors** ([`ProtocolError`]) — what can go wrong during
//!   encoding/decoding.
//!
//! # Architecture
//!
//! The protocol layer sits between the socket (raw bytes) and the
//! session/lobby layers (player context, room state). It does not know
//! about connections or rooms — it only knows how to serialize and
//! deserialize messages.
//!
//! ```text
//! Socket (bytes) → Protocol (Envelope) → Session (identity) → Lobby (room)
//! ```

mod codec;
mod error;
mod types;

pub use codec::Codec;
#[cfg(feature = "json")]
pub use codec::JsonCodec;
pub use error::ProtocolError;
pub use types::{
    ClientCommand, Envelope, ExamId, ExamQuestionView, Payload, PhaseId,
    PlayerId, PlayerInfo, PointId, PointStatus, QuestionId, QuestionView,
    Recipient, RoomEvent, RoomId, SystemMessage,
};
