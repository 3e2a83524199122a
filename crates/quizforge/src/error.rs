//! Unified error type for the Quizforge server.

use quizforge_lobby::LobbyError;
use quizforge_protocol::ProtocolError;
use quizforge_session::SessionError;

use crate::ws::WsError;

/// Top-level error that wraps all crate-specific errors, so the server
/// and its callers deal with one type and `?` converts automatically.
#[derive(Debug, thiserror::Error)]
pub enum QuizforgeError {
    /// A socket-level error (accept, send, recv).
    #[error(transparent)]
    Transport(#[from] WsError),

    /// A protocol-level error (encode, decode, invalid message).
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// A session-level error (auth, reconnect, expired).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A lobby-level error (turns, activities, membership).
    #[error(transparent)]
    Lobby(#[from] LobbyError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_transport_error() {
        let err = WsError::HandshakeFailed("nope".into());
        let unified: QuizforgeError = err.into();
        assert!(matches!(unified, QuizforgeError::Transport(_)));
        assert!(unified.to_string().contains("nope"));
    }

    #[test]
    fn test_from_protocol_error() {
        let err = ProtocolError::InvalidMessage("bad".into());
        let unified: QuizforgeError = err.into();
        assert!(matches!(unified, QuizforgeError::Protocol(_)));
    }

    #[test]
    fn test_from_session_error() {
        let err = SessionError::AuthFailed("denied".into());
        let unified: QuizforgeError = err.into();
        assert!(matches!(unified, QuizforgeError::Session(_)));
    }

    #[test]
    fn test_from_lobby_error() {
        let err = LobbyError::UnknownRoom(quizforge_protocol::RoomId(1));
        let unified: QuizforgeError = err.into();
        assert!(matches!(unified, QuizforgeError::Lobby(_)));
    }
}
