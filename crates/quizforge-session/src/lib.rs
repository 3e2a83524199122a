//! Player session management for Quizforge.
//!
//! This crate handles the lifecycle of player connections:
//!
//! 1. **Authentication** — validating who a player is ([`Authenticator`])
//! 2. **Session tracking** — knowing who's connected ([`SessionManager`])
//! 3. **Reconnection** — letting players resume after a socket drop
//!    (token-based, with a configurable grace period)
//!
//! A session is the server's record of one player identity, independent
//! of which lobby room (if any) the player is in. The lobby layer keeps
//! its own per-room roster; this crate only answers "is this socket the
//! same player who dropped a moment ago?".
//!
//! ```text
//! Lobby layer (above)   ← rosters, turns, activities
//!     ↕
//! Session layer (this)  ← identity, connection state, reconnect tokens
//!     ↕
//! Protocol layer (below) ← PlayerId, SystemMessage
//! ```

mod auth;
mod error;
mod manager;
mod session;

pub use auth::Authenticator;
pub use error::SessionError;
pub use manager::SessionManager;
pub use session::{Session, SessionConfig, SessionState};
