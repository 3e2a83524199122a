//! Authentication hook for validating player identity.
//!
//! Quizforge does not implement authentication — the surrounding quiz
//! platform does (its profile service issues the tokens the browser
//! client connects with). The engine only defines the seam: a single
//! async method that turns a token into a [`PlayerId`] or an error.

use quizforge_protocol::PlayerId;

use crate::SessionError;

/// Validates a client's auth token and returns their identity.
///
/// `Send + Sync + 'static` because the authenticator is shared across
/// all connection-handler tasks for the lifetime of the server.
///
/// # Example
///
/// ```rust
/// use quizforge_session::{Authenticator, SessionError};
/// use quizforge_protocol::PlayerId;
///
/// /// Accepts any numeric token as the player id. Development only.
/// struct DevAuthenticator;
///
/// impl Authenticator for DevAuthenticator {
///     async fn authenticate(
///         &self,
///         token: &str,
///     ) -> Result<PlayerId, SessionError> {
///         let id: u64 = token.parse().map_err(|_| {
///             SessionError::AuthFailed("token must be a number".into())
///         })?;
///         Ok(PlayerId(id))
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Validates the given token and returns the player's identity.
    ///
    /// Called once per connection during the handshake.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<PlayerId, SessionError>> + Send;
}
