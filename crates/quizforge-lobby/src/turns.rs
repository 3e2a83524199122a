//! The roster and the Turn Arbiter.
//!
//! Players keep their join-order slot for the whole session: a socket
//! drop flips `connected`, it never removes the record, so turn order
//! and scores survive reconnection. Only an explicit leave removes a
//! player.
//!
//! The arbiter rotates over *connected* players in join order. It is
//! re-evaluated (not merely incremented) whenever connection state
//! flips, so a returning player is eligible again at their original
//! position.

use std::time::Instant;

use quizforge_protocol::{PlayerId, PlayerInfo};

use crate::LobbyError;

/// One roster slot.
#[derive(Debug, Clone)]
pub struct PlayerRecord {
    pub id: PlayerId,
    pub display_name: String,
    pub connected: bool,
    pub last_seen_at: Instant,
}

/// Join-ordered player roster for one room.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    players: Vec<PlayerRecord>,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a player in join order. Returns `false` if already present.
    pub fn add(&mut self, id: PlayerId, display_name: impl Into<String>) -> bool {
        if self.contains(id) {
            return false;
        }
        self.players.push(PlayerRecord {
            id,
            display_name: display_name.into(),
            connected: true,
            last_seen_at: Instant::now(),
        });
        true
    }

    /// Removes a player (explicit leave only). Returns `false` if absent.
    pub fn remove(&mut self, id: PlayerId) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != id);
        self.players.len() != before
    }

    /// Flips a player's connection state and refreshes `last_seen_at`.
    /// Returns `false` if the player is not on the roster.
    pub fn set_connected(&mut self, id: PlayerId, connected: bool) -> bool {
        match self.players.iter_mut().find(|p| p.id == id) {
            Some(record) => {
                record.connected = connected;
                record.last_seen_at = Instant::now();
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, id: PlayerId) -> bool {
        self.players.iter().any(|p| p.id == id)
    }

    pub fn get(&self, id: PlayerId) -> Option<&PlayerRecord> {
        self.players.iter().find(|p| p.id == id)
    }

    pub fn display_name(&self, id: PlayerId) -> Option<&str> {
        self.get(id).map(|p| p.display_name.as_str())
    }

    pub fn is_connected(&self, id: PlayerId) -> bool {
        self.get(id).is_some_and(|p| p.connected)
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn connected_count(&self) -> usize {
        self.players.iter().filter(|p| p.connected).count()
    }

    /// The roster as broadcast in the `users` event.
    pub fn infos(&self) -> Vec<PlayerInfo> {
        self.players
            .iter()
            .map(|p| PlayerInfo {
                id: p.id,
                display_name: p.display_name.clone(),
                connected: p.connected,
            })
            .collect()
    }

    fn position(&self, id: PlayerId) -> Option<usize> {
        self.players.iter().position(|p| p.id == id)
    }
}

// ---------------------------------------------------------------------------
// Turn Arbiter
// ---------------------------------------------------------------------------

/// Rotates to the next connected player in join order after `current`,
/// skipping disconnected players. With no connected players the room
/// pauses (`None`). With exactly one connected player the turn stays
/// with them.
pub fn next_turn(roster: &Roster, current: Option<PlayerId>) -> Option<PlayerId> {
    if roster.connected_count() == 0 {
        return None;
    }

    let start = match current.and_then(|id| roster.position(id)) {
        Some(pos) => pos + 1,
        // Current player unknown (left, or no turn assigned yet):
        // start the scan from the top of the join order.
        None => 0,
    };

    let n = roster.players.len();
    (0..n)
        .map(|offset| &roster.players[(start + offset) % n])
        .find(|p| p.connected)
        .map(|p| p.id)
}

/// Re-evaluates the turn after a connection flip or roster change.
///
/// Keeps `current` if that player is still present and connected;
/// otherwise advances past them. A paused room (no active player)
/// resumes at the first connected player in join order.
pub fn reevaluate(roster: &Roster, current: Option<PlayerId>) -> Option<PlayerId> {
    match current {
        Some(id) if roster.is_connected(id) => Some(id),
        _ => next_turn(roster, current),
    }
}

/// Rejects state-mutating commands from anyone but the active player.
pub fn ensure_turn(active: Option<PlayerId>, player: PlayerId) -> Result<(), LobbyError> {
    if active == Some(player) {
        Ok(())
    } else {
        Err(LobbyError::NotYourTurn(player))
    }
}
