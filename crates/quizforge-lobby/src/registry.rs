//! The Session Registry: one relay per active lobby room.
//!
//! Rooms are created lazily on first join and evicted when the last
//! player leaves with no activity pending, or by the periodic idle
//! sweep. The registry also enforces the "one room per player at a
//! time" invariant and routes commands by membership.

use std::collections::HashMap;
use std::sync::Arc;

use quizforge_protocol::{ClientCommand, PlayerId, RoomId};

use crate::relay::{spawn_room, EventSender, RelayHandle, RoomInfo};
use crate::sources::{AnswerChecker, QuestionSource};
use crate::{LobbyConfig, LobbyError};

/// Default command channel size for room actors.
const DEFAULT_CHANNEL_SIZE: usize = 64;

/// Tracks every active room and which player is in which room.
///
/// Like the session manager, this is a plain-`HashMap` type owned
/// behind a single lock at the server layer — the registry itself
/// takes no locks.
pub struct LobbyRegistry {
    rooms: HashMap<RoomId, RelayHandle>,
    /// A player is in at most one room at a time (key invariant).
    player_rooms: HashMap<PlayerId, RoomId>,
    config: LobbyConfig,
    source: Arc<dyn QuestionSource>,
    checker: Arc<dyn AnswerChecker>,
}

impl LobbyRegistry {
    pub fn new(
        config: LobbyConfig,
        source: Arc<dyn QuestionSource>,
        checker: Arc<dyn AnswerChecker>,
    ) -> Self {
        Self {
            rooms: HashMap::new(),
            player_rooms: HashMap::new(),
            config,
            source,
            checker,
        }
    }

    /// Adds a player to a room, creating the room lazily if this is the
    /// first join for that id.
    pub async fn join(
        &mut self,
        player_id: PlayerId,
        room_id: RoomId,
        display_name: String,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        if let Some(current) = self.player_rooms.get(&player_id) {
            return Err(LobbyError::AlreadyInRoom(player_id, *current));
        }

        let handle = self.rooms.entry(room_id).or_insert_with(|| {
            tracing::info!(%room_id, "room created on first join");
            spawn_room(
                room_id,
                self.config.clone(),
                Arc::clone(&self.source),
                Arc::clone(&self.checker),
                DEFAULT_CHANNEL_SIZE,
            )
        });

        handle.join(player_id, display_name, sender).await?;
        self.player_rooms.insert(player_id, room_id);
        Ok(())
    }

    /// Removes a player from their current room. Evicts the room when
    /// it is left empty with no open activity.
    pub async fn leave(&mut self, player_id: PlayerId) -> Result<(), LobbyError> {
        let room_id = self
            .player_rooms
            .get(&player_id)
            .copied()
            .ok_or(LobbyError::NotInRoom(player_id))?;

        if let Some(handle) = self.rooms.get(&room_id) {
            handle.leave(player_id).await?;

            if let Ok(info) = handle.info().await {
                if info.player_count == 0 && !info.activity_open {
                    self.destroy(room_id).await?;
                }
            }
        }

        self.player_rooms.remove(&player_id);
        Ok(())
    }

    /// Routes a quiz command to the sender's room.
    pub async fn command(
        &self,
        player_id: PlayerId,
        command: ClientCommand,
    ) -> Result<(), LobbyError> {
        let handle = self.handle_for(player_id)?;
        handle.command(player_id, command).await
    }

    /// Reports a socket drop to the player's room, if they are in one.
    pub async fn dropped(&self, player_id: PlayerId) -> Result<(), LobbyError> {
        let handle = self.handle_for(player_id)?;
        handle.dropped(player_id).await
    }

    /// Reports a session resume to the player's room.
    pub async fn resumed(
        &self,
        player_id: PlayerId,
        sender: EventSender,
    ) -> Result<(), LobbyError> {
        let handle = self.handle_for(player_id)?;
        handle.resumed(player_id, sender).await
    }

    /// The room a player is currently in, if any.
    pub fn room_of(&self, player_id: &PlayerId) -> Option<RoomId> {
        self.player_rooms.get(player_id).copied()
    }

    /// Returns info about a specific room.
    pub async fn room_info(&self, room_id: RoomId) -> Result<RoomInfo, LobbyError> {
        let handle = self
            .rooms
            .get(&room_id)
            .ok_or(LobbyError::UnknownRoom(room_id))?;
        handle.info().await
    }

    /// Shuts a room down and drops every membership pointing at it.
    pub async fn destroy(&mut self, room_id: RoomId) -> Result<(), LobbyError> {
        let handle = self
            .rooms
            .remove(&room_id)
            .ok_or(LobbyError::UnknownRoom(room_id))?;

        let _ = handle.shutdown().await;
        self.player_rooms.retain(|_, rid| *rid != room_id);

        tracing::info!(%room_id, "room destroyed");
        Ok(())
    }

    /// Evicts rooms with nobody connected, no open activity, and no
    /// commands for at least the configured idle timeout. Call
    /// periodically from the server's sweep task. Returns the evicted
    /// room ids.
    pub async fn evict_idle(&mut self) -> Vec<RoomId> {
        let mut evicted = Vec::new();
        for (room_id, handle) in &self.rooms {
            if let Ok(info) = handle.info().await {
                if info.connected_count == 0
                    && !info.activity_open
                    && info.idle_for >= self.config.idle_timeout
                {
                    evicted.push(*room_id);
                }
            }
        }

        for room_id in &evicted {
            let _ = self.destroy(*room_id).await;
        }
        evicted
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    /// All active room ids.
    pub fn room_ids(&self) -> Vec<RoomId> {
        self.rooms.keys().copied().collect()
    }

    fn handle_for(&self, player_id: PlayerId) -> Result<&RelayHandle, LobbyError> {
        let room_id = self
            .player_rooms
            .get(&player_id)
            .ok_or(LobbyError::NotInRoom(player_id))?;
        self.rooms
            .get(room_id)
            .ok_or(LobbyError::UnknownRoom(*room_id))
    }
}
