//! Game-state snapshot types
//!
//! Snapshots arrive from an external game reader (or, in relay-projection
//! mode, over the signaling channel) and drive the audio policy and the
//! derived view state.

use serde::{Deserialize, Serialize};

/// Stable in-game participant identity
pub type ParticipantId = u32;

/// Shared activity mode of the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GamePhase {
    /// Not in any session (pre-session menu)
    Menu,
    /// In the pre-game lobby
    Lobby,
    /// Free-roam / tasks
    Tasks,
    /// Discussion / meeting
    Discussion,
}

/// One participant's raw state within a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Stable in-game id
    pub id: ParticipantId,
    /// Planar position
    pub x: f32,
    /// Planar position
    pub y: f32,
    /// Dead / spectator
    #[serde(default)]
    pub is_dead: bool,
    /// Dropped from the game session
    #[serde(default)]
    pub disconnected: bool,
    /// Concealed traversal state
    #[serde(default)]
    pub in_vent: bool,
    /// At most one player per snapshot is the local participant
    #[serde(default)]
    pub is_local: bool,
}

/// A full game-state snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameSnapshot {
    /// Current phase
    pub phase: GamePhase,
    /// Phase this snapshot transitioned from
    pub old_phase: GamePhase,
    /// Session code, `None` when no session is joined
    #[serde(default)]
    pub session_code: Option<String>,
    /// All known participants
    #[serde(default)]
    pub players: Vec<PlayerState>,
}

impl GameSnapshot {
    /// The local participant, if present in this snapshot
    pub fn local_player(&self) -> Option<&PlayerState> {
        self.players.iter().find(|p| p.is_local)
    }

    /// All participants other than the local one
    pub fn remote_players(&self) -> impl Iterator<Item = &PlayerState> {
        self.players.iter().filter(|p| !p.is_local)
    }

    /// Mark the player matching `id` as local and all others as remote.
    ///
    /// Relayed snapshots carry no local flag; the relay-projection client
    /// stamps its configured participant id onto them.
    pub fn assume_local(&mut self, id: ParticipantId) {
        for player in &mut self.players {
            player.is_local = player.id == id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn player(id: ParticipantId, is_local: bool) -> PlayerState {
        PlayerState {
            id,
            x: 0.0,
            y: 0.0,
            is_dead: false,
            disconnected: false,
            in_vent: false,
            is_local,
        }
    }

    #[test]
    fn test_local_player_lookup() {
        let snapshot = GameSnapshot {
            phase: GamePhase::Lobby,
            old_phase: GamePhase::Menu,
            session_code: Some("ABCDEF".to_string()),
            players: vec![player(0, false), player(1, true), player(2, false)],
        };

        assert_eq!(snapshot.local_player().map(|p| p.id), Some(1));
        let remotes: Vec<_> = snapshot.remote_players().map(|p| p.id).collect();
        assert_eq!(remotes, vec![0, 2]);
    }

    #[test]
    fn test_assume_local_restamps_flags() {
        let mut snapshot = GameSnapshot {
            phase: GamePhase::Tasks,
            old_phase: GamePhase::Lobby,
            session_code: Some("ABCDEF".to_string()),
            players: vec![player(0, true), player(3, false)],
        };

        snapshot.assume_local(3);
        assert_eq!(snapshot.local_player().map(|p| p.id), Some(3));
        assert!(!snapshot.players[0].is_local);
    }

    #[test]
    fn test_phase_wire_format() {
        let json = serde_json::to_string(&GamePhase::Discussion).unwrap();
        assert_eq!(json, "\"DISCUSSION\"");

        let phase: GamePhase = serde_json::from_str("\"TASKS\"").unwrap();
        assert_eq!(phase, GamePhase::Tasks);
    }

    #[test]
    fn test_snapshot_defaults() {
        let json = r#"{"phase":"LOBBY","old_phase":"MENU"}"#;
        let snapshot: GameSnapshot = serde_json::from_str(json).unwrap();
        assert!(snapshot.session_code.is_none());
        assert!(snapshot.players.is_empty());
    }
}
