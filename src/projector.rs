//! Derived session view
//!
//! Folds game snapshots, identity bindings and voice activity transitions
//! into the per-participant display state. Death knowledge follows what an
//! observer is allowed to know: a death during free roam stays hidden until
//! the next discussion reveals it.

use crate::audio::{VoiceEvent, VoiceSource};
use crate::game::{GamePhase, GameSnapshot, ParticipantId};
use crate::identity::ParticipantIdentityMap;
use std::collections::HashMap;
use tracing::debug;

/// Display state for one remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantView {
    /// Stable in-game id
    pub id: ParticipantId,
    /// Whether a transport token is bound to this participant
    pub connected: bool,
    /// Speaking indicator. Unconnected participants are flagged so the
    /// indicator never reads as confidently silent.
    pub talking: bool,
    /// Known-dead, as revealed by phase transitions
    pub dead: bool,
}

/// Display state for the whole session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    /// Current phase, `None` before the first snapshot
    pub phase: Option<GamePhase>,
    /// Displayed session label, with concealment and relay-mode
    /// placeholders already applied
    pub session_label: Option<String>,
    /// Local speaking indicator
    pub local_talking: bool,
    /// Remote playback is silenced
    pub deafened: bool,
    /// Relay link is up
    pub relay_connected: bool,
    /// Remote participants in snapshot order
    pub participants: Vec<ParticipantView>,
}

/// Projects raw session inputs into [`SessionView`] values
pub struct SessionStateProjector {
    phase: Option<GamePhase>,
    snapshot: Option<GameSnapshot>,
    talking: HashMap<ParticipantId, bool>,
    known_dead: HashMap<ParticipantId, bool>,
    local_talking: bool,
    relay_connected: bool,
    hide_session_code: bool,
    relay_projection: bool,
}

impl SessionStateProjector {
    /// Create an empty projector
    pub fn new(hide_session_code: bool, relay_projection: bool) -> Self {
        Self {
            phase: None,
            snapshot: None,
            talking: HashMap::new(),
            known_dead: HashMap::new(),
            local_talking: false,
            relay_connected: false,
            hide_session_code,
            relay_projection,
        }
    }

    /// Fold in a new game snapshot.
    ///
    /// Death knowledge only moves on phase transitions: entering the lobby
    /// forgets every death, entering any phase other than free roam merges
    /// the snapshot's dead and disconnected flags, and free roam itself
    /// changes nothing.
    pub fn apply_snapshot(&mut self, snapshot: GameSnapshot) {
        if self.phase != Some(snapshot.phase) {
            match snapshot.phase {
                GamePhase::Lobby => {
                    self.known_dead.clear();
                }
                GamePhase::Tasks => {}
                _ => {
                    for player in &snapshot.players {
                        self.known_dead
                            .insert(player.id, player.is_dead || player.disconnected);
                    }
                }
            }
            debug!(
                "Phase transition {:?} -> {:?}, {} known dead",
                self.phase,
                snapshot.phase,
                self.known_dead.values().filter(|d| **d).count()
            );
        }

        self.phase = Some(snapshot.phase);
        self.snapshot = Some(snapshot);
    }

    /// Fold in a voice activity transition.
    ///
    /// A remote participant only reads as talking while its route is
    /// audible; the gain is sampled at the moment of the transition.
    pub fn apply_voice(&mut self, event: &VoiceEvent, identities: &ParticipantIdentityMap) {
        match &event.source {
            VoiceSource::Local => {
                self.local_talking = event.active;
            }
            VoiceSource::Remote(token) => {
                if let Some(id) = identities.participant_for(token) {
                    self.talking.insert(id, event.active && event.gain > 0.0);
                }
            }
        }
    }

    /// Forget all speaking indicators (relay link lost or mesh torn down)
    pub fn reset_voice(&mut self) {
        self.talking.clear();
        self.local_talking = false;
    }

    /// Record the relay link going up or down
    pub fn set_relay_connected(&mut self, connected: bool) {
        self.relay_connected = connected;
    }

    /// The displayed session label: the code itself, "LOBBY" when the code
    /// is concealed, or "SIDECAR" when running off relayed snapshots
    /// without a session yet.
    fn session_label(&self) -> Option<String> {
        match self.snapshot.as_ref().and_then(|s| s.session_code.clone()) {
            Some(_) if self.hide_session_code => Some("LOBBY".to_string()),
            Some(code) => Some(code),
            None if self.relay_projection => Some("SIDECAR".to_string()),
            None => None,
        }
    }

    /// Build the current display state
    pub fn view(&self, identities: &ParticipantIdentityMap, deafened: bool) -> SessionView {
        let participants = self
            .snapshot
            .as_ref()
            .map(|snapshot| {
                snapshot
                    .remote_players()
                    .map(|player| {
                        let connected = identities.is_connected(player.id);
                        ParticipantView {
                            id: player.id,
                            connected,
                            talking: !connected
                                || self.talking.get(&player.id).copied().unwrap_or(false),
                            dead: self.known_dead.get(&player.id).copied().unwrap_or(false),
                        }
                    })
                    .collect()
            })
            .unwrap_or_default();

        SessionView {
            phase: self.phase,
            session_label: self.session_label(),
            local_talking: self.local_talking,
            deafened,
            relay_connected: self.relay_connected,
            participants,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::PlayerState;

    fn player(id: ParticipantId, is_local: bool, is_dead: bool) -> PlayerState {
        PlayerState {
            id,
            x: 0.0,
            y: 0.0,
            is_dead,
            disconnected: false,
            in_vent: false,
            is_local,
        }
    }

    fn snapshot(phase: GamePhase, players: Vec<PlayerState>) -> GameSnapshot {
        GameSnapshot {
            phase,
            old_phase: GamePhase::Menu,
            session_code: Some("ABCDEF".to_string()),
            players,
        }
    }

    fn identities(pairs: &[(&str, ParticipantId)]) -> ParticipantIdentityMap {
        let mut map = ParticipantIdentityMap::new();
        for (token, id) in pairs {
            map.bind((*token).to_string(), *id);
        }
        map
    }

    #[test]
    fn test_death_hidden_during_tasks_revealed_in_discussion() {
        let mut projector = SessionStateProjector::new(false, false);
        let ids = identities(&[("tok-1", 1)]);

        projector.apply_snapshot(snapshot(
            GamePhase::Tasks,
            vec![player(0, true, false), player(1, false, true)],
        ));
        assert!(!projector.view(&ids, false).participants[0].dead);

        // Same flag, still Tasks: no reveal.
        projector.apply_snapshot(snapshot(
            GamePhase::Tasks,
            vec![player(0, true, false), player(1, false, true)],
        ));
        assert!(!projector.view(&ids, false).participants[0].dead);

        projector.apply_snapshot(snapshot(
            GamePhase::Discussion,
            vec![player(0, true, false), player(1, false, true)],
        ));
        assert!(projector.view(&ids, false).participants[0].dead);
    }

    #[test]
    fn test_lobby_forgets_deaths() {
        let mut projector = SessionStateProjector::new(false, false);
        let ids = identities(&[("tok-1", 1)]);

        projector.apply_snapshot(snapshot(
            GamePhase::Discussion,
            vec![player(0, true, false), player(1, false, true)],
        ));
        assert!(projector.view(&ids, false).participants[0].dead);

        projector.apply_snapshot(snapshot(
            GamePhase::Lobby,
            vec![player(0, true, false), player(1, false, false)],
        ));
        assert!(!projector.view(&ids, false).participants[0].dead);
    }

    #[test]
    fn test_unconnected_participant_flagged_talking() {
        let mut projector = SessionStateProjector::new(false, false);

        projector.apply_snapshot(snapshot(
            GamePhase::Lobby,
            vec![player(0, true, false), player(1, false, false)],
        ));

        let view = projector.view(&identities(&[]), false);
        assert!(!view.participants[0].connected);
        assert!(view.participants[0].talking);

        let view = projector.view(&identities(&[("tok-1", 1)]), false);
        assert!(view.participants[0].connected);
        assert!(!view.participants[0].talking);
    }

    #[test]
    fn test_talking_requires_audible_gain() {
        let mut projector = SessionStateProjector::new(false, false);
        let ids = identities(&[("tok-1", 1)]);

        projector.apply_snapshot(snapshot(
            GamePhase::Lobby,
            vec![player(0, true, false), player(1, false, false)],
        ));

        // Active but muted: not talking.
        projector.apply_voice(
            &VoiceEvent {
                source: VoiceSource::Remote("tok-1".to_string()),
                active: true,
                gain: 0.0,
            },
            &ids,
        );
        assert!(!projector.view(&ids, false).participants[0].talking);

        projector.apply_voice(
            &VoiceEvent {
                source: VoiceSource::Remote("tok-1".to_string()),
                active: true,
                gain: 1.0,
            },
            &ids,
        );
        assert!(projector.view(&ids, false).participants[0].talking);

        projector.apply_voice(
            &VoiceEvent {
                source: VoiceSource::Remote("tok-1".to_string()),
                active: false,
                gain: 1.0,
            },
            &ids,
        );
        assert!(!projector.view(&ids, false).participants[0].talking);
    }

    #[test]
    fn test_local_talking_and_reset() {
        let mut projector = SessionStateProjector::new(false, false);
        let ids = identities(&[]);

        projector.apply_voice(
            &VoiceEvent {
                source: VoiceSource::Local,
                active: true,
                gain: 1.0,
            },
            &ids,
        );
        assert!(projector.view(&ids, false).local_talking);

        projector.reset_voice();
        assert!(!projector.view(&ids, false).local_talking);
    }

    #[test]
    fn test_session_label_substitutions() {
        let ids = identities(&[]);
        let snap = snapshot(GamePhase::Lobby, vec![player(0, true, false)]);

        let mut shown = SessionStateProjector::new(false, false);
        shown.apply_snapshot(snap.clone());
        assert_eq!(
            shown.view(&ids, false).session_label.as_deref(),
            Some("ABCDEF")
        );

        // Concealed code reads as a placeholder, not as absent.
        let mut hidden = SessionStateProjector::new(true, false);
        hidden.apply_snapshot(snap);
        assert_eq!(
            hidden.view(&ids, false).session_label.as_deref(),
            Some("LOBBY")
        );

        // Relay projection without a session yet.
        let sidecar = SessionStateProjector::new(false, true);
        assert_eq!(
            sidecar.view(&ids, false).session_label.as_deref(),
            Some("SIDECAR")
        );
    }

    #[test]
    fn test_view_carries_deafened_and_relay_state() {
        let mut projector = SessionStateProjector::new(false, false);
        let ids = identities(&[]);

        assert!(!projector.view(&ids, false).relay_connected);
        projector.set_relay_connected(true);

        let view = projector.view(&ids, true);
        assert!(view.relay_connected);
        assert!(view.deafened);
    }

    #[test]
    fn test_view_before_any_snapshot_is_empty() {
        let projector = SessionStateProjector::new(false, false);
        let view = projector.view(&identities(&[]), false);
        assert_eq!(view.phase, None);
        assert!(view.participants.is_empty());
    }
}
