//! Transport-token to participant-id reconciliation
//!
//! The signaling relay assigns each endpoint an opaque transport token;
//! the game assigns each participant a stable numeric id. The two arrive
//! asynchronously and out of order relative to connection setup, so they
//! are kept as an explicit keyed mapping rather than collapsed.

use crate::game::ParticipantId;
use std::collections::HashMap;
use tracing::debug;

/// Opaque relay-assigned endpoint identity
pub type PeerToken = String;

/// Mapping between transport tokens and participant ids
#[derive(Debug, Default)]
pub struct ParticipantIdentityMap {
    forward: HashMap<PeerToken, ParticipantId>,
}

impl ParticipantIdentityMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind one token to a participant id, replacing any previous binding
    /// for that token
    pub fn bind(&mut self, token: PeerToken, id: ParticipantId) {
        debug!("Binding token {} -> participant {}", token, id);
        self.forward.insert(token, id);
    }

    /// Replace the entire mapping wholesale. Existing entries are
    /// discarded, never merged.
    pub fn replace_all(&mut self, mapping: HashMap<PeerToken, ParticipantId>) {
        debug!("Replacing identity map ({} entries)", mapping.len());
        self.forward = mapping;
    }

    /// Participant id bound to a token, if any
    pub fn participant_for(&self, token: &str) -> Option<ParticipantId> {
        self.forward.get(token).copied()
    }

    /// Reverse lookup: token bound to a participant id, if any.
    ///
    /// A participant with no token has no audio route and is treated as
    /// not connected by display logic.
    pub fn token_for(&self, id: ParticipantId) -> Option<&PeerToken> {
        self.forward.iter().find(|(_, v)| **v == id).map(|(k, _)| k)
    }

    /// Whether any token is bound to this participant
    pub fn is_connected(&self, id: ParticipantId) -> bool {
        self.forward.values().any(|v| *v == id)
    }

    /// Drop all bindings
    pub fn clear(&mut self) {
        self.forward.clear();
    }

    /// Number of bindings
    pub fn len(&self) -> usize {
        self.forward.len()
    }

    /// Whether the map is empty
    pub fn is_empty(&self) -> bool {
        self.forward.is_empty()
    }
}
