//! Signaling wire protocol
//!
//! Tagged-JSON message set exchanged with the relay server. The negotiation
//! payloads inside `signal` messages are opaque to this layer; they are
//! produced and consumed by the peer connection seam.

use crate::game::{GameSnapshot, ParticipantId};
use crate::identity::PeerToken;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Messages sent to the relay server
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingCommand {
    /// Announce join intent for a session
    Join {
        /// Session code to join
        code: String,
        /// Local participant id
        id: ParticipantId,
    },

    /// Leave the current session
    Leave,

    /// Forward an opaque negotiation payload to one peer
    Signal {
        /// Negotiation payload
        data: serde_json::Value,
        /// Target transport token
        to: PeerToken,
    },

    /// Announce the local participant id
    #[serde(rename = "id")]
    AnnounceId {
        /// Local participant id
        id: ParticipantId,
    },

    /// Publish a session snapshot for relay-projection clients.
    /// Only the participant with id 0 publishes under sharing mode.
    Gamestate {
        /// Full snapshot
        state: GameSnapshot,
    },

    /// Subscribe to relayed session snapshots
    Sidecar,
}

/// Messages received from the relay server
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SignalingEvent {
    /// A remote peer joined the session
    Join {
        /// Transport token of the new peer
        token: PeerToken,
        /// Its participant id
        id: ParticipantId,
    },

    /// Negotiation payload from a peer
    Signal {
        /// Negotiation payload
        data: serde_json::Value,
        /// Sender transport token
        from: PeerToken,
    },

    /// Bind one token to a participant id
    SetId {
        /// Transport token
        token: PeerToken,
        /// Participant id
        id: ParticipantId,
    },

    /// Atomically replace the whole token -> participant mapping
    SetIds {
        /// Full replacement mapping
        ids: HashMap<PeerToken, ParticipantId>,
    },

    /// Relayed session snapshot (relay-projection mode only)
    Gamestate {
        /// Full snapshot
        state: GameSnapshot,
    },

    /// No host is available to relay snapshots
    NoGamestate,

    /// The relay asks this client to start publishing snapshots
    ShareGamestate,

    /// Relay link established (synthetic, not on the wire)
    #[serde(skip)]
    Connected,

    /// Relay link lost (synthetic, not on the wire)
    #[serde(skip)]
    Disconnected,
}

impl SignalingCommand {
    /// Convert command to JSON string
    pub fn to_json(&self) -> crate::Result<String> {
        serde_json::to_string(self).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to serialize command: {}", e))
        })
    }
}

impl SignalingEvent {
    /// Parse event from JSON string
    pub fn from_json(json: &str) -> crate::Result<Self> {
        serde_json::from_str(json).map_err(|e| {
            crate::Error::SerializationError(format!("Failed to deserialize event: {}", e))
        })
    }
}
