//! Peer-to-peer lobby voice mesh
//!
//! Connects every participant of a small game session directly to every
//! other participant and shapes each incoming voice stream by the shared
//! game state: positional panning and distance attenuation during free
//! roam, centered full-volume audio during discussions, and strict
//! audibility rules between the living and the dead.
//!
//! # Architecture
//!
//! - [`signaling`]: WebSocket relay bridge and the tagged-JSON protocol
//! - [`peer`]: per-peer negotiation links behind the [`peer::Negotiator`] seam
//! - [`audio`]: stream contracts, per-peer routes, mix policy and VAD
//! - [`mesh`]: the connection table, identity map and session lifecycle
//! - [`projector`]: derived per-participant display state
//! - [`client`]: the event loop tying everything together
//!
//! # Example
//!
//! ```no_run
//! use proximity_voice::audio::ChannelAudioSource;
//! use proximity_voice::client::VoiceClient;
//! use proximity_voice::config::VoiceConfig;
//! use proximity_voice::peer::PeerConnectionFactory;
//!
//! # async fn run() -> proximity_voice::Result<()> {
//! let config = VoiceConfig::default();
//! let negotiator = PeerConnectionFactory::new(config.stun_servers.clone());
//! let (source, _frames, _mic) = ChannelAudioSource::new();
//!
//! let (client, handle) = VoiceClient::new(config, Box::new(negotiator), Box::new(source))?;
//! tokio::spawn(client.run());
//! handle.set_deafened(false);
//! # Ok(())
//! # }
//! ```

pub mod audio;
pub mod client;
pub mod config;
pub mod error;
pub mod game;
pub mod identity;
pub mod mesh;
pub mod peer;
pub mod projector;
pub mod signaling;

pub use client::{ClientControl, VoiceClient, VoiceClientHandle};
pub use config::{VadConfig, VoiceConfig};
pub use error::{Error, Result};
pub use game::{GamePhase, GameSnapshot, ParticipantId, PlayerState};
pub use identity::{ParticipantIdentityMap, PeerToken};
pub use mesh::{PeerMeshManager, SessionHandle};
pub use projector::{ParticipantView, SessionStateProjector, SessionView};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
