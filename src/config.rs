//! Configuration types for the voice client

use serde::{Deserialize, Serialize};

/// Main configuration for the voice client
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    /// WebSocket relay server URL (ws:// or wss://)
    pub relay_url: String,

    /// STUN server URLs handed to the peer negotiation layer
    pub stun_servers: Vec<String>,

    /// Apply positional offsets in the pre-game lobby (default: true).
    /// Discussion audio is always centered regardless of this flag.
    pub enable_spatial_audio: bool,

    /// Hold-to-speak instead of open mic (default: false)
    pub push_to_talk: bool,

    /// Replace the session code with a placeholder in the displayed label
    pub hide_session_code: bool,

    /// Consume game snapshots relayed over signaling instead of a local
    /// game reader. Requires a host client in the same session.
    pub relay_projection: bool,

    /// Participant id to assume in relay-projection mode (no local game
    /// reader means snapshots cannot tell us which participant we are)
    pub relay_participant_id: Option<u32>,

    /// Planar distance beyond which a remote participant is inaudible
    pub audible_radius: f32,

    /// Voice activity detection tuning
    pub vad: VadConfig,
}

/// Voice activity detection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VadConfig {
    /// RMS energy level above which a stream counts as speech
    pub open_threshold: f32,

    /// Milliseconds of sub-threshold audio before a stop event fires
    pub hang_ms: u32,

    /// Sample rate of the audio fed to the detector, in Hz
    pub sample_rate: u32,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            relay_url: "wss://relay.example.com".to_string(),
            stun_servers: vec!["stun:stun.l.google.com:19302".to_string()],
            enable_spatial_audio: true,
            push_to_talk: false,
            hide_session_code: false,
            relay_projection: false,
            relay_participant_id: None,
            audible_radius: 7.0,
            vad: VadConfig::default(),
        }
    }
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            open_threshold: 0.015,
            hang_ms: 400,
            sample_rate: 48000,
        }
    }
}

impl VoiceConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `relay_url` is not a valid WebSocket URL
    /// - `stun_servers` is empty
    /// - `audible_radius` is not a positive finite number
    /// - `relay_projection` is set without `relay_participant_id`
    /// - VAD parameters are out of range
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !self.relay_url.starts_with("ws://") && !self.relay_url.starts_with("wss://") {
            return Err(Error::InvalidConfig(format!(
                "relay_url must start with ws:// or wss://, got {}",
                self.relay_url
            )));
        }

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        if !self.audible_radius.is_finite() || self.audible_radius <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "audible_radius must be a positive number, got {}",
                self.audible_radius
            )));
        }

        if self.relay_projection && self.relay_participant_id.is_none() {
            return Err(Error::InvalidConfig(
                "relay_projection requires relay_participant_id".to_string(),
            ));
        }

        self.vad.validate()
    }
}

impl VadConfig {
    /// Validate VAD parameters
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if !(0.0..=1.0).contains(&self.open_threshold) {
            return Err(Error::InvalidConfig(format!(
                "vad.open_threshold must be in range 0.0-1.0, got {}",
                self.open_threshold
            )));
        }

        if self.sample_rate == 0 {
            return Err(Error::InvalidConfig(
                "vad.sample_rate must be non-zero".to_string(),
            ));
        }

        Ok(())
    }
}
