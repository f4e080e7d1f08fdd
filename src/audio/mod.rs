//! Audio pipeline
//!
//! Stream contracts, per-peer routes, the spatial mix policy and voice
//! activity detection.

pub mod policy;
pub mod route;
pub mod stream;
pub mod vad;

pub use policy::{compute_mix, MixDecision, PAN_DEPTH, UNKNOWN_OFFSET};
pub use route::{AudioRoute, RouteControls};
pub use stream::{AudioFrame, ChannelAudioSource, LocalAudioSource, LocalStream, RemoteStream};
pub use vad::{VoiceActivityDetector, VoiceEvent, VoiceSource};
