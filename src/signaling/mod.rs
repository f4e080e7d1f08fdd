//! Signaling protocol and relay client

pub mod client;
pub mod protocol;

pub use client::SignalingClient;
pub use protocol::{SignalingCommand, SignalingEvent};
