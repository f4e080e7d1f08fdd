//! Peer connection management
//!
//! Handles the per-peer negotiation lifecycle behind a trait seam.

pub mod connection;
pub mod link;

pub use connection::{PeerConnection, PeerConnectionFactory};
pub use link::{LinkState, NegotiationEvent, NegotiationSink, Negotiator, PeerLink};
