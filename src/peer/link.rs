//! Peer negotiation seam
//!
//! The underlying connection primitive is an external collaborator: given
//! an initiator flag it produces outgoing signal payloads and, eventually,
//! a remote stream or an error. The mesh only ever talks to these traits,
//! so the concrete negotiation stack is swappable (and scriptable in tests).

use crate::audio::stream::RemoteStream;
use crate::identity::PeerToken;
use crate::Result;
use tokio::sync::mpsc;

/// Lifecycle state of one peer link
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    /// Connection object exists, no negotiation traffic yet
    Created,
    /// Offer/answer exchange in progress
    Negotiating,
    /// Remote media has arrived
    Streaming,
    /// Torn down
    Closed,
}

/// Asynchronous output of one peer link
pub enum NegotiationEvent {
    /// Outbound negotiation payload to be relayed to the peer
    Signal(serde_json::Value),
    /// Remote media stream became available
    Stream(RemoteStream),
    /// Negotiation failed; the link stays in its failed state
    Error(String),
}

impl std::fmt::Debug for NegotiationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NegotiationEvent::Signal(data) => f.debug_tuple("Signal").field(data).finish(),
            NegotiationEvent::Stream(_) => f.write_str("Stream(..)"),
            NegotiationEvent::Error(msg) => f.debug_tuple("Error").field(msg).finish(),
        }
    }
}

/// Sink for negotiation events, tagged with the owning peer's token
pub type NegotiationSink = mpsc::UnboundedSender<(PeerToken, NegotiationEvent)>;

/// One live peer connection
pub trait PeerLink: Send {
    /// Feed an inbound negotiation payload into the connection
    fn apply_signal(&mut self, data: serde_json::Value) -> Result<()>;

    /// Current lifecycle state
    fn state(&self) -> LinkState;

    /// Tear the connection down. Idempotent.
    fn close(&mut self);
}

/// Factory for peer links
pub trait Negotiator: Send + Sync {
    /// Open a connection toward `token`.
    ///
    /// Initiators start producing signal payloads immediately;
    /// non-initiators wait for the first inbound payload.
    fn open(
        &self,
        token: &PeerToken,
        initiator: bool,
        events: NegotiationSink,
    ) -> Result<Box<dyn PeerLink>>;
}
