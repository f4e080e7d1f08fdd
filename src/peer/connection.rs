//! Peer connection state machine
//!
//! Explicit per-peer state (Created -> Negotiating -> Streaming -> Closed)
//! driven by discrete inbound events, replacing nested negotiation
//! callbacks and making teardown auditable.

use super::link::{LinkState, NegotiationEvent, NegotiationSink, Negotiator, PeerLink};
use crate::audio::stream::{AudioFrame, RemoteStream};
use crate::identity::PeerToken;
use crate::{Error, Result};
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Default peer connection implementation
///
/// Performs the offer/answer handshake with opaque JSON payloads and hands
/// out a remote stream once the exchange completes. Decoded remote audio is
/// injected through [`PeerConnection::remote_frame_sender`] by whatever
/// media layer sits behind the negotiated transport.
pub struct PeerConnection {
    /// Remote peer's transport token
    token: PeerToken,

    /// Unique identifier for this connection instance
    connection_id: String,

    /// Whether this side initiates the handshake
    initiator: bool,

    /// Current lifecycle state
    state: LinkState,

    /// Local session description, once produced
    local_description: Option<String>,

    /// Remote session description, once applied
    remote_description: Option<String>,

    /// Accumulated transport candidates
    candidates: Vec<serde_json::Value>,

    /// Event sink toward the mesh
    events: NegotiationSink,

    /// Feed for decoded remote audio, live while Streaming
    remote_tx: Option<mpsc::UnboundedSender<AudioFrame>>,
}

impl PeerConnection {
    /// Create a new peer connection
    pub fn new(token: PeerToken, initiator: bool, events: NegotiationSink) -> Self {
        let connection_id = uuid::Uuid::new_v4().to_string();

        info!(
            "Creating peer connection: token={}, connection_id={}, initiator={}",
            token, connection_id, initiator
        );

        Self {
            token,
            connection_id,
            initiator,
            state: LinkState::Created,
            local_description: None,
            remote_description: None,
            candidates: Vec::new(),
            events,
            remote_tx: None,
        }
    }

    /// The remote peer's transport token
    pub fn token(&self) -> &str {
        &self.token
    }

    /// This connection instance's id
    pub fn connection_id(&self) -> &str {
        &self.connection_id
    }

    /// Number of accumulated transport candidates
    pub fn candidate_count(&self) -> usize {
        self.candidates.len()
    }

    /// Sender for decoded remote audio, available once streaming
    pub fn remote_frame_sender(&self) -> Option<mpsc::UnboundedSender<AudioFrame>> {
        self.remote_tx.clone()
    }

    fn set_state(&mut self, new_state: LinkState) {
        if self.state != new_state {
            debug!(
                "Peer {} state transition: {:?} -> {:?}",
                self.token, self.state, new_state
            );
            self.state = new_state;
        }
    }

    /// Produce the initial offer. Called once for initiator connections.
    pub(crate) fn start_offer(&mut self) {
        let sdp = format!("v=0 o=- {} offer", self.connection_id);
        self.local_description = Some(sdp.clone());
        self.set_state(LinkState::Negotiating);

        self.emit(NegotiationEvent::Signal(serde_json::json!({
            "kind": "offer",
            "sdp": sdp,
        })));
    }

    fn answer_offer(&mut self, offer_sdp: String) {
        self.remote_description = Some(offer_sdp);
        self.set_state(LinkState::Negotiating);

        let sdp = format!("v=0 o=- {} answer", self.connection_id);
        self.local_description = Some(sdp.clone());

        self.emit(NegotiationEvent::Signal(serde_json::json!({
            "kind": "answer",
            "sdp": sdp,
        })));

        // Handshake complete from the answerer's perspective.
        self.begin_streaming();
    }

    fn accept_answer(&mut self, answer_sdp: String) {
        self.remote_description = Some(answer_sdp);
        self.begin_streaming();
    }

    fn begin_streaming(&mut self) {
        let (tx, rx) = mpsc::unbounded_channel();
        self.remote_tx = Some(tx);
        self.set_state(LinkState::Streaming);
        self.emit(NegotiationEvent::Stream(RemoteStream { frames: rx }));
    }

    fn emit(&self, event: NegotiationEvent) {
        // The receiving loop may already be gone during teardown.
        let _ = self.events.send((self.token.clone(), event));
    }
}

impl PeerLink for PeerConnection {
    fn apply_signal(&mut self, data: serde_json::Value) -> Result<()> {
        if self.state == LinkState::Closed {
            return Err(Error::PeerConnectionError(format!(
                "Peer {} is closed",
                self.token
            )));
        }

        let kind = data
            .get("kind")
            .and_then(|k| k.as_str())
            .ok_or_else(|| Error::InvalidData("Signal payload without kind".to_string()))?;

        match kind {
            "offer" if !self.initiator => {
                let sdp = data
                    .get("sdp")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| Error::InvalidData("Offer without sdp".to_string()))?;
                debug!("Peer {} answering offer", self.token);
                self.answer_offer(sdp.to_string());
                Ok(())
            }
            "answer" if self.initiator => {
                let sdp = data
                    .get("sdp")
                    .and_then(|s| s.as_str())
                    .ok_or_else(|| Error::InvalidData("Answer without sdp".to_string()))?;
                debug!("Peer {} accepting answer", self.token);
                self.accept_answer(sdp.to_string());
                Ok(())
            }
            "candidate" => {
                debug!("Peer {} adding candidate", self.token);
                self.candidates.push(data);
                Ok(())
            }
            other => Err(Error::PeerConnectionError(format!(
                "Unexpected {} payload for peer {} (initiator={})",
                other, self.token, self.initiator
            ))),
        }
    }

    fn state(&self) -> LinkState {
        self.state
    }

    fn close(&mut self) {
        if self.state != LinkState::Closed {
            info!("Closing peer connection for {}", self.token);
            self.remote_tx = None;
            self.set_state(LinkState::Closed);
        }
    }
}

/// [`Negotiator`] producing [`PeerConnection`] links
pub struct PeerConnectionFactory {
    stun_servers: Vec<String>,
}

impl PeerConnectionFactory {
    /// Create a factory using the given STUN servers for NAT traversal
    pub fn new(stun_servers: Vec<String>) -> Self {
        Self { stun_servers }
    }
}

impl Negotiator for PeerConnectionFactory {
    fn open(
        &self,
        token: &PeerToken,
        initiator: bool,
        events: NegotiationSink,
    ) -> Result<Box<dyn PeerLink>> {
        debug!(
            "Opening link to {} via {} STUN server(s)",
            token,
            self.stun_servers.len()
        );

        let mut connection = PeerConnection::new(token.clone(), initiator, events);
        if initiator {
            connection.start_offer();
        }

        Ok(Box::new(connection))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (
        NegotiationSink,
        mpsc::UnboundedReceiver<(PeerToken, NegotiationEvent)>,
    ) {
        mpsc::unbounded_channel()
    }

    #[test]
    fn test_initiator_emits_offer_on_open() {
        let (tx, mut rx) = sink();
        let factory = PeerConnectionFactory::new(vec!["stun:stun.example.com".to_string()]);

        let link = factory.open(&"tok-1".to_string(), true, tx).unwrap();
        assert_eq!(link.state(), LinkState::Negotiating);

        let (token, event) = rx.try_recv().unwrap();
        assert_eq!(token, "tok-1");
        match event {
            NegotiationEvent::Signal(data) => assert_eq!(data["kind"], "offer"),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_non_initiator_waits_for_offer() {
        let (tx, mut rx) = sink();
        let factory = PeerConnectionFactory::new(vec!["stun:stun.example.com".to_string()]);

        let link = factory.open(&"tok-1".to_string(), false, tx).unwrap();
        assert_eq!(link.state(), LinkState::Created);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_non_initiator_answers_offer_and_streams() {
        let (tx, mut rx) = sink();
        let mut conn = PeerConnection::new("tok-1".to_string(), false, tx);

        conn.apply_signal(serde_json::json!({"kind": "offer", "sdp": "v=0 remote"}))
            .unwrap();

        assert_eq!(conn.state(), LinkState::Streaming);
        assert!(conn.remote_frame_sender().is_some());

        let (_, first) = rx.try_recv().unwrap();
        assert!(matches!(first, NegotiationEvent::Signal(ref d) if d["kind"] == "answer"));
        let (_, second) = rx.try_recv().unwrap();
        assert!(matches!(second, NegotiationEvent::Stream(_)));
    }

    #[test]
    fn test_initiator_streams_after_answer() {
        let (tx, mut rx) = sink();
        let mut conn = PeerConnection::new("tok-1".to_string(), true, tx);
        conn.start_offer();
        let _ = rx.try_recv(); // offer

        conn.apply_signal(serde_json::json!({"kind": "answer", "sdp": "v=0 remote"}))
            .unwrap();

        assert_eq!(conn.state(), LinkState::Streaming);
        let (_, event) = rx.try_recv().unwrap();
        assert!(matches!(event, NegotiationEvent::Stream(_)));
    }

    #[test]
    fn test_candidates_accumulate() {
        let (tx, _rx) = sink();
        let mut conn = PeerConnection::new("tok-1".to_string(), true, tx);

        conn.apply_signal(serde_json::json!({"kind": "candidate", "candidate": "a"}))
            .unwrap();
        conn.apply_signal(serde_json::json!({"kind": "candidate", "candidate": "b"}))
            .unwrap();

        assert_eq!(conn.candidate_count(), 2);
    }

    #[test]
    fn test_unexpected_payload_is_error() {
        let (tx, _rx) = sink();
        let mut conn = PeerConnection::new("tok-1".to_string(), true, tx);

        // An initiator must not receive an offer.
        let err = conn
            .apply_signal(serde_json::json!({"kind": "offer", "sdp": "v=0"}))
            .unwrap_err();
        assert!(err.is_peer_error());

        let err = conn.apply_signal(serde_json::json!({"sdp": "v=0"})).unwrap_err();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_close_is_idempotent_and_final() {
        let (tx, _rx) = sink();
        let mut conn = PeerConnection::new("tok-1".to_string(), false, tx);

        conn.close();
        conn.close();
        assert_eq!(conn.state(), LinkState::Closed);

        let err = conn
            .apply_signal(serde_json::json!({"kind": "offer", "sdp": "v=0"}))
            .unwrap_err();
        assert!(err.is_peer_error());
    }
}
