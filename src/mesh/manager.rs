//! Peer mesh management
//!
//! Owns every per-peer connection and audio route, the token/participant
//! identity map and the session membership lifecycle. The manager is
//! synchronous and single-owner: one event loop feeds it signaling events,
//! negotiation events and game snapshots, so no per-peer locking exists
//! anywhere in the mesh.

use crate::audio::policy::compute_mix;
use crate::audio::route::{AudioRoute, RouteControls};
use crate::audio::stream::AudioFrame;
use crate::audio::vad::{VoiceActivityDetector, VoiceEvent};
use crate::config::{VadConfig, VoiceConfig};
use crate::game::{GameSnapshot, ParticipantId};
use crate::identity::{ParticipantIdentityMap, PeerToken};
use crate::peer::link::{LinkState, NegotiationEvent, NegotiationSink, Negotiator, PeerLink};
use crate::signaling::protocol::{SignalingCommand, SignalingEvent};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Everything owned for one remote peer
struct PeerEntry {
    link: Box<dyn PeerLink>,
    route: Option<AudioRoute>,
}

/// The session this mesh currently belongs to
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionHandle {
    /// Session code announced to the relay
    pub code: String,
    /// Local participant id
    pub local_id: ParticipantId,
}

/// Owner of the peer-to-peer voice mesh
pub struct PeerMeshManager {
    negotiator: Box<dyn Negotiator>,
    commands: mpsc::UnboundedSender<SignalingCommand>,
    negotiation_tx: NegotiationSink,
    mix_out: mpsc::UnboundedSender<AudioFrame>,
    voice_events: mpsc::UnboundedSender<VoiceEvent>,
    vad: VadConfig,
    spatial_enabled: bool,
    audible_radius: f32,
    peers: HashMap<PeerToken, PeerEntry>,
    identities: ParticipantIdentityMap,
    session: Option<SessionHandle>,
    last_snapshot: Option<GameSnapshot>,
    deafened: bool,
}

impl PeerMeshManager {
    /// Create an empty mesh.
    ///
    /// `commands` carries outbound relay messages, `negotiation_tx` is
    /// handed to every opened link and must be drained back into
    /// [`handle_negotiation`](Self::handle_negotiation), `mix_out` receives
    /// every route's processed audio and `voice_events` the speaking
    /// transitions.
    pub fn new(
        config: &VoiceConfig,
        negotiator: Box<dyn Negotiator>,
        commands: mpsc::UnboundedSender<SignalingCommand>,
        negotiation_tx: NegotiationSink,
        mix_out: mpsc::UnboundedSender<AudioFrame>,
        voice_events: mpsc::UnboundedSender<VoiceEvent>,
    ) -> Self {
        Self {
            negotiator,
            commands,
            negotiation_tx,
            mix_out,
            voice_events,
            vad: config.vad.clone(),
            spatial_enabled: config.enable_spatial_audio,
            audible_radius: config.audible_radius,
            peers: HashMap::new(),
            identities: ParticipantIdentityMap::new(),
            session: None,
            last_snapshot: None,
            deafened: false,
        }
    }

    /// Join a session, tearing down any existing mesh first.
    ///
    /// Safe to call repeatedly with the same session; every call produces a
    /// fresh mesh, which is also how phase-boundary reconnects work.
    pub fn connect(&mut self, code: &str, local_id: ParticipantId) {
        info!("Joining session {} as participant {}", code, local_id);

        self.close_all_peers();
        self.session = Some(SessionHandle {
            code: code.to_string(),
            local_id,
        });

        self.send_command(SignalingCommand::Join {
            code: code.to_string(),
            id: local_id,
        });
    }

    /// Leave the current session and tear the mesh down
    pub fn disconnect(&mut self) {
        if self.session.take().is_some() {
            info!("Leaving session");
            self.send_command(SignalingCommand::Leave);
        }
        self.close_all_peers();
    }

    /// The session this mesh belongs to, if any
    pub fn session(&self) -> Option<&SessionHandle> {
        self.session.as_ref()
    }

    /// Current token/participant bindings
    pub fn identities(&self) -> &ParticipantIdentityMap {
        &self.identities
    }

    /// Number of live peer entries
    pub fn peer_count(&self) -> usize {
        self.peers.len()
    }

    /// Lifecycle state of one peer's link
    pub fn peer_state(&self, token: &str) -> Option<LinkState> {
        self.peers.get(token).map(|entry| entry.link.state())
    }

    /// Shared gain/pan controls of one peer's audio route, once streaming
    pub fn route_controls(&self, token: &str) -> Option<Arc<RouteControls>> {
        self.peers
            .get(token)?
            .route
            .as_ref()
            .map(|route| route.controls())
    }

    /// Feed one relay event into the mesh.
    ///
    /// Peer-scoped failures leave the offending entry in place in its
    /// failed state and the rest of the mesh running; they are not
    /// surfaced to the caller.
    pub fn handle_signaling(&mut self, event: SignalingEvent) {
        match event {
            SignalingEvent::Join { token, id } => self.handle_peer_joined(token, id),
            SignalingEvent::Signal { data, from } => self.handle_peer_signal(from, data),
            SignalingEvent::SetId { token, id } => self.identities.bind(token, id),
            SignalingEvent::SetIds { ids } => self.identities.replace_all(ids),
            SignalingEvent::Disconnected => {
                info!("Relay link lost, tearing down mesh");
                self.close_all_peers();
                self.identities.clear();
            }
            other => {
                debug!("Ignoring non-mesh signaling event: {:?}", other);
            }
        }
    }

    /// Feed one link event back into the mesh
    pub fn handle_negotiation(&mut self, token: PeerToken, event: NegotiationEvent) {
        match event {
            NegotiationEvent::Signal(data) => {
                self.send_command(SignalingCommand::Signal { data, to: token });
            }
            NegotiationEvent::Stream(remote) => {
                let Some(entry) = self.peers.get_mut(&token) else {
                    debug!("Stream for unknown peer {}, dropping", token);
                    return;
                };

                info!("Remote stream up for {}", token);
                let route = AudioRoute::spawn(
                    token.clone(),
                    remote,
                    self.mix_out.clone(),
                    VoiceActivityDetector::new(&self.vad),
                    self.voice_events.clone(),
                );
                if self.deafened {
                    route.controls().set_gain(0.0);
                }
                entry.route = Some(route);

                // Position the new route from the latest known state.
                if let Some(snapshot) = self.last_snapshot.clone() {
                    self.apply_snapshot(snapshot);
                }
            }
            NegotiationEvent::Error(message) => {
                warn!("Negotiation failed for {}: {}", token, message);
                self.fail_peer(&token);
            }
        }
    }

    /// A remote peer announced itself; this side initiates the connection.
    fn handle_peer_joined(&mut self, token: PeerToken, id: ParticipantId) {
        self.identities.bind(token.clone(), id);

        // At most one connection per peer: a stale entry (from a peer that
        // rejoined before its old link died) is closed before replacement.
        if let Some(mut stale) = self.peers.remove(&token) {
            warn!("Replacing existing connection for {}", token);
            stale.link.close();
        }

        match self
            .negotiator
            .open(&token, true, self.negotiation_tx.clone())
        {
            Ok(link) => {
                debug!("Opened initiator link to {}", token);
                self.peers.insert(token, PeerEntry { link, route: None });
            }
            Err(e) => warn!("Failed to open link to {}: {}", token, e),
        }
    }

    /// An inbound negotiation payload; creates the non-initiator side on
    /// first contact, so signal-before-join ordering is handled.
    fn handle_peer_signal(&mut self, from: PeerToken, data: serde_json::Value) {
        if !self.peers.contains_key(&from) {
            match self
                .negotiator
                .open(&from, false, self.negotiation_tx.clone())
            {
                Ok(link) => {
                    debug!("Opened answering link to {}", from);
                    self.peers
                        .insert(from.clone(), PeerEntry { link, route: None });
                }
                Err(e) => {
                    warn!("Failed to open link to {}: {}", from, e);
                    return;
                }
            }
        }

        // contains_key checked above; the entry exists
        let Some(entry) = self.peers.get_mut(&from) else {
            return;
        };
        if let Err(e) = entry.link.apply_signal(data) {
            warn!("Signal from {} rejected: {}", from, e);
            self.fail_peer(&from);
        }
    }

    /// Apply the audio policy to every routed peer for a new snapshot
    pub fn apply_snapshot(&mut self, snapshot: GameSnapshot) {
        let Some(local) = snapshot.local_player().cloned() else {
            debug!("Snapshot without local participant, skipping policy");
            self.last_snapshot = Some(snapshot);
            return;
        };

        for remote in snapshot.remote_players() {
            let Some(token) = self.identities.token_for(remote.id) else {
                continue;
            };
            let Some(controls) = self
                .peers
                .get(token)
                .and_then(|entry| entry.route.as_ref())
                .map(|route| route.controls())
            else {
                continue;
            };

            let mix = compute_mix(
                snapshot.phase,
                self.spatial_enabled,
                &local,
                remote,
                self.audible_radius,
            );

            controls.set_gain(if self.deafened { 0.0 } else { mix.gain });
            if let Some(pan) = mix.pan {
                controls.set_pan(pan);
            }
        }

        self.last_snapshot = Some(snapshot);
    }

    /// Silence every route without touching policy state; clearing the
    /// flag re-derives gains from the last snapshot.
    pub fn set_deafened(&mut self, deafened: bool) {
        if self.deafened == deafened {
            return;
        }
        self.deafened = deafened;
        info!("Deafened: {}", deafened);

        if deafened {
            for entry in self.peers.values() {
                if let Some(route) = &entry.route {
                    route.controls().set_gain(0.0);
                }
            }
        } else if let Some(snapshot) = self.last_snapshot.clone() {
            self.apply_snapshot(snapshot);
        }
    }

    /// Whether playback is currently deafened
    pub fn is_deafened(&self) -> bool {
        self.deafened
    }

    /// Mark a peer failed: close its link and drop its route, but keep the
    /// table entry. A later inbound payload for the token is rejected by
    /// the closed link instead of quietly creating a fresh connection; the
    /// entry is only replaced by an explicit `join` for the same token.
    fn fail_peer(&mut self, token: &str) {
        if let Some(entry) = self.peers.get_mut(token) {
            entry.link.close();
            entry.route = None;
        }
    }

    fn close_all_peers(&mut self) {
        if self.peers.is_empty() {
            return;
        }
        info!("Tearing down {} peer(s)", self.peers.len());
        for (_, mut entry) in self.peers.drain() {
            entry.link.close();
        }
    }

    fn send_command(&self, command: SignalingCommand) {
        // The relay bridge may already be gone during shutdown.
        let _ = self.commands.send(command);
    }
}

impl Drop for PeerMeshManager {
    fn drop(&mut self) {
        self.close_all_peers();
    }
}
