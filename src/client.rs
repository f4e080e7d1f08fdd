//! Voice client event loop
//!
//! Single task that owns the mesh, the projector and the relay bridge.
//! Every input (relay events, link events, voice transitions, game
//! snapshots, embedder controls) arrives over a channel and is applied in
//! arrival order, which is the only ordering guarantee the mesh needs.

use crate::audio::stream::{AudioFrame, LocalAudioSource, LocalStream};
use crate::audio::vad::{VoiceActivityDetector, VoiceEvent, VoiceSource};
use crate::config::VoiceConfig;
use crate::game::{GamePhase, GameSnapshot, ParticipantId};
use crate::mesh::PeerMeshManager;
use crate::peer::link::{NegotiationEvent, Negotiator};
use crate::projector::{SessionStateProjector, SessionView};
use crate::signaling::client::SignalingClient;
use crate::signaling::protocol::{SignalingCommand, SignalingEvent};
use crate::identity::PeerToken;
use crate::Result;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

const RECONNECT_DELAY: Duration = Duration::from_secs(3);

/// Embedder-issued control messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientControl {
    /// Enable or disable the local capture track (mute, push-to-talk)
    SetMicEnabled(bool),
    /// Silence or restore all remote playback
    SetDeafened(bool),
    /// Leave the session and stop the client
    Shutdown,
}

/// Handle held by the embedder while [`VoiceClient::run`] is live
pub struct VoiceClientHandle {
    controls: mpsc::UnboundedSender<ClientControl>,
    views: watch::Receiver<SessionView>,
    snapshots: mpsc::UnboundedSender<GameSnapshot>,
    /// Mixed stereo playback frames from every remote route
    pub mix: mpsc::UnboundedReceiver<AudioFrame>,
}

impl VoiceClientHandle {
    /// Enable or disable the local capture track
    pub fn set_mic_enabled(&self, enabled: bool) {
        let _ = self.controls.send(ClientControl::SetMicEnabled(enabled));
    }

    /// Silence or restore all remote playback
    pub fn set_deafened(&self, deafened: bool) {
        let _ = self.controls.send(ClientControl::SetDeafened(deafened));
    }

    /// Leave the session and stop the client
    pub fn shutdown(&self) {
        let _ = self.controls.send(ClientControl::Shutdown);
    }

    /// Watch the derived session view
    pub fn views(&self) -> watch::Receiver<SessionView> {
        self.views.clone()
    }

    /// Feed a game snapshot from a local game reader
    pub fn publish_snapshot(&self, snapshot: GameSnapshot) {
        let _ = self.snapshots.send(snapshot);
    }
}

/// The assembled voice client
pub struct VoiceClient {
    config: VoiceConfig,
    signaling: SignalingClient,
    mesh: PeerMeshManager,
    projector: SessionStateProjector,
    audio_source: Box<dyn LocalAudioSource>,
    events_tx: mpsc::UnboundedSender<SignalingEvent>,
    voice_tx: mpsc::UnboundedSender<VoiceEvent>,
    view_tx: watch::Sender<SessionView>,
    signaling_rx: mpsc::UnboundedReceiver<SignalingEvent>,
    command_rx: mpsc::UnboundedReceiver<SignalingCommand>,
    negotiation_rx: mpsc::UnboundedReceiver<(PeerToken, NegotiationEvent)>,
    voice_rx: mpsc::UnboundedReceiver<VoiceEvent>,
    snapshot_rx: mpsc::UnboundedReceiver<GameSnapshot>,
    control_rx: mpsc::UnboundedReceiver<ClientControl>,
}

impl VoiceClient {
    /// Assemble a client from its collaborators.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(
        config: VoiceConfig,
        negotiator: Box<dyn Negotiator>,
        audio_source: Box<dyn LocalAudioSource>,
    ) -> Result<(Self, VoiceClientHandle)> {
        config.validate()?;

        let (events_tx, signaling_rx) = mpsc::unbounded_channel();
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (negotiation_tx, negotiation_rx) = mpsc::unbounded_channel();
        let (mix_tx, mix_rx) = mpsc::unbounded_channel();
        let (voice_tx, voice_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (view_tx, view_rx) = watch::channel(SessionView {
            phase: None,
            session_label: None,
            local_talking: false,
            deafened: false,
            relay_connected: false,
            participants: Vec::new(),
        });

        let signaling = SignalingClient::new(&config.relay_url);
        let mesh = PeerMeshManager::new(
            &config,
            negotiator,
            command_tx,
            negotiation_tx,
            mix_tx,
            voice_tx.clone(),
        );
        let projector =
            SessionStateProjector::new(config.hide_session_code, config.relay_projection);

        let client = Self {
            config,
            signaling,
            mesh,
            projector,
            audio_source,
            events_tx,
            voice_tx,
            view_tx,
            signaling_rx,
            command_rx,
            negotiation_rx,
            voice_rx,
            snapshot_rx,
            control_rx,
        };

        let handle = VoiceClientHandle {
            controls: control_tx,
            views: view_rx,
            snapshots: snapshot_tx,
            mix: mix_rx,
        };

        Ok((client, handle))
    }

    /// Run the client until shutdown.
    ///
    /// Acquires the local capture stream (fatal if unavailable), connects
    /// to the relay and then serves the event loop. The relay link is
    /// re-established with a fixed delay whenever it drops; embedder
    /// controls and snapshots keep being served between attempts.
    pub async fn run(self) -> Result<()> {
        let Self {
            config,
            mut signaling,
            mut mesh,
            mut projector,
            audio_source,
            events_tx,
            voice_tx,
            view_tx,
            mut signaling_rx,
            mut command_rx,
            mut negotiation_rx,
            mut voice_rx,
            mut snapshot_rx,
            mut control_rx,
        } = self;

        let local = audio_source.acquire().await?;
        let mic_enabled = local.enabled.clone();
        mic_enabled.store(!config.push_to_talk, Ordering::Relaxed);
        spawn_local_vad(local, VoiceActivityDetector::new(&config.vad), voice_tx);

        let mut announced_id: Option<ParticipantId> = None;
        let mut share_snapshots = false;

        let connected = connect_with_retry(
            &mut signaling,
            &events_tx,
            &mut control_rx,
            &mut snapshot_rx,
            &config,
            &mut mesh,
            &mut projector,
            &view_tx,
            &mut announced_id,
            share_snapshots,
            &mic_enabled,
        )
        .await;
        if connected == RetryOutcome::Shutdown {
            return Ok(());
        }

        loop {
            tokio::select! {
                Some(event) = signaling_rx.recv() => {
                    match event {
                        SignalingEvent::Connected => {
                            projector.set_relay_connected(true);
                            let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
                            if config.relay_projection {
                                send(&signaling, SignalingCommand::Sidecar);
                            }
                            if let Some(id) = announced_id {
                                send(&signaling, SignalingCommand::AnnounceId { id });
                            }
                            // Rejoin the session the mesh last belonged to.
                            if let Some(session) = mesh.session().cloned() {
                                mesh.connect(&session.code, session.local_id);
                            }
                        }
                        SignalingEvent::Disconnected => {
                            mesh.handle_signaling(SignalingEvent::Disconnected);
                            projector.reset_voice();
                            projector.set_relay_connected(false);
                            let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));

                            let connected = connect_with_retry(
                                &mut signaling,
                                &events_tx,
                                &mut control_rx,
                                &mut snapshot_rx,
                                &config,
                                &mut mesh,
                                &mut projector,
                                &view_tx,
                                &mut announced_id,
                                share_snapshots,
                                &mic_enabled,
                            )
                            .await;
                            if connected == RetryOutcome::Shutdown {
                                return Ok(());
                            }
                        }
                        SignalingEvent::Gamestate { state } => {
                            if config.relay_projection {
                                if let Some(id) = config.relay_participant_id {
                                    let mut snapshot = state;
                                    snapshot.assume_local(id);
                                    handle_snapshot(
                                        snapshot,
                                        true,
                                        &config,
                                        &signaling,
                                        &mut mesh,
                                        &mut projector,
                                        &view_tx,
                                        &mut announced_id,
                                        share_snapshots,
                                    );
                                }
                            } else {
                                debug!("Ignoring relayed snapshot outside relay projection");
                            }
                        }
                        SignalingEvent::NoGamestate => {
                            warn!("No host is publishing snapshots for this session");
                        }
                        SignalingEvent::ShareGamestate => {
                            info!("Relay requested snapshot sharing");
                            share_snapshots = true;
                        }
                        other => {
                            mesh.handle_signaling(other);
                            let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
                        }
                    }
                }
                Some(command) = command_rx.recv() => {
                    send(&signaling, command);
                }
                Some((token, event)) = negotiation_rx.recv() => {
                    mesh.handle_negotiation(token, event);
                }
                Some(event) = voice_rx.recv() => {
                    projector.apply_voice(&event, mesh.identities());
                    let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
                }
                Some(snapshot) = snapshot_rx.recv() => {
                    handle_snapshot(
                        snapshot,
                        false,
                        &config,
                        &signaling,
                        &mut mesh,
                        &mut projector,
                        &view_tx,
                        &mut announced_id,
                        share_snapshots,
                    );
                }
                Some(control) = control_rx.recv() => {
                    match control {
                        ClientControl::SetMicEnabled(enabled) => {
                            debug!("Mic enabled: {}", enabled);
                            mic_enabled.store(enabled, Ordering::Relaxed);
                        }
                        ClientControl::SetDeafened(deafened) => {
                            mesh.set_deafened(deafened);
                            let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
                        }
                        ClientControl::Shutdown => {
                            info!("Shutting down voice client");
                            mesh.disconnect();
                            while let Ok(command) = command_rx.try_recv() {
                                send(&signaling, command);
                            }
                            return Ok(());
                        }
                    }
                }
                else => return Ok(()),
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RetryOutcome {
    Connected,
    Shutdown,
}

/// Establish the relay link, retrying with a fixed delay until it comes
/// up. Embedder controls and local snapshots are still served between
/// attempts, so shutdown and deafen toggles work during a relay outage.
#[allow(clippy::too_many_arguments)]
async fn connect_with_retry(
    signaling: &mut SignalingClient,
    events_tx: &mpsc::UnboundedSender<SignalingEvent>,
    control_rx: &mut mpsc::UnboundedReceiver<ClientControl>,
    snapshot_rx: &mut mpsc::UnboundedReceiver<GameSnapshot>,
    config: &VoiceConfig,
    mesh: &mut PeerMeshManager,
    projector: &mut SessionStateProjector,
    view_tx: &watch::Sender<SessionView>,
    announced_id: &mut Option<ParticipantId>,
    share_snapshots: bool,
    mic_enabled: &Arc<AtomicBool>,
) -> RetryOutcome {
    loop {
        match signaling.connect(events_tx.clone()).await {
            Ok(()) => return RetryOutcome::Connected,
            Err(e) => warn!("Relay connection failed: {}", e),
        }

        let delay = tokio::time::sleep(RECONNECT_DELAY);
        tokio::pin!(delay);
        loop {
            tokio::select! {
                _ = &mut delay => break,
                control = control_rx.recv() => match control {
                    Some(ClientControl::SetMicEnabled(enabled)) => {
                        mic_enabled.store(enabled, Ordering::Relaxed);
                    }
                    Some(ClientControl::SetDeafened(deafened)) => {
                        mesh.set_deafened(deafened);
                        let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
                    }
                    Some(ClientControl::Shutdown) | None => {
                        info!("Shutting down voice client during relay outage");
                        mesh.disconnect();
                        return RetryOutcome::Shutdown;
                    }
                },
                Some(snapshot) = snapshot_rx.recv() => {
                    handle_snapshot(
                        snapshot,
                        false,
                        config,
                        signaling,
                        mesh,
                        projector,
                        view_tx,
                        announced_id,
                        share_snapshots,
                    );
                }
            }
        }
    }
}

/// Whether a snapshot should (re)join the mesh.
///
/// Joins on a session code the mesh is not in yet, and rejoins on
/// returning to the lobby from a round, which gives every round a fresh
/// set of peer connections.
fn needs_join(
    current_code: Option<&str>,
    snapshot_code: &str,
    phase: GamePhase,
    old_phase: GamePhase,
) -> bool {
    if current_code != Some(snapshot_code) {
        return true;
    }
    phase == GamePhase::Lobby
        && matches!(old_phase, GamePhase::Discussion | GamePhase::Tasks)
}

#[allow(clippy::too_many_arguments)]
fn handle_snapshot(
    snapshot: GameSnapshot,
    via_relay: bool,
    config: &VoiceConfig,
    signaling: &SignalingClient,
    mesh: &mut PeerMeshManager,
    projector: &mut SessionStateProjector,
    view_tx: &watch::Sender<SessionView>,
    announced_id: &mut Option<ParticipantId>,
    share_snapshots: bool,
) {
    let local_id = snapshot.local_player().map(|p| p.id);

    if let Some(id) = local_id {
        if *announced_id != Some(id) {
            send(signaling, SignalingCommand::AnnounceId { id });
            *announced_id = Some(id);
        }
    }

    match (snapshot.session_code.as_deref(), local_id) {
        (Some(code), Some(id)) => {
            let current = mesh.session().map(|s| s.code.clone());
            if needs_join(current.as_deref(), code, snapshot.phase, snapshot.old_phase) {
                mesh.connect(code, id);
            }
        }
        (None, _) => {
            // Left the game session entirely.
            if mesh.session().is_some() {
                mesh.disconnect();
            }
        }
        _ => {}
    }

    // Only the host participant publishes, and never echoes relayed state.
    if share_snapshots && !via_relay && !config.relay_projection && local_id == Some(0) {
        send(
            signaling,
            SignalingCommand::Gamestate {
                state: snapshot.clone(),
            },
        );
    }

    projector.apply_snapshot(snapshot.clone());
    mesh.apply_snapshot(snapshot);
    let _ = view_tx.send(projector.view(mesh.identities(), mesh.is_deafened()));
}

fn send(signaling: &SignalingClient, command: SignalingCommand) {
    if let Err(e) = signaling.send(command) {
        warn!("Failed to send signaling command: {}", e);
    }
}

/// Run voice activity detection over the local capture stream.
///
/// A disabled track is detected as silence, so muting mid-sentence ends
/// the local speaking indicator through the normal hangover path.
fn spawn_local_vad(
    mut local: LocalStream,
    mut vad: VoiceActivityDetector,
    voice_tx: mpsc::UnboundedSender<VoiceEvent>,
) {
    tokio::spawn(async move {
        while let Some(frame) = local.frames.recv().await {
            let transition = if local.is_enabled() {
                vad.process(&frame.samples)
            } else {
                vad.process(&vec![0.0; frame.samples.len()])
            };

            if let Some(active) = transition {
                let event = VoiceEvent {
                    source: VoiceSource::Local,
                    active,
                    gain: 1.0,
                };
                if voice_tx.send(event).is_err() {
                    break;
                }
            }
        }

        debug!("Local voice activity task terminated");
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_needs_join_on_new_session_code() {
        assert!(needs_join(None, "ABCDEF", GamePhase::Lobby, GamePhase::Menu));
        assert!(needs_join(
            Some("ABCDEF"),
            "XYZXYZ",
            GamePhase::Lobby,
            GamePhase::Menu
        ));
        assert!(!needs_join(
            Some("ABCDEF"),
            "ABCDEF",
            GamePhase::Lobby,
            GamePhase::Menu
        ));
    }

    #[test]
    fn test_rejoin_on_returning_to_lobby() {
        for old in [GamePhase::Discussion, GamePhase::Tasks] {
            assert!(needs_join(Some("ABCDEF"), "ABCDEF", GamePhase::Lobby, old));
        }

        // Mid-round phase changes never rejoin.
        assert!(!needs_join(
            Some("ABCDEF"),
            "ABCDEF",
            GamePhase::Tasks,
            GamePhase::Lobby
        ));
        assert!(!needs_join(
            Some("ABCDEF"),
            "ABCDEF",
            GamePhase::Discussion,
            GamePhase::Tasks
        ));
    }

    #[tokio::test]
    async fn test_client_rejects_invalid_config() {
        use crate::audio::stream::ChannelAudioSource;
        use crate::peer::connection::PeerConnectionFactory;

        let config = VoiceConfig {
            relay_url: "http://not-a-ws-url".to_string(),
            ..Default::default()
        };
        let (source, _tx, _enabled) = ChannelAudioSource::new();

        let result = VoiceClient::new(
            config,
            Box::new(PeerConnectionFactory::new(vec!["stun:s".to_string()])),
            Box::new(source),
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_shutdown_completes_during_relay_outage() {
        use crate::audio::stream::ChannelAudioSource;
        use crate::peer::connection::PeerConnectionFactory;

        // Nothing listens on this port, so every connect attempt fails
        // and the client sits in its retry path.
        let config = VoiceConfig {
            relay_url: "ws://127.0.0.1:9".to_string(),
            ..Default::default()
        };
        let (source, _frames, _enabled) = ChannelAudioSource::new();
        let (client, handle) = VoiceClient::new(
            config,
            Box::new(PeerConnectionFactory::new(vec!["stun:s".to_string()])),
            Box::new(source),
        )
        .unwrap();

        let task = tokio::spawn(client.run());
        handle.shutdown();

        let joined = tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .expect("shutdown stalled behind reconnect attempts");
        assert!(joined.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_local_vad_respects_mic_flag() {
        use crate::audio::stream::ChannelAudioSource;
        use crate::config::VadConfig;

        let (source, frames, enabled) = ChannelAudioSource::new();
        let local = source.acquire().await.unwrap();
        let (voice_tx, mut voice_rx) = mpsc::unbounded_channel();

        let vad = VoiceActivityDetector::new(&VadConfig {
            open_threshold: 0.1,
            hang_ms: 10,
            sample_rate: 48000,
        });
        spawn_local_vad(local, vad, voice_tx);

        enabled.store(false, Ordering::Relaxed);
        frames.send(AudioFrame::mono(vec![0.9; 480])).unwrap();
        tokio::task::yield_now().await;
        assert!(voice_rx.try_recv().is_err());

        enabled.store(true, Ordering::Relaxed);
        frames.send(AudioFrame::mono(vec![0.9; 480])).unwrap();
        let event = voice_rx.recv().await.unwrap();
        assert_eq!(event.source, VoiceSource::Local);
        assert!(event.active);
    }
}
