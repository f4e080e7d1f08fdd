//! Headless relay-projection voice client
//!
//! Joins a session without a local game reader: snapshots arrive relayed
//! over the signaling channel and the configured participant id is assumed
//! as the local one. Session membership and the derived view are logged.

use clap::Parser;
use proximity_voice::audio::ChannelAudioSource;
use proximity_voice::client::VoiceClient;
use proximity_voice::config::VoiceConfig;
use proximity_voice::peer::PeerConnectionFactory;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "voice_client", version, about = "Headless lobby voice client")]
struct Args {
    /// WebSocket relay server URL
    #[arg(long, env = "VOICE_RELAY_URL", default_value = "wss://relay.example.com")]
    relay_url: String,

    /// Participant id to assume for relayed snapshots
    #[arg(long)]
    participant_id: u32,

    /// STUN server for NAT traversal
    #[arg(long, default_value = "stun:stun.l.google.com:19302")]
    stun_server: String,

    /// Disable positional audio in the lobby
    #[arg(long)]
    no_spatial_audio: bool,

    /// Conceal the session code in logged views
    #[arg(long)]
    hide_session_code: bool,

    /// Planar distance beyond which peers are inaudible
    #[arg(long, default_value_t = 7.0)]
    audible_radius: f32,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    info!("proximity-voice {}", proximity_voice::VERSION);

    let config = VoiceConfig {
        relay_url: args.relay_url,
        stun_servers: vec![args.stun_server],
        enable_spatial_audio: !args.no_spatial_audio,
        hide_session_code: args.hide_session_code,
        relay_projection: true,
        relay_participant_id: Some(args.participant_id),
        audible_radius: args.audible_radius,
        ..Default::default()
    };

    let negotiator = PeerConnectionFactory::new(config.stun_servers.clone());
    let (source, _frames, _mic) = ChannelAudioSource::new();
    let (client, handle) = VoiceClient::new(config, Box::new(negotiator), Box::new(source))?;

    let mut views = handle.views();
    tokio::spawn(async move {
        while views.changed().await.is_ok() {
            let view = views.borrow().clone();
            info!(
                "phase={:?} session={:?} relay_connected={} participants={}",
                view.phase,
                view.session_label,
                view.relay_connected,
                view.participants.len()
            );
            for p in &view.participants {
                info!(
                    "  participant {}: connected={} talking={} dead={}",
                    p.id, p.connected, p.talking, p.dead
                );
            }
        }
    });

    let client_task = tokio::spawn(client.run());

    tokio::signal::ctrl_c().await?;
    info!("Interrupt received, shutting down");
    handle.shutdown();

    match client_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => {
            error!("Voice client failed: {}", e);
            return Err(e.into());
        }
        Err(e) => error!("Voice client task panicked: {}", e),
    }

    Ok(())
}
