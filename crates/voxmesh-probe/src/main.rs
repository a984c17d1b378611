//! voxmesh-probe: joins a room's voice session listen-only and logs what the
//! coordinator sees.
//!
//! Useful for checking a signaling deployment: join, retry, roster, mute and
//! settings traffic all flow through the real coordinator while no audio is
//! captured or negotiated.

mod listen;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use voxmesh_config::{toml_loader, validation, VoxmeshConfig};
use voxmesh_session::signaling::ws::WsConfig;
use voxmesh_session::{
    Collaborators, LocalIdentity, RoomContext, SessionCoordinator, VoiceEvent, WsSignalingChannel,
};

use crate::listen::{NoMicrophone, SignalingOnly};

#[derive(Parser)]
#[command(name = "voxmesh-probe", about = "Listen-only voice session probe")]
struct Args {
    /// Config file. Defaults to the platform config path.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Signaling server URL, overriding the config.
    #[arg(long)]
    url: Option<String>,

    /// Room to join.
    #[arg(short, long)]
    room: String,

    #[arg(long, default_value = "voxmesh-probe")]
    user_id: String,

    #[arg(long, default_value = "probe")]
    username: String,

    /// User id of the room host, if known.
    #[arg(long)]
    host: Option<String>,

    /// Print the effective configuration as JSON and exit.
    #[arg(long)]
    print_config: bool,

    /// Seconds between roster dumps.
    #[arg(long, default_value_t = 10)]
    roster_interval: u64,
}

fn load(args: &Args) -> voxmesh_common::Result<VoxmeshConfig> {
    let mut config = match &args.config {
        Some(path) => {
            let config = toml_loader::load_from_path(path)?;
            validation::validate(&config)?;
            config
        }
        None => voxmesh_config::load_config()?,
    };
    if let Some(url) = &args.url {
        config.signaling.url = url.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> voxmesh_common::Result<()> {
    let args = Args::parse();
    let config = load(&args)?;
    if args.print_config {
        println!("{}", voxmesh_config::config_to_json(&config));
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.as_filter().into()),
        )
        .init();

    let ws_config = WsConfig::from(&config.signaling);
    tracing::info!(url = %ws_config.display_url(), room = %args.room, "voxmesh-probe starting");
    let channel = Arc::new(WsSignalingChannel::connect(ws_config));

    let collaborators = Collaborators {
        signaling: channel.clone(),
        capture: Arc::new(NoMicrophone),
        transports: Arc::new(SignalingOnly),
    };
    let identity = LocalIdentity::new(args.user_id.clone(), args.username.clone());
    let (coordinator, mut events) = SessionCoordinator::spawn(config, identity, collaborators)?;

    let mut room = RoomContext::new(args.room.clone());
    if let Some(host) = &args.host {
        room = room.with_host(host.clone());
    }
    coordinator.attach_room(room).await?;
    coordinator.join(args.room.clone()).await?;

    let mut roster_tick =
        tokio::time::interval(Duration::from_secs(args.roster_interval.max(1)));
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => log_event(&event),
                None => break,
            },
            _ = roster_tick.tick() => log_roster(&coordinator, channel.is_connected()).await?,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted, leaving session");
                break;
            }
        }
    }

    coordinator.shutdown().await?;
    channel.disconnect().await;
    Ok(())
}

fn log_event(event: &VoiceEvent) {
    match event {
        VoiceEvent::StateChanged(state) => tracing::info!(%state, "State"),
        VoiceEvent::SessionStarted {
            session_id,
            host_user_id,
        } => tracing::info!(session = %session_id, host = ?host_user_id, "Session"),
        VoiceEvent::ParticipantJoined { user_id, username } => {
            tracing::info!(user_id = %user_id, username = %username, "Joined")
        }
        VoiceEvent::ParticipantLeft { user_id, username } => {
            tracing::info!(user_id = %user_id, username = %username, "Left")
        }
        VoiceEvent::MuteChanged { user_id, is_muted } => {
            tracing::info!(user_id = %user_id, muted = is_muted, "Mute")
        }
        VoiceEvent::SpeakingChanged {
            user_id, speaking, ..
        } => tracing::debug!(user_id = %user_id, speaking, "Speaking"),
        VoiceEvent::QualityChanged { user_id, quality } => {
            tracing::info!(user_id = %user_id, rtt_ms = quality.rtt_ms, class = ?quality.class, "Quality")
        }
        VoiceEvent::SettingsChanged(settings) => tracing::info!(?settings, "Settings"),
        VoiceEvent::LocalMuteChanged(muted) => tracing::info!(muted, "Local mute"),
        VoiceEvent::LocalDeafenChanged(deafened) => tracing::info!(deafened, "Local deafen"),
        VoiceEvent::Notification(n) => {
            tracing::warn!(level = ?n.level, title = %n.title, "{}", n.body)
        }
    }
}

async fn log_roster(
    coordinator: &SessionCoordinator,
    signaling_up: bool,
) -> voxmesh_common::Result<()> {
    let participants = coordinator.participants().await?;
    tracing::info!(count = participants.len(), signaling_up, "Roster");
    for (rank, p) in participants.iter().enumerate() {
        tracing::info!(
            rank,
            user_id = %p.user_id,
            username = %p.username,
            muted = p.is_muted,
            speaking = p.is_active_speaker(),
            connected = p.is_connected,
            quality = ?p.quality,
            "  participant"
        );
    }
    Ok(())
}
