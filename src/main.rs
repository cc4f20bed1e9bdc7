use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use duocall_lib::logger;
use duocall_lib::peer::ice::probe_ice_server;
use duocall_lib::peer::{IceServerConfig, IceServerKind, RtcPeerFactory};
use duocall_lib::signaling::relay::RelayServer;
use duocall_lib::signaling::ws::WsTransport;
use duocall_lib::{Negotiator, NegotiatorConfig, SessionEvent, StaticMedia};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "duocall", version, about = "Two-party WebRTC call negotiation")]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Запустить сигнальный relay сервер
    Relay {
        #[arg(long, default_value = "127.0.0.1", env = "DUOCALL_HOST")]
        host: String,
        #[arg(long, default_value_t = 8765, env = "DUOCALL_PORT")]
        port: u16,
        #[arg(long, default_value_t = duocall_lib::config::ROOM_CAPACITY)]
        capacity: usize,
    },
    /// Войти в комнату и дождаться собеседника
    Call {
        #[arg(long, default_value = "ws://127.0.0.1:8765", env = "DUOCALL_SERVER")]
        server: String,
        #[arg(long)]
        room: String,
        /// Отправлять видео вместе со звуком
        #[arg(long)]
        video: bool,
        /// JSON файл с настройками согласования
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Проверить доступность STUN/TURN сервера
    CheckIce {
        #[arg(long)]
        url: String,
        #[arg(long, value_enum, default_value_t = Kind::Stun)]
        kind: Kind,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        credential: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Kind {
    Stun,
    Turn,
}

#[tokio::main]
async fn main() -> Result<()> {
    logger::init();
    let cli = Cli::parse();

    match cli.command {
        Cmd::Relay {
            host,
            port,
            capacity,
        } => relay(&host, port, capacity).await,
        Cmd::Call {
            server,
            room,
            video,
            config,
        } => call(&server, room, video, config).await,
        Cmd::CheckIce {
            url,
            kind,
            username,
            credential,
        } => check_ice(url, kind, username, credential).await,
    }
}

async fn relay(host: &str, port: u16, capacity: usize) -> Result<()> {
    let server = RelayServer::bind((host, port), capacity)
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    println!("relay listening on ws://{}", server.local_addr()?);

    tokio::select! {
        result = server.serve() => result.context("relay stopped")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down relay"),
    }
    Ok(())
}

async fn call(server: &str, room: String, video: bool, config: Option<PathBuf>) -> Result<()> {
    let config = match config {
        Some(path) => NegotiatorConfig::from_file(&path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => NegotiatorConfig::default(),
    };
    let transport = WsTransport::connect(server)
        .await
        .with_context(|| format!("failed to connect to {server}"))?;
    let factory = Arc::new(RtcPeerFactory::new(config.ice_servers.clone()));
    let media = Arc::new(if video {
        StaticMedia::audio_video()
    } else {
        StaticMedia::audio_only()
    });

    let (handle, mut events, task) =
        Negotiator::spawn(config, room.into(), Box::new(transport), factory, media);

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                println!("{event:?}");
                match event {
                    SessionEvent::StateChanged(state) if state.is_terminal() => {
                        println!("call finished: {state:?}");
                        break;
                    }
                    SessionEvent::TransportDisconnected | SessionEvent::RoomFull(_) => break,
                    _ => {}
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl-C, hanging up");
                handle.hang_up()?;
                break;
            }
        }
    }

    handle.shutdown()?;
    if let Err(e) = task.await {
        error!("Negotiator task failed: {e}");
    }
    Ok(())
}

async fn check_ice(
    url: String,
    kind: Kind,
    username: Option<String>,
    credential: Option<String>,
) -> Result<()> {
    let server = IceServerConfig {
        id: "cli".into(),
        r#type: match kind {
            Kind::Stun => IceServerKind::Stun,
            Kind::Turn => IceServerKind::Turn,
        },
        url,
        username,
        credential,
    };
    server.validate()?;

    if probe_ice_server(&server).await? {
        println!("{} is reachable", server.url);
        Ok(())
    } else {
        bail!("{} is not reachable", server.url)
    }
}
