//! Relay сервер: раздаёт id, держит комнаты, пересылает сообщения.

use super::hub::RoomHub;
use super::protocol::{ClientFrame, ServerFrame};
use super::{PeerId, RoomId};
use crate::error::TransportError;
use crate::utils::random_id;
use futures_util::{SinkExt, StreamExt};
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

pub struct RelayServer {
    listener: TcpListener,
    hub: RoomHub,
}

impl RelayServer {
    pub async fn bind(addr: impl tokio::net::ToSocketAddrs, capacity: usize) -> Result<Self, TransportError> {
        let listener = TcpListener::bind(addr).await?;
        Ok(Self {
            listener,
            hub: RoomHub::with_capacity(capacity),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, TransportError> {
        Ok(self.listener.local_addr()?)
    }

    pub fn hub(&self) -> &RoomHub {
        &self.hub
    }

    /// Принимает соединения, пока не будет отменён
    pub async fn serve(self) -> Result<(), TransportError> {
        info!("Signaling relay listening on {}", self.listener.local_addr()?);
        loop {
            let (stream, addr) = self.listener.accept().await?;
            let hub = self.hub.clone();
            tokio::spawn(async move {
                if let Err(e) = handle_connection(stream, hub).await {
                    warn!("Connection {addr} ended with error: {e}");
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, hub: RoomHub) -> Result<(), TransportError> {
    let ws = tokio_tungstenite::accept_async(stream).await?;
    let id = PeerId(random_id());
    info!("Client connected as {id}");

    let (mut write, mut read) = ws.split();
    let (outbox, mut frames) = mpsc::unbounded_channel::<ServerFrame>();

    let writer = tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            let closing = frame == ServerFrame::Closed;
            match serde_json::to_string(&frame) {
                Ok(text) => {
                    if write.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => error!("Failed to encode frame: {e}"),
            }
            if closing {
                break;
            }
        }
        let _ = write.close().await;
    });

    let mut room: Option<RoomId> = None;
    while let Some(msg) = read.next().await {
        let text = match msg {
            Ok(Message::Text(text)) => text,
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                debug!("Read error from {id}: {e}");
                break;
            }
        };
        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("Malformed frame from {id}: {e}");
                continue;
            }
        };

        match frame {
            ClientFrame::Join { room: wanted } => {
                if let Some(current) = room.take() {
                    if current != wanted {
                        hub.leave(&current, &id);
                    }
                }
                match hub.join(&wanted, &id, outbox.clone()) {
                    Ok(()) => room = Some(wanted),
                    Err(TransportError::RoomFull(full)) => {
                        let _ = outbox.send(ServerFrame::RoomFull { room: full });
                    }
                    Err(e) => warn!("Join failed for {id}: {e}"),
                }
            }
            ClientFrame::Leave => {
                if let Some(current) = room.take() {
                    hub.leave(&current, &id);
                }
            }
            ClientFrame::Signal { message } => match &room {
                Some(current) => {
                    if let Err(e) = hub.relay(current, &id, &message) {
                        warn!("Relay from {id} failed: {e}");
                    }
                }
                None => debug!("Dropping {} from {id}: not in a room", message.kind()),
            },
        }
    }

    if let Some(current) = room.take() {
        hub.leave(&current, &id);
    }
    drop(outbox);
    let _ = writer.await;
    info!("Client {id} disconnected");
    Ok(())
}
