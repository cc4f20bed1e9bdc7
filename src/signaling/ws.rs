//! WebSocket клиент relay сервера

use super::protocol::{ClientFrame, ServerFrame};
use super::{RoomId, SignalingMessage, SignalingTransport, TransportEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub struct WsTransport {
    outgoing: mpsc::UnboundedSender<ClientFrame>,
    events: mpsc::UnboundedReceiver<TransportEvent>,
    joined: bool,
    reader: JoinHandle<()>,
}

impl WsTransport {
    pub async fn connect(url: &str) -> Result<Self, TransportError> {
        info!("Connecting to signaling server: {}", url);
        let (ws_stream, _) = connect_async(url).await?;
        info!("Connected to signaling server");

        let (write, read) = ws_stream.split();
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();

        tokio::spawn(sender_task(write, outgoing_rx));
        let reader = tokio::spawn(receiver_task(read, events_tx));

        Ok(Self {
            outgoing,
            events,
            joined: false,
            reader,
        })
    }

    fn push(&self, frame: ClientFrame) -> Result<(), TransportError> {
        self.outgoing.send(frame).map_err(|_| TransportError::Closed)
    }
}

/// Отправляет кадры из канала в сокет; закрывает сокет, когда канал закрыт
async fn sender_task(
    mut write: SplitSink<WsStream, Message>,
    mut rx: mpsc::UnboundedReceiver<ClientFrame>,
) {
    while let Some(frame) = rx.recv().await {
        let text = match serde_json::to_string(&frame) {
            Ok(text) => text,
            Err(e) => {
                error!("Failed to encode frame: {}", e);
                continue;
            }
        };
        if let Err(e) = write.send(Message::Text(text)).await {
            error!("Failed to send WebSocket message: {}", e);
            break;
        }
    }
    let _ = write.close().await;
    debug!("Sender task terminated");
}

/// Читает кадры relay и превращает их в события
async fn receiver_task(mut read: SplitStream<WsStream>, events: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(msg) = read.next().await {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerFrame>(&text) {
                Ok(ServerFrame::Closed) => break,
                Ok(frame) => {
                    if events.send(frame.into()).is_err() {
                        return;
                    }
                }
                Err(e) => warn!("Ignoring malformed frame: {}", e),
            },
            Ok(Message::Close(_)) => {
                info!("WebSocket connection closed");
                break;
            }
            Err(e) => {
                error!("WebSocket error: {}", e);
                break;
            }
            _ => {}
        }
    }
    let _ = events.send(TransportEvent::Disconnected);
    debug!("Receiver task terminated");
}

#[async_trait]
impl SignalingTransport for WsTransport {
    async fn join(&mut self, room: &RoomId) -> Result<(), TransportError> {
        self.push(ClientFrame::Join { room: room.clone() })?;
        self.joined = true;
        Ok(())
    }

    async fn leave(&mut self) -> Result<(), TransportError> {
        if !self.joined {
            return Ok(());
        }
        self.joined = false;
        self.push(ClientFrame::Leave)
    }

    async fn send(&mut self, message: &SignalingMessage) -> Result<(), TransportError> {
        if !self.joined {
            return Err(TransportError::NotJoined);
        }
        self.push(ClientFrame::Signal {
            message: message.clone(),
        })
    }

    async fn next_event(&mut self) -> Option<TransportEvent> {
        let event = self.events.recv().await?;
        if let TransportEvent::RoomFull(_) = &event {
            self.joined = false;
        }
        Some(event)
    }
}

impl Drop for WsTransport {
    fn drop(&mut self) {
        // sender завершится сам, когда закроется канал `outgoing`
        self.reader.abort();
    }
}
