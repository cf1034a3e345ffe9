//! Websocket side of the relay.

use crate::{HasMessage, RelayError, RelayResult};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

/// A push channel delivering relay messages for one pairing.
#[async_trait]
pub trait PairingChannel: Send + Sync {
    /// Subscribe to messages for `uuid`.
    ///
    /// The receiver yields every message addressed to `uuid` until the relay
    /// closes, in which case a final `Err` is delivered. Dropping the receiver
    /// tears the subscription down.
    async fn subscribe(&self, uuid: &str) -> RelayResult<mpsc::Receiver<RelayResult<HasMessage>>>;
}

/// [`PairingChannel`] over tokio-tungstenite.
pub struct WebSocketChannel {
    url: String,
}

impl WebSocketChannel {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

#[async_trait]
impl PairingChannel for WebSocketChannel {
    async fn subscribe(&self, uuid: &str) -> RelayResult<mpsc::Receiver<RelayResult<HasMessage>>> {
        info!(url = %self.url, uuid = %uuid, "Connecting to relay channel");

        let (ws_stream, _) = connect_async(self.url.as_str()).await?;
        let (mut write, mut read) = ws_stream.split();

        let subscription = HasMessage::subscribe(uuid).to_json()?;
        write.send(Message::Text(subscription.into())).await?;
        debug!(uuid = %uuid, "Sent auth_wait");

        let (tx, rx) = mpsc::channel(16);
        let uuid = uuid.to_string();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = tx.closed() => {
                        debug!(uuid = %uuid, "Channel receiver dropped, closing websocket");
                        let _ = write.send(Message::Close(None)).await;
                        break;
                    }
                    frame = read.next() => match frame {
                        Some(Ok(Message::Text(text))) => match HasMessage::from_json(&text) {
                            Ok(msg) if msg.uuid() == uuid => {
                                if tx.send(Ok(msg)).await.is_err() {
                                    break;
                                }
                            }
                            Ok(msg) => {
                                debug!(uuid = %uuid, other = %msg.uuid(), "Ignoring message for another pairing");
                            }
                            Err(e) => {
                                warn!(uuid = %uuid, error = %e, "Failed to parse relay message");
                            }
                        },
                        Some(Ok(Message::Ping(data))) => {
                            if write.send(Message::Pong(data)).await.is_err() {
                                let _ = tx.send(Err(RelayError::Closed)).await;
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!(uuid = %uuid, "Relay channel closed");
                            let _ = tx.send(Err(RelayError::Closed)).await;
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            warn!(uuid = %uuid, error = %e, "WebSocket error");
                            let _ = tx.send(Err(e.into())).await;
                            break;
                        }
                    }
                }
            }
        });

        Ok(rx)
    }
}
