//! tokio-tungstenite socket adapter

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use rentline_core::{RealtimeError, SocketConnector, SocketFrame, SocketStream};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Opens `ws://` and `wss://` sockets.
#[derive(Debug, Clone)]
pub struct TungsteniteConnector {
    connect_timeout: Duration,
}

impl TungsteniteConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TungsteniteConnector {
    fn default() -> Self {
        Self::new(DEFAULT_CONNECT_TIMEOUT)
    }
}

#[async_trait]
impl SocketConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn SocketStream>, RealtimeError> {
        let (socket, response) = tokio::time::timeout(self.connect_timeout, connect_async(url))
            .await
            .map_err(|_| RealtimeError::Connect("timed out opening websocket".to_string()))?
            .map_err(|e| RealtimeError::Connect(e.to_string()))?;

        debug!(status = %response.status(), "Websocket handshake complete");
        Ok(Box::new(TungsteniteStream { socket }))
    }
}

struct TungsteniteStream {
    socket: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl SocketStream for TungsteniteStream {
    async fn send_text(&mut self, text: String) -> Result<(), RealtimeError> {
        self.socket
            .send(Message::Text(text))
            .await
            .map_err(|e| RealtimeError::Send(e.to_string()))
    }

    async fn next_frame(&mut self) -> Option<Result<SocketFrame, RealtimeError>> {
        loop {
            let frame = match self.socket.next().await? {
                Ok(Message::Text(text)) => SocketFrame::Text(text),
                Ok(Message::Binary(bytes)) => SocketFrame::Binary(bytes),
                Ok(Message::Close(frame)) => {
                    SocketFrame::Close(frame.map(|frame| frame.reason.into_owned()))
                }
                // Control frames are answered by tungstenite itself.
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => continue,
                Err(e) => return Some(Err(RealtimeError::Receive(e.to_string()))),
            };
            return Some(Ok(frame));
        }
    }

    async fn close(&mut self) -> Result<(), RealtimeError> {
        self.socket.close(None).await.map_err(|e| RealtimeError::Send(e.to_string()))
    }
}
