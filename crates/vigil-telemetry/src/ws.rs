//! WebSocket feed transport

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::debug;

use crate::error::TransportError;
use crate::transport::{FeedMessage, FeedTransport, FrameStream};

/// Connects to a `ws://` or `wss://` feed endpoint
#[derive(Debug, Clone)]
pub struct WebSocketTransport {
    url: String,
}

impl WebSocketTransport {
    /// Create a transport for `url`
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl FeedTransport for WebSocketTransport {
    async fn connect(&self) -> Result<Box<dyn FrameStream>, TransportError> {
        let (ws, response) = connect_async(self.url.as_str())
            .await
            .map_err(|e| TransportError::Connect(e.to_string()))?;
        debug!("WebSocket handshake complete ({})", response.status());
        Ok(Box::new(WebSocketFrameStream { ws }))
    }

    fn describe(&self) -> String {
        self.url.clone()
    }
}

struct WebSocketFrameStream {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

/// Close codes treated as a clean shutdown
fn is_clean_close(code: CloseCode) -> bool {
    matches!(code, CloseCode::Normal | CloseCode::Away)
}

#[async_trait]
impl FrameStream for WebSocketFrameStream {
    async fn next_message(&mut self) -> Option<Result<FeedMessage, TransportError>> {
        loop {
            let message = match self.ws.next().await? {
                Ok(message) => message,
                Err(e) => return Some(Err(TransportError::Stream(e.to_string()))),
            };

            match message {
                Message::Text(text) => return Some(Ok(FeedMessage::Text(text))),
                Message::Binary(data) => return Some(Ok(FeedMessage::Binary(data))),
                // Pings are answered by tungstenite on the next read/flush
                Message::Ping(_) | Message::Pong(_) | Message::Frame(_) => continue,
                Message::Close(None) => return None,
                Message::Close(Some(frame)) if is_clean_close(frame.code) => return None,
                Message::Close(Some(frame)) => {
                    return Some(Err(TransportError::AbnormalClose {
                        code: u16::from(frame.code),
                        reason: frame.reason.into_owned(),
                    }))
                }
            }
        }
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(TransportError::Stream(e.to_string())),
        }
    }
}
