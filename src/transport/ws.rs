//! WebSocket transport over `tokio-tungstenite`

use super::{FrameSink, FrameSource, Transport, TransportEvent, ABNORMAL_CLOSURE};
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Close frame that carried no status code
const NO_STATUS_RECEIVED: u16 = 1005;

/// Opens real WebSocket connections
#[derive(Debug, Clone, Default)]
pub struct WebSocketTransport;

impl WebSocketTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        let (stream, response) = connect_async(url)
            .await
            .map_err(|e| SessionError::Connection(format!("{}: {}", url, e)))?;

        tracing::info!(url = %url, status = %response.status(), "WebSocket connected");

        let (sink, stream) = stream.split();
        Ok((
            Box::new(WsSink {
                sink,
                closed: false,
            }),
            Box::new(WsSource {
                stream,
                done: false,
            }),
        ))
    }

    fn name(&self) -> &str {
        "websocket"
    }
}

struct WsSink {
    sink: SplitSink<WsStream, Message>,
    closed: bool,
}

#[async_trait]
impl FrameSink for WsSink {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(SessionError::Send {
                frame: "text".to_string(),
                reason: "connection closed".to_string(),
            });
        }

        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| SessionError::Send {
                frame: "text".to_string(),
                reason: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.sink.close().await {
            Ok(()) => Ok(()),
            Err(tungstenite::Error::ConnectionClosed) | Err(tungstenite::Error::AlreadyClosed) => {
                Ok(())
            }
            Err(e) => Err(SessionError::Connection(format!("close failed: {}", e))),
        }
    }
}

struct WsSource {
    stream: SplitStream<WsStream>,
    done: bool,
}

#[async_trait]
impl FrameSource for WsSource {
    async fn next(&mut self) -> Option<TransportEvent> {
        if self.done {
            return None;
        }

        loop {
            match self.stream.next().await {
                Some(Ok(Message::Text(text))) => return Some(TransportEvent::Text(text)),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => return Some(TransportEvent::Text(text)),
                    Err(_) => {
                        tracing::warn!("Dropping non-UTF-8 binary frame");
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    self.done = true;
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                    return Some(TransportEvent::Closed { code, reason });
                }
                // Ping/pong are answered by tungstenite
                Some(Ok(_)) => {}
                Some(Err(e)) => return Some(TransportEvent::Error(e.to_string())),
                None => {
                    self.done = true;
                    return Some(TransportEvent::Closed {
                        code: ABNORMAL_CLOSURE,
                        reason: "connection dropped".to_string(),
                    });
                }
            }
        }
    }
}
