//! Connection driver
//!
//! One task per connection. The driver owns both halves of the transport,
//! performs the auth handshake, then multiplexes facade commands with
//! inbound frames until either side ends the connection. Inbound events
//! are folded into the shared [`SessionDerivedState`] through the watch
//! channel, so readers always see a consistent snapshot.

use crate::auth::TokenProvider;
use crate::error::{Result, SessionError};
use crate::event::{ClientFrame, ProtocolEvent};
use crate::state::{SessionDerivedState, SessionOutcome};
use crate::transport::{FrameSink, FrameSource, Transport, TransportEvent, ABNORMAL_CLOSURE};
use crate::types::StoryGenerationParams;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};

pub(crate) const NO_TOKEN: &str = "Authentication failed: No token available";
pub(crate) const TOKEN_ERROR: &str = "Authentication failed: Token retrieval error";
pub(crate) const TRANSPORT_ERROR: &str = "WebSocket connection error";
pub(crate) const CONNECTION_LOST: &str = "Connection lost - server may be down";

/// Requests from the facade to the driver
#[derive(Debug)]
pub(crate) enum Command {
    Generate(StoryGenerationParams),
    Disconnect,
}

type Halves = (Box<dyn FrameSink>, Box<dyn FrameSource>);

pub(crate) struct ConnectionDriver {
    id: String,
    url: String,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    state: Arc<watch::Sender<SessionDerivedState>>,
    commands: mpsc::UnboundedReceiver<Command>,
    connect_timeout: Duration,
}

impl ConnectionDriver {
    pub(crate) fn new(
        url: String,
        transport: Arc<dyn Transport>,
        tokens: Arc<dyn TokenProvider>,
        state: Arc<watch::Sender<SessionDerivedState>>,
        commands: mpsc::UnboundedReceiver<Command>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            id: format!("conn-{}", uuid::Uuid::new_v4()),
            url,
            transport,
            tokens,
            state,
            commands,
            connect_timeout,
        }
    }

    /// Drive the connection until it closes
    pub(crate) async fn run(mut self) {
        tracing::debug!(
            connection = %self.id,
            url = %self.url,
            transport = self.transport.name(),
            "Opening connection"
        );

        if let Some((sink, source)) = self.handshake().await {
            self.serve(sink, source).await;
        }

        tracing::debug!(connection = %self.id, "Connection driver stopped");
    }

    async fn handshake(&mut self) -> Option<Halves> {
        let opened = tokio::select! {
            _ = wait_for_disconnect(&mut self.commands) => {
                self.shut_down(None);
                return None;
            }
            result = tokio::time::timeout(self.connect_timeout, self.transport.open(&self.url)) => result,
        };

        let (mut sink, source) = match opened {
            Ok(Ok(halves)) => halves,
            Ok(Err(e)) => {
                tracing::error!(connection = %self.id, error = %e, "Failed to open connection");
                self.fail(format!("Connection failed: {}", e));
                return None;
            }
            Err(_) => {
                tracing::error!(
                    connection = %self.id,
                    timeout_secs = self.connect_timeout.as_secs(),
                    "Timed out opening connection"
                );
                self.fail(format!(
                    "Connection failed: {}",
                    SessionError::Timeout(format!("opening {}", self.url))
                ));
                return None;
            }
        };

        let token = tokio::select! {
            _ = wait_for_disconnect(&mut self.commands) => {
                close_quietly(&self.id, sink.as_mut()).await;
                self.shut_down(None);
                return None;
            }
            result = self.tokens.token() => result,
        };

        let token = match token {
            Ok(Some(token)) => token,
            Ok(None) => {
                tracing::warn!(connection = %self.id, "No authentication token available");
                close_quietly(&self.id, sink.as_mut()).await;
                self.fail(NO_TOKEN.to_string());
                return None;
            }
            Err(e) => {
                tracing::error!(connection = %self.id, error = %e, "Token retrieval failed");
                close_quietly(&self.id, sink.as_mut()).await;
                self.fail(TOKEN_ERROR.to_string());
                return None;
            }
        };

        if let Err(e) = send_frame(sink.as_mut(), &ClientFrame::Auth { token }).await {
            tracing::error!(connection = %self.id, error = %e, "Failed to send auth frame");
            close_quietly(&self.id, sink.as_mut()).await;
            self.fail(format!("Connection failed: {}", e));
            return None;
        }

        self.state.send_modify(|s| {
            s.is_connected = true;
            s.connection_error = None;
        });
        tracing::info!(connection = %self.id, url = %self.url, "Connected");

        Some((sink, source))
    }

    async fn serve(&mut self, mut sink: Box<dyn FrameSink>, mut source: Box<dyn FrameSource>) {
        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command::Generate(params)) => {
                        self.send_generate(sink.as_mut(), params).await;
                    }
                    Some(Command::Disconnect) | None => {
                        close_quietly(&self.id, sink.as_mut()).await;
                        self.commands.close();
                        self.state.send_modify(|s| {
                            s.mark_closed(None);
                            s.connection_error = None;
                        });
                        tracing::info!(connection = %self.id, "Disconnected");
                        break;
                    }
                },
                event = source.next() => match event {
                    Some(TransportEvent::Text(text)) => self.handle_frame(&text),
                    Some(TransportEvent::Error(reason)) => {
                        tracing::error!(connection = %self.id, error = %reason, "Transport error");
                        close_quietly(&self.id, sink.as_mut()).await;
                        self.shut_down(Some(TRANSPORT_ERROR.to_string()));
                        break;
                    }
                    Some(closed @ TransportEvent::Closed { .. }) => {
                        self.handle_close(&closed);
                        break;
                    }
                    None => {
                        self.handle_close(&TransportEvent::Closed {
                            code: ABNORMAL_CLOSURE,
                            reason: "stream ended".to_string(),
                        });
                        break;
                    }
                },
            }
        }
    }

    async fn send_generate(&self, sink: &mut dyn FrameSink, params: StoryGenerationParams) {
        tracing::info!(
            connection = %self.id,
            theme = %params.theme,
            pages = params.pages,
            "Starting story generation"
        );

        if let Err(e) = send_frame(sink, &ClientFrame::Generate(params)).await {
            tracing::error!(connection = %self.id, error = %e, "Failed to send generation request");
            self.state.send_modify(|s| {
                s.is_generating = false;
                s.outcome = Some(SessionOutcome::Failed {
                    message: e.to_string(),
                });
            });
        }
    }

    fn handle_frame(&self, text: &str) {
        let event = match ProtocolEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(connection = %self.id, error = %e, "Dropping malformed frame");
                return;
            }
        };

        match &event {
            ProtocolEvent::AuthSuccess { message } => {
                tracing::info!(connection = %self.id, message = ?message, "Authenticated");
            }
            ProtocolEvent::SessionCreated { session_id } => {
                tracing::info!(connection = %self.id, session_id = %session_id, "Session created");
            }
            ProtocolEvent::Completed { .. } => {
                tracing::info!(connection = %self.id, "Story generation completed");
            }
            ProtocolEvent::Error { message } => {
                tracing::error!(connection = %self.id, message = %message, "Generation failed");
            }
            ProtocolEvent::Unknown { kind, .. } => {
                tracing::debug!(connection = %self.id, kind = %kind, "Unrecognized event kind");
            }
            _ => {
                tracing::trace!(connection = %self.id, kind = event.kind(), "Event received");
            }
        }

        self.state.send_modify(|s| s.apply(event));
    }

    fn handle_close(&mut self, event: &TransportEvent) {
        let TransportEvent::Closed { code, reason } = event else {
            return;
        };
        let error = if event.is_abnormal_close() {
            tracing::warn!(connection = %self.id, code, reason = %reason, "Connection lost");
            Some(CONNECTION_LOST.to_string())
        } else {
            tracing::info!(connection = %self.id, code, reason = %reason, "Connection closed by server");
            None
        };
        self.shut_down(error);
    }

    fn fail(&mut self, message: String) {
        self.shut_down(Some(message));
    }

    /// Refuse further commands, then publish the closed state
    ///
    /// The command channel closes first so the facade sees this connection
    /// as finished by the time readers observe `is_connected == false`.
    fn shut_down(&mut self, error: Option<String>) {
        self.commands.close();
        self.state.send_modify(|s| s.mark_closed(error));
    }
}

async fn send_frame(sink: &mut dyn FrameSink, frame: &ClientFrame) -> Result<()> {
    let text = frame.encode()?;
    tracing::debug!(frame = ?frame, "Sending frame");
    sink.send(text).await.map_err(|e| SessionError::Send {
        frame: frame.name().to_string(),
        reason: e.to_string(),
    })
}

async fn close_quietly(id: &str, sink: &mut dyn FrameSink) {
    if let Err(e) = sink.close().await {
        tracing::debug!(connection = %id, error = %e, "Error while closing connection");
    }
}

/// Resolves on a disconnect request or when the facade goes away
async fn wait_for_disconnect(commands: &mut mpsc::UnboundedReceiver<Command>) {
    while let Some(command) = commands.recv().await {
        match command {
            Command::Disconnect => return,
            Command::Generate(params) => {
                tracing::warn!(theme = %params.theme, "Generation requested before handshake completed, ignoring");
            }
        }
    }
}
