//! Story session facade
//!
//! `StorySession` is the surface presentation code talks to. Commands go to
//! the connection driver over a channel; reads are served from the latest
//! [`SessionDerivedState`] snapshot. Dropping the session disconnects it.

use crate::auth::TokenProvider;
use crate::config::SessionConfig;
use crate::connection::{Command, ConnectionDriver};
use crate::error::{Result, SessionError};
use crate::event::ProtocolEvent;
use crate::state::{SessionDerivedState, SessionOutcome};
use crate::transport::Transport;
use crate::types::{AgentIdentity, AgentStates, StoryGenerationParams};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::WatchStream;

struct DriverLink {
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<()>,
}

/// Client session for one story-generation backend
///
/// At most one connection is open at a time. All reads are cheap snapshot
/// projections; subscribe with [`StorySession::subscribe`] or
/// [`StorySession::updates`] to observe changes.
pub struct StorySession {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    tokens: Arc<dyn TokenProvider>,
    state: Arc<watch::Sender<SessionDerivedState>>,
    link: Option<DriverLink>,
}

impl StorySession {
    /// Create a disconnected session
    pub fn new(
        config: SessionConfig,
        transport: impl Transport + 'static,
        tokens: impl TokenProvider + 'static,
    ) -> Self {
        let (state, _) = watch::channel(SessionDerivedState::default());
        Self {
            config,
            transport: Arc::new(transport),
            tokens: Arc::new(tokens),
            state: Arc::new(state),
            link: None,
        }
    }

    /// Get the transport name
    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Open the connection and start the auth handshake
    ///
    /// Returns immediately; the outcome shows up as `is_connected` or
    /// `connection_error`. Calling this while a connection is open or
    /// opening does nothing; once a connection has ended for any reason a
    /// new one is opened. Must be called within a Tokio runtime.
    pub fn connect(&mut self) -> Result<()> {
        if let Some(link) = &self.link {
            if !link.commands.is_closed() {
                tracing::debug!("Connect requested while already connected, ignoring");
                return Ok(());
            }
        }

        self.config.validate()?;

        let (commands, rx) = mpsc::unbounded_channel();
        let driver = ConnectionDriver::new(
            self.config.ws_url(),
            self.transport.clone(),
            self.tokens.clone(),
            self.state.clone(),
            rx,
            Duration::from_secs(self.config.connect_timeout_secs),
        );

        self.state.send_modify(|s| s.connection_error = None);
        let task = tokio::spawn(driver.run());
        self.link = Some(DriverLink { commands, task });
        Ok(())
    }

    /// Start a generation run on the open connection
    ///
    /// Resets the derived state, marks the session as generating and sends
    /// `params` as the request frame. Fails with `NotConnected` and changes
    /// nothing when no authenticated connection is open.
    pub fn generate_story(&self, params: StoryGenerationParams) -> Result<()> {
        let connected = self.state.borrow().is_connected;
        let link = match &self.link {
            Some(link) if connected => link,
            _ => {
                tracing::error!(theme = %params.theme, "Cannot generate story: not connected");
                return Err(SessionError::NotConnected);
            }
        };

        self.state.send_modify(SessionDerivedState::begin_run);
        if link.commands.send(Command::Generate(params)).is_err() {
            tracing::error!("Connection driver is gone, generation request dropped");
            self.state.send_modify(|s| s.mark_closed(None));
            return Err(SessionError::NotConnected);
        }
        Ok(())
    }

    /// Close the connection and wait for the driver to finish
    ///
    /// Safe to call when already disconnected.
    pub async fn disconnect(&mut self) {
        let Some(link) = self.link.take() else {
            return;
        };

        // The driver may already have exited on its own
        let _ = link.commands.send(Command::Disconnect);
        if let Err(e) = link.task.await {
            tracing::error!(error = %e, "Connection driver failed");
            self.state.send_modify(|s| s.mark_closed(None));
        }
    }

    /// Wait until the state satisfies `predicate`
    pub async fn wait_for(
        &self,
        timeout: Duration,
        predicate: impl FnMut(&SessionDerivedState) -> bool,
    ) -> Result<SessionDerivedState> {
        let mut rx = self.state.subscribe();
        // Bound so the watch guard is released before `rx` drops
        let result = match tokio::time::timeout(timeout, rx.wait_for(predicate)).await {
            Ok(Ok(state)) => Ok(SessionDerivedState::clone(&state)),
            Ok(Err(_)) => Err(SessionError::NotConnected),
            Err(_) => Err(SessionError::Timeout(format!(
                "session state after {}ms",
                timeout.as_millis()
            ))),
        };
        result
    }

    /// Receiver for state changes
    pub fn subscribe(&self) -> watch::Receiver<SessionDerivedState> {
        self.state.subscribe()
    }

    /// Stream of snapshots, starting with the current one
    pub fn updates(&self) -> WatchStream<SessionDerivedState> {
        WatchStream::new(self.state.subscribe())
    }

    /// Copy of the full derived state
    pub fn snapshot(&self) -> SessionDerivedState {
        self.state.borrow().clone()
    }

    pub fn is_connected(&self) -> bool {
        self.state.borrow().is_connected
    }

    pub fn is_generating(&self) -> bool {
        self.state.borrow().is_generating
    }

    /// Event log in arrival order
    pub fn messages(&self) -> Vec<ProtocolEvent> {
        self.state.borrow().messages.clone()
    }

    pub fn agent_states(&self) -> AgentStates {
        self.state.borrow().agent_states
    }

    pub fn current_agent(&self) -> Option<AgentIdentity> {
        self.state.borrow().current_agent
    }

    pub fn current_phase(&self) -> Option<String> {
        self.state.borrow().current_phase.clone()
    }

    pub fn current_turn(&self) -> Option<u32> {
        self.state.borrow().current_turn
    }

    pub fn current_activity(&self) -> Option<String> {
        self.state.borrow().current_activity.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.state.borrow().session_id.clone()
    }

    /// In-progress text per agent
    pub fn streaming_messages(&self) -> HashMap<AgentIdentity, String> {
        self.state.borrow().streaming.to_map()
    }

    pub fn current_streaming_agent(&self) -> Option<AgentIdentity> {
        self.state.borrow().streaming.current()
    }

    pub fn connection_error(&self) -> Option<String> {
        self.state.borrow().connection_error.clone()
    }

    pub fn outcome(&self) -> Option<SessionOutcome> {
        self.state.borrow().outcome.clone()
    }

    /// Completed story text, once available
    pub fn story(&self) -> Option<String> {
        self.state.borrow().story().map(str::to_string)
    }
}

impl std::fmt::Debug for StorySession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.borrow();
        f.debug_struct("StorySession")
            .field("transport", &self.transport.name())
            .field("url", &self.config.ws_url())
            .field("is_connected", &state.is_connected)
            .field("is_generating", &state.is_generating)
            .field("messages", &state.messages.len())
            .finish()
    }
}

impl Drop for StorySession {
    fn drop(&mut self) {
        if let Some(link) = self.link.take() {
            let _ = link.commands.send(Command::Disconnect);
        }
    }
}
