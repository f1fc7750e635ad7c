//! Derived session state and the reducer that maintains it
//!
//! `SessionDerivedState::apply` folds one [`ProtocolEvent`] into the
//! state. It never fails: every event kind is handled, and unknown kinds
//! are appended to the log without further effect.
//!
//! # Final-message exclusivity
//!
//! When an agent publishes a final `agent_message`, that agent is shown as
//! `writing` and the other two are forced to `waiting`, regardless of what
//! their last `agent_update` said. This is a display policy, not something
//! the backend guarantees; a following `agent_update` overrides it.

use crate::event::ProtocolEvent;
use crate::streaming::StreamingBuffers;
use crate::types::{AgentIdentity, AgentStates};

/// How a generation run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    Completed {
        story: String,
        session_id: Option<String>,
    },
    Failed {
        message: String,
    },
}

/// Everything the presentation layer can observe about a session
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SessionDerivedState {
    /// Append-only log of received events, in arrival order
    pub messages: Vec<ProtocolEvent>,

    pub agent_states: AgentStates,

    /// Last agent that appeared in an agent-bearing event
    pub current_agent: Option<AgentIdentity>,

    /// Highest `turn` seen on any `agent_message`
    pub current_turn: Option<u32>,

    /// Last non-empty `phase` seen on any `agent_message`
    pub current_phase: Option<String>,

    /// Latest `activity` string from an `agent_update`
    pub current_activity: Option<String>,

    pub session_id: Option<String>,

    pub streaming: StreamingBuffers,

    pub is_generating: bool,

    pub is_connected: bool,

    /// Set once the run completes or fails
    pub outcome: Option<SessionOutcome>,

    /// Last connection-level failure, for display
    pub connection_error: Option<String>,
}

impl SessionDerivedState {
    /// Fold one event into the state
    pub fn apply(&mut self, event: ProtocolEvent) {
        if let Some(agent) = event.agent() {
            self.current_agent = Some(agent);
        }

        match &event {
            ProtocolEvent::Status { .. } | ProtocolEvent::Unknown { .. } => {}

            ProtocolEvent::AgentUpdate {
                agent,
                state,
                activity,
            } => {
                self.agent_states.set(*agent, *state);
                if let Some(activity) = activity {
                    self.current_activity = Some(activity.clone());
                }
            }

            ProtocolEvent::AgentMessage {
                agent, turn, phase, ..
            } => {
                self.streaming.finalize(*agent);
                self.agent_states.highlight(*agent);
                if let Some(turn) = turn {
                    self.current_turn = Some(self.current_turn.map_or(*turn, |t| t.max(*turn)));
                }
                if let Some(phase) = phase.as_ref().filter(|p| !p.is_empty()) {
                    self.current_phase = Some(phase.clone());
                }
            }

            ProtocolEvent::AgentStreamChunk { agent, chunk } => {
                if !chunk.is_empty() {
                    self.streaming.push_chunk(*agent, chunk);
                }
            }

            ProtocolEvent::SessionCreated { session_id } => {
                self.session_id = Some(session_id.clone());
            }

            // Handshake signal, consumed by the connection driver
            ProtocolEvent::AuthSuccess { .. } => return,

            ProtocolEvent::Completed { story, session_id } => {
                if let Some(id) = session_id {
                    self.session_id = Some(id.clone());
                }
                self.outcome = Some(SessionOutcome::Completed {
                    story: story.clone(),
                    session_id: self.session_id.clone(),
                });
                self.finish_run();
            }

            ProtocolEvent::Error { message } => {
                self.outcome = Some(SessionOutcome::Failed {
                    message: message.clone(),
                });
                self.finish_run();
            }
        }

        self.messages.push(event);
    }

    /// Fresh state for a new generation run on an open connection
    pub(crate) fn begin_run(&mut self) {
        *self = Self {
            is_connected: self.is_connected,
            is_generating: true,
            ..Self::default()
        };
    }

    /// Transport went away
    pub(crate) fn mark_closed(&mut self, error: Option<String>) {
        self.is_connected = false;
        self.is_generating = false;
        self.streaming.clear();
        if error.is_some() {
            self.connection_error = error;
        }
    }

    fn finish_run(&mut self) {
        self.agent_states.reset();
        self.current_agent = None;
        self.current_phase = None;
        self.streaming.clear();
        self.is_generating = false;
    }

    /// Completed story, if the run finished successfully
    pub fn story(&self) -> Option<&str> {
        match &self.outcome {
            Some(SessionOutcome::Completed { story, .. }) => Some(story.as_str()),
            _ => None,
        }
    }

    /// Number of finalized agent messages in the log
    pub fn agent_message_count(&self) -> usize {
        self.messages
            .iter()
            .filter(|e| matches!(e, ProtocolEvent::AgentMessage { .. }))
            .count()
    }
}
