//! Wire protocol frames
//!
//! Inbound frames are JSON objects discriminated by a required `type`
//! field. Known kinds deserialize into a [`ProtocolEvent`] variant;
//! kinds this client does not know yet are kept as
//! [`ProtocolEvent::Unknown`] so newer backends do not break older clients.

use crate::error::{Result, SessionError};
use crate::types::{AgentActivityState, AgentIdentity, StoryGenerationParams};
use serde::Deserialize;
use std::fmt;

/// Every `type` value this client understands
const KNOWN_KINDS: [&str; 8] = [
    "status",
    "agent_update",
    "agent_message",
    "agent_stream_chunk",
    "session_created",
    "auth_success",
    "completed",
    "error",
];

/// A single inbound protocol event
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProtocolEvent {
    /// Backend progress notice
    Status { message: String },

    /// An agent changed activity
    AgentUpdate {
        agent: AgentIdentity,
        state: AgentActivityState,
        /// Human-readable description of what the agent is doing
        #[serde(default)]
        activity: Option<String>,
    },

    /// Finalized message from an agent
    AgentMessage {
        agent: AgentIdentity,
        message: String,
        /// Absent when the backend sent no usable turn number
        #[serde(default, deserialize_with = "lenient_turn")]
        turn: Option<u32>,
        #[serde(default)]
        phase: Option<String>,
    },

    /// Incremental fragment of an in-progress agent message
    AgentStreamChunk { agent: AgentIdentity, chunk: String },

    /// Backend assigned a session id to this generation run
    SessionCreated { session_id: String },

    /// Credential accepted
    AuthSuccess {
        #[serde(default)]
        message: Option<String>,
    },

    /// Generation finished with a story
    Completed {
        story: String,
        #[serde(default)]
        session_id: Option<String>,
    },

    /// Generation failed
    Error { message: String },

    /// Frame with a `type` this client does not recognize
    #[serde(skip)]
    Unknown {
        kind: String,
        payload: serde_json::Value,
    },
}

impl ProtocolEvent {
    /// Parse one inbound text frame
    pub fn parse(text: &str) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_str(text)?;

        let kind = value
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or_else(|| SessionError::Protocol("frame has no string `type` field".to_string()))?
            .to_string();

        if KNOWN_KINDS.contains(&kind.as_str()) {
            serde_json::from_value(value)
                .map_err(|e| SessionError::Protocol(format!("malformed '{}' frame: {}", kind, e)))
        } else {
            Ok(Self::Unknown {
                kind,
                payload: value,
            })
        }
    }

    /// The wire `type` of this event
    pub fn kind(&self) -> &str {
        match self {
            Self::Status { .. } => "status",
            Self::AgentUpdate { .. } => "agent_update",
            Self::AgentMessage { .. } => "agent_message",
            Self::AgentStreamChunk { .. } => "agent_stream_chunk",
            Self::SessionCreated { .. } => "session_created",
            Self::AuthSuccess { .. } => "auth_success",
            Self::Completed { .. } => "completed",
            Self::Error { .. } => "error",
            Self::Unknown { kind, .. } => kind.as_str(),
        }
    }

    /// The agent this event concerns, if any
    pub fn agent(&self) -> Option<AgentIdentity> {
        match self {
            Self::AgentUpdate { agent, .. }
            | Self::AgentMessage { agent, .. }
            | Self::AgentStreamChunk { agent, .. } => Some(*agent),
            _ => None,
        }
    }

    /// Displayable text carried by the event
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Status { message }
            | Self::AgentMessage { message, .. }
            | Self::Error { message } => Some(message.as_str()),
            Self::AgentStreamChunk { chunk, .. } => Some(chunk.as_str()),
            Self::Completed { story, .. } => Some(story.as_str()),
            Self::AgentUpdate { activity, .. } => activity.as_deref(),
            _ => None,
        }
    }

    /// Whether this event ends the current generation run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Error { .. })
    }
}

/// Outbound frame
#[derive(Clone, PartialEq)]
pub enum ClientFrame {
    /// First frame after the transport opens: `{"type":"auth","token":...}`
    Auth { token: String },

    /// Bare generation parameters, no `type` discriminator
    Generate(StoryGenerationParams),
}

impl ClientFrame {
    /// Short name used in logs and errors
    pub fn name(&self) -> &'static str {
        match self {
            Self::Auth { .. } => "auth",
            Self::Generate(_) => "generate",
        }
    }

    /// Encode to the JSON text sent over the wire
    pub fn encode(&self) -> Result<String> {
        let text = match self {
            Self::Auth { token } => serde_json::to_string(&serde_json::json!({
                "type": "auth",
                "token": token,
            }))?,
            Self::Generate(params) => serde_json::to_string(params)?,
        };
        Ok(text)
    }
}

/// Accept any non-negative integral number as a turn; anything else is
/// treated as absent so the message itself is kept.
fn lenient_turn<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(turn_from_value))
}

fn turn_from_value(value: &serde_json::Value) -> Option<u32> {
    if let Some(n) = value.as_u64() {
        return u32::try_from(n).ok();
    }
    let f = value.as_f64()?;
    if f.is_finite() && f >= 0.0 && f.fract() == 0.0 && f <= f64::from(u32::MAX) {
        Some(f as u32)
    } else {
        tracing::debug!(turn = %value, "Ignoring unusable turn number");
        None
    }
}

impl fmt::Debug for ClientFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Auth { .. } => f
                .debug_struct("Auth")
                .field("token", &"<redacted>")
                .finish(),
            Self::Generate(params) => f.debug_tuple("Generate").field(params).finish(),
        }
    }
}
