//! # story-session
//!
//! Client session for a real-time, multi-agent story generation backend.
//!
//! ## Overview
//!
//! A backend runs three collaborating agents (Writer, Reader, Expert) and
//! streams their progress over a duplex socket. `story-session` opens that
//! socket, authenticates, sends a generation request and folds every
//! inbound event into a derived state the presentation layer can read:
//! the message log, per-agent activity, the current turn and phase, and
//! partial text that is still streaming in.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use story_session::{SessionConfig, StaticToken, StoryGenerationParams, StorySession};
//! use story_session::transport::ws::WebSocketTransport;
//! use std::time::Duration;
//!
//! # async fn example() -> story_session::Result<()> {
//! let config = SessionConfig::default().with_api_url("https://stories.example.org");
//! let mut session = StorySession::new(config, WebSocketTransport::new(), StaticToken::new("jwt"));
//!
//! session.connect()?;
//! session.wait_for(Duration::from_secs(10), |s| s.is_connected).await?;
//!
//! session.generate_story(StoryGenerationParams::new("scp", 3).with_protagonist("Dr. Bright"))?;
//!
//! let done = session.wait_for(Duration::from_secs(600), |s| s.outcome.is_some()).await?;
//! println!("{}", done.story().unwrap_or("generation failed"));
//!
//! session.disconnect().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Transports
//!
//! - **ws**: WebSocket via tokio-tungstenite
//! - **memory**: in-process transport with a scriptable server side, for tests
//!
//! ## Architecture
//!
//! - **Transport** trait: opens a connection and returns its sink and source halves
//! - **ConnectionDriver**: one task per connection, runs the auth handshake
//!   and feeds inbound events to the reducer
//! - **SessionDerivedState**: reducer output, published through a watch channel
//! - **StorySession**: facade with commands and read-only projections

pub mod auth;
mod connection;
pub mod config;
pub mod error;
pub mod event;
pub mod export;
pub mod session;
pub mod state;
pub mod streaming;
pub mod transport;
pub mod types;

// Re-export core types
pub use auth::{FnTokenProvider, StaticToken, TokenProvider};
pub use config::SessionConfig;
pub use error::{Result, SessionError};
pub use event::{ClientFrame, ProtocolEvent};
pub use export::{
    export_filename, format_agent_logs, ExportFormat, ExportOptions, SessionMetadata,
};
pub use session::StorySession;
pub use state::{SessionDerivedState, SessionOutcome};
pub use streaming::StreamingBuffers;
pub use transport::{FrameSink, FrameSource, Transport, TransportEvent};
pub use types::{
    AgentActivityState, AgentIdentity, AgentStates, StoryGenerationParams, ThemeOptions,
};

// Re-export transports for convenience
pub use transport::memory::MemoryTransport;
pub use transport::ws::WebSocketTransport;
