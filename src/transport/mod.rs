//! Transport traits for the duplex text channel under a session
//!
//! A transport opens one connection per call and hands back its two
//! halves: a [`FrameSink`] for outbound text frames and a [`FrameSource`]
//! yielding inbound [`TransportEvent`]s. The connection driver owns both
//! halves for the lifetime of the connection.

use crate::error::Result;
use async_trait::async_trait;

pub mod memory;
pub mod ws;

/// Close code for a connection that dropped without a close handshake
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Close code for a normal, requested close
pub const NORMAL_CLOSURE: u16 = 1000;

/// Opens connections to a backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open a connection to `url`
    async fn open(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)>;

    /// Transport name (e.g., "websocket", "memory")
    fn name(&self) -> &str;
}

/// Outbound half of an open connection
#[async_trait]
pub trait FrameSink: Send {
    /// Send one text frame
    async fn send(&mut self, text: String) -> Result<()>;

    /// Close the connection; closing twice is not an error
    async fn close(&mut self) -> Result<()>;
}

/// Inbound half of an open connection
#[async_trait]
pub trait FrameSource: Send {
    /// Next inbound event, or `None` once the connection is gone
    async fn next(&mut self) -> Option<TransportEvent>;
}

/// Something that happened on the inbound side of a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// One text frame
    Text(String),

    /// Transport-level failure; ends the connection
    Error(String),

    /// Connection closed by the peer or the network
    Closed { code: u16, reason: String },
}

impl TransportEvent {
    /// Whether a close with this event's code was abnormal
    pub fn is_abnormal_close(&self) -> bool {
        matches!(self, Self::Closed { code, .. } if *code == ABNORMAL_CLOSURE)
    }
}
