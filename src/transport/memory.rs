//! In-memory transport
//!
//! Stands in for a backend in tests and single-process use. The handle is
//! cheap to clone; every clone sees the same connection. Frames pushed
//! with [`MemoryTransport::push_frame`] are delivered to the most recently
//! opened connection, and everything the client sends is recorded.

use super::{FrameSink, FrameSource, Transport, TransportEvent, ABNORMAL_CLOSURE};
use crate::error::{Result, SessionError};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::mpsc;

#[derive(Default)]
struct Shared {
    opens: AtomicUsize,
    closes: AtomicUsize,
    refuse: AtomicBool,
    urls: Mutex<Vec<String>>,
    sent: Mutex<Vec<String>>,
    inbound: Mutex<Option<mpsc::UnboundedSender<TransportEvent>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// In-memory transport with a scriptable server side
#[derive(Clone, Default)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("opens", &self.open_count())
            .field("closes", &self.close_count())
            .finish_non_exhaustive()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent `open` calls fail (or succeed again)
    pub fn refuse_connections(&self, refuse: bool) {
        self.shared.refuse.store(refuse, Ordering::SeqCst);
    }

    /// Deliver a text frame to the open connection
    ///
    /// Returns `false` when no connection is open.
    pub fn push_frame(&self, text: impl Into<String>) -> bool {
        self.push_event(TransportEvent::Text(text.into()))
    }

    /// Deliver a JSON value as a text frame
    pub fn push_json(&self, value: serde_json::Value) -> bool {
        self.push_frame(value.to_string())
    }

    /// Deliver a transport error to the open connection
    pub fn push_error(&self, message: impl Into<String>) -> bool {
        self.push_event(TransportEvent::Error(message.into()))
    }

    /// Close the open connection from the server side
    pub fn close_from_server(&self, code: u16, reason: impl Into<String>) -> bool {
        let delivered = self.push_event(TransportEvent::Closed {
            code,
            reason: reason.into(),
        });
        lock(&self.shared.inbound).take();
        delivered
    }

    /// Drop the open connection without a close handshake
    pub fn drop_connection(&self) -> bool {
        self.close_from_server(ABNORMAL_CLOSURE, "connection dropped")
    }

    fn push_event(&self, event: TransportEvent) -> bool {
        match lock(&self.shared.inbound).as_ref() {
            Some(tx) => tx.send(event).is_ok(),
            None => false,
        }
    }

    /// Number of successful `open` calls
    pub fn open_count(&self) -> usize {
        self.shared.opens.load(Ordering::SeqCst)
    }

    /// Number of client-side closes
    pub fn close_count(&self) -> usize {
        self.shared.closes.load(Ordering::SeqCst)
    }

    /// URLs passed to `open`, in order
    pub fn opened_urls(&self) -> Vec<String> {
        lock(&self.shared.urls).clone()
    }

    /// Every frame the client has sent, across all connections
    pub fn sent_frames(&self) -> Vec<String> {
        lock(&self.shared.sent).clone()
    }

    /// Sent frames parsed as JSON; unparseable frames are skipped
    pub fn sent_json(&self) -> Vec<serde_json::Value> {
        self.sent_frames()
            .iter()
            .filter_map(|f| serde_json::from_str(f).ok())
            .collect()
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    async fn open(&self, url: &str) -> Result<(Box<dyn FrameSink>, Box<dyn FrameSource>)> {
        if self.shared.refuse.load(Ordering::SeqCst) {
            return Err(SessionError::Connection(format!("{}: connection refused", url)));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        *lock(&self.shared.inbound) = Some(tx);
        lock(&self.shared.urls).push(url.to_string());
        self.shared.opens.fetch_add(1, Ordering::SeqCst);

        tracing::debug!(url = %url, "Memory connection opened");

        Ok((
            Box::new(MemorySink {
                shared: self.shared.clone(),
                closed: false,
            }),
            Box::new(MemorySource { inbound: rx }),
        ))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

struct MemorySink {
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl FrameSink for MemorySink {
    async fn send(&mut self, text: String) -> Result<()> {
        if self.closed {
            return Err(SessionError::Send {
                frame: "text".to_string(),
                reason: "connection closed".to_string(),
            });
        }
        lock(&self.shared.sent).push(text);
        Ok(())
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.shared.closes.fetch_add(1, Ordering::SeqCst);
            lock(&self.shared.inbound).take();
        }
        Ok(())
    }
}

struct MemorySource {
    inbound: mpsc::UnboundedReceiver<TransportEvent>,
}

#[async_trait]
impl FrameSource for MemorySource {
    async fn next(&mut self) -> Option<TransportEvent> {
        self.inbound.recv().await
    }
}
