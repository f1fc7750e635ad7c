//! Per-agent streaming buffers
//!
//! A buffer is created by the first chunk from an agent, grows with each
//! further chunk, and is retired the moment that agent's final message
//! arrives. The final message replaces the buffer as the displayed text,
//! so a buffer and the final message for the same agent never coexist.
//!
//! Chunks for one streaming span are assumed to arrive before that
//! agent's final message; out-of-order delivery is not repaired here.

use crate::types::AgentIdentity;
use std::collections::HashMap;

/// Partial text per agent plus the agent currently holding UI focus
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamingBuffers {
    buffers: HashMap<AgentIdentity, String>,

    /// Agent that emitted the most recent chunk
    current: Option<AgentIdentity>,
}

impl StreamingBuffers {
    /// Append a chunk to `agent`'s buffer, creating it if absent
    pub fn push_chunk(&mut self, agent: AgentIdentity, chunk: &str) {
        self.current = Some(agent);
        self.buffers.entry(agent).or_default().push_str(chunk);
    }

    /// Retire `agent`'s buffer because its final message arrived
    ///
    /// Returns the discarded partial text, if any. Other agents' buffers
    /// and the focus pointer (unless it pointed at `agent`) are untouched.
    pub fn finalize(&mut self, agent: AgentIdentity) -> Option<String> {
        if self.current == Some(agent) {
            self.current = None;
        }
        self.buffers.remove(&agent)
    }

    /// Drop every buffer and the focus pointer
    pub fn clear(&mut self) {
        self.buffers.clear();
        self.current = None;
    }

    /// Partial text for `agent`
    pub fn get(&self, agent: AgentIdentity) -> Option<&str> {
        self.buffers.get(&agent).map(String::as_str)
    }

    /// Agent that emitted the most recent chunk
    pub fn current(&self) -> Option<AgentIdentity> {
        self.current
    }

    pub fn contains(&self, agent: AgentIdentity) -> bool {
        self.buffers.contains_key(&agent)
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    /// Copy of every live buffer
    pub fn to_map(&self) -> HashMap<AgentIdentity, String> {
        self.buffers.clone()
    }
}
