//! Agent conversation export
//!
//! Renders the finalized `agent_message` entries of a session log as plain
//! text, JSON or Markdown. Every other event kind is left out.

use crate::error::Result;
use crate::event::ProtocolEvent;
use crate::types::AgentIdentity;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const RULE_WIDTH: usize = 60;

/// Output format of an export
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Text,
    Json,
    Markdown,
}

impl ExportFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Text => "txt",
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Text => "text/plain",
            Self::Json => "application/json",
            Self::Markdown => "text/markdown",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportOptions {
    pub format: ExportFormat,

    /// Emit the session header; JSON exports carry `null` metadata when off
    pub include_metadata: bool,
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Text,
            include_metadata: true,
        }
    }
}

impl ExportOptions {
    pub fn new(format: ExportFormat) -> Self {
        Self {
            format,
            ..Default::default()
        }
    }

    pub fn without_metadata(mut self) -> Self {
        self.include_metadata = false;
        self
    }
}

/// Descriptive header for an exported session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionMetadata {
    pub theme: String,
    pub pages: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protagonist: Option<String>,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_messages: usize,
    pub total_turns: u32,
}

impl SessionMetadata {
    /// Elapsed time as `Xm Ys`, when the session has ended
    pub fn duration_label(&self) -> Option<String> {
        let end = self.end_time?;
        let millis = (end - self.start_time).num_milliseconds().max(0);
        let secs = (millis + 500) / 1000;
        Some(format!("{}m {}s", secs / 60, secs % 60))
    }
}

/// One exported agent message
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
struct ExportedMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    agent: AgentIdentity,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    turn: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    phase: Option<&'a str>,
}

fn agent_messages(messages: &[ProtocolEvent]) -> impl Iterator<Item = ExportedMessage<'_>> {
    messages.iter().filter_map(|event| match event {
        ProtocolEvent::AgentMessage {
            agent,
            message,
            turn,
            phase,
        } => Some(ExportedMessage {
            kind: "agent_message",
            agent: *agent,
            message: message.as_str(),
            turn: *turn,
            phase: phase.as_deref(),
        }),
        _ => None,
    })
}

/// Render the agent conversation in the requested format
pub fn format_agent_logs(
    messages: &[ProtocolEvent],
    metadata: Option<&SessionMetadata>,
    options: ExportOptions,
) -> Result<String> {
    let metadata = metadata.filter(|_| options.include_metadata);
    match options.format {
        ExportFormat::Text => Ok(format_text(messages, metadata)),
        ExportFormat::Json => format_json(messages, metadata),
        ExportFormat::Markdown => Ok(format_markdown(messages, metadata)),
    }
}

fn timestamp(time: &DateTime<Utc>) -> String {
    time.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_text(messages: &[ProtocolEvent], metadata: Option<&SessionMetadata>) -> String {
    let heavy = "=".repeat(RULE_WIDTH);
    let light = "-".repeat(RULE_WIDTH);
    let mut out = String::new();

    out.push_str(&format!("{heavy}\nSTORY WRITER - AGENT INTERACTION LOG\n{heavy}\n\n"));

    if let Some(meta) = metadata {
        out.push_str("SESSION INFORMATION\n");
        out.push_str(&"-".repeat(RULE_WIDTH / 2));
        out.push('\n');
        out.push_str(&format!("Theme: {}\n", meta.theme));
        out.push_str(&format!("Pages: {}\n", meta.pages));
        if let Some(protagonist) = &meta.protagonist {
            out.push_str(&format!("Protagonist: {}\n", protagonist));
        }
        out.push_str(&format!("Start Time: {}\n", timestamp(&meta.start_time)));
        if let (Some(end), Some(duration)) = (&meta.end_time, meta.duration_label()) {
            out.push_str(&format!("End Time: {}\n", timestamp(end)));
            out.push_str(&format!("Duration: {}\n", duration));
        }
        out.push_str(&format!("Total Messages: {}\n", meta.total_messages));
        out.push_str(&format!("Total Turns: {}\n", meta.total_turns));
        out.push_str(&format!("\n{heavy}\n\n"));
    }

    out.push_str(&format!("AGENT CONVERSATION\n{heavy}\n\n"));

    for msg in agent_messages(messages) {
        out.push_str(&format!("[{}]", msg.agent));
        if let Some(turn) = msg.turn.filter(|t| *t > 0) {
            out.push_str(&format!(" - Turn {}", turn));
        }
        if let Some(phase) = msg.phase.filter(|p| !p.is_empty()) {
            out.push_str(&format!(" - Phase: {}", phase));
        }
        out.push('\n');
        out.push_str(msg.message);
        out.push('\n');
        out.push_str(&format!("{light}\n\n"));
    }

    out
}

fn format_json(messages: &[ProtocolEvent], metadata: Option<&SessionMetadata>) -> Result<String> {
    let export = serde_json::json!({
        "metadata": metadata,
        "messages": agent_messages(messages).collect::<Vec<_>>(),
        "exportedAt": Utc::now(),
    });
    Ok(serde_json::to_string_pretty(&export)?)
}

fn format_markdown(messages: &[ProtocolEvent], metadata: Option<&SessionMetadata>) -> String {
    let mut out = String::from("# Story Writer - Agent Interaction Log\n\n");

    if let Some(meta) = metadata {
        out.push_str("## Session Information\n\n");
        out.push_str(&format!("- **Theme**: {}\n", meta.theme));
        out.push_str(&format!("- **Pages**: {}\n", meta.pages));
        if let Some(protagonist) = &meta.protagonist {
            out.push_str(&format!("- **Protagonist**: {}\n", protagonist));
        }
        out.push_str(&format!("- **Start Time**: {}\n", timestamp(&meta.start_time)));
        if let (Some(end), Some(duration)) = (&meta.end_time, meta.duration_label()) {
            out.push_str(&format!("- **End Time**: {}\n", timestamp(end)));
            out.push_str(&format!("- **Duration**: {}\n", duration));
        }
        out.push_str(&format!("- **Total Messages**: {}\n", meta.total_messages));
        out.push_str(&format!("- **Total Turns**: {}\n", meta.total_turns));
        out.push_str("\n---\n\n");
    }

    out.push_str("## Agent Conversation\n\n");

    let mut current_phase: Option<&str> = None;
    for msg in agent_messages(messages) {
        if let Some(phase) = msg.phase.filter(|p| !p.is_empty()) {
            if current_phase != Some(phase) {
                current_phase = Some(phase);
                out.push_str(&format!("### Phase: {}\n\n", phase));
            }
        }

        out.push_str(&format!("#### {}", msg.agent));
        if let Some(turn) = msg.turn.filter(|t| *t > 0) {
            out.push_str(&format!(" (Turn {})", turn));
        }
        out.push_str("\n\n");

        let quoted: Vec<String> = msg
            .message
            .split('\n')
            .map(|line| {
                if line.trim().is_empty() {
                    ">".to_string()
                } else {
                    format!("> {}", line)
                }
            })
            .collect();
        out.push_str(&quoted.join("\n"));
        out.push_str("\n\n");
    }

    out
}

/// Download name for an export: `story_log_<timestamp>_<theme>.<ext>`
pub fn export_filename(theme: &str, format: ExportFormat) -> String {
    export_filename_at(theme, format, Utc::now())
}

/// [`export_filename`] with an explicit timestamp
pub fn export_filename_at(theme: &str, format: ExportFormat, at: DateTime<Utc>) -> String {
    format!(
        "story_log_{}_{}.{}",
        at.format("%Y-%m-%dT%H-%M-%S"),
        sanitize_theme(theme),
        format.extension()
    )
}

/// Lowercase, runs of non-alphanumerics collapsed to `_`, at most 30 chars
fn sanitize_theme(theme: &str) -> String {
    let mut out = String::with_capacity(theme.len());
    let mut in_run = false;
    for c in theme.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            in_run = false;
        } else if !in_run {
            out.push('_');
            in_run = true;
        }
    }
    out.truncate(30);
    out
}
