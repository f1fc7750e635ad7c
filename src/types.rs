//! Core session types for story-session
//!
//! Agent identities and activity states use the wire spelling
//! (`"Writer"`, `"thinking"`); outbound parameters use camelCase keys.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One of the three collaborating agents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AgentIdentity {
    Writer,
    Reader,
    Expert,
}

impl AgentIdentity {
    /// Every agent, in display order
    pub const ALL: [AgentIdentity; 3] = [Self::Writer, Self::Reader, Self::Expert];

    /// Wire name of the agent
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Writer => "Writer",
            Self::Reader => "Reader",
            Self::Expert => "Expert",
        }
    }
}

impl fmt::Display for AgentIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-agent activity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentActivityState {
    Thinking,
    Writing,
    #[default]
    Waiting,
}

/// Activity state of all three agents
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AgentStates {
    pub writer: AgentActivityState,
    pub reader: AgentActivityState,
    pub expert: AgentActivityState,
}

impl AgentStates {
    /// Activity of one agent
    pub fn get(&self, agent: AgentIdentity) -> AgentActivityState {
        match agent {
            AgentIdentity::Writer => self.writer,
            AgentIdentity::Reader => self.reader,
            AgentIdentity::Expert => self.expert,
        }
    }

    /// Set the activity of one agent, leaving the others untouched
    pub fn set(&mut self, agent: AgentIdentity, state: AgentActivityState) {
        match agent {
            AgentIdentity::Writer => self.writer = state,
            AgentIdentity::Reader => self.reader = state,
            AgentIdentity::Expert => self.expert = state,
        }
    }

    /// Mark `agent` as writing and every other agent as waiting
    pub fn highlight(&mut self, agent: AgentIdentity) {
        for other in AgentIdentity::ALL {
            let state = if other == agent {
                AgentActivityState::Writing
            } else {
                AgentActivityState::Waiting
            };
            self.set(other, state);
        }
    }

    /// Put every agent back to waiting
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    /// `(agent, state)` pairs in display order
    pub fn iter(&self) -> impl Iterator<Item = (AgentIdentity, AgentActivityState)> + '_ {
        AgentIdentity::ALL.into_iter().map(|agent| (agent, self.get(agent)))
    }
}

/// Generation request sent to the backend
///
/// Serialized without a `type` discriminator, unlike every other frame
/// on the connection. The backend reads the bare object as parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryGenerationParams {
    /// Free-form story prompt
    pub theme: String,

    /// Requested story length in pages
    pub pages: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protagonist: Option<String>,

    /// Model identifier (e.g. `anthropic/claude-sonnet-4-20250514`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Universe id (`scp`, `fantasy`, `noir`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ui_theme: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub theme_options: Option<ThemeOptions>,
}

impl StoryGenerationParams {
    pub fn new(theme: impl Into<String>, pages: u32) -> Self {
        Self {
            theme: theme.into(),
            pages,
            protagonist: None,
            model: None,
            ui_theme: None,
            theme_options: None,
        }
    }

    pub fn with_protagonist(mut self, protagonist: impl Into<String>) -> Self {
        self.protagonist = Some(protagonist.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_ui_theme(mut self, ui_theme: impl Into<String>) -> Self {
        self.ui_theme = Some(ui_theme.into());
        self
    }

    pub fn with_theme_options(mut self, options: ThemeOptions) -> Self {
        self.theme_options = Some(options);
        self
    }
}

/// Universe-specific generation sliders, each in `0..=100`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ThemeOptions {
    Scp(ScpOptions),
    Fantasy(FantasyOptions),
    Cyberpunk(CyberpunkOptions),
    Romance(RomanceOptions),
    Noir(NoirOptions),
    SciFi(SciFiOptions),
}

impl ThemeOptions {
    /// Default sliders for a universe id; unknown ids get the SCP set
    pub fn defaults_for(theme_id: &str) -> Self {
        match theme_id {
            "fantasy" => Self::Fantasy(FantasyOptions {
                magic_level: 60,
                tone: 50,
                quest_scale: 50,
                time_period: 20,
            }),
            "cyberpunk" => Self::Cyberpunk(CyberpunkOptions {
                tech_level: 70,
                dystopia_level: 60,
                perspective: 30,
                augmentation: 50,
            }),
            "romance" => Self::Romance(RomanceOptions {
                heat_level: 40,
                drama_level: 50,
                relationship_type: 50,
                setting_era: 50,
            }),
            "noir" => Self::Noir(NoirOptions {
                grittiness: 60,
                mystery_complexity: 50,
                time_period: 40,
                moral_ambiguity: 70,
            }),
            "scifi" => Self::SciFi(SciFiOptions {
                tech_level: 60,
                science_type: 50,
                scope: 50,
                outlook: 50,
            }),
            _ => Self::Scp(ScpOptions {
                horror_level: 40,
                containment_class: 30,
                redaction_level: 50,
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScpOptions {
    pub horror_level: u8,
    pub containment_class: u8,
    pub redaction_level: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FantasyOptions {
    pub magic_level: u8,
    pub tone: u8,
    pub quest_scale: u8,
    pub time_period: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CyberpunkOptions {
    pub tech_level: u8,
    pub dystopia_level: u8,
    pub perspective: u8,
    pub augmentation: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RomanceOptions {
    pub heat_level: u8,
    pub drama_level: u8,
    pub relationship_type: u8,
    pub setting_era: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NoirOptions {
    pub grittiness: u8,
    pub mystery_complexity: u8,
    pub time_period: u8,
    pub moral_ambiguity: u8,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SciFiOptions {
    pub tech_level: u8,
    pub science_type: u8,
    pub scope: u8,
    pub outlook: u8,
}
