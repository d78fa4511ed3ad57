//! Session types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Conversation mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatMode {
    /// Guided, one step at a time.
    #[default]
    StepByStep,
    /// Whole procedure overview up front.
    Roadmap,
}

impl ChatMode {
    /// Wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::StepByStep => "step_by_step",
            Self::Roadmap => "roadmap",
        }
    }

    /// Human-readable label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::StepByStep => "step-by-step",
            Self::Roadmap => "roadmap",
        }
    }
}

impl fmt::Display for ChatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChatMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "step_by_step" | "step" => Ok(Self::StepByStep),
            "roadmap" => Ok(Self::Roadmap),
            other => Err(format!("unknown chat mode: {other}")),
        }
    }
}

/// Session lifecycle as reported by the backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    /// Conversation in progress.
    #[default]
    Active,
    /// Porting procedure finished.
    Completed,
    /// Handed off to a human.
    Escalated,
    /// Timed out on the backend.
    Expired,
    /// Status string this client does not know.
    #[serde(other)]
    Unknown,
}

/// A chat session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    /// Locally generated identifier.
    #[serde(default)]
    pub id: String,
    /// Opaque session credential.
    #[serde(default)]
    pub session_token: String,
    /// Conversation mode.
    #[serde(default)]
    pub mode: ChatMode,
    /// Current procedure step.
    #[serde(default)]
    pub current_step: String,
    /// Lifecycle status.
    #[serde(default)]
    pub status: SessionStatus,
    /// Creation instant.
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

/// Step name for a freshly started session.
pub const INITIAL_STEP: &str = "welcome";

impl Session {
    /// New local session with a random id.
    pub fn new(session_token: impl Into<String>, mode: ChatMode) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            session_token: session_token.into(),
            mode,
            current_step: INITIAL_STEP.to_string(),
            status: SessionStatus::Active,
            created_at: Utc::now(),
        }
    }

    /// Wholesale replacement by backend session info.
    ///
    /// The local `id` always survives; a token the backend omitted is carried
    /// over from `previous`.
    #[must_use]
    pub fn replaced_by(previous: Option<&Self>, mut info: Self) -> Self {
        if let Some(prev) = previous {
            info.id.clone_from(&prev.id);
            if info.session_token.is_empty() {
                info.session_token.clone_from(&prev.session_token);
            }
        }
        info
    }
}
