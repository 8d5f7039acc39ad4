use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Sender {
    User,
    Bot,
    Notice,
}

impl fmt::Display for Sender {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Sender::User => "You",
            Sender::Bot => "Support",
            Sender::Notice => "System",
        };
        write!(f, "{}", label)
    }
}

/// The issue a support ticket is opened for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Billing,
    Gameplay,
    Technical,
    Other,
}

impl IssueCategory {
    pub const ALL: [IssueCategory; 4] = [
        IssueCategory::Billing,
        IssueCategory::Gameplay,
        IssueCategory::Technical,
        IssueCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            IssueCategory::Billing => "billing",
            IssueCategory::Gameplay => "gameplay",
            IssueCategory::Technical => "technical",
            IssueCategory::Other => "other",
        }
    }

    /// "Other" issues skip the scripted conversation and go straight to a live agent.
    pub fn needs_live_agent(&self) -> bool {
        matches!(self, IssueCategory::Other)
    }
}

impl fmt::Display for IssueCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IssueCategory {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        IssueCategory::ALL
            .into_iter()
            .find(|c| c.as_str() == wanted)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "unknown issue category '{}' (expected billing, gameplay, technical or other)",
                    s.trim()
                )
            })
    }
}

/// Feedback a user left on a bot reply.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Helpfulness {
    #[default]
    Unset,
    Helpful,
    Unhelpful,
}

impl From<bool> for Helpfulness {
    fn from(helpful: bool) -> Self {
        if helpful {
            Helpfulness::Helpful
        } else {
            Helpfulness::Unhelpful
        }
    }
}
