use anyhow::{bail, Context, Result};
use std::time::Duration;

/// Longest accepted resolution window: one year.
pub const MAX_RESOLUTION_HOURS: i64 = 24 * 365;

pub const DEFAULT_QUICK_REPLIES: [&str; 3] = ["Thanks!", "I need more help", "Got it"];

/// Timing and canned text for the scripted support conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct SupportConfig {
    /// Delay before the scripted acknowledgment of a user message
    pub reply_delay: Duration,
    /// Delay before the "live agent" follow-up after an escalation
    pub live_agent_delay: Duration,
    /// How far ahead of ticket creation the target resolution time is set
    pub resolution_window: chrono::Duration,
    pub quick_replies: Vec<String>,
}

impl Default for SupportConfig {
    fn default() -> Self {
        Self {
            reply_delay: Duration::from_millis(1000),
            live_agent_delay: Duration::from_millis(1000),
            resolution_window: chrono::Duration::hours(24),
            quick_replies: DEFAULT_QUICK_REPLIES.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl SupportConfig {
    /// Read overrides from `HELPDESK_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();

        if let Some(ms) = lookup("HELPDESK_REPLY_DELAY_MS") {
            config.reply_delay = Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("Invalid HELPDESK_REPLY_DELAY_MS: {}", ms))?,
            );
        }

        if let Some(ms) = lookup("HELPDESK_AGENT_DELAY_MS") {
            config.live_agent_delay = Duration::from_millis(
                ms.trim()
                    .parse()
                    .with_context(|| format!("Invalid HELPDESK_AGENT_DELAY_MS: {}", ms))?,
            );
        }

        if let Some(hours) = lookup("HELPDESK_RESOLUTION_HOURS") {
            let hours: i64 = hours
                .trim()
                .parse()
                .with_context(|| format!("Invalid HELPDESK_RESOLUTION_HOURS: {}", hours))?;
            if !(0..=MAX_RESOLUTION_HOURS).contains(&hours) {
                bail!(
                    "Invalid HELPDESK_RESOLUTION_HOURS: {} (expected 0 to {})",
                    hours,
                    MAX_RESOLUTION_HOURS
                );
            }
            config.resolution_window = chrono::Duration::try_hours(hours)
                .with_context(|| format!("Invalid HELPDESK_RESOLUTION_HOURS: {}", hours))?;
        }

        if let Some(list) = lookup("HELPDESK_QUICK_REPLIES") {
            let replies: Vec<String> = list
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if !replies.is_empty() {
                config.quick_replies = replies;
            }
        }

        Ok(config)
    }
}
