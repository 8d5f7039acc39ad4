use crate::entity::{Helpfulness, IssueCategory, Sender};
use crate::error::{Result, SupportError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Number of user messages after which a live agent may be requested.
pub const ESCALATION_THRESHOLD: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub(crate) id: String,
    pub(crate) sender: Sender,
    pub(crate) body: String,
    pub(crate) sent_at: DateTime<Utc>,
    #[serde(default)]
    pub(crate) helpfulness: Helpfulness,
}

impl ChatMessage {
    pub fn new(sender: Sender, body: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            sender,
            body: body.into(),
            sent_at: Utc::now(),
            helpfulness: Helpfulness::Unset,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn sent_at(&self) -> DateTime<Utc> {
        self.sent_at
    }

    pub fn helpfulness(&self) -> Helpfulness {
        self.helpfulness
    }
}

/// Full in-memory state of one support conversation.
///
/// Fields are only writable inside the crate so the store stays the sole
/// owner of every mutation; callers read through the accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatSession {
    pub(crate) messages: Vec<ChatMessage>,
    pub(crate) selected_category: Option<IssueCategory>,
    pub(crate) ticket_id: Option<String>,
    pub(crate) target_resolution_time: Option<DateTime<Utc>>,
    pub(crate) interaction_count: u32,
    pub(crate) live_agent_requested: bool,
    pub(crate) is_open: bool,
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn selected_category(&self) -> Option<IssueCategory> {
        self.selected_category
    }

    pub fn ticket_id(&self) -> Option<&str> {
        self.ticket_id.as_deref()
    }

    pub fn target_resolution_time(&self) -> Option<DateTime<Utc>> {
        self.target_resolution_time
    }

    pub fn interaction_count(&self) -> u32 {
        self.interaction_count
    }

    pub fn live_agent_requested(&self) -> bool {
        self.live_agent_requested
    }

    pub fn is_open(&self) -> bool {
        self.is_open
    }

    pub fn escalation_eligible(&self) -> bool {
        self.interaction_count >= ESCALATION_THRESHOLD
    }

    /// The text input is hidden for "other" issues, which only a live agent handles.
    pub fn input_enabled(&self) -> bool {
        matches!(self.selected_category, Some(c) if !c.needs_live_agent())
    }

    pub fn message(&self, id: &str) -> Option<&ChatMessage> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub(crate) fn append(&mut self, sender: Sender, body: impl Into<String>) -> &ChatMessage {
        self.messages.push(ChatMessage::new(sender, body));
        &self.messages[self.messages.len() - 1]
    }

    /// First write wins: returns false and changes nothing if a category is already set.
    pub(crate) fn select_category(
        &mut self,
        category: IssueCategory,
        ticket_id: String,
        target_resolution_time: DateTime<Utc>,
    ) -> bool {
        if self.selected_category.is_some() {
            return false;
        }
        self.selected_category = Some(category);
        self.ticket_id = Some(ticket_id);
        self.target_resolution_time = Some(target_resolution_time);
        true
    }

    pub(crate) fn mark_helpful(&mut self, message_id: &str, helpful: bool) -> Result<()> {
        let message = self
            .messages
            .iter_mut()
            .find(|m| m.id == message_id && m.sender == Sender::Bot)
            .ok_or_else(|| SupportError::MessageNotFound(message_id.to_string()))?;

        if message.helpfulness != Helpfulness::Unset {
            return Err(SupportError::AlreadyRated(message_id.to_string()));
        }
        message.helpfulness = helpful.into();
        Ok(())
    }

    pub(crate) fn record_user_interaction(&mut self) {
        self.interaction_count = self.interaction_count.saturating_add(1);
    }

    /// Back to the empty initial snapshot. Visibility belongs to the caller and is kept.
    pub(crate) fn reset(&mut self) {
        *self = Self {
            is_open: self.is_open,
            ..Self::default()
        };
    }
}
