use crate::chat::ChatSession;
use crate::error::{Result, SupportError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a support conversation currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatState {
    AwaitingCategory,
    Conversing,
    AwaitingLiveAgent,
}

impl ChatState {
    pub fn of(session: &ChatSession) -> Self {
        match session.selected_category {
            None => ChatState::AwaitingCategory,
            Some(category) if category.needs_live_agent() || session.live_agent_requested => {
                ChatState::AwaitingLiveAgent
            }
            Some(_) => ChatState::Conversing,
        }
    }
}

impl fmt::Display for ChatState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChatState::AwaitingCategory => "waiting for an issue category",
            ChatState::Conversing => "conversing",
            ChatState::AwaitingLiveAgent => "waiting for a live agent",
        };
        f.write_str(text)
    }
}

/// User-initiated actions the view can dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatAction {
    SelectCategory,
    SendMessage,
    MarkHelpful,
    RequestLiveAgent,
}

impl fmt::Display for ChatAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChatAction::SelectCategory => "select an issue category",
            ChatAction::SendMessage => "send a message",
            ChatAction::MarkHelpful => "rate a reply",
            ChatAction::RequestLiveAgent => "request a live agent",
        };
        f.write_str(text)
    }
}

/// Check `action` against the transition table for the session's current state.
pub fn check(session: &ChatSession, action: ChatAction) -> Result<ChatState> {
    let state = ChatState::of(session);
    let allowed = match (state, action) {
        (ChatState::AwaitingCategory, ChatAction::SelectCategory) => true,
        (ChatState::Conversing, ChatAction::SendMessage) => true,
        (ChatState::Conversing, ChatAction::MarkHelpful) => true,
        (ChatState::Conversing, ChatAction::RequestLiveAgent) => session.escalation_eligible(),
        (ChatState::AwaitingLiveAgent, ChatAction::SendMessage) => session.input_enabled(),
        (ChatState::AwaitingLiveAgent, ChatAction::MarkHelpful) => true,
        _ => false,
    };

    if allowed {
        Ok(state)
    } else {
        Err(SupportError::InvalidTransition { state, action })
    }
}
