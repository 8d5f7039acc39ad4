use crate::transition::{ChatAction, ChatState};
use thiserror::Error;

/// Errors returned by the support chat when an action is rejected.
///
/// None of these are fatal: the session is left untouched and the view
/// decides how to surface the rejection.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupportError {
    #[error("Message not found or not a support reply: {0}")]
    MessageNotFound(String),

    #[error("Message {0} has already been rated")]
    AlreadyRated(String),

    #[error("Cannot {action} while {state}")]
    InvalidTransition { state: ChatState, action: ChatAction },

    #[error("Quick reply not found: {0}")]
    QuickReplyNotFound(usize),

    #[error("Message text is empty")]
    EmptyMessage,

    #[error("Target resolution time is out of range")]
    ResolutionOutOfRange,
}

pub type Result<T> = std::result::Result<T, SupportError>;
