use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{Event, EventBus};
use crate::chat::ChatSession;
use crate::config::SupportConfig;
use crate::entity::{IssueCategory, Sender};
use crate::error::{Result, SupportError};
use crate::store::{ScriptedMessage, SessionStore};
use crate::ticket;
use crate::transition::{self, ChatAction};

pub const ACK_REPLY: &str = "Thank you for your message. Our support team will assist you shortly.";
pub const OTHER_ISSUE_REPLY: &str = "Please wait for a live agent to assist you.";
pub const CONNECTING_NOTICE: &str = "Connecting to a live agent...";
pub const LIVE_AGENT_REPLY: &str = "A live agent will be with you shortly.";

/// Drives the scripted support conversation on top of a [`SessionStore`].
///
/// Every user action is checked against the transition table before it
/// touches the session; rejected actions return a [`SupportError`] and leave
/// the session exactly as it was.
#[derive(Clone)]
pub struct SupportChat {
    store: SessionStore,
    config: Arc<SupportConfig>,
}

impl SupportChat {
    pub fn new(bus: Arc<EventBus>, config: SupportConfig) -> Self {
        let store = SessionStore::new(bus, config.resolution_window);
        Self {
            store,
            config: Arc::new(config),
        }
    }

    pub fn snapshot(&self) -> ChatSession {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.store.subscribe()
    }

    pub fn quick_replies(&self) -> &[String] {
        &self.config.quick_replies
    }

    /// Open a ticket. The ticket notice (and, for "other", the live agent
    /// hand-off) land in the same update as the category itself.
    pub fn select_category(&self, category: IssueCategory) -> Result<String> {
        let (ticket_id, generation) = self
            .store
            .transact(|session| {
                transition::check(session, ChatAction::SelectCategory)?;
                let target = self.store.resolution_target()?;
                let ticket_id = ticket::generate();
                session.select_category(category, ticket_id.clone(), target);
                session.append(
                    Sender::Notice,
                    format!("Ticket {} created for {} support.", ticket_id, category),
                );
                if category.needs_live_agent() {
                    session.append(Sender::Bot, OTHER_ISSUE_REPLY);
                }
                Ok(ticket_id)
            })
            .inspect_err(|e| warn!("Rejected category {}: {}", category, e))?;

        info!("Opened ticket {} for {} support", ticket_id, category);
        if category.needs_live_agent() {
            self.store.schedule_script(
                generation,
                vec![
                    ScriptedMessage::new(Sender::Notice, CONNECTING_NOTICE, self.config.reply_delay),
                    ScriptedMessage::new(
                        Sender::Bot,
                        LIVE_AGENT_REPLY,
                        self.config.live_agent_delay,
                    ),
                ],
            );
        }
        Ok(ticket_id)
    }

    /// Send user text. The acknowledgment is scheduled, not awaited.
    pub fn send_message(&self, text: &str) -> Result<JoinHandle<()>> {
        if text.trim().is_empty() {
            return Err(SupportError::EmptyMessage);
        }

        let ((), generation) = self
            .store
            .transact(|session| {
                transition::check(session, ChatAction::SendMessage)?;
                session.append(Sender::User, text);
                session.record_user_interaction();
                Ok(())
            })
            .inspect_err(|e| warn!("Rejected message: {}", e))?;

        Ok(self.store.schedule_script(
            generation,
            vec![ScriptedMessage::new(Sender::Bot, ACK_REPLY, self.config.reply_delay)],
        ))
    }

    pub fn send_quick_reply(&self, index: usize) -> Result<JoinHandle<()>> {
        let text = self
            .config
            .quick_replies
            .get(index)
            .ok_or(SupportError::QuickReplyNotFound(index))?;
        self.send_message(text)
    }

    pub fn request_live_agent(&self) -> Result<JoinHandle<()>> {
        let ((), generation) = self
            .store
            .transact(|session| {
                transition::check(session, ChatAction::RequestLiveAgent)?;
                session.live_agent_requested = true;
                session.append(Sender::Notice, CONNECTING_NOTICE);
                Ok(())
            })
            .inspect_err(|e| warn!("Rejected live agent request: {}", e))?;

        info!("Live agent requested");
        Ok(self.store.schedule_script(
            generation,
            vec![ScriptedMessage::new(
                Sender::Bot,
                LIVE_AGENT_REPLY,
                self.config.live_agent_delay,
            )],
        ))
    }

    pub fn mark_helpful(&self, message_id: &str, helpful: bool) -> Result<()> {
        self.store.update(|session| {
            transition::check(session, ChatAction::MarkHelpful)?;
            session.mark_helpful(message_id, helpful)
        })
    }

    pub fn set_open(&self, open: bool) {
        self.store.set_open(open);
    }

    pub fn reset(&self) {
        self.store.reset();
    }
}
