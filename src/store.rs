use crate::{
    bus::{Event, EventBus},
    chat::{ChatMessage, ChatSession},
    entity::{IssueCategory, Sender},
    error::{Result, SupportError},
    ticket,
};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

struct Inner {
    session: ChatSession,
    /// Bumped on every reset so late scripted replies can tell they are stale
    generation: u64,
    pending: CancellationToken,
}

/// Owner of the support chat session. All mutations go through here and
/// every change is published on the event bus as a fresh snapshot.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<Inner>>,
    bus: Arc<EventBus>,
    resolution_window: chrono::Duration,
}

impl SessionStore {
    pub fn new(bus: Arc<EventBus>, resolution_window: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                session: ChatSession::new(),
                generation: 0,
                pending: CancellationToken::new(),
            })),
            bus,
            resolution_window,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        // A panic mid-update cannot leave the session half-written, so keep serving it
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    pub fn snapshot(&self) -> ChatSession {
        self.lock().session.clone()
    }

    /// Apply `f` atomically. On success, newly appended messages and the
    /// resulting snapshot are published; on error nothing is published, so
    /// `f` must check before it mutates.
    pub fn update<T>(&self, f: impl FnOnce(&mut ChatSession) -> Result<T>) -> Result<T> {
        self.transact(f).map(|(value, _)| value)
    }

    /// Like [`update`](Self::update), but also returns the session generation
    /// the mutation ran under, for scheduling follow-up scripted messages.
    pub fn transact<T>(&self, f: impl FnOnce(&mut ChatSession) -> Result<T>) -> Result<(T, u64)> {
        let (value, generation, appended, snapshot) = {
            let mut inner = self.lock();
            let before = inner.session.messages.len();
            let value = f(&mut inner.session)?;
            let appended = inner
                .session
                .messages
                .get(before..)
                .map(<[ChatMessage]>::to_vec)
                .unwrap_or_default();
            (value, inner.generation, appended, inner.session.clone())
        };

        for msg in appended {
            self.bus.publish(Event::MessageAppended(msg));
        }
        self.bus.publish(Event::SessionUpdated(snapshot));
        Ok((value, generation))
    }

    pub fn append_message(&self, sender: Sender, body: impl Into<String>) -> ChatMessage {
        let body = body.into();
        let (msg, snapshot) = {
            let mut inner = self.lock();
            let msg = inner.session.append(sender, body).clone();
            (msg, inner.session.clone())
        };
        debug!("Appended {:?} message {}", msg.sender, msg.id);
        self.bus.publish(Event::MessageAppended(msg.clone()));
        self.bus.publish(Event::SessionUpdated(snapshot));
        msg
    }

    /// Target resolution time for a ticket opened now.
    pub fn resolution_target(&self) -> Result<DateTime<Utc>> {
        Utc::now()
            .checked_add_signed(self.resolution_window)
            .ok_or(SupportError::ResolutionOutOfRange)
    }

    /// Returns the new ticket id, or `None` if a category was already chosen.
    pub fn select_category(&self, category: IssueCategory) -> Result<Option<String>> {
        let ticket_id = self.update(|session| {
            if session.selected_category.is_some() {
                return Ok(None);
            }
            let target = self.resolution_target()?;
            let ticket_id = ticket::generate();
            session.select_category(category, ticket_id.clone(), target);
            Ok(Some(ticket_id))
        })?;

        match &ticket_id {
            Some(id) => info!("Opened ticket {} for {} support", id, category),
            None => debug!("Ignoring category {}: already selected", category),
        }
        Ok(ticket_id)
    }

    pub fn mark_helpful(&self, message_id: &str, helpful: bool) -> Result<()> {
        self.update(|session| session.mark_helpful(message_id, helpful))
    }

    pub fn record_user_interaction(&self) {
        let _ = self.update(|session| {
            session.record_user_interaction();
            Ok(())
        });
    }

    pub fn set_open(&self, open: bool) {
        let _ = self.update(|session| {
            session.is_open = open;
            Ok(())
        });
    }

    /// Wipe the session and cancel every scripted reply still waiting to fire.
    pub fn reset(&self) {
        let snapshot = {
            let mut inner = self.lock();
            inner.session.reset();
            inner.generation += 1;
            inner.pending.cancel();
            inner.pending = CancellationToken::new();
            inner.session.clone()
        };
        info!("Support session reset");
        self.bus.publish(Event::SessionUpdated(snapshot));
    }

    /// Append a scripted message after `delay`, unless the session is reset first.
    pub fn schedule_message(
        &self,
        sender: Sender,
        body: impl Into<String>,
        delay: Duration,
    ) -> JoinHandle<()> {
        let generation = self.lock().generation;
        self.schedule_script(generation, vec![ScriptedMessage::new(sender, body, delay)])
    }

    /// Play `script` in order for the session `generation`. Each step waits
    /// its own delay after the previous one. A reset, past or future, stops
    /// the remaining steps.
    pub fn schedule_script(&self, generation: u64, script: Vec<ScriptedMessage>) -> JoinHandle<()> {
        let token = {
            let inner = self.lock();
            if inner.generation == generation {
                inner.pending.clone()
            } else {
                let stale = CancellationToken::new();
                stale.cancel();
                stale
            }
        };
        let store = self.clone();

        tokio::spawn(async move {
            for step in script {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Scripted reply cancelled by reset");
                        return;
                    }
                    _ = tokio::time::sleep(step.delay) => {}
                }
                if !store.append_if_current(generation, step.sender, step.body) {
                    return;
                }
            }
        })
    }

    fn append_if_current(&self, generation: u64, sender: Sender, body: String) -> bool {
        let (msg, snapshot) = {
            let mut inner = self.lock();
            if inner.generation != generation {
                debug!("Dropping stale scripted reply from generation {}", generation);
                return false;
            }
            let msg = inner.session.append(sender, body).clone();
            (msg, inner.session.clone())
        };
        self.bus.publish(Event::MessageAppended(msg));
        self.bus.publish(Event::SessionUpdated(snapshot));
        true
    }
}

/// One step of a scripted reply sequence.
#[derive(Debug, Clone, PartialEq)]
pub struct ScriptedMessage {
    pub sender: Sender,
    pub body: String,
    /// Wait before this step, counted from the previous one
    pub delay: Duration,
}

impl ScriptedMessage {
    pub fn new(sender: Sender, body: impl Into<String>, delay: Duration) -> Self {
        Self {
            sender,
            body: body.into(),
            delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn store() -> SessionStore {
        SessionStore::new(Arc::new(EventBus::new()), chrono::Duration::hours(24))
    }

    #[test]
    fn test_append_message_publishes_message_and_snapshot() {
        let store = store();
        let mut rx = store.subscribe();

        let msg = store.append_message(Sender::User, "hi");

        match rx.try_recv().unwrap() {
            Event::MessageAppended(m) => assert_eq!(m, msg),
            other => panic!("unexpected event {:?}", other),
        }
        match rx.try_recv().unwrap() {
            Event::SessionUpdated(s) => assert_eq!(s.messages, vec![msg]),
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_select_category_generates_ticket_once() {
        let store = store();
        let before = Utc::now();

        let ticket_id = store.select_category(IssueCategory::Billing).unwrap().unwrap();
        assert!(ticket::is_valid(&ticket_id));

        let session = store.snapshot();
        assert_eq!(session.ticket_id.as_deref(), Some(ticket_id.as_str()));
        let target = session.target_resolution_time.unwrap();
        assert!(target >= before + chrono::Duration::hours(24));
        assert!(target <= Utc::now() + chrono::Duration::hours(24));

        assert_eq!(store.select_category(IssueCategory::Technical), Ok(None));
        let again = store.snapshot();
        assert_eq!(again.selected_category, Some(IssueCategory::Billing));
        assert_eq!(again.ticket_id, Some(ticket_id));
    }

    #[test]
    fn test_mark_helpful_error_publishes_nothing() {
        let store = store();
        store.append_message(Sender::User, "hi");
        let mut rx = store.subscribe();

        assert_eq!(
            store.mark_helpful("nope", true),
            Err(SupportError::MessageNotFound("nope".to_string()))
        );
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_open_only_touches_visibility() {
        let store = store();
        store.select_category(IssueCategory::Gameplay).unwrap();
        let before = store.snapshot();

        store.set_open(true);
        let after = store.snapshot();
        assert!(after.is_open);
        assert_eq!(ChatSession { is_open: false, ..after }, before);

        store.set_open(false);
        assert_eq!(store.snapshot(), before);
    }

    #[test]
    fn test_reset_from_any_state() {
        let store = store();
        store.select_category(IssueCategory::Technical).unwrap();
        store.append_message(Sender::User, "crash");
        store.record_user_interaction();
        store.record_user_interaction();

        store.reset();

        assert_eq!(store.snapshot(), ChatSession::new());
        assert!(store.select_category(IssueCategory::Billing).unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_scheduled_message_arrives_after_delay() {
        let store = store();
        let handle = store.schedule_message(Sender::Bot, "later", Duration::from_secs(1));

        tokio::time::sleep(Duration::from_millis(999)).await;
        assert!(store.snapshot().messages.is_empty());

        handle.await.unwrap();
        let messages = store.snapshot().messages;
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].body, "later");
        assert_eq!(messages[0].sender, Sender::Bot);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_cancels_pending_messages() {
        let store = store();
        let handle = store.schedule_message(Sender::Bot, "stale", Duration::from_secs(1));

        store.reset();
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(store.snapshot().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_messages_scheduled_after_reset_still_fire() {
        let store = store();
        store.reset();
        let handle = store.schedule_message(Sender::Notice, "fresh", Duration::from_secs(1));
        handle.await.unwrap();
        assert_eq!(store.snapshot().messages.len(), 1);
    }

    #[test]
    fn test_unrepresentable_resolution_target_is_rejected() {
        let store = SessionStore::new(
            Arc::new(EventBus::new()),
            chrono::Duration::try_days(100_000_000).unwrap(),
        );
        let mut rx = store.subscribe();

        assert_eq!(
            store.select_category(IssueCategory::Billing),
            Err(SupportError::ResolutionOutOfRange)
        );
        assert_eq!(store.snapshot(), ChatSession::new());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_transact_reports_generation() {
        let store = store();
        let (_, first) = store.transact(|_| Ok(())).unwrap();
        store.reset();
        let (_, second) = store.transact(|_| Ok(())).unwrap();
        assert_eq!(second, first + 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_plays_steps_in_order() {
        let store = store();
        let script = vec![
            ScriptedMessage::new(Sender::Notice, "one", Duration::from_secs(1)),
            ScriptedMessage::new(Sender::Bot, "two", Duration::from_secs(1)),
        ];
        let (_, generation) = store.transact(|_| Ok(())).unwrap();
        let handle = store.schedule_script(generation, script);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        let bodies: Vec<_> = store.snapshot().messages.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["one"]);

        handle.await.unwrap();
        let bodies: Vec<_> = store.snapshot().messages.into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, vec!["one", "two"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reset_mid_script_stops_remaining_steps() {
        let store = store();
        let script = vec![
            ScriptedMessage::new(Sender::Notice, "one", Duration::from_secs(1)),
            ScriptedMessage::new(Sender::Bot, "two", Duration::from_secs(1)),
        ];
        let (_, generation) = store.transact(|_| Ok(())).unwrap();
        let handle = store.schedule_script(generation, script);

        tokio::time::sleep(Duration::from_millis(1500)).await;
        store.reset();
        handle.await.unwrap();

        assert!(store.snapshot().messages.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_script_for_past_generation_never_fires() {
        let store = store();
        let (_, generation) = store.transact(|_| Ok(())).unwrap();
        store.reset();

        let handle = store.schedule_script(
            generation,
            vec![ScriptedMessage::new(Sender::Bot, "stale", Duration::from_secs(1))],
        );
        handle.await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;

        assert!(store.snapshot().messages.is_empty());
    }
}
