//! Conversation message store and UI update sink.
//!
//! The [`Conversation`] is the only shared mutable state of the subsystem.
//! The orchestrator creates messages in it; assembler snapshots are committed
//! to the single active placeholder. Every conversation generation is
//! numbered, and snapshots tagged with an older generation are refused so an
//! abandoned delivery can never touch a reset conversation.

use cadence_core::types::{Message, MessageId};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::assembler::{AssemblyOutcome, Notification};
use crate::error::DeliveryError;
use crate::state::{DeliveryState, DeliveryTracker};

// =============================================================================
// UI sink
// =============================================================================

/// Receives every notification after it has been committed to the store.
pub trait UpdateSink: Send + Sync {
    fn on_update(&self, notification: &Notification);
}

/// Sink that discards notifications.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl UpdateSink for NullSink {
    fn on_update(&self, _notification: &Notification) {}
}

/// Sink forwarding notifications over an unbounded channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<Notification>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UpdateSink for ChannelSink {
    fn on_update(&self, notification: &Notification) {
        if self.tx.send(notification.clone()).is_err() {
            tracing::trace!("Update receiver dropped");
        }
    }
}

// =============================================================================
// Conversation
// =============================================================================

/// Identity of an accepted delivery.
#[derive(Debug, Clone)]
pub struct DeliveryTicket {
    pub generation: u64,
    pub user_message_id: MessageId,
    pub assistant_message_id: MessageId,
    pub cancel: CancellationToken,
}

#[derive(Debug)]
struct ActiveDelivery {
    assistant_message_id: MessageId,
    cancel: CancellationToken,
}

/// Ordered messages of one conversation plus its delivery slot.
#[derive(Debug, Default)]
pub struct Conversation {
    generation: u64,
    messages: Vec<Message>,
    tracker: DeliveryTracker,
    active: Option<ActiveDelivery>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a user message and an empty assistant placeholder.
    ///
    /// Refused without any change while another delivery is in flight.
    pub fn begin(&mut self, text: &str) -> Result<DeliveryTicket, DeliveryError> {
        if let Some(active) = &self.active {
            return Err(DeliveryError::Busy(active.assistant_message_id));
        }
        self.tracker.transition(DeliveryState::Pending)?;

        let user = Message::user(text);
        let placeholder = Message::assistant_placeholder();
        let ticket = DeliveryTicket {
            generation: self.generation,
            user_message_id: user.id,
            assistant_message_id: placeholder.id,
            cancel: CancellationToken::new(),
        };
        self.messages.push(user);
        self.messages.push(placeholder);
        self.active = Some(ActiveDelivery {
            assistant_message_id: ticket.assistant_message_id,
            cancel: ticket.cancel.clone(),
        });
        Ok(ticket)
    }

    /// Commit a snapshot to the active placeholder.
    ///
    /// Returns `false`, leaving everything untouched, when the snapshot
    /// belongs to an older generation or to a message that is not the
    /// active placeholder. A terminal snapshot releases the delivery slot.
    pub fn commit(
        &mut self,
        generation: u64,
        notification: &Notification,
        outcome: Option<AssemblyOutcome>,
    ) -> Result<bool, DeliveryError> {
        if generation != self.generation {
            return Ok(false);
        }
        let is_active = self
            .active
            .as_ref()
            .is_some_and(|a| a.assistant_message_id == notification.message_id);
        if !is_active {
            return Ok(false);
        }
        let Some(message) = self
            .messages
            .iter_mut()
            .rev()
            .find(|m| m.id == notification.message_id)
        else {
            return Ok(false);
        };

        message.content.clone_from(&notification.content);
        if notification.terminal {
            message.model_name.clone_from(&notification.model_name);
            let target = match outcome {
                Some(AssemblyOutcome::Failed) => DeliveryState::Failed,
                _ => DeliveryState::Done,
            };
            self.tracker.transition(target)?;
            self.tracker.transition(DeliveryState::Idle)?;
            self.active = None;
        } else if self.tracker.current() == DeliveryState::Pending {
            self.tracker.transition(DeliveryState::Streaming)?;
        }
        Ok(true)
    }

    /// Start a new generation: drop every message and cancel the in-flight
    /// delivery, if any.
    pub fn reset(&mut self) {
        if let Some(active) = self.active.take() {
            active.cancel.cancel();
            tracing::info!(
                message_id = %active.assistant_message_id,
                "Abandoning in-flight delivery"
            );
        }
        self.tracker.reset();
        self.messages.clear();
        self.generation += 1;
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> DeliveryState {
        self.tracker.current()
    }

    /// Assistant message currently being delivered.
    pub fn active_message_id(&self) -> Option<MessageId> {
        self.active.as_ref().map(|a| a.assistant_message_id)
    }

    /// Owned copy of every message, oldest first.
    pub fn snapshot(&self) -> Vec<Message> {
        self.messages.clone()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn message(&self, id: MessageId) -> Option<&Message> {
        self.messages.iter().find(|m| m.id == id)
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::types::Role;

    fn note(id: MessageId, content: &str, model: Option<&str>, terminal: bool) -> Notification {
        Notification {
            message_id: id,
            content: content.to_string(),
            model_name: model.map(str::to_string),
            terminal,
        }
    }

    // ---- begin ----

    #[test]
    fn test_begin_registers_user_and_placeholder() {
        let mut conv = Conversation::new();
        let ticket = conv.begin("hello").unwrap();
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.messages()[0].role, Role::User);
        assert_eq!(conv.messages()[0].content, "hello");
        assert_eq!(conv.messages()[1].id, ticket.assistant_message_id);
        assert!(conv.messages()[1].is_pending());
        assert_eq!(conv.state(), DeliveryState::Pending);
        assert_eq!(conv.active_message_id(), Some(ticket.assistant_message_id));
    }

    #[test]
    fn test_begin_while_active_is_rejected_without_mutation() {
        let mut conv = Conversation::new();
        let ticket = conv.begin("first").unwrap();
        let err = conv.begin("second").unwrap_err();
        assert!(matches!(err, DeliveryError::Busy(id) if id == ticket.assistant_message_id));
        assert_eq!(conv.len(), 2);
        assert_eq!(conv.state(), DeliveryState::Pending);
    }

    // ---- commit ----

    #[test]
    fn test_commit_progresses_states() {
        let mut conv = Conversation::new();
        let t = conv.begin("q").unwrap();
        let id = t.assistant_message_id;

        assert!(conv.commit(t.generation, &note(id, "par", None, false), None).unwrap());
        assert_eq!(conv.state(), DeliveryState::Streaming);
        assert_eq!(conv.message(id).unwrap().content, "par");

        let done = note(id, "partial", Some("m"), true);
        assert!(conv
            .commit(t.generation, &done, Some(AssemblyOutcome::Completed))
            .unwrap());
        assert_eq!(conv.state(), DeliveryState::Idle);
        assert!(conv.active_message_id().is_none());
        let msg = conv.message(id).unwrap();
        assert_eq!(msg.content, "partial");
        assert_eq!(msg.model_name.as_deref(), Some("m"));
    }

    #[test]
    fn test_terminal_commit_from_pending() {
        let mut conv = Conversation::new();
        let t = conv.begin("q").unwrap();
        let failed = note(t.assistant_message_id, "sorry", None, true);
        assert!(conv
            .commit(t.generation, &failed, Some(AssemblyOutcome::Failed))
            .unwrap());
        assert_eq!(conv.state(), DeliveryState::Idle);
        assert!(conv.begin("again").is_ok());
    }

    #[test]
    fn test_finished_message_is_immutable() {
        let mut conv = Conversation::new();
        let t = conv.begin("q").unwrap();
        let id = t.assistant_message_id;
        conv.commit(t.generation, &note(id, "final", None, true), Some(AssemblyOutcome::Completed))
            .unwrap();
        assert!(!conv.commit(t.generation, &note(id, "late", None, false), None).unwrap());
        assert_eq!(conv.message(id).unwrap().content, "final");
    }

    #[test]
    fn test_commit_for_other_message_refused() {
        let mut conv = Conversation::new();
        let t = conv.begin("q").unwrap();
        let stray = note(t.user_message_id, "hijack", None, false);
        assert!(!conv.commit(t.generation, &stray, None).unwrap());
        assert_eq!(conv.messages()[0].content, "q");
    }

    // ---- reset ----

    #[test]
    fn test_reset_cancels_and_clears() {
        let mut conv = Conversation::new();
        let t = conv.begin("q").unwrap();
        conv.reset();
        assert!(t.cancel.is_cancelled());
        assert!(conv.is_empty());
        assert_eq!(conv.state(), DeliveryState::Idle);
        assert_eq!(conv.generation(), t.generation + 1);
    }

    #[test]
    fn test_stale_generation_refused_after_reset() {
        let mut conv = Conversation::new();
        let old = conv.begin("q").unwrap();
        conv.reset();
        let fresh = conv.begin("q2").unwrap();
        let stale = note(old.assistant_message_id, "ghost", None, true);
        assert!(!conv.commit(old.generation, &stale, None).unwrap());
        assert_eq!(conv.state(), DeliveryState::Pending);
        assert_eq!(conv.active_message_id(), Some(fresh.assistant_message_id));
    }

    // ---- sinks ----

    #[tokio::test]
    async fn test_channel_sink_forwards() {
        let (sink, mut rx) = ChannelSink::new();
        let n = note(MessageId::new(), "x", None, false);
        sink.on_update(&n);
        assert_eq!(rx.recv().await, Some(n));
    }

    #[test]
    fn test_channel_sink_tolerates_dropped_receiver() {
        let (sink, rx) = ChannelSink::new();
        drop(rx);
        sink.on_update(&note(MessageId::new(), "x", None, false));
    }
}
